//! # 文件系统层
//!
//! 磁盘的布局见 [`layout`](crate::layout)；
//! 这一层负责格式化与挂载，以及按路径创建、打开、删除、列举文件。
//!
//! 空闲扇区位图与根目录两个文件在文件系统的整个生命周期内保持打开。
//! 每个修改操作都从位图文件重新读出位图，全部步骤成功后才写回；
//! 失败时丢弃内存中的副本。多个结构之间的写回没有日志，
//! 写回中途出错可能使它们互相矛盾，调用者必须串行执行修改操作。

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use block_dev::BlockDevice;
use vfs::{DirEntryType, Error, Space, Stat};

use crate::util::{components, join_path, normalize_path};
use crate::{
    DIRECTORY_FILE_SIZE, DirEntry, Directory, FileHeader, FreeMap, OpenFile, SECTOR_SIZE,
    SectorId,
};

/// 空闲扇区位图的文件头所在扇区
pub const FREE_MAP_SECTOR: SectorId = SectorId::new(0);
/// 根目录的文件头所在扇区
pub const ROOT_SECTOR: SectorId = SectorId::new(1);

/// 时钟，返回 Unix 秒数，用于记录文件的创建时间
pub type Clock = fn() -> u64;

fn epoch() -> u64 {
    0
}

#[derive(Debug)]
pub struct FileSystem {
    block_device: Arc<dyn BlockDevice>,
    free_map_file: OpenFile,
    directory_file: OpenFile,
    clock: Clock,
}

impl FileSystem {
    /// 在 `total_sectors` 个扇区的设备上建立空的文件系统
    pub fn format(block_device: Arc<dyn BlockDevice>, total_sectors: usize) -> vfs::Result<Self> {
        if total_sectors < 2 {
            log::warn!("{total_sectors} sectors cannot hold the reserved headers");
            return Err(Error::InsufficientSpace(Space::Header));
        }

        let mut free_map = FreeMap::new(total_sectors);
        free_map.mark(FREE_MAP_SECTOR);
        free_map.mark(ROOT_SECTOR);

        let free_map_header = FileHeader::allocate(
            &mut free_map,
            FreeMap::file_size(total_sectors),
            "/",
            epoch(),
            &block_device,
        )?;
        let directory_header = FileHeader::allocate(
            &mut free_map,
            DIRECTORY_FILE_SIZE,
            "/",
            epoch(),
            &block_device,
        )?;

        free_map_header.write_back(FREE_MAP_SECTOR, &block_device)?;
        directory_header.write_back(ROOT_SECTOR, &block_device)?;

        let free_map_file =
            OpenFile::with_header(block_device.clone(), FREE_MAP_SECTOR, free_map_header);
        let directory_file =
            OpenFile::with_header(block_device.clone(), ROOT_SECTOR, directory_header);
        free_map.write_back(&free_map_file)?;
        Directory::new().write_back(&directory_file)?;

        log::info!(
            "formatted {total_sectors} sectors, {} free",
            free_map.clear_count()
        );

        Ok(Self {
            block_device,
            free_map_file,
            directory_file,
            clock: epoch,
        })
    }

    /// 挂载已经格式化过的设备
    pub fn mount(block_device: Arc<dyn BlockDevice>) -> vfs::Result<Self> {
        let free_map_file = OpenFile::open(block_device.clone(), FREE_MAP_SECTOR)?;
        let directory_file = OpenFile::open(block_device.clone(), ROOT_SECTOR)?;
        let free_map = FreeMap::fetch_from(&free_map_file)?;
        Directory::fetch_from(&directory_file)?;

        log::info!(
            "mounted file system with {} free sectors",
            free_map.clear_count()
        );

        Ok(Self {
            block_device,
            free_map_file,
            directory_file,
            clock: epoch,
        })
    }

    /// 替换记录创建时间所用的时钟
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// 在 `path` 目录下创建名为 `name` 的文件或目录。
    /// 目录的大小固定为 [`DIRECTORY_FILE_SIZE`]，`size` 被忽略。
    pub fn create(&mut self, name: &str, size: usize, is_dir: bool, path: &str) -> vfs::Result<()> {
        log::debug!("create {name:?} in {path:?}, {size} bytes, dir: {is_dir}");

        let (mut dir, dir_file) = self.open_dir(path)?;
        if !DirEntry::is_valid_name(name) {
            return Err(Error::InvalidName);
        }
        if dir.find(name).is_some() {
            return Err(Error::AlreadyExists);
        }

        let mut free_map = FreeMap::fetch_from(&self.free_map_file)?;
        let sector = free_map
            .find()
            .ok_or(Error::InsufficientSpace(Space::Header))?;
        dir.add(name, sector, is_dir)?;

        let size = if is_dir { DIRECTORY_FILE_SIZE } else { size };
        let header = FileHeader::allocate(
            &mut free_map,
            size,
            &normalize_path(path),
            (self.clock)(),
            &self.block_device,
        )?;

        // 所有步骤都已成功，依次写回
        header.write_back(sector, &self.block_device)?;
        if is_dir {
            let file = OpenFile::with_header(self.block_device.clone(), sector, header);
            Directory::new().write_back(&file)?;
        }
        dir.write_back(&dir_file)?;
        free_map.write_back(&self.free_map_file)
    }

    /// 打开 `path` 目录下名为 `name` 的文件
    pub fn open(&self, name: &str, path: &str) -> vfs::Result<OpenFile> {
        log::debug!("open {name:?} in {path:?}");

        let (dir, _) = self.open_dir(path)?;
        let sector = dir.find(name).ok_or(Error::NotFound)?;
        OpenFile::open(self.block_device.clone(), sector)
    }

    /// 删除 `path` 目录下名为 `name` 的文件；目录连同其中的所有内容一并删除
    pub fn remove(&mut self, name: &str, path: &str) -> vfs::Result<()> {
        log::debug!("remove {name:?} in {path:?}");

        let (mut dir, dir_file) = self.open_dir(path)?;
        let entry = dir.entry(name).cloned().ok_or(Error::NotFound)?;
        let sector = entry.header_sector();

        if entry.is_dir() {
            let child_path = join_path(path, name);
            let children =
                Directory::fetch_from(&OpenFile::open(self.block_device.clone(), sector)?)?;
            for child in children.entries() {
                self.remove(child.name(), &child_path)?;
            }
        }

        let header = FileHeader::fetch_from(sector, &self.block_device)?;
        let mut free_map = FreeMap::fetch_from(&self.free_map_file)?;
        header.deallocate(&mut free_map, &self.block_device)?;
        free_map.release(sector)?;
        dir.remove(name)?;

        free_map.write_back(&self.free_map_file)?;
        dir.write_back(&dir_file)
    }

    /// 整棵目录树，从根目录开始先序排列
    pub fn list(&self) -> vfs::Result<Vec<Listing>> {
        self.list_all("/")
    }

    /// 以 `path` 为根的目录树，先序排列
    pub fn list_all(&self, path: &str) -> vfs::Result<Vec<Listing>> {
        let mut listings = Vec::new();
        self.walk(normalize_path(path), &mut listings)?;
        Ok(listings)
    }

    /// `path` 目录下的目录项，不递归
    pub fn read_dir(&self, path: &str) -> vfs::Result<Vec<vfs::DirEntry>> {
        let (dir, _) = self.open_dir(path)?;
        Ok(dir.list())
    }

    pub fn stat(&self, name: &str, path: &str) -> vfs::Result<Stat> {
        let (dir, _) = self.open_dir(path)?;
        let entry = dir.entry(name).ok_or(Error::NotFound)?;
        let header = FileHeader::fetch_from(entry.header_sector(), &self.block_device)?;

        Ok(Stat {
            mode: if entry.is_dir() {
                DirEntryType::Directory
            } else {
                DirEntryType::Regular
            },
            inode: entry.header_sector().raw().into(),
            block_size: SECTOR_SIZE as u64,
            blocks: header.sector_count() as u64,
            size: header.len() as u64,
        })
    }

    /// 空闲扇区数
    pub fn free_sectors(&self) -> vfs::Result<usize> {
        Ok(FreeMap::fetch_from(&self.free_map_file)?.clear_count())
    }

    /// 文件系统的完整快照，用于调试输出
    pub fn report(&self) -> vfs::Result<Report> {
        Ok(Report {
            free_map_header: self.free_map_file.header().clone(),
            directory_header: self.directory_file.header().clone(),
            free_map: FreeMap::fetch_from(&self.free_map_file)?,
            root: Directory::fetch_from(&self.directory_file)?,
        })
    }
}

impl FileSystem {
    /// 逐级解析 `path`，返回最后一级目录及其所在的文件
    fn open_dir(&self, path: &str) -> vfs::Result<(Directory, OpenFile)> {
        let mut file = self.directory_file.clone();
        let mut dir = Directory::fetch_from(&file)?;

        for name in components(path) {
            let sector = dir
                .entry(name)
                .filter(|entry| entry.is_dir())
                .map(DirEntry::header_sector)
                .ok_or(Error::PathNotFound)?;
            file = OpenFile::open(self.block_device.clone(), sector)?;
            dir = Directory::fetch_from(&file)?;
        }

        Ok((dir, file))
    }

    fn walk(&self, path: String, listings: &mut Vec<Listing>) -> vfs::Result<()> {
        let (dir, _) = self.open_dir(&path)?;
        let subdirs: Vec<_> = dir
            .entries()
            .filter(|entry| entry.is_dir())
            .map(|entry| join_path(&path, entry.name()))
            .collect();

        listings.push(Listing {
            path,
            entries: dir.list(),
        });
        for subdir in subdirs {
            self.walk(subdir, listings)?;
        }
        Ok(())
    }
}

/// 一个目录的路径及其目录项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub path: String,
    pub entries: Vec<vfs::DirEntry>,
}

impl fmt::Display for Listing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.path)?;
        for entry in &self.entries {
            if entry.is_dir() {
                writeln!(f, "  {}/", entry.name)?;
            } else {
                writeln!(f, "  {}", entry.name)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Report {
    pub free_map_header: FileHeader,
    pub directory_header: FileHeader,
    pub free_map: FreeMap,
    pub root: Directory,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Bit map file header:")?;
        write!(f, "{}", self.free_map_header)?;
        writeln!(f, "Directory file header:")?;
        write!(f, "{}", self.directory_header)?;
        write!(f, "{}", self.free_map)?;
        write!(f, "{}", self.root)
    }
}
