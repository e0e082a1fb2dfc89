use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use vfs::{Error, Space, Violation};

use crate::{DirEntry, OpenFile, SectorId};

/// 一个目录最多容纳的目录项数
pub const NUM_DIR_ENTRIES: usize = 10;
/// 目录文件的字节数
pub const DIRECTORY_FILE_SIZE: usize = NUM_DIR_ENTRIES * DirEntry::SIZE;

/// 目录：定长的目录项表，本身作为普通文件的数据存放
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    table: Vec<DirEntry>,
}

impl Directory {
    /// 空目录
    pub fn new() -> Self {
        Self {
            table: vec![DirEntry::default(); NUM_DIR_ENTRIES],
        }
    }

    /// 从目录文件读出目录表
    pub fn fetch_from(file: &OpenFile) -> vfs::Result<Self> {
        let mut bytes = [0; DIRECTORY_FILE_SIZE];
        if file.read_at(&mut bytes, 0)? != DIRECTORY_FILE_SIZE {
            log::error!("directory file at sector {} is truncated", file.header_sector());
            return Err(Violation::CorruptRecord.into());
        }

        let table = bytes
            .chunks_exact(DirEntry::SIZE)
            .map(DirEntry::decode)
            .collect::<vfs::Result<_>>()?;
        Ok(Self { table })
    }

    /// 把目录表写回目录文件
    pub fn write_back(&self, file: &OpenFile) -> vfs::Result<()> {
        let mut bytes = [0; DIRECTORY_FILE_SIZE];
        for (entry, chunk) in self.table.iter().zip(bytes.chunks_exact_mut(DirEntry::SIZE)) {
            entry.encode(chunk)?;
        }

        if file.write_at(&bytes, 0)? != DIRECTORY_FILE_SIZE {
            log::error!("directory file at sector {} is truncated", file.header_sector());
            return Err(Violation::CorruptRecord.into());
        }
        Ok(())
    }

    /// 按名字查找，返回文件头所在扇区
    pub fn find(&self, name: &str) -> Option<SectorId> {
        self.entry(name).map(DirEntry::header_sector)
    }

    pub fn entry(&self, name: &str) -> Option<&DirEntry> {
        self.table
            .iter()
            .find(|entry| entry.in_use() && entry.name() == name)
    }

    /// 名字存在且是目录
    pub fn is_dir(&self, name: &str) -> bool {
        self.entry(name).is_some_and(DirEntry::is_dir)
    }

    /// 添加目录项
    pub fn add(&mut self, name: &str, header_sector: SectorId, is_dir: bool) -> vfs::Result<()> {
        if !DirEntry::is_valid_name(name) {
            return Err(Error::InvalidName);
        }
        if self.entry(name).is_some() {
            return Err(Error::AlreadyExists);
        }

        let slot = self
            .table
            .iter_mut()
            .find(|entry| !entry.in_use())
            .ok_or(Error::InsufficientSpace(Space::Directory))?;
        *slot = DirEntry::new(name, header_sector, is_dir);
        Ok(())
    }

    /// 删除目录项，只清除表项，不动文件本身
    pub fn remove(&mut self, name: &str) -> vfs::Result<()> {
        let slot = self
            .table
            .iter_mut()
            .find(|entry| entry.in_use() && entry.name() == name)
            .ok_or(Error::NotFound)?;
        *slot = DirEntry::default();
        Ok(())
    }

    /// 所有在用的目录项
    pub fn entries(&self) -> impl Iterator<Item = &DirEntry> {
        self.table.iter().filter(|entry| entry.in_use())
    }

    pub fn list(&self) -> Vec<vfs::DirEntry> {
        self.entries().map(DirEntry::to_vfs).collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries().count()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries().next().is_none()
    }
}

impl Default for Directory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Directory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Directory contents:")?;
        for entry in self.entries() {
            let kind = if entry.is_dir() { "D" } else { "F" };
            writeln!(
                f,
                "Name: {}, Sector: {}, Type: {kind}",
                entry.name(),
                entry.header_sector()
            )?;
        }
        Ok(())
    }
}
