//! # 文件头
//!
//! 一个文件头恰好占据一个扇区，记录文件的长度，以及定位数据扇区的两级索引：
//! - 直接索引：文件头内的 [`NUM_DIRECT`] 个槽位，每个都指向一个**数据扇区**
//! - 间接索引：文件头内的 [`NUM_INDIRECT`] 个槽位，每个都指向一个**索引块**；
//!   索引块整块连续存储 [`INDEX_COUNT`] 个扇区号，每个都指向一个数据扇区
//!
//! 目录的数据用于存放目录表；文件的数据就是文件的内容。
//!
//! ## 块索引编码
//!
//! 逻辑块 `k`（从0数起）：
//! - `k < NUM_DIRECT` 时就是直接索引的第 `k` 个槽位
//! - 否则 `(k - NUM_DIRECT) / INDEX_COUNT` 为索引块的位置，
//!   `(k - NUM_DIRECT) % INDEX_COUNT` 为块内的位置

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::{fmt, mem};

use binrw::io::Cursor;
use binrw::{BinRead, BinWrite, binrw};
use block_dev::BlockDevice;
use vfs::{Error, Space, Violation};

use super::corrupt;
use crate::sector::{decode_slots, encode_slots};
use crate::util::{cstr, fill_cstr, format_timestamp};
use crate::{FREE_MAP_SECTOR, FreeMap, OpenFile, SECTOR_SIZE, SectorId};

/// 直接索引的槽位数
pub const NUM_DIRECT: usize = 15;
/// 间接索引的槽位数
pub const NUM_INDIRECT: usize = 4;
/// 索引块的编号容量
pub const INDEX_COUNT: usize = SECTOR_SIZE / mem::size_of::<u32>();
/// 一个文件最多拥有的数据扇区数
pub const MAX_SECTORS: usize = NUM_DIRECT + NUM_INDIRECT * INDEX_COUNT;
/// 一个文件最多拥有的字节数
pub const MAX_FILE_SIZE: usize = MAX_SECTORS * SECTOR_SIZE;
/// 创建时间 `YYYY-MM-DD HH:MM:SS\0`
pub const TIMESTAMP_LEN: usize = 20;
/// 创建时所在目录的路径，超长截断
pub const PATH_LEN: usize = 24;

const _: () = assert!(
    2 * mem::size_of::<u32>()
        + (NUM_DIRECT + NUM_INDIRECT) * mem::size_of::<u32>()
        + TIMESTAMP_LEN
        + PATH_LEN
        == SECTOR_SIZE
);

/// 磁盘上的文件头，即 inode
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    /// 文件的字节数
    byte_len: u32,
    /// 已分配的数据扇区数，追加之后可以多于容纳 `byte_len` 所需
    sector_count: u32,
    #[br(map = |raw: [u32; NUM_DIRECT]| decode_slots(raw))]
    #[bw(map = |slots: &[Option<SectorId>; NUM_DIRECT]| encode_slots(slots))]
    direct: [Option<SectorId>; NUM_DIRECT],
    #[br(map = |raw: [u32; NUM_INDIRECT]| decode_slots(raw))]
    #[bw(map = |slots: &[Option<SectorId>; NUM_INDIRECT]| encode_slots(slots))]
    indirect: [Option<SectorId>; NUM_INDIRECT],
    created_at: [u8; TIMESTAMP_LEN],
    path: [u8; PATH_LEN],
}

/// 索引块，整块都是扇区号
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, PartialEq, Eq)]
struct IndexBlock {
    #[br(map = |raw: [u32; INDEX_COUNT]| decode_slots(raw))]
    #[bw(map = |slots: &[Option<SectorId>; INDEX_COUNT]| encode_slots(slots))]
    slots: [Option<SectorId>; INDEX_COUNT],
}

impl FileHeader {
    /// 为新文件初始化文件头，并从 `free_map` 中为数据分配扇区。
    ///
    /// 空间不足时返回错误且不动 `free_map`；
    /// 成功后由调用者负责写回 `free_map`。
    pub fn allocate(
        free_map: &mut FreeMap,
        byte_len: usize,
        path: &str,
        created_at: u64,
        block_device: &Arc<dyn BlockDevice>,
    ) -> vfs::Result<Self> {
        if byte_len > MAX_FILE_SIZE {
            log::warn!("{byte_len} bytes exceed the file size limit");
            return Err(Error::CapacityExceeded);
        }

        let mut header = Self {
            byte_len: byte_len as u32,
            sector_count: 0,
            direct: [None; NUM_DIRECT],
            indirect: [None; NUM_INDIRECT],
            created_at: format_timestamp(created_at),
            path: [0; PATH_LEN],
        };
        fill_cstr(&mut header.path, path);

        let sectors = byte_len.div_ceil(SECTOR_SIZE);
        log::debug!("allocate {sectors} sectors for {byte_len} bytes");
        header.grow(sectors, free_map, block_device)?;

        Ok(header)
    }

    /// 原地追加 `n` 个数据扇区，已分配的索引保持不变。
    ///
    /// 位图不与调用者共享：此处从位图文件重新读出，分配成功后立即写回。
    /// 调用期间调用者手中的位图副本会过期，不得再写回。
    pub fn append_sectors(
        &mut self,
        n: usize,
        block_device: &Arc<dyn BlockDevice>,
    ) -> vfs::Result<()> {
        log::debug!("append {n} sectors to {} sectors", self.sector_count);

        let free_map_file = OpenFile::open(block_device.clone(), FREE_MAP_SECTOR)?;
        let mut free_map = FreeMap::fetch_from(&free_map_file)?;
        self.grow(n, &mut free_map, block_device)?;
        free_map.write_back(&free_map_file)
    }

    /// 把文件占据的所有数据扇区与索引块还给 `free_map`。
    ///
    /// 文件头所在的扇区由调用者归还。
    pub fn deallocate(
        &self,
        free_map: &mut FreeMap,
        block_device: &Arc<dyn BlockDevice>,
    ) -> vfs::Result<()> {
        for sector in self.sectors(block_device)? {
            free_map.release(sector)?;
        }
        Ok(())
    }

    /// 找到存放第 `offset` 字节的扇区
    pub fn byte_to_sector(
        &self,
        offset: usize,
        block_device: &Arc<dyn BlockDevice>,
    ) -> vfs::Result<SectorId> {
        let block = offset / SECTOR_SIZE;
        if block >= MAX_SECTORS {
            return Err(Error::CapacityExceeded);
        }
        let unassigned = Error::from(Violation::UnassignedSlot(block as u32));

        if block < NUM_DIRECT {
            return self.direct[block].ok_or(unassigned);
        }

        // 剔去直接索引的部分
        let index = block - NUM_DIRECT;
        let indirect = self.indirect[index / INDEX_COUNT].ok_or(unassigned)?;
        IndexBlock::load(indirect, block_device)?.slots[index % INDEX_COUNT].ok_or(unassigned)
    }

    pub fn fetch_from(
        sector: SectorId,
        block_device: &Arc<dyn BlockDevice>,
    ) -> vfs::Result<Self> {
        let buf = sector.read(block_device);
        Self::read(&mut Cursor::new(&buf[..])).map_err(corrupt)
    }

    pub fn write_back(
        &self,
        sector: SectorId,
        block_device: &Arc<dyn BlockDevice>,
    ) -> vfs::Result<()> {
        let mut buf = [0; SECTOR_SIZE];
        self.write(&mut Cursor::new(&mut buf[..])).map_err(corrupt)?;
        sector.write(&buf, block_device);
        Ok(())
    }

    /// 文件头占据的所有扇区：先是按逻辑顺序排列的数据扇区，后是索引块
    pub fn sectors(&self, block_device: &Arc<dyn BlockDevice>) -> vfs::Result<Vec<SectorId>> {
        let mut sectors = self.data_sectors(block_device)?;
        sectors.extend(self.indirect.iter().flatten());
        Ok(sectors)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.byte_len as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.byte_len == 0
    }

    #[inline]
    pub fn sector_count(&self) -> usize {
        self.sector_count as usize
    }

    #[inline]
    pub fn created_at(&self) -> &str {
        cstr(&self.created_at)
    }

    #[inline]
    pub fn path(&self) -> &str {
        cstr(&self.path)
    }

    /// 已分配的扇区能容纳多少字节
    #[inline]
    pub fn capacity(&self) -> usize {
        self.sector_count() * SECTOR_SIZE
    }

    pub(crate) fn set_len(&mut self, byte_len: usize) {
        debug_assert!(byte_len <= self.capacity());
        self.byte_len = byte_len as u32;
    }
}

impl FileHeader {
    /// 在 `sector_count` 之后追加 `n` 个数据扇区：
    /// 先填直接索引，再填已有索引块的空槽，最后逐个建立新的索引块。
    fn grow(
        &mut self,
        n: usize,
        free_map: &mut FreeMap,
        block_device: &Arc<dyn BlockDevice>,
    ) -> vfs::Result<()> {
        let from = self.sector_count();
        let to = from + n;
        if to > MAX_SECTORS {
            log::warn!("{to} sectors exceed the index capacity");
            return Err(Error::CapacityExceeded);
        }

        // 先确认空间足够，失败时不留副作用
        let new_index_blocks = self.indirect[..index_blocks(to)]
            .iter()
            .filter(|slot| slot.is_none())
            .count();
        if free_map.clear_count() < n + new_index_blocks {
            log::warn!(
                "{} free sectors, {} needed",
                free_map.clear_count(),
                n + new_index_blocks
            );
            return Err(Error::InsufficientSpace(Space::Data));
        }

        /******************** 直接索引 ********************/
        for slot in &mut self.direct[from.min(NUM_DIRECT)..to.min(NUM_DIRECT)] {
            if slot.is_none() {
                *slot = Some(take(free_map)?);
            }
        }
        /******************** END ********************/

        /******************** 间接索引 ********************/
        if to > NUM_DIRECT {
            let from = from.saturating_sub(NUM_DIRECT);
            let to = to - NUM_DIRECT;

            // 索引块全部填好之后才落盘，中途出错时磁盘上的索引块不变
            let mut filled = Vec::new();
            for index in from / INDEX_COUNT..to.div_ceil(INDEX_COUNT) {
                let (sector, mut block) = match self.indirect[index] {
                    Some(sector) => (sector, IndexBlock::load(sector, block_device)?),
                    None => {
                        let sector = take(free_map)?;
                        self.indirect[index] = Some(sector);
                        (sector, IndexBlock::EMPTY)
                    }
                };

                // 本索引块负责的逻辑范围
                let base = index * INDEX_COUNT;
                let start = from.max(base) - base;
                let end = to.min(base + INDEX_COUNT) - base;
                for slot in &mut block.slots[start..end] {
                    if slot.is_none() {
                        *slot = Some(take(free_map)?);
                    }
                }

                filled.push((sector, block));
            }
            for (sector, block) in filled {
                block.store(sector, block_device)?;
            }
        }
        /******************** END ********************/

        self.sector_count = to as u32;
        Ok(())
    }

    /// 按逻辑顺序排列的数据扇区
    fn data_sectors(&self, block_device: &Arc<dyn BlockDevice>) -> vfs::Result<Vec<SectorId>> {
        let count = self.sector_count();
        let mut sectors = Vec::with_capacity(count);

        for (block, slot) in self.direct.iter().take(count).enumerate() {
            sectors.push(slot.ok_or(Violation::UnassignedSlot(block as u32))?);
        }

        let mut remaining = count.saturating_sub(NUM_DIRECT);
        for (index, slot) in self.indirect.iter().enumerate() {
            if remaining == 0 {
                break;
            }
            let base = NUM_DIRECT + index * INDEX_COUNT;
            let indirect = slot.ok_or(Violation::UnassignedSlot(base as u32))?;
            let in_block = remaining.min(INDEX_COUNT);

            let block = IndexBlock::load(indirect, block_device)?;
            for (i, slot) in block.slots.iter().take(in_block).enumerate() {
                sectors.push(slot.ok_or(Violation::UnassignedSlot((base + i) as u32))?);
            }
            remaining -= in_block;
        }

        Ok(sectors)
    }
}

impl IndexBlock {
    const EMPTY: Self = Self {
        slots: [None; INDEX_COUNT],
    };

    fn load(sector: SectorId, block_device: &Arc<dyn BlockDevice>) -> vfs::Result<Self> {
        let buf = sector.read(block_device);
        Self::read(&mut Cursor::new(&buf[..])).map_err(corrupt)
    }

    fn store(&self, sector: SectorId, block_device: &Arc<dyn BlockDevice>) -> vfs::Result<()> {
        let mut buf = [0; SECTOR_SIZE];
        self.write(&mut Cursor::new(&mut buf[..])).map_err(corrupt)?;
        sector.write(&buf, block_device);
        Ok(())
    }
}

/// 容纳 `sectors` 个数据扇区需要几个索引块
#[inline]
fn index_blocks(sectors: usize) -> usize {
    sectors.saturating_sub(NUM_DIRECT).div_ceil(INDEX_COUNT)
}

#[inline]
fn take(free_map: &mut FreeMap) -> vfs::Result<SectorId> {
    free_map.find().ok_or(Error::InsufficientSpace(Space::Data))
}

impl fmt::Display for FileHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "FileHeader contents. File size: {}. File blocks: {}",
            self.byte_len, self.sector_count
        )?;
        writeln!(f, "Created: {} Path: {:?}", self.created_at(), self.path())?;

        f.write_str("Direct:")?;
        for sector in self.direct.iter().flatten() {
            write!(f, " {sector}")?;
        }
        writeln!(f)?;

        f.write_str("Indirect:")?;
        for sector in self.indirect.iter().flatten() {
            write!(f, " {sector}")?;
        }
        writeln!(f)
    }
}

#[cfg(test)]
mod tests {
    use alloc::collections::BTreeSet;
    use alloc::format;

    use block_dev::RamDisk;

    use super::*;
    use crate::FileSystem;

    const SECTORS: usize = 1024;

    fn device() -> Arc<dyn BlockDevice> {
        Arc::new(RamDisk::new(SECTOR_SIZE, SECTORS))
    }

    /// 0、1号扇区已被占用的位图
    fn free_map() -> FreeMap {
        let mut free_map = FreeMap::new(SECTORS);
        free_map.mark(SectorId::new(0));
        free_map.mark(SectorId::new(1));
        free_map
    }

    fn occupied(free_map: &FreeMap) -> BTreeSet<SectorId> {
        free_map.occupied().collect()
    }

    #[test]
    fn allocate_translate_deallocate() {
        let dev = device();
        let sizes = (0..=MAX_FILE_SIZE).step_by(7 * SECTOR_SIZE + 13).chain([
            1,
            SECTOR_SIZE,
            NUM_DIRECT * SECTOR_SIZE,
            NUM_DIRECT * SECTOR_SIZE + 1,
            (NUM_DIRECT + INDEX_COUNT) * SECTOR_SIZE,
            (NUM_DIRECT + INDEX_COUNT) * SECTOR_SIZE + 1,
            MAX_FILE_SIZE,
        ]);

        for size in sizes {
            let mut free_map = free_map();
            let before = free_map.clone();

            let header = FileHeader::allocate(&mut free_map, size, "/", 0, &dev).unwrap();
            assert_eq!(header.len(), size);
            assert_eq!(header.sector_count(), size.div_ceil(SECTOR_SIZE));

            // 新占用的扇区恰好就是文件头声明的扇区
            let claimed: BTreeSet<_> = header.sectors(&dev).unwrap().into_iter().collect();
            let newly: BTreeSet<_> = occupied(&free_map)
                .difference(&occupied(&before))
                .copied()
                .collect();
            assert_eq!(claimed, newly, "size {size}");
            assert_eq!(
                claimed.len(),
                header.sector_count() + index_blocks(header.sector_count())
            );

            let data = header.data_sectors(&dev).unwrap();
            for offset in (0..size).step_by(61).chain(size.checked_sub(1)) {
                assert_eq!(
                    header.byte_to_sector(offset, &dev).unwrap(),
                    data[offset / SECTOR_SIZE],
                    "size {size} offset {offset}"
                );
            }

            header.deallocate(&mut free_map, &dev).unwrap();
            assert_eq!(free_map, before, "size {size}");
        }
    }

    #[test]
    fn direct_then_indirect() {
        let dev = device();
        let mut free_map = free_map();
        let size = (NUM_DIRECT + 3) * SECTOR_SIZE;
        let header = FileHeader::allocate(&mut free_map, size, "/", 0, &dev).unwrap();

        // 按顺序分配：直接索引 2..17，索引块 17，之后是块内的数据扇区
        let expect_direct: Vec<_> = (2..2 + NUM_DIRECT as u32).map(SectorId::new).collect();
        let direct: Vec<_> = header.direct.iter().flatten().copied().collect();
        assert_eq!(direct, expect_direct);
        assert_eq!(header.indirect[0], Some(SectorId::new(17)));
        assert_eq!(header.indirect[1], None);

        let block = IndexBlock::load(SectorId::new(17), &dev).unwrap();
        assert_eq!(block.slots[..3], [18, 19, 20].map(|s| Some(SectorId::new(s))));
        assert!(block.slots[3..].iter().all(Option::is_none));

        assert_eq!(
            header.byte_to_sector(NUM_DIRECT * SECTOR_SIZE + 5, &dev),
            Ok(SectorId::new(18))
        );
    }

    #[test]
    fn too_large() {
        let dev = device();
        let mut free_map = free_map();
        let before = free_map.clone();

        assert_eq!(
            FileHeader::allocate(&mut free_map, MAX_FILE_SIZE + 1, "/", 0, &dev),
            Err(Error::CapacityExceeded)
        );
        assert_eq!(free_map, before);
    }

    #[test]
    fn not_enough_space() {
        let dev = device();
        let mut free_map = free_map();
        while free_map.clear_count() > 20 {
            free_map.find();
        }
        let before = free_map.clone();

        // 20 个数据扇区另需 1 个索引块
        assert_eq!(
            FileHeader::allocate(&mut free_map, 20 * SECTOR_SIZE, "/", 0, &dev),
            Err(Error::InsufficientSpace(Space::Data))
        );
        assert_eq!(free_map, before);

        assert!(FileHeader::allocate(&mut free_map, 19 * SECTOR_SIZE, "/", 0, &dev).is_ok());
        assert_eq!(free_map.clear_count(), 0);
    }

    #[test]
    fn round_trip() {
        let dev = device();
        let mut free_map = free_map();
        let header = FileHeader::allocate(
            &mut free_map,
            40 * SECTOR_SIZE + 7,
            "/abc/aaa/B",
            1_700_000_000,
            &dev,
        )
        .unwrap();

        header.write_back(SectorId::new(1), &dev).unwrap();
        let fetched = FileHeader::fetch_from(SectorId::new(1), &dev).unwrap();
        assert_eq!(fetched, header);
        assert_eq!(fetched.created_at(), "2023-11-14 22:13:20");
        assert_eq!(fetched.path(), "/abc/aaa/B");

        // 未分配的槽位不编码为0：41 个数据扇区只用到第一个索引块
        let raw = SectorId::new(1).read(&dev);
        let indirect = 8 + 4 * NUM_DIRECT;
        assert_ne!(&raw[indirect..indirect + 4], &[0xff; 4]);
        assert_eq!(&raw[indirect + 4..indirect + 8], &[0xff; 4]);
    }

    #[test]
    fn append_then_deallocate() {
        let dev = device();
        FileSystem::format(dev.clone(), SECTORS).unwrap();
        let free_map_file = OpenFile::open(dev.clone(), FREE_MAP_SECTOR).unwrap();

        let initial = FreeMap::fetch_from(&free_map_file).unwrap();
        let mut free_map = initial.clone();
        let mut header =
            FileHeader::allocate(&mut free_map, 10 * SECTOR_SIZE, "/", 0, &dev).unwrap();
        free_map.write_back(&free_map_file).unwrap();
        let original: Vec<_> = header.data_sectors(&dev).unwrap();

        // 跨过直接索引，填满第一个索引块再用上第二个
        header.append_sectors(5, &dev).unwrap();
        header.append_sectors(40, &dev).unwrap();
        assert_eq!(header.sector_count(), 55);
        assert_eq!(header.len(), 10 * SECTOR_SIZE);

        let data = header.data_sectors(&dev).unwrap();
        assert_eq!(data.len(), 10 + 5 + 40);
        assert_eq!(data[..10], original[..]);
        assert_eq!(header.indirect.iter().flatten().count(), 2);

        let mut free_map = FreeMap::fetch_from(&free_map_file).unwrap();
        let clear = free_map.clear_count();
        header.deallocate(&mut free_map, &dev).unwrap();
        assert_eq!(free_map.clear_count() - clear, 55 + 2);
        assert_eq!(free_map, initial);
    }

    #[test]
    fn index_blocks_reach_disk() {
        let dev = device();
        let mut free_map = free_map();
        let size = (NUM_DIRECT + 40) * SECTOR_SIZE;
        let mut header = FileHeader::allocate(&mut free_map, size, "/", 0, &dev).unwrap();

        let data = header.data_sectors(&dev).unwrap();
        let blocks: Vec<_> = header.indirect.iter().flatten().copied().collect();
        assert_eq!(blocks.len(), 2);
        for (i, &sector) in blocks.iter().enumerate() {
            let block = IndexBlock::load(sector, &dev).unwrap();
            let base = NUM_DIRECT + i * INDEX_COUNT;
            let expect: Vec<_> = data[base..data.len().min(base + INDEX_COUNT)]
                .iter()
                .copied()
                .map(Some)
                .collect();
            assert_eq!(block.slots[..expect.len()], expect[..]);
            assert!(block.slots[expect.len()..].iter().all(Option::is_none));
        }

        // 空间不足时磁盘上的索引块保持原样
        let raw: Vec<_> = blocks.iter().map(|sector| sector.read(&dev)).collect();
        let mut exhausted = free_map.clone();
        while exhausted.find().is_some() {}
        assert_eq!(
            header.grow(10, &mut exhausted, &dev),
            Err(Error::InsufficientSpace(Space::Data))
        );
        assert_eq!(header.sector_count(), NUM_DIRECT + 40);
        for (sector, before) in blocks.iter().zip(&raw) {
            assert_eq!(&sector.read(&dev), before);
        }
    }

    #[test]
    fn append_beyond_capacity() {
        let dev = device();
        FileSystem::format(dev.clone(), SECTORS).unwrap();
        let mut free_map = free_map();
        let mut header =
            FileHeader::allocate(&mut free_map, MAX_FILE_SIZE - 1, "/", 0, &dev).unwrap();
        let before = header.clone();

        assert_eq!(header.append_sectors(1, &dev), Err(Error::CapacityExceeded));
        assert_eq!(header, before);
    }

    #[test]
    fn double_free_is_fatal() {
        let dev = device();
        let mut free_map = free_map();
        let header = FileHeader::allocate(&mut free_map, 300, "/", 0, &dev).unwrap();

        header.deallocate(&mut free_map, &dev).unwrap();
        let err = header.deallocate(&mut free_map, &dev).unwrap_err();
        assert_eq!(err, Error::IntegrityViolation(Violation::SectorNotOccupied(2)));
        assert!(err.is_fatal());
    }

    #[test]
    fn unassigned_offset() {
        let dev = device();
        let mut free_map = free_map();
        let header = FileHeader::allocate(&mut free_map, SECTOR_SIZE, "/", 0, &dev).unwrap();

        assert_eq!(
            header.byte_to_sector(SECTOR_SIZE, &dev),
            Err(Error::from(Violation::UnassignedSlot(1)))
        );
        assert_eq!(
            header.byte_to_sector(NUM_DIRECT * SECTOR_SIZE, &dev),
            Err(Error::from(Violation::UnassignedSlot(NUM_DIRECT as u32)))
        );
        assert_eq!(
            header.byte_to_sector(MAX_FILE_SIZE, &dev),
            Err(Error::CapacityExceeded)
        );
    }

    #[test]
    fn display() {
        let dev = device();
        let mut free_map = free_map();
        let header = FileHeader::allocate(&mut free_map, 200, "/", 0, &dev).unwrap();

        assert_eq!(
            format!("{header}"),
            "FileHeader contents. File size: 200. File blocks: 2\n\
             Created: 1970-01-01 00:00:00 Path: \"/\"\n\
             Direct: 2 3\n\
             Indirect:\n"
        );
    }
}
