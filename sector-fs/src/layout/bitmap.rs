use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use vfs::Violation;

use crate::{OpenFile, SectorId};

/// 位图的组
type Group = u64;

const GROUP_BITS: usize = Group::BITS as usize;
const GROUP_BYTES: usize = GROUP_BITS / 8;

/// 空闲扇区位图，每个扇区一位，置位表示占用
///
/// 位图本身作为普通文件存放，文件头在 [`FREE_MAP_SECTOR`](crate::FREE_MAP_SECTOR)。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeMap {
    groups: Vec<Group>,
}

impl FreeMap {
    /// 所有扇区都空闲的位图
    pub fn new(sectors: usize) -> Self {
        let mut groups = vec![0; sectors.div_ceil(GROUP_BITS)];

        // 设备末尾之外的位永远视为占用
        let tail = sectors % GROUP_BITS;
        if let Some(last) = groups.last_mut().filter(|_| tail != 0) {
            *last = Group::MAX << tail;
        }

        Self { groups }
    }

    /// 记录 `sectors` 个扇区的位图文件有多少字节
    #[inline]
    pub fn file_size(sectors: usize) -> usize {
        sectors.div_ceil(GROUP_BITS) * GROUP_BYTES
    }

    /// 位图可记录的总位数
    #[inline]
    pub fn capacity(&self) -> usize {
        self.groups.len() * GROUP_BITS
    }

    /// 找到第一个空闲扇区并标记为占用。
    /// 若位图的空间用尽，则返回空。
    pub fn find(&mut self) -> Option<SectorId> {
        let (group_index, ingroup_index) =
            self.groups
                .iter()
                .enumerate()
                .find_map(|(group_index, &bits)| {
                    (bits != Group::MAX).then_some((group_index, bits.trailing_ones()))
                })?;

        self.groups[group_index] |= 1 << ingroup_index;
        Some(SectorId::new(
            (group_index * GROUP_BITS) as u32 + ingroup_index,
        ))
    }

    /// 扇区是否被占用；位图之外的扇区一律视为占用
    pub fn test(&self, sector: SectorId) -> bool {
        let (group_index, ingroup_index) = Self::locate(sector);
        self.groups
            .get(group_index)
            .is_none_or(|&bits| bits & (1 << ingroup_index) != 0)
    }

    /// 标记为占用；位图之外的扇区忽略
    pub fn mark(&mut self, sector: SectorId) {
        let (group_index, ingroup_index) = Self::locate(sector);
        if let Some(bits) = self.groups.get_mut(group_index) {
            *bits |= 1 << ingroup_index;
        }
    }

    /// 标记为空闲；位图之外的扇区忽略
    pub fn clear(&mut self, sector: SectorId) {
        let (group_index, ingroup_index) = Self::locate(sector);
        if let Some(bits) = self.groups.get_mut(group_index) {
            *bits &= !(1 << ingroup_index);
        }
    }

    /// 空闲扇区的个数
    pub fn clear_count(&self) -> usize {
        self.groups
            .iter()
            .map(|bits| bits.count_zeros() as usize)
            .sum()
    }

    /// 归还扇区；扇区必须处于占用状态，否则位图与文件头已经不一致
    pub fn release(&mut self, sector: SectorId) -> vfs::Result<()> {
        if sector.index() >= self.capacity() {
            log::error!("sector {sector} is released but lies outside the free map");
            return Err(Violation::SectorNotOccupied(sector.raw()).into());
        }
        if !self.test(sector) {
            log::error!("sector {sector} is released but not marked occupied");
            return Err(Violation::SectorNotOccupied(sector.raw()).into());
        }
        self.clear(sector);
        Ok(())
    }

    /// 所有被占用的扇区，从小到大
    pub fn occupied(&self) -> impl Iterator<Item = SectorId> + '_ {
        (0..self.capacity() as u32)
            .map(SectorId::new)
            .filter(|&sector| self.test(sector))
    }

    /// 从位图文件读出
    pub fn fetch_from(file: &OpenFile) -> vfs::Result<Self> {
        let mut bytes = vec![0; file.len()];
        let read = file.read_at(&mut bytes, 0)?;
        if read != bytes.len() || read % GROUP_BYTES != 0 {
            log::error!("free map file holds {read} bytes");
            return Err(Violation::CorruptRecord.into());
        }

        let groups = bytes
            .chunks_exact(GROUP_BYTES)
            .map(|chunk| {
                let mut raw = [0; GROUP_BYTES];
                raw.copy_from_slice(chunk);
                Group::from_le_bytes(raw)
            })
            .collect();

        Ok(Self { groups })
    }

    /// 写回位图文件
    pub fn write_back(&self, file: &OpenFile) -> vfs::Result<()> {
        let bytes: Vec<u8> = self
            .groups
            .iter()
            .flat_map(|bits| bits.to_le_bytes())
            .collect();

        if file.write_at(&bytes, 0)? != bytes.len() {
            log::error!("free map file is shorter than the map");
            return Err(Violation::CorruptRecord.into());
        }
        Ok(())
    }

    #[inline]
    fn locate(sector: SectorId) -> (usize, usize) {
        let index = sector.index();
        (index / GROUP_BITS, index % GROUP_BITS)
    }
}

impl fmt::Display for FreeMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Bitmap set:")?;
        for (i, sector) in self.occupied().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{sector}")?;
        }
        writeln!(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_in_order() {
        let mut map = FreeMap::new(128);
        map.mark(SectorId::new(0));
        map.mark(SectorId::new(2));

        assert_eq!(map.find(), Some(SectorId::new(1)));
        assert_eq!(map.find(), Some(SectorId::new(3)));
        assert_eq!(map.clear_count(), 124);
    }

    #[test]
    fn exhausted() {
        let mut map = FreeMap::new(64);
        for i in 0..64 {
            assert_eq!(map.find(), Some(SectorId::new(i)));
        }
        assert_eq!(map.find(), None);
        assert_eq!(map.clear_count(), 0);
    }

    #[test]
    fn padding_is_never_free() {
        let mut map = FreeMap::new(70);
        assert_eq!(map.capacity(), 128);
        assert_eq!(map.clear_count(), 70);
        assert_eq!(FreeMap::file_size(70), 16);
        assert!(map.test(SectorId::new(70)));
        assert!(map.test(SectorId::new(500)));

        for _ in 0..70 {
            assert!(map.find().is_some());
        }
        assert_eq!(map.find(), None);
    }

    #[test]
    fn release_requires_occupied() {
        let mut map = FreeMap::new(64);
        let sector = map.find().unwrap();
        assert_eq!(map.release(sector), Ok(()));

        let err = map.release(sector).unwrap_err();
        assert_eq!(
            err,
            vfs::Error::IntegrityViolation(Violation::SectorNotOccupied(0))
        );
        assert!(err.is_fatal());
    }

    #[test]
    fn outside_the_map() {
        let mut map = FreeMap::new(64);
        let before = map.clone();

        map.mark(SectorId::new(64));
        map.clear(SectorId::new(5000));
        assert_eq!(map, before);

        let err = map.release(SectorId::new(5000)).unwrap_err();
        assert_eq!(
            err,
            vfs::Error::IntegrityViolation(Violation::SectorNotOccupied(5000))
        );
        assert!(err.is_fatal());
        assert_eq!(map, before);
    }

    #[test]
    fn display_lists_occupied() {
        let mut map = FreeMap::new(64);
        map.mark(SectorId::new(0));
        map.mark(SectorId::new(1));
        map.mark(SectorId::new(9));
        assert_eq!(alloc::format!("{map}"), "Bitmap set:\n0, 1, 9\n");
    }
}
