//! 扇区的抽象

use alloc::sync::Arc;

use block_dev::BlockDevice;
use derive_more::{Display, From, Into};

use crate::SECTOR_SIZE;

/// 一个扇区的原始数据
pub type SectorBuf = [u8; SECTOR_SIZE];

/// 扇区号
///
/// 索引表里的"未分配"用 `Option<SectorId>` 的 `None` 表达，
/// 不与任何真实扇区号（包括0号扇区）混用。
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into, Display)]
#[repr(transparent)]
pub struct SectorId(u32);

impl SectorId {
    /// 磁盘上"未分配"槽位的编码
    pub const NIL: u32 = u32::MAX;

    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub fn decode(raw: u32) -> Option<Self> {
        (raw != Self::NIL).then_some(Self(raw))
    }

    #[inline]
    pub fn encode(slot: Option<Self>) -> u32 {
        slot.map_or(Self::NIL, Self::raw)
    }

    /// 同步读出整个扇区
    pub fn read(self, block_device: &Arc<dyn BlockDevice>) -> SectorBuf {
        let mut buf = [0; SECTOR_SIZE];
        block_device.read_block(self.index(), &mut buf);
        buf
    }

    /// 同步写入整个扇区
    #[inline]
    pub fn write(self, buf: &SectorBuf, block_device: &Arc<dyn BlockDevice>) {
        block_device.write_block(self.index(), buf);
    }
}

pub(crate) fn decode_slots<const N: usize>(raw: [u32; N]) -> [Option<SectorId>; N] {
    raw.map(SectorId::decode)
}

pub(crate) fn encode_slots<const N: usize>(slots: &[Option<SectorId>; N]) -> [u32; N] {
    slots.map(SectorId::encode)
}
