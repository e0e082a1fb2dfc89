use alloc::string::ToString;

use binrw::io::Cursor;
use binrw::{BinRead, BinWrite, binrw};
use enumflags2::{BitFlags, bitflags};
use vfs::{DirEntryType, Violation};

use super::corrupt;
use crate::SectorId;
use crate::util::{cstr, fill_cstr};

/// 文件名的最大长度
pub const NAME_MAX_LEN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[bitflags]
#[repr(u8)]
pub enum EntryFlag {
    /// 该项已被占用
    InUse = 0b0000_0001,
    /// 该项指向一个目录
    Directory = 0b0000_0010,
}

/// 目录表中的一项，恒为16字节
#[binrw]
#[brw(little)]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DirEntry {
    #[br(map = |raw: u8| BitFlags::from_bits_truncate(raw))]
    #[bw(map = |flags: &BitFlags<EntryFlag>| flags.bits())]
    flags: BitFlags<EntryFlag>,
    // 最后一字节留给 \0
    name: [u8; NAME_MAX_LEN + 1],
    #[br(map = |raw: u32| SectorId::new(raw))]
    #[bw(map = |sector: &SectorId| sector.raw())]
    header_sector: SectorId,
}

impl DirEntry {
    pub const SIZE: usize = 16;

    pub fn new(name: &str, header_sector: SectorId, is_dir: bool) -> Self {
        let mut flags = BitFlags::from(EntryFlag::InUse);
        if is_dir {
            flags |= EntryFlag::Directory;
        }

        let mut entry = Self {
            flags,
            name: [0; NAME_MAX_LEN + 1],
            header_sector,
        };
        fill_cstr(&mut entry.name, name);
        entry
    }

    /// 非空、不超过 [`NAME_MAX_LEN`] 字节、不含 `/` 与 `\0`
    pub fn is_valid_name(name: &str) -> bool {
        !name.is_empty() && name.len() <= NAME_MAX_LEN && !name.contains(['/', '\0'])
    }

    #[inline]
    pub fn in_use(&self) -> bool {
        self.flags.contains(EntryFlag::InUse)
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.flags.contains(EntryFlag::Directory)
    }

    #[inline]
    pub fn name(&self) -> &str {
        cstr(&self.name)
    }

    #[inline]
    pub fn header_sector(&self) -> SectorId {
        self.header_sector
    }

    pub fn to_vfs(&self) -> vfs::DirEntry {
        vfs::DirEntry {
            inode: self.header_sector.raw().into(),
            ty: if self.is_dir() {
                DirEntryType::Directory
            } else {
                DirEntryType::Regular
            },
            name: self.name().to_string(),
        }
    }

    /// 在用的项名字必须是 UTF-8
    pub(crate) fn decode(bytes: &[u8]) -> vfs::Result<Self> {
        let entry = Self::read(&mut Cursor::new(bytes)).map_err(corrupt)?;
        let name = &entry.name;
        let len = name.iter().position(|&c| c == 0).unwrap_or(name.len());
        if entry.in_use() && core::str::from_utf8(&name[..len]).is_err() {
            log::error!("entry for sector {} has a non-UTF-8 name", entry.header_sector);
            return Err(Violation::CorruptRecord.into());
        }
        Ok(entry)
    }

    pub(crate) fn encode(&self, bytes: &mut [u8]) -> vfs::Result<()> {
        self.write(&mut Cursor::new(bytes)).map_err(corrupt)
    }
}
