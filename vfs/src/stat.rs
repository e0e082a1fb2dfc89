use crate::DirEntryType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    pub mode: DirEntryType,
    /// 文件头所在扇区
    pub inode: u64,
    /// Optimal I/O block size
    pub block_size: u64,
    /// Occupying data sectors
    pub blocks: u64,
    /// File size
    pub size: u64,
}
