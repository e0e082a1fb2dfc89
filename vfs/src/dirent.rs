use alloc::string::String;

/// 交给上层（系统调用、命令行）的目录项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// 文件头所在扇区
    pub inode: u64,
    pub ty: DirEntryType,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum DirEntryType {
    Directory,
    #[default]
    Regular,
}

impl DirEntry {
    #[inline]
    pub fn is_dir(&self) -> bool {
        self.ty == DirEntryType::Directory
    }
}
