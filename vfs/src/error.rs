use core::fmt;

use thiserror::Error;

/// 文件系统操作的失败原因
///
/// 除 [`Error::IntegrityViolation`] 外都是可恢复的普通失败；
/// 完整性破坏意味着磁盘上的结构已经自相矛盾，调用者必须停下。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    #[error("not enough space for the {0}")]
    InsufficientSpace(Space),
    #[error("entry already exists")]
    AlreadyExists,
    #[error("entry not found")]
    NotFound,
    #[error("path not found")]
    PathNotFound,
    #[error("file exceeds the addressable range of its header")]
    CapacityExceeded,
    #[error("invalid file name")]
    InvalidName,
    #[error("integrity violation: {0}")]
    IntegrityViolation(Violation),
}

/// 耗尽的是哪一种空间
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Space {
    /// 没有空闲扇区放文件头
    Header,
    /// 目录表已满
    Directory,
    /// 没有足够的空闲扇区放数据与索引块
    Data,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("sector {0} should be occupied but is free")]
    SectorNotOccupied(u32),
    #[error("block {0} has no sector assigned")]
    UnassignedSlot(u32),
    #[error("corrupt on-disk record")]
    CorruptRecord,
}

impl Error {
    /// 是否为不可恢复的错误
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::IntegrityViolation(_))
    }
}

impl From<Violation> for Error {
    #[inline]
    fn from(violation: Violation) -> Self {
        Self::IntegrityViolation(violation)
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Header => "file header",
            Self::Directory => "directory entry",
            Self::Data => "data sectors",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_integrity_violations_are_fatal() {
        assert!(Error::from(Violation::SectorNotOccupied(3)).is_fatal());
        assert!(!Error::InsufficientSpace(Space::Data).is_fatal());
        assert!(!Error::AlreadyExists.is_fatal());
        assert!(!Error::PathNotFound.is_fatal());
    }
}
