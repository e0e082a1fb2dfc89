//! # 磁盘数据结构层
//!
//! 磁盘布局：
//! 0号扇区：空闲扇区位图的文件头 | 1号扇区：根目录的文件头 | 其余扇区由位图分配
//!
//! 记录都按小端序、定长字段编解码，写回的字节与内存中的值一一对应。

mod bitmap;
pub use bitmap::FreeMap;

mod header;
pub use header::{
    FileHeader, INDEX_COUNT, MAX_FILE_SIZE, MAX_SECTORS, NUM_DIRECT, NUM_INDIRECT, PATH_LEN,
    TIMESTAMP_LEN,
};

/// 目录项，也属于磁盘文件系统数据结构
mod dir_entry;
pub use dir_entry::{DirEntry, EntryFlag, NAME_MAX_LEN};

use vfs::Violation;

/// 磁盘上的记录无法解码
fn corrupt(err: binrw::Error) -> vfs::Error {
    log::error!("corrupt on-disk record: {err}");
    Violation::CorruptRecord.into()
}
