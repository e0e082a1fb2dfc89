//! # 块设备接口层
//!
//! 块设备是以**块**（扇区）为单位存储数据的设备，例如磁盘、U盘等；
//! [`BlockDevice`] 就是对读写块设备的抽象，
//! 实现了此特质的类型称为**块设备驱动**。
//!
//! 传输是同步且整块的：不存在部分扇区的读写。
//! 驱动内部的传输失败没有可恢复的路径，直接 panic。

#![no_std]

extern crate alloc;

mod ram_disk;

use core::any::Any;
use core::fmt::Debug;

pub use self::ram_disk::RamDisk;

/// 块设备驱动特质
pub trait BlockDevice: Send + Sync + Any + Debug {
    /// 读出编号为 `block_id` 的整块，`buf` 的长度必须等于块大小
    fn read_block(&self, block_id: usize, buf: &mut [u8]);

    /// 写入编号为 `block_id` 的整块，`buf` 的长度必须等于块大小
    fn write_block(&self, block_id: usize, buf: &[u8]);
}
