use alloc::vec;
use alloc::vec::Vec;

use spin::Mutex;

use crate::BlockDevice;

/// 内存盘：整块设备都放在一段堆内存里
#[derive(Debug)]
pub struct RamDisk {
    block_size: usize,
    data: Mutex<Vec<u8>>,
}

impl RamDisk {
    pub fn new(block_size: usize, blocks: usize) -> Self {
        Self {
            block_size,
            data: Mutex::new(vec![0; block_size * blocks]),
        }
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    #[inline]
    pub fn blocks(&self) -> usize {
        self.data.lock().len() / self.block_size
    }

    fn range(&self, block_id: usize, len: usize) -> core::ops::Range<usize> {
        assert_eq!(len, self.block_size, "not a complete block!");
        let start = block_id * self.block_size;
        start..start + self.block_size
    }
}

impl BlockDevice for RamDisk {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        let range = self.range(block_id, buf.len());
        let data = self.data.lock();
        assert!(range.end <= data.len(), "block {block_id} out of device");
        buf.copy_from_slice(&data[range]);
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) {
        let range = self.range(block_id, buf.len());
        let mut data = self.data.lock();
        assert!(range.end <= data.len(), "block {block_id} out of device");
        data[range].copy_from_slice(buf);
    }
}
