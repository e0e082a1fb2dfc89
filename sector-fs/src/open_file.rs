use alloc::sync::Arc;

use block_dev::BlockDevice;
use vfs::Error;

use crate::{FileHeader, SECTOR_SIZE, SectorId};

/// 打开的文件：文件头的内存副本加一个读写游标
///
/// 文件大小在创建时确定，读写都截断在文件末尾；需要更多空间时显式调用 [`OpenFile::extend`]。
/// 同一文件头的多个句柄之间互不协调。
#[derive(Debug, Clone)]
pub struct OpenFile {
    header_sector: SectorId,
    header: FileHeader,
    cursor: usize,
    block_device: Arc<dyn BlockDevice>,
}

impl OpenFile {
    /// 读出 `header_sector` 处的文件头并打开
    pub fn open(block_device: Arc<dyn BlockDevice>, header_sector: SectorId) -> vfs::Result<Self> {
        let header = FileHeader::fetch_from(header_sector, &block_device)?;
        Ok(Self::with_header(block_device, header_sector, header))
    }

    /// 用已在内存中的文件头打开，不读盘
    pub(crate) fn with_header(
        block_device: Arc<dyn BlockDevice>,
        header_sector: SectorId,
        header: FileHeader,
    ) -> Self {
        Self {
            header_sector,
            header,
            cursor: 0,
            block_device,
        }
    }

    #[inline]
    pub fn seek(&mut self, position: usize) {
        self.cursor = position;
    }

    #[inline]
    pub fn tell(&self) -> usize {
        self.cursor
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.header.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.header.is_empty()
    }

    #[inline]
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    #[inline]
    pub fn header_sector(&self) -> SectorId {
        self.header_sector
    }

    /// 从游标处读，游标前进实际读到的字节数
    pub fn read(&mut self, buf: &mut [u8]) -> vfs::Result<usize> {
        let read = self.read_at(buf, self.cursor)?;
        self.cursor += read;
        Ok(read)
    }

    /// 从游标处写，游标前进实际写入的字节数
    pub fn write(&mut self, buf: &[u8]) -> vfs::Result<usize> {
        let written = self.write_at(buf, self.cursor)?;
        self.cursor += written;
        Ok(written)
    }

    /// 从 `offset` 开始读到 `buf` 满或文件结束，返回读到的字节数
    pub fn read_at(&self, buf: &mut [u8], offset: usize) -> vfs::Result<usize> {
        let mut start = offset;
        let end = offset.saturating_add(buf.len()).min(self.len());
        if start >= end {
            return Ok(0);
        }

        // 已读取多少字节
        let mut read_size = 0;
        while start < end {
            // 当前扇区的末地址(字节)
            let current_sector_end = (start / SECTOR_SIZE + 1) * SECTOR_SIZE;
            let sector_read_size = current_sector_end.min(end) - start;

            let sector = self.header.byte_to_sector(start, &self.block_device)?;
            let data = sector.read(&self.block_device);
            // 绝对地址 % 扇区大小 = 扇区内偏移
            let inner = start % SECTOR_SIZE;
            buf[read_size..read_size + sector_read_size]
                .copy_from_slice(&data[inner..inner + sector_read_size]);

            read_size += sector_read_size;
            start += sector_read_size;
        }

        Ok(read_size)
    }

    /// 从 `offset` 开始写，截断在文件末尾，返回写入的字节数
    ///
    /// 只覆盖扇区的一部分时先读出原扇区，改写后整块写回。
    pub fn write_at(&self, buf: &[u8], offset: usize) -> vfs::Result<usize> {
        let mut start = offset;
        let end = offset.saturating_add(buf.len()).min(self.len());
        if start >= end {
            return Ok(0);
        }

        let mut write_size = 0;
        while start < end {
            let current_sector_end = (start / SECTOR_SIZE + 1) * SECTOR_SIZE;
            let sector_write_size = current_sector_end.min(end) - start;

            let sector = self.header.byte_to_sector(start, &self.block_device)?;
            let src = &buf[write_size..write_size + sector_write_size];
            let data = if sector_write_size == SECTOR_SIZE {
                let mut data = [0; SECTOR_SIZE];
                data.copy_from_slice(src);
                data
            } else {
                let mut data = sector.read(&self.block_device);
                let inner = start % SECTOR_SIZE;
                data[inner..inner + sector_write_size].copy_from_slice(src);
                data
            };
            sector.write(&data, &self.block_device);

            write_size += sector_write_size;
            start += sector_write_size;
        }

        Ok(write_size)
    }

    /// 把文件加长 `additional` 字节：按需追加扇区，写回文件头。
    ///
    /// 追加会直接改写磁盘上的空闲扇区位图，
    /// 调用者手里的位图副本在此之后必须重新读取。
    pub fn extend(&mut self, additional: usize) -> vfs::Result<()> {
        let new_len = self
            .len()
            .checked_add(additional)
            .ok_or(Error::CapacityExceeded)?;
        let needed = new_len.div_ceil(SECTOR_SIZE);
        let have = self.header.sector_count();

        let mut header = self.header.clone();
        if needed > have {
            header.append_sectors(needed - have, &self.block_device)?;
        }
        header.set_len(new_len);
        header.write_back(self.header_sector, &self.block_device)?;

        log::debug!(
            "file at sector {} extended to {new_len} bytes",
            self.header_sector
        );
        self.header = header;
        Ok(())
    }
}
