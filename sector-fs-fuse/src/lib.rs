
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

use block_dev::BlockDevice;
use sector_fs::{FileSystem, SECTOR_SIZE};

/// 以宿主机上的镜像文件充当块设备
#[derive(Debug)]
pub struct BlockFile(pub Mutex<File>);

impl BlockFile {
    /// 新建（或截断）一个 `sectors` 个扇区的镜像
    pub fn create(path: impl AsRef<Path>, sectors: usize) -> io::Result<Self> {
        let fd = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        fd.set_len((sectors * SECTOR_SIZE) as u64)?;

        Ok(Self(Mutex::new(fd)))
    }

    /// 打开已有的镜像
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let fd = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self(Mutex::new(fd)))
    }

    /// 镜像中完整扇区的个数
    pub fn sectors(&self) -> io::Result<usize> {
        let file = self.0.lock().expect("block file lock poisoned");
        Ok(file.metadata()?.len() as usize / SECTOR_SIZE)
    }
}

impl BlockDevice for BlockFile {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        assert_eq!(buf.len(), SECTOR_SIZE, "not a complete block!");
        let mut file = self.0.lock().expect("block file lock poisoned");
        file.seek(SeekFrom::Start((block_id * SECTOR_SIZE) as u64))
            .expect("seeking error");
        file.read_exact(buf).expect("not a complete block!");
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) {
        assert_eq!(buf.len(), SECTOR_SIZE, "not a complete block!");
        let mut file = self.0.lock().expect("block file lock poisoned");
        file.seek(SeekFrom::Start((block_id * SECTOR_SIZE) as u64))
            .expect("seeking error");
        file.write_all(buf).expect("not a complete block!");
    }
}

/// 把镜像内的绝对路径拆成所在目录与文件名
///
/// `/a/b/c` 拆为 `("/a/b", "c")`，`c` 拆为 `("/", "c")`；
/// 路径指向根目录时返回空。
pub fn split_path(path: &str) -> Option<(&str, &str)> {
    let path = path.trim_end_matches('/');
    let (dir, name) = path.rsplit_once('/').unwrap_or(("", path));
    if name.is_empty() {
        return None;
    }
    Some((if dir.is_empty() { "/" } else { dir }, name))
}

/// 性能测试的文件名
pub const PERF_FILE: &str = "TestFile";
/// 性能测试的文件大小
pub const PERF_FILE_SIZE: usize = 5000;
/// 性能测试每次读写的内容
pub const PERF_CONTENTS: &[u8; 10] = b"1234567890";

/// 读写性能测试的统计
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerfStats {
    pub bytes_written: usize,
    pub bytes_read: usize,
}

/// 在根目录下顺序写入一个 [`PERF_FILE_SIZE`] 字节的文件，每次 10 字节，
/// 再按同样的粒度读回校验，最后删除它。
pub fn perf_test(fs: &mut FileSystem) -> vfs::Result<PerfStats> {
    log::info!(
        "sequential write of {PERF_FILE_SIZE} byte file, in {} byte chunks",
        PERF_CONTENTS.len()
    );

    fs.create(PERF_FILE, PERF_FILE_SIZE, false, "/")?;
    let mut file = fs.open(PERF_FILE, "/")?;
    let mut bytes_written = 0;
    while bytes_written < PERF_FILE_SIZE {
        let written = file.write(PERF_CONTENTS)?;
        if written == 0 {
            break;
        }
        bytes_written += written;
    }

    let mut file = fs.open(PERF_FILE, "/")?;
    let mut buf = [0; PERF_CONTENTS.len()];
    let mut bytes_read = 0;
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        if buf[..read] != PERF_CONTENTS[..read] {
            log::warn!("perf test: unexpected contents at byte {bytes_read}");
        }
        bytes_read += read;
    }

    fs.remove(PERF_FILE, "/")?;

    let stats = PerfStats {
        bytes_written,
        bytes_read,
    };
    log::info!("perf test done: {stats:?}");
    Ok(stats)
}

/// 文件系统错误转为宿主机上的 I/O 错误；完整性错误另行记录
pub fn into_io(err: vfs::Error) -> io::Error {
    if err.is_fatal() {
        log::error!("file system integrity is broken: {err}");
    }
    io::Error::other(err)
}
