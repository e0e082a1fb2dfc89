#![no_std]

extern crate alloc;

/* sector-fs 的整体架构，自上而下 */

// 文件系统层：路径解析，以及创建、打开、删除、列举、格式化
mod fs;

// 目录层：一级目录的名字到文件头的映射表
mod directory;

// 打开文件层：游标与按字节读写
mod open_file;

// 磁盘数据结构层：文件头、索引块、目录项、空闲扇区位图
mod layout;

// 扇区层：扇区编号与整扇区读写
mod sector;

mod util;

pub use self::{
    directory::{DIRECTORY_FILE_SIZE, Directory, NUM_DIR_ENTRIES},
    fs::{Clock, FREE_MAP_SECTOR, FileSystem, Listing, ROOT_SECTOR, Report},
    layout::{
        DirEntry, EntryFlag, FileHeader, FreeMap, INDEX_COUNT, MAX_FILE_SIZE, MAX_SECTORS,
        NAME_MAX_LEN, NUM_DIRECT, NUM_INDIRECT, PATH_LEN, TIMESTAMP_LEN,
    },
    open_file::OpenFile,
    sector::{SectorBuf, SectorId},
    util::{format_timestamp, join_path, normalize_path},
};

pub const SECTOR_SIZE: usize = 128;
