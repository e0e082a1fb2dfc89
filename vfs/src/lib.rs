#![no_std]

extern crate alloc;

mod dirent;
mod error;
mod stat;

pub use self::{
    dirent::{DirEntry, DirEntryType},
    error::{Error, Space, Violation},
    stat::Stat,
};

pub type Result<T> = core::result::Result<T, Error>;
