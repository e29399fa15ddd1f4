use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("no such file or directory")]
    NotFound,

    #[error("no free inode or data block left")]
    Exhausted,

    #[error("directory has no room for another entry")]
    Full,

    #[error("write exceeds the maximum file size")]
    CapacityExceeded,

    #[error("file exists")]
    AlreadyExists,

    #[error("not a directory")]
    NotADirectory,

    #[error("is a directory")]
    IsADirectory,

    #[error("directory not empty")]
    DirectoryNotEmpty,

    #[error("invalid file name")]
    InvalidName,

    #[error("file name too long")]
    NameTooLong,

    #[error("inode {0} is out of range")]
    InvalidInode(u32),

    #[error("bad magic number {0:#x}")]
    BadMagic(u32),

    #[error("corrupted volume: {0}")]
    Corrupted(&'static str),

    #[error("invalid geometry: {0}")]
    InvalidGeometry(&'static str),

    #[error("device too small: need {need} blocks, have {have}")]
    DeviceTooSmall { need: usize, have: usize },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// 转换为 POSIX 错误码，供宿主分发层使用
    pub fn errno(&self) -> i32 {
        match self {
            Self::NotFound => libc::ENOENT,
            Self::Exhausted | Self::Full => libc::ENOSPC,
            Self::CapacityExceeded => libc::EFBIG,
            Self::AlreadyExists => libc::EEXIST,
            Self::NotADirectory => libc::ENOTDIR,
            Self::IsADirectory => libc::EISDIR,
            Self::DirectoryNotEmpty => libc::ENOTEMPTY,
            Self::InvalidName | Self::InvalidInode(_) | Self::InvalidGeometry(_) => libc::EINVAL,
            Self::NameTooLong => libc::ENAMETOOLONG,
            Self::BadMagic(_) | Self::Corrupted(_) | Self::DeviceTooSmall { .. } | Self::Io(_) => {
                libc::EIO
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
