use std::fmt;

use crate::machine::disk::DiskError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    FileNotFound,
    FileAlreadyExists,
    NotADirectory,
    IsADirectory,
    DirectoryFull,
    DiskFull,
    FileTooLarge,
    DirectoryNotEmpty,
    NameTooLong,
    InvalidPath,
    Disk(DiskError),
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsError::FileNotFound => write!(f, "file not found"),
            FsError::FileAlreadyExists => write!(f, "file already exists"),
            FsError::NotADirectory => write!(f, "not a directory"),
            FsError::IsADirectory => write!(f, "is a directory"),
            FsError::DirectoryFull => write!(f, "directory is full"),
            FsError::DiskFull => write!(f, "not enough free space on disk"),
            FsError::FileTooLarge => write!(f, "file would exceed the maximum file size"),
            FsError::DirectoryNotEmpty => write!(f, "directory is not empty"),
            FsError::NameTooLong => write!(f, "file name too long"),
            FsError::InvalidPath => write!(f, "invalid path"),
            FsError::Disk(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for FsError {}

impl From<DiskError> for FsError {
    fn from(e: DiskError) -> Self {
        FsError::Disk(e)
    }
}
