use core::fmt;

/// 块设备返回的错误, 由 BlockDevice 的实现者给出
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum IOError {
    Read,
    Write,
}

impl fmt::Display for IOError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IOError::Read => write!(f, "block device read failed"),
            IOError::Write => write!(f, "block device write failed"),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FSError {
    /// 设备读写失败
    Device(IOError),
    /// 引导扇区签名或 FAT32 字段不合法
    InvalidBootSector,
    NotFat32,
    InvalidMbr,
    NoFat32Partition,
    /// 长目录项的校验和或顺序号前后不一致
    CorruptedLongEntry,
    /// 需要一个已分配的簇, 但 FAT 表项是 bad/reserved/free
    UnexpectedCluster { cluster: u32, entry: u32 },
    InvalidCluster(u32),
    ChainTooLong,
    NoFreeCluster,
    /// 扇区被锁住时又去访问扇区缓冲区, 属于编程错误
    SectorLocked,
    OutOfRange,
    EndOfArray,
    NotChainTail(u32),
    NoNextCluster(u32),
    InvalidName,
    NameTooLong,
    NotFound,
    AlreadyExists,
    NotDirectory,
    DirectoryNotEmpty,
}

impl From<IOError> for FSError {
    fn from(value: IOError) -> Self {
        FSError::Device(value)
    }
}

impl fmt::Display for FSError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FSError::Device(e) => write!(f, "{}", e),
            FSError::InvalidBootSector => write!(f, "invalid boot sector"),
            FSError::NotFat32 => write!(f, "volume is not FAT32"),
            FSError::InvalidMbr => write!(f, "invalid master boot record"),
            FSError::NoFat32Partition => write!(f, "partition is not FAT32"),
            FSError::CorruptedLongEntry => write!(f, "long entry corrupted"),
            FSError::UnexpectedCluster { cluster, entry } => write!(
                f,
                "cluster {} has unexpected FAT entry {:#010X}",
                cluster, entry
            ),
            FSError::InvalidCluster(c) => write!(f, "cluster {} out of the data area", c),
            FSError::ChainTooLong => write!(f, "cluster chain longer than the volume"),
            FSError::NoFreeCluster => write!(f, "no free cluster"),
            FSError::SectorLocked => write!(f, "sector buffer is locked"),
            FSError::OutOfRange => write!(f, "access outside the sector"),
            FSError::EndOfArray => write!(f, "index past the end of the directory"),
            FSError::NotChainTail(c) => write!(f, "cluster {} is not the end of its chain", c),
            FSError::NoNextCluster(c) => write!(f, "cluster {} has no next cluster", c),
            FSError::InvalidName => write!(f, "invalid name"),
            FSError::NameTooLong => write!(f, "name too long"),
            FSError::NotFound => write!(f, "entry not found"),
            FSError::AlreadyExists => write!(f, "entry already exists"),
            FSError::NotDirectory => write!(f, "not a directory"),
            FSError::DirectoryNotEmpty => write!(f, "directory not empty"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for IOError {}

#[cfg(feature = "std")]
impl std::error::Error for FSError {}
