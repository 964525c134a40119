#![cfg_attr(not(any(test, feature = "std")), no_std)]

mod block_device;
mod boot_sector;
mod config;
mod data;
mod directory;
mod directory_entry;
mod error;
mod fat;
mod fat_list;
mod file;
mod fsinfo;
mod mbr;
mod sector_driver;
mod volume;

pub use block_device::{BlockDevice, MemoryDevice};
pub use boot_sector::BiosParameterBlock;
pub use config::{LONG_NAME_MAX, MAX_LONG_NAME_ENTRIES, SECTOR_SIZE};
pub use data::DataArea;
pub use directory::{Directory, Index, LongEntry};
pub use directory_entry::{
    checksum, format_short_name, short_name_from_long, DirectoryEntry, EntryInfo, FatDate,
    FatTime, FileAttributes, LongDirectoryEntry, ShortDirectoryEntry, DIRENT_SZ,
    DIR_ENTRY_DELETED_FLAG, DIR_ENTRY_NO_MORE, LAST_LONG_ENTRY, LONG_NAME_LEN, SHORT_NAME_LEN,
};
pub use error::{FSError, IOError};
pub use fat::{FATArea, FATEntry, FATLayout};
pub use fat_list::FATAreaList;
pub use file::File;
pub use fsinfo::{FSInfo, FSInfoSector};
pub use mbr::{MasterBootRecord, PartitionEntry, PartitionType, BOOT_SIGNATURE};
pub use sector_driver::{SectorDriver, SectorLock, SectorValue};
pub use volume::Volume;

pub const START_CLUS_ID: u32 = 2;
