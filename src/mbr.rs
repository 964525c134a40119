// 主引导记录 (MBR), 只用来找到 FAT32 卷的第一个扇区
use super::{BlockDevice, FSError, SectorDriver};
use log::{debug, error};

const PARTITION_TABLE_OFFSET: usize = 446;
const PARTITION_ENTRY_SZ: usize = 16;
const SIGNATURE_OFFSET: usize = 510;
pub const BOOT_SIGNATURE: u16 = 0xAA55;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PartitionType {
    Blank,
    Fat12,
    Fat16Small,
    Extended,
    Fat16,
    NtfsOrExfat,
    Fat32Chs,
    Fat32Lba,
    Fat16Lba,
    ExtendedLba,
    Other(u8),
}

impl From<u8> for PartitionType {
    fn from(value: u8) -> Self {
        match value {
            0x00 => PartitionType::Blank,
            0x01 => PartitionType::Fat12,
            0x04 => PartitionType::Fat16Small,
            0x05 => PartitionType::Extended,
            0x06 => PartitionType::Fat16,
            0x07 => PartitionType::NtfsOrExfat,
            0x0B => PartitionType::Fat32Chs,
            0x0C => PartitionType::Fat32Lba,
            0x0E => PartitionType::Fat16Lba,
            0x0F => PartitionType::ExtendedLba,
            n => PartitionType::Other(n),
        }
    }
}

impl PartitionType {
    pub fn is_fat32(&self) -> bool {
        matches!(self, PartitionType::Fat32Chs | PartitionType::Fat32Lba)
    }
}

#[derive(Copy, Clone, Debug)]
pub struct PartitionEntry {
    pub boot_id: u8,
    pub partition_type: PartitionType,
    pub first_sector: u32,
    pub sectors: u32,
}

impl PartitionEntry {
    fn parse(raw: &[u8]) -> Self {
        Self {
            boot_id: raw[0],
            partition_type: PartitionType::from(raw[4]),
            first_sector: u32::from_le_bytes([raw[8], raw[9], raw[10], raw[11]]),
            sectors: u32::from_le_bytes([raw[12], raw[13], raw[14], raw[15]]),
        }
    }
    pub fn is_bootable(&self) -> bool {
        self.boot_id == 0x80
    }
}

#[derive(Copy, Clone, Debug)]
pub struct MasterBootRecord {
    pub partitions: [PartitionEntry; 4],
    pub signature: u16,
}

impl MasterBootRecord {
    /// MBR 永远在 0 号扇区
    pub fn read<D: BlockDevice>(driver: &mut SectorDriver<D>) -> Result<Self, FSError> {
        let sector = driver.view_locked(0)?;
        let entry = |i: usize| {
            let start = PARTITION_TABLE_OFFSET + i * PARTITION_ENTRY_SZ;
            PartitionEntry::parse(&sector[start..start + PARTITION_ENTRY_SZ])
        };
        let mbr = Self {
            partitions: [entry(0), entry(1), entry(2), entry(3)],
            signature: sector.read::<u16>(SIGNATURE_OFFSET)?,
        };
        Ok(mbr)
    }
    pub fn is_valid(&self) -> bool {
        self.signature == BOOT_SIGNATURE
    }
    /// 第 index (0..4) 个分区如果是 FAT32, 返回它的第一个扇区
    pub fn fat32_first_sector(&self, index: usize) -> Result<u32, FSError> {
        if !self.is_valid() {
            error!("invalid MBR signature {:#06X}", self.signature);
            return Err(FSError::InvalidMbr);
        }
        let partition = self.partitions.get(index).ok_or(FSError::NoFat32Partition)?;
        if !partition.partition_type.is_fat32() || partition.first_sector == 0 {
            debug!(
                "partition {} has type {:?}, not FAT32",
                index, partition.partition_type
            );
            return Err(FSError::NoFat32Partition);
        }
        Ok(partition.first_sector)
    }
}
