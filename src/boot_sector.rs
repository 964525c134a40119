// 对 DBR 的抽象: 引导扇区只在挂载时读一次, 之后只用它算出来的几何信息
use super::{BlockDevice, FSError, SectorDriver, START_CLUS_ID};
use crate::config::SECTOR_SIZE;
use crate::mbr::BOOT_SIGNATURE;
use log::{error, warn};

const FAT_ENTRY_SZ: u32 = 4;
const EXTENDED_BOOT_SIGNATURE: u8 = 0x29;
const BACKUP_BOOT_SECTOR: u16 = 6;
const MIRRORING_DISABLED: u16 = 0x0080;
const ACTIVE_FAT_MASK: u16 = 0x000F;

// 并不是引导扇区里面全部的信息, 引导代码之类的不关心
#[derive(Debug, Default, Copy, Clone)]
pub struct BiosParameterBlock {
    oem_name: [u8; 8],
    bytes_per_sector: u16,
    sectors_per_cluster: u8,
    reserved_sectors: u16,
    fats_number: u8,         // FAT 表数, 正常的为1或2
    root_entries: u16,       // 根目录的目录项数, FAT32 一直设为0
    total_sectors_16: u16,   // FAT32 固定为0
    media: u8,               // 存储介质类型
    sectors_per_fat_16: u16, // FAT32 固定为0
    sectors_per_track: u16,
    heads: u16,          // 磁头数
    hidden_sectors: u32, // 文件系统前的隐藏扇区数, 对于有分区的磁盘来说不为0
    total_sectors_32: u32,
    // Extended BIOS Parameter Block
    fats_sectors: u32,
    extended_flags: u16,
    fs_version: u16,
    root_dir_cluster: u32,
    fsinfo_sector: u16,
    backup_boot_sector: u16,
    drive_number: u8,
    boot_signature: u8,
    volume_id: u32,
    volume_label: [u8; 11], // 卷名, 11bytes
    fs_type_label: [u8; 8], // 文件系统类型名, 如果是FAT32就是FAT32的ascii码
    signature: u16,         // 扇区最后两个字节 0xAA55
}

fn le16(raw: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([raw[offset], raw[offset + 1]])
}

fn le32(raw: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        raw[offset],
        raw[offset + 1],
        raw[offset + 2],
        raw[offset + 3],
    ])
}

impl BiosParameterBlock {
    const FAT32_MAX_CLUSTERS: u32 = 0x0FFF_FFF4;

    /// 按 FAT 规范的偏移解析整个引导扇区 (小端序)
    pub fn parse(raw: &[u8; SECTOR_SIZE]) -> Self {
        let mut bpb = Self::default();
        bpb.oem_name.copy_from_slice(&raw[3..11]);
        bpb.bytes_per_sector = le16(raw, 11);
        bpb.sectors_per_cluster = raw[13];
        bpb.reserved_sectors = le16(raw, 14);
        bpb.fats_number = raw[16];
        bpb.root_entries = le16(raw, 17);
        bpb.total_sectors_16 = le16(raw, 19);
        bpb.media = raw[21];
        bpb.sectors_per_fat_16 = le16(raw, 22);
        bpb.sectors_per_track = le16(raw, 24);
        bpb.heads = le16(raw, 26);
        bpb.hidden_sectors = le32(raw, 28);
        bpb.total_sectors_32 = le32(raw, 32);
        bpb.fats_sectors = le32(raw, 36);
        bpb.extended_flags = le16(raw, 40);
        bpb.fs_version = le16(raw, 42);
        bpb.root_dir_cluster = le32(raw, 44);
        bpb.fsinfo_sector = le16(raw, 48);
        bpb.backup_boot_sector = le16(raw, 50);
        bpb.drive_number = raw[64];
        bpb.boot_signature = raw[66];
        bpb.volume_id = le32(raw, 67);
        bpb.volume_label.copy_from_slice(&raw[71..82]);
        bpb.fs_type_label.copy_from_slice(&raw[82..90]);
        bpb.signature = le16(raw, 510);
        bpb
    }
    /// 读取并校验 first_sector 处的引导扇区
    pub fn read<D: BlockDevice>(
        driver: &mut SectorDriver<D>,
        first_sector: u32,
    ) -> Result<Self, FSError> {
        let bpb = {
            let sector = driver.view_locked(first_sector)?;
            Self::parse(&sector)
        };
        bpb.validate()?;
        Ok(bpb)
    }
    fn validate_signature(&self) -> Result<(), FSError> {
        if self.signature != BOOT_SIGNATURE {
            error!("invalid boot sector signature {:#06X}", self.signature);
            return Err(FSError::InvalidBootSector);
        }
        Ok(())
    }
    // 最先判断是否是 FAT32 类型文件系统: 旧的 16 位字段都必须是 0
    fn validate_fat32(&self) -> Result<(), FSError> {
        if self.root_entries != 0
            || self.total_sectors_16 != 0
            || self.sectors_per_fat_16 != 0
            || self.fs_version != 0
        {
            error!("Unsupported filesystem: Not FAT32");
            return Err(FSError::NotFat32);
        }
        if &self.fs_type_label != b"FAT32   " {
            warn!("unexpected filesystem type label {:?}", self.fs_type_label);
        }
        Ok(())
    }
    // 扇区的字节数只支持范围在512-4096字节中二的整指数倍, 还必须和扇区缓冲区一样大
    fn validate_bytes_per_sector(&self) -> Result<(), FSError> {
        if self.bytes_per_sector.count_ones() != 1
            || self.bytes_per_sector < 512
            || self.bytes_per_sector > 4096
        {
            error!(
                "invalid bytes_per_sector value in BPB: expected a power of two in [512, 4096] but got {}",
                self.bytes_per_sector
            );
            return Err(FSError::InvalidBootSector);
        }
        if usize::from(self.bytes_per_sector) != SECTOR_SIZE {
            error!(
                "unsupported bytes_per_sector {}: the sector buffer holds {} bytes",
                self.bytes_per_sector, SECTOR_SIZE
            );
            return Err(FSError::InvalidBootSector);
        }
        Ok(())
    }
    // 簇的扇区数只支持二的整指数倍
    fn validate_sectors_per_cluster(&self) -> Result<(), FSError> {
        if self.sectors_per_cluster.count_ones() != 1 {
            error!(
                "invalid sectors_per_cluster value in BPB: expected a power of two but got {}",
                self.sectors_per_cluster
            );
            return Err(FSError::InvalidBootSector);
        }
        Ok(())
    }
    fn validate_reserved_sectors(&self) -> Result<(), FSError> {
        if self.reserved_sectors < 1 {
            error!(
                "invalid reserved_sectors value in BPB: {}",
                self.reserved_sectors
            );
            return Err(FSError::InvalidBootSector);
        }
        if self.backup_boot_sector >= self.reserved_sectors {
            error!(
                "Invalid BPB: expected backup boot-sector to be in the reserved region (sector < {}) but got sector {}",
                self.reserved_sectors, self.backup_boot_sector
            );
            return Err(FSError::InvalidBootSector);
        }
        if self.backup_boot_sector != BACKUP_BOOT_SECTOR {
            warn!(
                "backup boot sector at {} instead of {}",
                self.backup_boot_sector, BACKUP_BOOT_SECTOR
            );
        }
        if self.fsinfo_sector >= self.reserved_sectors {
            error!(
                "Invalid BPB: expected FSInfo sector to be in the reserved region (sector < {}) but got sector {}",
                self.reserved_sectors, self.fsinfo_sector
            );
            return Err(FSError::InvalidBootSector);
        }
        Ok(())
    }
    fn validate_fats(&self) -> Result<(), FSError> {
        if self.fats_number == 0 {
            error!("invalid fats value in BPB: {}", self.fats_number);
            return Err(FSError::InvalidBootSector);
        }
        if !self.is_fat_mirrored() && self.active_fat() >= self.fats_number {
            error!(
                "Invalid BPB: active FAT {} but only {} FATs",
                self.active_fat(),
                self.fats_number
            );
            return Err(FSError::InvalidBootSector);
        }
        if self.fats_sectors == 0 {
            error!(
                "Invalid sectors_per_fat_32 value in FAT32 BPB: expected non-zero value but got {}",
                self.fats_sectors
            );
            return Err(FSError::InvalidBootSector);
        }
        Ok(())
    }
    fn validate_total_sectors(&self) -> Result<(), FSError> {
        if self.total_sectors_32 == 0 {
            error!("Invalid BPB (total_sectors_32 should be non-zero)");
            return Err(FSError::InvalidBootSector);
        }
        let first_data_sector =
            u64::from(self.reserved_sectors) + u64::from(self.fats_number) * u64::from(self.fats_sectors);
        if u64::from(self.total_sectors_32) <= first_data_sector {
            error!(
                "Invalid total_sectors value in BPB: expected value > {} but got {}",
                first_data_sector, self.total_sectors_32
            );
            return Err(FSError::InvalidBootSector);
        }
        Ok(())
    }
    fn validate_total_clusters(&self) -> Result<(), FSError> {
        let total_clusters = self.total_clusters();
        if total_clusters > Self::FAT32_MAX_CLUSTERS {
            error!("Invalid BPB: too many clusters {}", total_clusters);
            return Err(FSError::InvalidBootSector);
        }
        let usable_fat_entries = self.fat_entries().saturating_sub(START_CLUS_ID);
        // FAT 装不下的簇号会落到下一份 FAT 或数据区
        if usable_fat_entries < total_clusters {
            error!(
                "Invalid BPB: FAT is too small (allows allocation of {} clusters) compared to the total number of clusters ({})",
                usable_fat_entries, total_clusters
            );
            return Err(FSError::InvalidBootSector);
        }
        let last_cluster = total_clusters + START_CLUS_ID - 1;
        if !(START_CLUS_ID..=last_cluster).contains(&self.root_dir_cluster) {
            error!("Invalid BPB: root directory cluster {}", self.root_dir_cluster);
            return Err(FSError::InvalidBootSector);
        }
        Ok(())
    }
    // 验证文件系统是否是合法的FAT32类型
    pub fn validate(&self) -> Result<(), FSError> {
        self.validate_signature()?;
        self.validate_fat32()?;
        self.validate_bytes_per_sector()?;
        self.validate_sectors_per_cluster()?;
        self.validate_reserved_sectors()?;
        self.validate_fats()?;
        self.validate_total_sectors()?;
        self.validate_total_clusters()?;
        Ok(())
    }

    // Volume info
    pub fn oem_name(&self) -> &[u8; 8] {
        &self.oem_name
    }
    pub fn media(&self) -> u8 {
        self.media
    }
    pub fn sectors_per_track(&self) -> u16 {
        self.sectors_per_track
    }
    pub fn heads(&self) -> u16 {
        self.heads
    }
    pub fn hidden_sectors(&self) -> u32 {
        self.hidden_sectors
    }
    pub fn total_sectors(&self) -> u32 {
        self.total_sectors_32
    }
    pub fn bytes_per_sector(&self) -> u32 {
        u32::from(self.bytes_per_sector)
    }
    pub fn drive_number(&self) -> u8 {
        self.drive_number
    }
    pub fn is_volume_label_and_id_set(&self) -> bool {
        self.boot_signature == EXTENDED_BOOT_SIGNATURE
    }
    pub fn volume_id(&self) -> Option<u32> {
        self.is_volume_label_and_id_set().then_some(self.volume_id)
    }
    pub fn volume_label(&self) -> Option<&[u8; 11]> {
        self.is_volume_label_and_id_set().then_some(&self.volume_label)
    }
    pub fn fs_type_label(&self) -> &[u8; 8] {
        &self.fs_type_label
    }
    pub fn signature(&self) -> u16 {
        self.signature
    }

    // Reserved area
    pub fn reserved_sectors(&self) -> u32 {
        u32::from(self.reserved_sectors)
    }
    pub fn fsinfo_sector(&self) -> u32 {
        u32::from(self.fsinfo_sector)
    }
    pub fn backup_boot_sector(&self) -> u32 {
        u32::from(self.backup_boot_sector)
    }

    // FAT area: FAT[0] U FAT[1] U ... U FAT[n-1], 所有扇区号都相对于卷的第一个扇区
    pub fn fats_number(&self) -> u8 {
        self.fats_number
    }
    pub fn fats_sectors(&self) -> u32 {
        self.fats_sectors
    }
    /// 运行时是否把 FAT 镜像到所有副本
    pub fn is_fat_mirrored(&self) -> bool {
        self.extended_flags & MIRRORING_DISABLED == 0
    }
    /// 不镜像时唯一使用的 FAT
    pub fn active_fat(&self) -> u8 {
        (self.extended_flags & ACTIVE_FAT_MASK) as u8
    }
    /// 写 FAT 时要同步的副本数
    pub fn active_fats_number(&self) -> u8 {
        if self.is_fat_mirrored() {
            self.fats_number
        } else {
            1
        }
    }
    pub fn fat_first_sector(&self, i: u8) -> u32 {
        self.reserved_sectors() + self.fats_sectors * u32::from(i)
    }
    pub fn fat_area_first_sector(&self) -> u32 {
        self.fat_first_sector(0)
    }
    pub fn sectors_per_all_fats(&self) -> u32 {
        u32::from(self.fats_number) * self.fats_sectors
    }
    pub fn fat_entries_per_sector(&self) -> u32 {
        self.bytes_per_sector() / FAT_ENTRY_SZ
    }
    pub fn fat_entries(&self) -> u32 {
        self.fat_entries_per_sector() * self.fats_sectors
    }
    /// FAT 里多分配出来, 没有对应簇的表项数
    pub fn fat_unused_entries(&self) -> u32 {
        self.fat_entries()
            .saturating_sub(START_CLUS_ID + self.total_clusters())
    }

    // Data area
    pub fn data_area_first_sector(&self) -> u32 {
        self.reserved_sectors() + self.sectors_per_all_fats()
    }
    pub fn data_area_sectors(&self) -> u32 {
        self.total_sectors_32
            .saturating_sub(self.data_area_first_sector())
    }
    pub fn sectors_per_cluster(&self) -> u32 {
        u32::from(self.sectors_per_cluster)
    }
    pub fn cluster_size(&self) -> u32 {
        self.sectors_per_cluster() * self.bytes_per_sector()
    }
    pub fn total_clusters(&self) -> u32 {
        self.data_area_sectors() / self.sectors_per_cluster().max(1)
    }
    pub fn first_sector_of_cluster(&self, cluster: u32) -> u32 {
        self.data_area_first_sector()
            + cluster.saturating_sub(START_CLUS_ID) * self.sectors_per_cluster()
    }
    pub fn root_dir_cluster(&self) -> u32 {
        self.root_dir_cluster
    }
    pub fn root_dir_first_sector(&self) -> u32 {
        self.first_sector_of_cluster(self.root_dir_cluster)
    }
}
