// 一个挂载好的 FAT32 卷: 唯一的扇区缓冲区, 引导扇区算出来的几何信息, FAT 区和数据区
use super::{
    BiosParameterBlock, BlockDevice, DataArea, FATArea, FATLayout, FSError, FSInfo, FSInfoSector,
    MasterBootRecord, SectorDriver,
};
use log::{error, info};

pub struct Volume<D: BlockDevice> {
    driver: SectorDriver<D>,
    first_sector: u32,
    bpb: BiosParameterBlock,
    fat_layout: FATLayout,
    data_area: DataArea,
    fsinfo: FSInfoSector,
}

impl<D: BlockDevice> Volume<D> {
    /// first_sector 是卷在设备上的第一个扇区, 没有分区表的介质传 0
    pub fn new(block_dev: D, first_sector: u32) -> Result<Self, FSError> {
        let mut driver = SectorDriver::new(block_dev);
        let bpb = BiosParameterBlock::read(&mut driver, first_sector)?;
        let fsinfo = FSInfoSector::read(&mut driver, first_sector + bpb.fsinfo_sector())?;
        let volume = Self {
            fat_layout: FATLayout::new(&bpb, first_sector),
            data_area: DataArea::new(&bpb, first_sector),
            driver,
            first_sector,
            bpb,
            fsinfo,
        };
        info!(
            "mounted FAT32 volume at sector {}: {} clusters of {} sectors",
            first_sector,
            volume.total_clusters(),
            volume.sectors_per_cluster()
        );
        Ok(volume)
    }
    /// 通过 MBR 挂载第 index 个分区
    pub fn open_partition(block_dev: D, index: usize) -> Result<Self, FSError> {
        let first_sector = {
            let mut driver = SectorDriver::new(&block_dev);
            MasterBootRecord::read(&mut driver)?.fat32_first_sector(index)?
        };
        Self::new(block_dev, first_sector)
    }

    pub fn bpb(&self) -> &BiosParameterBlock {
        &self.bpb
    }
    pub fn first_sector(&self) -> u32 {
        self.first_sector
    }
    pub fn bytes_per_sector(&self) -> u32 {
        self.bpb.bytes_per_sector()
    }
    pub fn sectors_per_cluster(&self) -> u32 {
        self.bpb.sectors_per_cluster()
    }
    pub fn reserved_sectors(&self) -> u32 {
        self.bpb.reserved_sectors()
    }
    pub fn fats_number(&self) -> u8 {
        self.bpb.fats_number()
    }
    pub fn is_fat_mirrored(&self) -> bool {
        self.bpb.is_fat_mirrored()
    }
    pub fn sectors_per_fat(&self) -> u32 {
        self.bpb.fats_sectors()
    }
    /// 以下扇区号都是设备上的绝对扇区号
    pub fn fat_area_first_sector(&self) -> u32 {
        self.fat_layout.first_sector()
    }
    pub fn data_area_first_sector(&self) -> u32 {
        self.data_area.first_sector()
    }
    pub fn first_sector_of_cluster(&self, cluster_id: u32) -> Result<u32, FSError> {
        self.data_area.first_sector_of(cluster_id)
    }
    pub fn total_clusters(&self) -> u32 {
        self.data_area.total_clusters()
    }
    pub fn root_directory_first_cluster(&self) -> u32 {
        self.bpb.root_dir_cluster()
    }
    pub fn fsinfo(&self) -> FSInfo {
        self.fsinfo.fsinfo()
    }

    pub fn fat_area(&mut self) -> FATArea<'_, D> {
        FATArea::new(&mut self.driver, &self.fat_layout, &mut self.fsinfo)
    }
    pub fn data_area(&self) -> &DataArea {
        &self.data_area
    }
    pub fn driver(&mut self) -> &mut SectorDriver<D> {
        &mut self.driver
    }
    /// 数据区和驱动同时借出来, 读写簇内扇区时用
    pub(crate) fn data_and_driver(&mut self) -> (&DataArea, &mut SectorDriver<D>) {
        (&self.data_area, &mut self.driver)
    }
    /// 写回 FSINFO 提示和缓冲区里的脏扇区
    pub fn flush(&mut self) -> Result<(), FSError> {
        self.fsinfo.sync(&mut self.driver)?;
        self.driver.flush()
    }
}

impl<D: BlockDevice> Drop for Volume<D> {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            error!("volume at sector {} not flushed: {}", self.first_sector, e);
        }
    }
}
