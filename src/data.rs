// 数据区: 簇号到扇区号的换算, 扇区号都是设备上的绝对扇区号
use super::{BiosParameterBlock, BlockDevice, FSError, SectorDriver, START_CLUS_ID};
use crate::config::SECTOR_SIZE;

#[derive(Debug, Copy, Clone)]
pub struct DataArea {
    first_sector: u32,
    sectors_per_cluster: u32,
    total_clusters: u32,
}

impl DataArea {
    pub(crate) fn new(bpb: &BiosParameterBlock, volume_first_sector: u32) -> Self {
        Self {
            first_sector: volume_first_sector + bpb.data_area_first_sector(),
            sectors_per_cluster: bpb.sectors_per_cluster(),
            total_clusters: bpb.total_clusters(),
        }
    }
    pub fn first_sector(&self) -> u32 {
        self.first_sector
    }
    pub fn sectors_per_cluster(&self) -> u32 {
        self.sectors_per_cluster
    }
    pub fn total_clusters(&self) -> u32 {
        self.total_clusters
    }
    pub fn cluster_size(&self) -> usize {
        self.sectors_per_cluster as usize * SECTOR_SIZE
    }
    /// 最后一个数据簇的簇号
    pub fn last_cluster(&self) -> u32 {
        self.total_clusters + START_CLUS_ID - 1
    }
    pub fn contains(&self, cluster_id: u32) -> bool {
        (START_CLUS_ID..=self.last_cluster()).contains(&cluster_id)
    }
    pub fn first_sector_of(&self, cluster_id: u32) -> Result<u32, FSError> {
        if !self.contains(cluster_id) {
            return Err(FSError::InvalidCluster(cluster_id));
        }
        Ok(self.first_sector + (cluster_id - START_CLUS_ID) * self.sectors_per_cluster)
    }
    /// 簇内第 local 个扇区
    pub fn sector_of(&self, cluster_id: u32, local: u32) -> Result<u32, FSError> {
        if local >= self.sectors_per_cluster {
            return Err(FSError::OutOfRange);
        }
        Ok(self.first_sector_of(cluster_id)? + local)
    }
    /// 整个簇写成同一个字节
    pub fn fill_cluster<D: BlockDevice>(
        &self,
        driver: &mut SectorDriver<D>,
        cluster_id: u32,
        value: u8,
    ) -> Result<(), FSError> {
        let first = self.first_sector_of(cluster_id)?;
        driver.fill_n(first, self.sectors_per_cluster, value)?;
        Ok(())
    }
    pub fn clear_cluster<D: BlockDevice>(
        &self,
        driver: &mut SectorDriver<D>,
        cluster_id: u32,
    ) -> Result<(), FSError> {
        self.fill_cluster(driver, cluster_id, 0)
    }
}
