// FAT 表结构体
use super::{
    BiosParameterBlock, BlockDevice, FSError, FSInfo, FSInfoSector, SectorDriver, START_CLUS_ID,
};
use crate::config::SECTOR_SIZE;
use log::{debug, error};

const BYTES_PER_ENTRY: u32 = 4;
const ENTRIES_PER_SECTOR: u32 = SECTOR_SIZE as u32 / BYTES_PER_ENTRY;
const ENTRY_MASK: u32 = 0x0FFF_FFFF;
const RESERVED_BITS: u32 = 0xF000_0000;
const FREE_CLUSTER: u32 = 0x0000_0000;
const BAD_CLUSTER: u32 = 0x0FFF_FFF7;
const FINAL_CLUSTER: u32 = 0x0FFF_FFFF;

/// The high 4 bits of a FAT32 FAT entry are reserved.
/// 0x0FFFFFF8..=0x0FFFFFFE 和越界的簇号都归为 Reserved, 既不是链尾也不能分配
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum FATEntry {
    Free,
    Next(u32),
    Bad,
    End,
    Reserved(u32),
}

impl FATEntry {
    /// 按 28 位有效值分类, last_cluster 是数据区最后一个簇号
    pub fn classify(raw: u32, last_cluster: u32) -> Self {
        match raw & ENTRY_MASK {
            FREE_CLUSTER => FATEntry::Free,
            BAD_CLUSTER => FATEntry::Bad,
            FINAL_CLUSTER => FATEntry::End,
            n if (START_CLUS_ID..=last_cluster).contains(&n) => FATEntry::Next(n),
            n => FATEntry::Reserved(n),
        }
    }
    pub fn raw(&self) -> u32 {
        match *self {
            FATEntry::Free => FREE_CLUSTER,
            FATEntry::Bad => BAD_CLUSTER,
            FATEntry::End => FINAL_CLUSTER,
            FATEntry::Next(n) | FATEntry::Reserved(n) => n & ENTRY_MASK,
        }
    }
    /// 属于某条簇链
    pub fn is_allocated(&self) -> bool {
        matches!(self, FATEntry::Next(_) | FATEntry::End)
    }
}

/// FAT 区在设备上的位置
#[derive(Debug, Copy, Clone)]
pub struct FATLayout {
    first_sector: u32,
    sectors_per_fat: u32,
    fats_number: u8,
    mirrored: bool,
    active_fat: u8,
    total_clusters: u32,
}

impl FATLayout {
    pub(crate) fn new(bpb: &BiosParameterBlock, volume_first_sector: u32) -> Self {
        Self {
            first_sector: volume_first_sector + bpb.fat_area_first_sector(),
            sectors_per_fat: bpb.fats_sectors(),
            fats_number: bpb.fats_number(),
            mirrored: bpb.is_fat_mirrored(),
            active_fat: bpb.active_fat(),
            total_clusters: bpb.total_clusters(),
        }
    }
    pub fn first_sector(&self) -> u32 {
        self.first_sector
    }
    pub fn sectors_per_fat(&self) -> u32 {
        self.sectors_per_fat
    }
    pub fn fats_number(&self) -> u8 {
        self.fats_number
    }
    pub fn is_mirrored(&self) -> bool {
        self.mirrored
    }
    pub fn total_clusters(&self) -> u32 {
        self.total_clusters
    }
    pub fn last_cluster(&self) -> u32 {
        self.total_clusters + START_CLUS_ID - 1
    }
    /// 读的那一份 FAT: 镜像时读第一份, 否则读活动的那一份
    fn read_fat(&self) -> u8 {
        if self.mirrored {
            0
        } else {
            self.active_fat
        }
    }
    /// 写的那些 FAT: 镜像时写所有副本
    fn write_fats(&self) -> core::ops::Range<u8> {
        if self.mirrored {
            0..self.fats_number
        } else {
            self.active_fat..self.active_fat + 1
        }
    }
    /// 第 fat 份 FAT 中 cluster_id 表项所在的 (扇区, 偏移)
    pub fn position(&self, fat: u8, cluster_id: u32) -> (u32, usize) {
        let sector_id = self.first_sector
            + self.sectors_per_fat * u32::from(fat)
            + cluster_id / ENTRIES_PER_SECTOR;
        let offset = (BYTES_PER_ENTRY * (cluster_id % ENTRIES_PER_SECTOR)) as usize;
        (sector_id, offset)
    }
}

/// 管理 FAT 和 FSINFO 里的提示值, 从 Volume::fat_area 拿到
pub struct FATArea<'a, D: BlockDevice> {
    driver: &'a mut SectorDriver<D>,
    layout: &'a FATLayout,
    fsinfo: &'a mut FSInfoSector,
}

impl<'a, D: BlockDevice> FATArea<'a, D> {
    pub(crate) fn new(
        driver: &'a mut SectorDriver<D>,
        layout: &'a FATLayout,
        fsinfo: &'a mut FSInfoSector,
    ) -> Self {
        Self {
            driver,
            layout,
            fsinfo,
        }
    }
    pub fn layout(&self) -> &FATLayout {
        self.layout
    }
    pub fn fsinfo(&self) -> FSInfo {
        self.fsinfo.fsinfo()
    }
    fn check_cluster(&self, cluster_id: u32) -> Result<(), FSError> {
        if !(START_CLUS_ID..=self.layout.last_cluster()).contains(&cluster_id) {
            error!("cluster {} out of FAT", cluster_id);
            return Err(FSError::InvalidCluster(cluster_id));
        }
        Ok(())
    }
    fn entry_raw(&mut self, cluster_id: u32) -> Result<u32, FSError> {
        let (sector_id, offset) = self.layout.position(self.layout.read_fat(), cluster_id);
        self.driver.read::<u32>(sector_id, offset)
    }
    pub fn entry(&mut self, cluster_id: u32) -> Result<FATEntry, FSError> {
        self.check_cluster(cluster_id)?;
        let raw = self.entry_raw(cluster_id)?;
        Ok(FATEntry::classify(raw, self.layout.last_cluster()))
    }
    /// 写入所有要同步的 FAT 副本, 保留高 4 位
    pub fn set_entry(&mut self, cluster_id: u32, entry: FATEntry) -> Result<(), FSError> {
        self.check_cluster(cluster_id)?;
        let old_reserved_bits = self.entry_raw(cluster_id)? & RESERVED_BITS;
        let value = entry.raw() | old_reserved_bits;
        for fat in self.layout.write_fats() {
            let (sector_id, offset) = self.layout.position(fat, cluster_id);
            self.driver.write(sector_id, offset, value)?;
        }
        Ok(())
    }
    /// 链上的下一个簇, 链尾返回 None
    pub fn next_cluster(&mut self, cluster_id: u32) -> Result<Option<u32>, FSError> {
        match self.entry(cluster_id)? {
            FATEntry::Next(n) => Ok(Some(n)),
            FATEntry::End => Ok(None),
            entry => Err(FSError::UnexpectedCluster {
                cluster: cluster_id,
                entry: entry.raw(),
            }),
        }
    }
    pub fn last_cluster(&mut self, start_cluster: u32) -> Result<u32, FSError> {
        let mut curr_cluster = start_cluster;
        for _ in 0..self.layout.total_clusters {
            match self.next_cluster(curr_cluster)? {
                Some(next_cluster) => curr_cluster = next_cluster,
                None => return Ok(curr_cluster),
            }
        }
        Err(FSError::ChainTooLong)
    }
    pub fn chain_length(&mut self, start_cluster: u32) -> Result<u32, FSError> {
        let mut curr_cluster = start_cluster;
        for num in 1..=self.layout.total_clusters {
            match self.next_cluster(curr_cluster)? {
                Some(next_cluster) => curr_cluster = next_cluster,
                None => return Ok(num),
            }
        }
        Err(FSError::ChainTooLong)
    }
    /// 从 START_CLUS_ID 开始线性搜索
    fn search_free_cluster(&mut self) -> Result<u32, FSError> {
        for cluster_id in START_CLUS_ID..=self.layout.last_cluster() {
            if self.entry(cluster_id)? == FATEntry::Free {
                return Ok(cluster_id);
            }
        }
        Err(FSError::NoFreeCluster)
    }
    /// 扫描整个 FAT, 顺便修正 FSINFO 里的空闲簇数
    pub fn count_free_clusters(&mut self) -> Result<u32, FSError> {
        let mut num = 0;
        for cluster_id in START_CLUS_ID..=self.layout.last_cluster() {
            if self.entry(cluster_id)? == FATEntry::Free {
                num += 1;
            }
        }
        self.fsinfo.update(|info| info.set_free_clusters(Some(num)));
        Ok(num)
    }
    fn allocated(&mut self, cluster_id: u32) {
        let last = self.layout.last_cluster();
        self.fsinfo.update(|info| {
            info.map_free_clusters(|n| n.saturating_sub(1));
            info.set_next_free_cluster((cluster_id < last).then_some(cluster_id + 1));
        });
    }
    fn freed(&mut self, num: u32) {
        self.fsinfo
            .update(|info| info.map_free_clusters(|n| n.saturating_add(num)));
    }
    /// 新建只有一个簇的链
    pub fn new_list(&mut self) -> Result<u32, FSError> {
        let cluster_id = self.search_free_cluster()?;
        self.set_entry(cluster_id, FATEntry::End)?;
        self.allocated(cluster_id);
        debug!("new_list: {}", cluster_id);
        Ok(cluster_id)
    }
    /// 归还整条链, 遇到空闲簇停下, 返回释放的簇数
    pub fn remove_list(&mut self, start_cluster: u32) -> Result<u32, FSError> {
        let mut curr_cluster = start_cluster;
        let mut num = 0;
        let result = loop {
            if num >= self.layout.total_clusters {
                break Err(FSError::ChainTooLong);
            }
            let entry = self.entry(curr_cluster)?;
            match entry {
                FATEntry::Next(next_cluster) => {
                    self.set_entry(curr_cluster, FATEntry::Free)?;
                    num += 1;
                    curr_cluster = next_cluster;
                }
                FATEntry::End => {
                    self.set_entry(curr_cluster, FATEntry::Free)?;
                    num += 1;
                    break Ok(num);
                }
                FATEntry::Free => break Ok(num),
                FATEntry::Bad | FATEntry::Reserved(_) => {
                    break Err(FSError::UnexpectedCluster {
                        cluster: curr_cluster,
                        entry: entry.raw(),
                    })
                }
            }
        };
        self.freed(num);
        debug!("remove_list({}): {} clusters freed", start_cluster, num);
        result
    }
    /// 在 cluster_id 后面插入一个新簇, 返回新簇号
    pub fn add_cluster(&mut self, cluster_id: u32) -> Result<u32, FSError> {
        let entry = self.entry(cluster_id)?;
        if !entry.is_allocated() {
            return Err(FSError::UnexpectedCluster {
                cluster: cluster_id,
                entry: entry.raw(),
            });
        }
        let new_cluster = self.search_free_cluster()?;
        // 先让新簇接上原来的后继, 再改 cluster_id
        self.set_entry(new_cluster, entry)?;
        self.set_entry(cluster_id, FATEntry::Next(new_cluster))?;
        self.allocated(new_cluster);
        debug!("add_cluster({}): {}", cluster_id, new_cluster);
        Ok(new_cluster)
    }
    /// cluster_id 必须是链尾
    pub fn push_back_cluster(&mut self, cluster_id: u32) -> Result<u32, FSError> {
        if self.entry(cluster_id)? != FATEntry::End {
            return Err(FSError::NotChainTail(cluster_id));
        }
        self.add_cluster(cluster_id)
    }
    /// 删掉 cluster_id 后面的那个簇, 返回 cluster_id 的新表项
    pub fn remove_next_cluster(&mut self, cluster_id: u32) -> Result<FATEntry, FSError> {
        let removed = match self.entry(cluster_id)? {
            FATEntry::Next(n) => n,
            FATEntry::End => return Err(FSError::NoNextCluster(cluster_id)),
            entry => {
                return Err(FSError::UnexpectedCluster {
                    cluster: cluster_id,
                    entry: entry.raw(),
                })
            }
        };
        let successor = self.entry(removed)?;
        if !successor.is_allocated() {
            return Err(FSError::UnexpectedCluster {
                cluster: removed,
                entry: successor.raw(),
            });
        }
        self.set_entry(cluster_id, successor)?;
        self.set_entry(removed, FATEntry::Free)?;
        self.freed(1);
        debug!("remove_next_cluster({}): {} freed", cluster_id, removed);
        Ok(successor)
    }
}
