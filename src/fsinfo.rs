// 对FSInfo的抽象
use super::{BlockDevice, FSError, SectorDriver};
use log::{debug, warn};

const LEAD_SIGNATURE_OFFSET: usize = 0;
const STRUC_SIGNATURE_OFFSET: usize = 484;
const FREE_COUNT_OFFSET: usize = 488;
const NEXT_FREE_OFFSET: usize = 492;
const TRAIL_SIGNATURE_OFFSET: usize = 508;

/// 0xFFFFFFFF 表示不知道
pub const UNKNOWN: u32 = 0xFFFF_FFFF;

/// FSInfo 里的两个提示值, 只是提示, 不保证正确
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FSInfo {
    free_cluster_count: u32,
    next_free_cluster: u32,
}

impl Default for FSInfo {
    fn default() -> Self {
        Self {
            free_cluster_count: UNKNOWN,
            next_free_cluster: UNKNOWN,
        }
    }
}

impl FSInfo {
    /// 返回 None 只是代表不确定而已
    pub fn free_clusters(&self) -> Option<u32> {
        (self.free_cluster_count != UNKNOWN).then_some(self.free_cluster_count)
    }
    /// 返回 None 只是代表不确定而已
    pub fn next_free_cluster(&self) -> Option<u32> {
        (self.next_free_cluster != UNKNOWN).then_some(self.next_free_cluster)
    }
    pub fn set_next_free_cluster(&mut self, cluster: Option<u32>) {
        self.next_free_cluster = cluster.unwrap_or(UNKNOWN);
    }
    pub fn set_free_clusters(&mut self, count: Option<u32>) {
        self.free_cluster_count = count.unwrap_or(UNKNOWN);
    }
    /// 空闲簇数已知时才更新
    pub fn map_free_clusters(&mut self, f: impl FnOnce(u32) -> u32) {
        if let Some(n) = self.free_clusters() {
            self.free_cluster_count = f(n);
        }
    }
}

/// FSInfo 扇区: 记住它在哪, 签名是否合法, 内存里的提示有没有变过
#[derive(Debug, Copy, Clone)]
pub struct FSInfoSector {
    sector_id: u32,
    valid: bool,
    modified: bool,
    fsinfo: FSInfo,
}

impl FSInfoSector {
    const LEAD_SIGNATURE: u32 = 0x4161_5252;
    const STRUC_SIGNATURE: u32 = 0x6141_7272;
    const TRAIL_SIGNATURE: u32 = 0xAA55_0000;

    /// 签名不对时不报错, 提示值都当成未知
    pub fn read<D: BlockDevice>(
        driver: &mut SectorDriver<D>,
        sector_id: u32,
    ) -> Result<Self, FSError> {
        let sector = driver.view_locked(sector_id)?;
        let valid = sector.read::<u32>(LEAD_SIGNATURE_OFFSET)? == Self::LEAD_SIGNATURE
            && sector.read::<u32>(STRUC_SIGNATURE_OFFSET)? == Self::STRUC_SIGNATURE
            && sector.read::<u32>(TRAIL_SIGNATURE_OFFSET)? == Self::TRAIL_SIGNATURE;
        let fsinfo = if valid {
            FSInfo {
                free_cluster_count: sector.read(FREE_COUNT_OFFSET)?,
                next_free_cluster: sector.read(NEXT_FREE_OFFSET)?,
            }
        } else {
            warn!("invalid signature in FSInfo sector {}", sector_id);
            FSInfo::default()
        };
        Ok(Self {
            sector_id,
            valid,
            modified: false,
            fsinfo,
        })
    }
    pub fn sector_id(&self) -> u32 {
        self.sector_id
    }
    pub fn is_valid(&self) -> bool {
        self.valid
    }
    pub fn fsinfo(&self) -> FSInfo {
        self.fsinfo
    }
    /// 修改提示值, 之后 sync 才会写回
    pub fn update(&mut self, f: impl FnOnce(&mut FSInfo)) {
        let old = self.fsinfo;
        f(&mut self.fsinfo);
        if old != self.fsinfo {
            self.modified = true;
        }
    }
    /// 同步 FSINFO 回外存, 签名不合法的扇区不碰
    pub fn sync<D: BlockDevice>(&mut self, driver: &mut SectorDriver<D>) -> Result<(), FSError> {
        if !self.valid || !self.modified {
            return Ok(());
        }
        debug!(
            "sync fsinfo: free {:?}, next free {:?}",
            self.fsinfo.free_clusters(),
            self.fsinfo.next_free_cluster()
        );
        driver.write(
            self.sector_id,
            FREE_COUNT_OFFSET,
            self.fsinfo.free_cluster_count,
        )?;
        driver.write(
            self.sector_id,
            NEXT_FREE_OFFSET,
            self.fsinfo.next_free_cluster,
        )?;
        self.modified = false;
        Ok(())
    }
}
