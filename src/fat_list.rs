// 簇链上的游标, 把簇链看成一串扇区
use super::{BlockDevice, FSError, Volume};

#[derive(Debug, Copy, Clone)]
pub struct FATAreaList {
    first_cluster: u32,
    cluster: u32,
    local_sector: u32, // 簇内第几个扇区
    end_of_sectors: bool,
}

impl FATAreaList {
    /// first_cluster 为 0 表示空链 (还没分配簇的空文件)
    pub fn new(first_cluster: u32) -> Self {
        Self {
            first_cluster,
            cluster: first_cluster,
            local_sector: 0,
            end_of_sectors: first_cluster == 0,
        }
    }
    pub fn first_cluster(&self) -> u32 {
        self.first_cluster
    }
    pub fn cluster(&self) -> u32 {
        self.cluster
    }
    pub fn local_sector(&self) -> u32 {
        self.local_sector
    }
    pub fn is_end_of_sectors(&self) -> bool {
        self.end_of_sectors
    }
    pub fn rewind(&mut self) {
        *self = Self::new(self.first_cluster);
    }
    /// 游标所在扇区的绝对扇区号
    pub fn sector_number<D: BlockDevice>(&self, volume: &Volume<D>) -> Result<u32, FSError> {
        if self.end_of_sectors {
            return Err(FSError::EndOfArray);
        }
        volume.data_area().sector_of(self.cluster, self.local_sector)
    }
    /// 跳到下一个簇的第一个扇区, 已经是链尾时返回 false
    pub fn next_cluster<D: BlockDevice>(&mut self, volume: &mut Volume<D>) -> Result<bool, FSError> {
        if self.end_of_sectors {
            return Ok(false);
        }
        match volume.fat_area().next_cluster(self.cluster)? {
            Some(next) => {
                self.cluster = next;
                self.local_sector = 0;
                Ok(true)
            }
            None => {
                self.end_of_sectors = true;
                Ok(false)
            }
        }
    }
    /// 簇内还有扇区就留在簇内, 否则查 FAT
    pub fn next_sector<D: BlockDevice>(&mut self, volume: &mut Volume<D>) -> Result<bool, FSError> {
        if self.end_of_sectors {
            return Ok(false);
        }
        if self.local_sector + 1 < volume.sectors_per_cluster() {
            self.local_sector += 1;
            return Ok(true);
        }
        self.next_cluster(volume)
    }
    /// 在链尾追加一个簇, 游标停在新簇的第一个扇区, 返回新簇号.
    /// 空链会先建一条新链
    pub fn push_back_cluster<D: BlockDevice>(
        &mut self,
        volume: &mut Volume<D>,
    ) -> Result<u32, FSError> {
        let mut fat = volume.fat_area();
        let new_cluster = if self.first_cluster == 0 {
            let head = fat.new_list()?;
            self.first_cluster = head;
            head
        } else {
            let tail = fat.last_cluster(self.cluster)?;
            fat.push_back_cluster(tail)?
        };
        self.cluster = new_cluster;
        self.local_sector = 0;
        self.end_of_sectors = false;
        Ok(new_cluster)
    }
    /// 追加一个簇并把它写满 value, 目录要求新簇全为 0
    pub fn push_back_cluster_fill_with<D: BlockDevice>(
        &mut self,
        volume: &mut Volume<D>,
        value: u8,
    ) -> Result<u32, FSError> {
        let new_cluster = self.push_back_cluster(volume)?;
        let (data, driver) = volume.data_and_driver();
        data.fill_cluster(driver, new_cluster, value)?;
        Ok(new_cluster)
    }
}
