// 顺序读文件
use super::{BlockDevice, FATAreaList, FSError, LongEntry, Volume};
use crate::config::SECTOR_SIZE;
use log::warn;

#[derive(Debug, Copy, Clone)]
pub struct File {
    list: FATAreaList,
    offset: usize, // 当前扇区内的偏移
    size: u32,
    remaining: u32,
}

impl File {
    pub fn new(first_cluster: u32, size: u32) -> Self {
        Self {
            list: FATAreaList::new(first_cluster),
            offset: 0,
            size,
            remaining: size,
        }
    }
    pub fn from_entry(entry: &LongEntry) -> Self {
        Self::new(entry.info.start_cluster, entry.info.size)
    }
    pub fn size(&self) -> u32 {
        self.size
    }
    pub fn position(&self) -> u32 {
        self.size - self.remaining
    }
    /// 读完了, 或者簇链比文件大小短
    pub fn is_eof(&self) -> bool {
        self.remaining == 0 || self.list.is_end_of_sectors()
    }
    /// 回到文件开头, 不重新分配任何东西
    pub fn reset(&mut self) {
        self.list.rewind();
        self.offset = 0;
        self.remaining = self.size;
    }
    /// 返回读到的字节数, 文件末尾返回 0.
    /// 读了一部分之后出错返回已读的字节数, 错误留到下一次调用
    pub fn read<D: BlockDevice>(
        &mut self,
        volume: &mut Volume<D>,
        buf: &mut [u8],
    ) -> Result<usize, FSError> {
        let mut n = 0;
        match self.read_into(volume, buf, &mut n) {
            Ok(()) => Ok(n),
            Err(e) if n > 0 => {
                warn!("short read of {} bytes: {}", n, e);
                Ok(n)
            }
            Err(e) => Err(e),
        }
    }
    fn read_into<D: BlockDevice>(
        &mut self,
        volume: &mut Volume<D>,
        buf: &mut [u8],
        n: &mut usize,
    ) -> Result<(), FSError> {
        while *n < buf.len() && self.remaining > 0 {
            if self.offset == SECTOR_SIZE {
                if !self.list.next_sector(volume)? {
                    break;
                }
                self.offset = 0;
            }
            if self.list.is_end_of_sectors() {
                break;
            }
            let sector_id = self.list.sector_number(volume)?;
            let len = (buf.len() - *n)
                .min(self.remaining as usize)
                .min(SECTOR_SIZE - self.offset);
            let read = volume
                .driver()
                .read_bytes(sector_id, self.offset, &mut buf[*n..*n + len])?;
            *n += read;
            self.offset += read;
            self.remaining -= read as u32;
        }
        Ok(())
    }
}
