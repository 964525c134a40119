use crate::config::SECTOR_SIZE;
use crate::error::IOError;
use spin::Mutex;

pub trait BlockDevice {
    // read_block 中, buf 长度必须是 SECTOR_SIZE, 读不到就返回 IOError::Read,
    // 重试由设备自己决定, 文件系统这一层不会重试
    fn read_block(&self, block_id: u32, buf: &mut [u8]) -> Result<(), IOError>;
    fn write_block(&self, block_id: u32, buf: &[u8]) -> Result<(), IOError>;
}

impl<T: BlockDevice + ?Sized> BlockDevice for &T {
    fn read_block(&self, block_id: u32, buf: &mut [u8]) -> Result<(), IOError> {
        (**self).read_block(block_id, buf)
    }
    fn write_block(&self, block_id: u32, buf: &[u8]) -> Result<(), IOError> {
        (**self).write_block(block_id, buf)
    }
}

/// 用一段内存模拟块设备, 主机上的工具和测试都用它
pub struct MemoryDevice<'a> {
    data: Mutex<&'a mut [u8]>,
}

impl<'a> MemoryDevice<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        Self {
            data: Mutex::new(data),
        }
    }
    pub fn blocks(&self) -> u32 {
        (self.data.lock().len() / SECTOR_SIZE) as u32
    }
    /// 直接看某个块的内容
    pub fn read_raw<V>(&self, block_id: u32, f: impl FnOnce(&[u8]) -> V) -> V {
        let data = self.data.lock();
        let start = block_id as usize * SECTOR_SIZE;
        f(&data[start..start + SECTOR_SIZE])
    }
    fn range(&self, block_id: u32, len: usize) -> Option<(usize, usize)> {
        let start = (block_id as usize).checked_mul(SECTOR_SIZE)?;
        let end = start.checked_add(len)?;
        if len > SECTOR_SIZE || end > self.data.lock().len() {
            return None;
        }
        Some((start, end))
    }
}

impl BlockDevice for MemoryDevice<'_> {
    fn read_block(&self, block_id: u32, buf: &mut [u8]) -> Result<(), IOError> {
        let (start, end) = self.range(block_id, buf.len()).ok_or(IOError::Read)?;
        buf.copy_from_slice(&self.data.lock()[start..end]);
        Ok(())
    }
    fn write_block(&self, block_id: u32, buf: &[u8]) -> Result<(), IOError> {
        let (start, end) = self.range(block_id, buf.len()).ok_or(IOError::Write)?;
        self.data.lock()[start..end].copy_from_slice(buf);
        Ok(())
    }
}
