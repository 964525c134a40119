/// 扇区缓存层: 整个文件系统只有这一个扇区缓冲区
use super::BlockDevice;
use crate::config::SECTOR_SIZE;
use crate::error::FSError;
use core::ops::Deref;
use log::{error, trace};

/// 扇区里按小端序存放的整数, 与主机字节序无关
pub trait SectorValue: Sized + Copy {
    const SIZE: usize;
    fn from_le(bytes: &[u8]) -> Self;
    fn write_le(self, bytes: &mut [u8]);
}

macro_rules! impl_sector_value {
    ($($t:ty),*) => {
        $(
            impl SectorValue for $t {
                const SIZE: usize = core::mem::size_of::<$t>();
                fn from_le(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; core::mem::size_of::<$t>()];
                    raw.copy_from_slice(&bytes[..Self::SIZE]);
                    <$t>::from_le_bytes(raw)
                }
                fn write_le(self, bytes: &mut [u8]) {
                    bytes[..Self::SIZE].copy_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_sector_value!(u8, u16, u32);

pub struct SectorDriver<D: BlockDevice> {
    cache: [u8; SECTOR_SIZE],
    sector_id: Option<u32>, // 当前缓冲区里是哪个扇区
    modified: bool,
    locked: bool,
    block_dev: D,
}

impl<D: BlockDevice> SectorDriver<D> {
    pub fn new(block_dev: D) -> Self {
        Self {
            cache: [0; SECTOR_SIZE],
            sector_id: None,
            modified: false,
            locked: false,
            block_dev,
        }
    }
    pub fn device(&self) -> &D {
        &self.block_dev
    }
    pub fn sector_id(&self) -> Option<u32> {
        self.sector_id
    }
    pub fn is_modified(&self) -> bool {
        self.modified
    }
    pub fn is_locked(&self) -> bool {
        self.locked
    }
    /// 冻结当前扇区, 在 unlock 之前任何访问都会失败
    pub fn lock(&mut self) -> Result<(), FSError> {
        if self.locked {
            error!("locking an already locked sector");
            return Err(FSError::SectorLocked);
        }
        self.locked = true;
        Ok(())
    }
    pub fn unlock(&mut self) {
        self.locked = false;
    }
    /// 把 sector_id 装进缓冲区, 换出之前先把脏扇区写回
    fn load(&mut self, sector_id: u32) -> Result<(), FSError> {
        if self.locked {
            error!(
                "trying to access sector {} while sector {:?} is locked",
                sector_id, self.sector_id
            );
            return Err(FSError::SectorLocked);
        }
        if self.sector_id != Some(sector_id) {
            self.sync()?;
            trace!("read_block({})", sector_id);
            if let Err(e) = self.block_dev.read_block(sector_id, &mut self.cache) {
                self.sector_id = None;
                return Err(e.into());
            }
            self.sector_id = Some(sector_id);
        }
        Ok(())
    }
    fn check_range(offset: usize, len: usize) -> Result<(), FSError> {
        match offset.checked_add(len) {
            Some(end) if end <= SECTOR_SIZE => Ok(()),
            _ => Err(FSError::OutOfRange),
        }
    }
    pub fn read<T: SectorValue>(&mut self, sector_id: u32, offset: usize) -> Result<T, FSError> {
        Self::check_range(offset, T::SIZE)?;
        self.load(sector_id)?;
        Ok(T::from_le(&self.cache[offset..]))
    }
    pub fn write<T: SectorValue>(
        &mut self,
        sector_id: u32,
        offset: usize,
        value: T,
    ) -> Result<(), FSError> {
        Self::check_range(offset, T::SIZE)?;
        self.load(sector_id)?;
        value.write_le(&mut self.cache[offset..]);
        self.modified = true;
        Ok(())
    }
    /// buf[..n] = sector[offset..offset + n], 返回 n (扇区剩余不够时 n < buf.len())
    pub fn read_bytes(
        &mut self,
        sector_id: u32,
        offset: usize,
        buf: &mut [u8],
    ) -> Result<usize, FSError> {
        Self::check_range(offset, 0)?;
        self.load(sector_id)?;
        let n = buf.len().min(SECTOR_SIZE - offset);
        buf[..n].copy_from_slice(&self.cache[offset..offset + n]);
        Ok(n)
    }
    pub fn write_bytes(
        &mut self,
        sector_id: u32,
        offset: usize,
        buf: &[u8],
    ) -> Result<usize, FSError> {
        Self::check_range(offset, 0)?;
        self.load(sector_id)?;
        let n = buf.len().min(SECTOR_SIZE - offset);
        self.cache[offset..offset + n].copy_from_slice(&buf[..n]);
        self.modified = true;
        Ok(n)
    }
    /// 锁住扇区并返回它的视图, 视图 drop 时自动解锁
    pub fn view_locked(&mut self, sector_id: u32) -> Result<SectorLock<'_, D>, FSError> {
        self.load(sector_id)?;
        self.lock()?;
        Ok(SectorLock { driver: self })
    }
    fn sync(&mut self) -> Result<(), FSError> {
        if let (true, Some(id)) = (self.modified, self.sector_id) {
            trace!("write_block({})", id);
            self.block_dev.write_block(id, &self.cache)?;
            self.modified = false;
        }
        Ok(())
    }
    pub fn flush(&mut self) -> Result<(), FSError> {
        self.sync()
    }
    /// 用 value 填满 [first, first + n) 这些扇区, 返回实际写入的扇区数.
    /// 新建目录时簇必须全是 0x00
    pub fn fill_n(&mut self, first: u32, n: u32, value: u8) -> Result<u32, FSError> {
        if self.locked {
            error!("fill_n while sector {:?} is locked", self.sector_id);
            return Err(FSError::SectorLocked);
        }
        if n == 0 {
            return Ok(0);
        }
        self.sync()?;
        self.cache.fill(value);
        self.sector_id = None;
        for i in 0..n {
            trace!("write_block({})", first + i);
            self.block_dev.write_block(first + i, &self.cache)?;
            self.sector_id = Some(first + i);
        }
        Ok(n)
    }
}

impl<D: BlockDevice> Drop for SectorDriver<D> {
    fn drop(&mut self) {
        if let Err(e) = self.sync() {
            error!("sector {:?} lost on drop: {}", self.sector_id, e);
        }
    }
}

/// 被锁住的扇区
pub struct SectorLock<'a, D: BlockDevice> {
    driver: &'a mut SectorDriver<D>,
}

impl<D: BlockDevice> SectorLock<'_, D> {
    pub fn sector_id(&self) -> u32 {
        // load 成功之后才会构造 SectorLock
        self.driver.sector_id.unwrap_or_default()
    }
    pub fn read<T: SectorValue>(&self, offset: usize) -> Result<T, FSError> {
        SectorDriver::<D>::check_range(offset, T::SIZE)?;
        Ok(T::from_le(&self.driver.cache[offset..offset + T::SIZE]))
    }
    /// 可写视图, 扇区被标记为已修改
    pub fn bytes_mut(&mut self) -> &mut [u8; SECTOR_SIZE] {
        self.driver.modified = true;
        &mut self.driver.cache
    }
}

impl<D: BlockDevice> Deref for SectorLock<'_, D> {
    type Target = [u8; SECTOR_SIZE];
    fn deref(&self) -> &Self::Target {
        &self.driver.cache
    }
}

impl<D: BlockDevice> Drop for SectorLock<'_, D> {
    fn drop(&mut self) {
        self.driver.unlock();
    }
}
