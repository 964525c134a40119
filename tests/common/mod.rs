// 在内存里格式化 FAT32 镜像
#![allow(dead_code)]

use minifat::{BlockDevice, FATAreaList, IOError, MemoryDevice, Volume};
use std::cell::Cell;

pub const BLOCK_SZ: usize = 512;
pub const RESERVED_SECTORS: u32 = 32;
pub const FSINFO_SECTOR: u32 = 1;
pub const BACKUP_BOOT_SECTOR: u32 = 6;
pub const ROOT_CLUSTER: u32 = 2;
pub const PARTITION_START: u32 = 64;

#[derive(Copy, Clone, Debug)]
pub struct ImageSpec {
    pub partition_start: Option<u32>,
    pub sectors_per_cluster: u8,
    pub clusters: u32,
    pub fats: u8,
    pub mirrored: bool,
    pub active_fat: u8,
}

impl Default for ImageSpec {
    fn default() -> Self {
        Self {
            partition_start: None,
            sectors_per_cluster: 1,
            clusters: 1000,
            fats: 2,
            mirrored: true,
            active_fat: 0,
        }
    }
}

impl ImageSpec {
    pub fn first_sector(&self) -> u32 {
        self.partition_start.unwrap_or(0)
    }
    pub fn fat_sectors(&self) -> u32 {
        ((self.clusters + 2) * 4 + BLOCK_SZ as u32 - 1) / BLOCK_SZ as u32
    }
    pub fn data_first_sector(&self) -> u32 {
        self.first_sector() + RESERVED_SECTORS + self.fat_sectors() * u32::from(self.fats)
    }
    pub fn total_sectors(&self) -> u32 {
        RESERVED_SECTORS
            + self.fat_sectors() * u32::from(self.fats)
            + self.clusters * u32::from(self.sectors_per_cluster)
    }
    /// 第 fat 份 FAT 在设备上的第一个扇区
    pub fn fat_first_sector(&self, fat: u8) -> u32 {
        self.first_sector() + RESERVED_SECTORS + self.fat_sectors() * u32::from(fat)
    }
}

fn put16(image: &mut [u8], at: usize, value: u16) {
    image[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

fn put32(image: &mut [u8], at: usize, value: u32) {
    image[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

pub fn boot_sector(spec: &ImageSpec) -> [u8; BLOCK_SZ] {
    let mut raw = [0u8; BLOCK_SZ];
    raw[..3].copy_from_slice(&[0xEB, 0x58, 0x90]);
    raw[3..11].copy_from_slice(b"MSWIN4.1");
    put16(&mut raw, 11, BLOCK_SZ as u16);
    raw[13] = spec.sectors_per_cluster;
    put16(&mut raw, 14, RESERVED_SECTORS as u16);
    raw[16] = spec.fats;
    raw[21] = 0xF8;
    put16(&mut raw, 24, 63);
    put16(&mut raw, 26, 255);
    put32(&mut raw, 28, spec.first_sector());
    put32(&mut raw, 32, spec.total_sectors());
    put32(&mut raw, 36, spec.fat_sectors());
    let ext_flags = if spec.mirrored {
        0
    } else {
        0x0080 | u16::from(spec.active_fat)
    };
    put16(&mut raw, 40, ext_flags);
    put32(&mut raw, 44, ROOT_CLUSTER);
    put16(&mut raw, 48, FSINFO_SECTOR as u16);
    put16(&mut raw, 50, BACKUP_BOOT_SECTOR as u16);
    raw[64] = 0x80;
    raw[66] = 0x29;
    put32(&mut raw, 67, 0x1234_5678);
    raw[71..82].copy_from_slice(b"MINIFAT    ");
    raw[82..90].copy_from_slice(b"FAT32   ");
    raw[510] = 0x55;
    raw[511] = 0xAA;
    raw
}

/// MBR (可选) + 引导扇区 + 备份 + FSInfo + FAT + 全零的数据区, 根目录占簇 2
pub fn format(spec: &ImageSpec) -> Vec<u8> {
    let base = spec.first_sector() as usize * BLOCK_SZ;
    let mut image = vec![0u8; base + spec.total_sectors() as usize * BLOCK_SZ];
    if let Some(start) = spec.partition_start {
        let entry = 446;
        image[entry] = 0x80;
        image[entry + 4] = 0x0C;
        put32(&mut image, entry + 8, start);
        put32(&mut image, entry + 12, spec.total_sectors());
        image[510] = 0x55;
        image[511] = 0xAA;
    }
    let boot = boot_sector(spec);
    image[base..base + BLOCK_SZ].copy_from_slice(&boot);
    let backup = base + BACKUP_BOOT_SECTOR as usize * BLOCK_SZ;
    image[backup..backup + BLOCK_SZ].copy_from_slice(&boot);

    let fsinfo = base + FSINFO_SECTOR as usize * BLOCK_SZ;
    put32(&mut image, fsinfo, 0x4161_5252);
    put32(&mut image, fsinfo + 484, 0x6141_7272);
    put32(&mut image, fsinfo + 488, spec.clusters - 1);
    put32(&mut image, fsinfo + 492, ROOT_CLUSTER + 1);
    put32(&mut image, fsinfo + 508, 0xAA55_0000);

    for fat in 0..spec.fats {
        let at = spec.fat_first_sector(fat) as usize * BLOCK_SZ;
        put32(&mut image, at, 0x0FFF_FFF8);
        put32(&mut image, at + 4, 0x0FFF_FFFF);
        put32(&mut image, at + 8, 0x0FFF_FFFF);
    }
    image
}

pub fn default_image() -> Vec<u8> {
    format(&ImageSpec::default())
}

pub fn mount(image: &mut [u8]) -> Volume<MemoryDevice<'_>> {
    Volume::new(MemoryDevice::new(image), 0).expect("mount failed")
}

/// 直接从镜像里读 FAT 表项
pub fn raw_fat_entry(image: &[u8], spec: &ImageSpec, fat: u8, cluster: u32) -> u32 {
    let at = spec.fat_first_sector(fat) as usize * BLOCK_SZ + cluster as usize * 4;
    u32::from_le_bytes([image[at], image[at + 1], image[at + 2], image[at + 3]])
}

pub fn set_raw_fat_entry(image: &mut [u8], spec: &ImageSpec, fat: u8, cluster: u32, value: u32) {
    let at = spec.fat_first_sector(fat) as usize * BLOCK_SZ + cluster as usize * 4;
    put32(image, at, value);
}

/// 分配一条刚好装下 data 的簇链并写入, 返回链头
pub fn write_chain<D: BlockDevice>(volume: &mut Volume<D>, data: &[u8]) -> u32 {
    let mut list = FATAreaList::new(0);
    for (i, chunk) in data.chunks(BLOCK_SZ).enumerate() {
        if i == 0 || !list.next_sector(volume).unwrap() {
            list.push_back_cluster(volume).unwrap();
        }
        let sector = list.sector_number(volume).unwrap();
        volume.driver().write_bytes(sector, 0, chunk).unwrap();
    }
    list.first_cluster()
}

pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// 可以让某个块读或写失败的设备
pub struct FlakyDevice<'a> {
    inner: MemoryDevice<'a>,
    failing_block: Cell<Option<u32>>,
    failing_write: Cell<Option<u32>>,
}

impl<'a> FlakyDevice<'a> {
    pub fn new(image: &'a mut [u8]) -> Self {
        Self {
            inner: MemoryDevice::new(image),
            failing_block: Cell::new(None),
            failing_write: Cell::new(None),
        }
    }
    pub fn fail_reads_of(&self, block_id: Option<u32>) {
        self.failing_block.set(block_id);
    }
    pub fn fail_writes_of(&self, block_id: Option<u32>) {
        self.failing_write.set(block_id);
    }
}

impl BlockDevice for FlakyDevice<'_> {
    fn read_block(&self, block_id: u32, buf: &mut [u8]) -> Result<(), IOError> {
        if self.failing_block.get() == Some(block_id) {
            return Err(IOError::Read);
        }
        self.inner.read_block(block_id, buf)
    }
    fn write_block(&self, block_id: u32, buf: &[u8]) -> Result<(), IOError> {
        if self.failing_write.get() == Some(block_id) {
            return Err(IOError::Write);
        }
        self.inner.write_block(block_id, buf)
    }
}
