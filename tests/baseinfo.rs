mod common;

use common::*;
use minifat::{FSError, MemoryDevice, Volume, START_CLUS_ID};

#[test]
fn check_geometry() {
    let spec = ImageSpec::default();
    let mut image = format(&spec);
    let volume = mount(&mut image);
    assert_eq!(volume.bytes_per_sector(), 512);
    assert_eq!(volume.sectors_per_cluster(), 1);
    assert_eq!(volume.reserved_sectors(), RESERVED_SECTORS);
    assert_eq!(volume.fats_number(), 2);
    assert!(volume.is_fat_mirrored());
    assert_eq!(volume.sectors_per_fat(), spec.fat_sectors());
    assert_eq!(volume.fat_area_first_sector(), RESERVED_SECTORS);
    assert_eq!(
        volume.data_area_first_sector(),
        volume.reserved_sectors() + volume.sectors_per_fat() * u32::from(volume.fats_number())
    );
    assert_eq!(
        volume.first_sector_of_cluster(START_CLUS_ID).unwrap(),
        volume.data_area_first_sector()
    );
    assert_eq!(volume.total_clusters(), spec.clusters);
    assert_eq!(volume.root_directory_first_cluster(), ROOT_CLUSTER);
}

#[test]
fn check_geometry_with_larger_clusters() {
    let spec = ImageSpec {
        sectors_per_cluster: 4,
        clusters: 300,
        ..ImageSpec::default()
    };
    let mut image = format(&spec);
    let volume = mount(&mut image);
    let data = volume.data_area_first_sector();
    assert_eq!(data, spec.data_first_sector());
    for cluster in [2, 3, 10, 301] {
        assert_eq!(
            volume.first_sector_of_cluster(cluster).unwrap(),
            data + (cluster - 2) * 4
        );
    }
    assert_eq!(
        volume.first_sector_of_cluster(302),
        Err(FSError::InvalidCluster(302))
    );
    assert_eq!(
        volume.first_sector_of_cluster(1),
        Err(FSError::InvalidCluster(1))
    );
}

#[test]
fn check_boot_sector_fields() {
    let mut image = default_image();
    let volume = mount(&mut image);
    let bpb = volume.bpb();
    assert_eq!(bpb.oem_name(), b"MSWIN4.1");
    assert_eq!(bpb.media(), 0xF8);
    assert_eq!(bpb.volume_id(), Some(0x1234_5678));
    assert_eq!(bpb.volume_label(), Some(b"MINIFAT    "));
    assert_eq!(bpb.fs_type_label(), b"FAT32   ");
    assert_eq!(bpb.backup_boot_sector(), BACKUP_BOOT_SECTOR);
    assert_eq!(bpb.fsinfo_sector(), FSINFO_SECTOR);
    assert_eq!(bpb.fat_entries_per_sector(), 128);
    assert_eq!(bpb.signature(), 0xAA55);
}

#[test]
fn check_fsinfo() {
    let spec = ImageSpec::default();
    let mut image = format(&spec);
    let volume = mount(&mut image);
    let fsinfo = volume.fsinfo();
    assert_eq!(fsinfo.free_clusters(), Some(spec.clusters - 1));
    assert_eq!(fsinfo.next_free_cluster(), Some(ROOT_CLUSTER + 1));
}

#[test]
fn invalid_fsinfo_is_tolerated() {
    let mut image = default_image();
    image[FSINFO_SECTOR as usize * BLOCK_SZ] = 0;
    let volume = mount(&mut image);
    assert_eq!(volume.fsinfo().free_clusters(), None);
    assert_eq!(volume.fsinfo().next_free_cluster(), None);
}

#[test]
fn open_partition_through_mbr() {
    let spec = ImageSpec {
        partition_start: Some(PARTITION_START),
        ..ImageSpec::default()
    };
    let mut image = format(&spec);
    let volume = Volume::open_partition(MemoryDevice::new(&mut image), 0).unwrap();
    assert_eq!(volume.first_sector(), PARTITION_START);
    assert_eq!(volume.fat_area_first_sector(), PARTITION_START + RESERVED_SECTORS);
    assert_eq!(volume.data_area_first_sector(), spec.data_first_sector());
    assert_eq!(volume.total_clusters(), spec.clusters);
}

#[test]
fn open_partition_rejects_other_partitions() {
    let spec = ImageSpec {
        partition_start: Some(PARTITION_START),
        ..ImageSpec::default()
    };
    let mut image = format(&spec);
    let result = Volume::open_partition(MemoryDevice::new(&mut image), 1);
    assert!(matches!(result, Err(FSError::NoFat32Partition)));

    let mut image = format(&spec);
    image[446 + 4] = 0x07;
    let result = Volume::open_partition(MemoryDevice::new(&mut image), 0);
    assert!(matches!(result, Err(FSError::NoFat32Partition)));
}

#[test]
fn open_partition_without_mbr() {
    let mut image = default_image();
    // 没有分区表, 0 号扇区是引导扇区, 分区表位置上是 0
    {
        let result = Volume::open_partition(MemoryDevice::new(&mut image), 0);
        assert!(matches!(result, Err(FSError::NoFat32Partition)));
    }
    image[510] = 0;
    let result = Volume::open_partition(MemoryDevice::new(&mut image), 0);
    assert!(matches!(result, Err(FSError::InvalidMbr)));
}

#[test]
fn reject_bad_signature() {
    let mut image = default_image();
    image[510] = 0;
    let result = Volume::new(MemoryDevice::new(&mut image), 0);
    assert!(matches!(result, Err(FSError::InvalidBootSector)));
}

#[test]
fn reject_non_fat32() {
    let mut image = default_image();
    // root_entries != 0
    image[17] = 0x00;
    image[18] = 0x02;
    let result = Volume::new(MemoryDevice::new(&mut image), 0);
    assert!(matches!(result, Err(FSError::NotFat32)));

    let mut image = default_image();
    // sectors_per_fat_16 != 0
    image[22] = 9;
    let result = Volume::new(MemoryDevice::new(&mut image), 0);
    assert!(matches!(result, Err(FSError::NotFat32)));
}

#[test]
fn reject_bad_geometry() {
    let mut image = default_image();
    // 1024 字节的扇区放不进扇区缓冲区
    image[11..13].copy_from_slice(&1024u16.to_le_bytes());
    let result = Volume::new(MemoryDevice::new(&mut image), 0);
    assert!(matches!(result, Err(FSError::InvalidBootSector)));

    let mut image = default_image();
    image[13] = 3;
    let result = Volume::new(MemoryDevice::new(&mut image), 0);
    assert!(matches!(result, Err(FSError::InvalidBootSector)));

    let mut image = default_image();
    image[16] = 0;
    let result = Volume::new(MemoryDevice::new(&mut image), 0);
    assert!(matches!(result, Err(FSError::InvalidBootSector)));

    let mut image = default_image();
    image[32..36].copy_from_slice(&0u32.to_le_bytes());
    let result = Volume::new(MemoryDevice::new(&mut image), 0);
    assert!(matches!(result, Err(FSError::InvalidBootSector)));
}

#[test]
fn reject_fat_smaller_than_data_area() {
    let mut image = default_image();
    // 一个扇区的 FAT 只有 128 项, 数据区却有上千个簇
    image[36..40].copy_from_slice(&1u32.to_le_bytes());
    let before = image.clone();
    {
        let result = Volume::new(MemoryDevice::new(&mut image), 0);
        assert!(matches!(result, Err(FSError::InvalidBootSector)));
    }
    assert!(image == before);
}

#[test]
fn reject_short_device() {
    let mut image = vec![0u8; 100];
    let result = Volume::new(MemoryDevice::new(&mut image), 0);
    assert!(matches!(result, Err(FSError::Device(_))));
}
