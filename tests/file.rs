mod common;

use common::*;
use minifat::{FSError, File, Volume};

fn read_all<D: minifat::BlockDevice>(
    volume: &mut Volume<D>,
    file: &mut File,
    step: usize,
) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = vec![0u8; step];
    loop {
        let n = file.read(volume, &mut buf).unwrap();
        if n == 0 {
            return out;
        }
        out.extend_from_slice(&buf[..n]);
    }
}

#[test]
fn read_in_small_chunks() {
    let mut image = default_image();
    let mut volume = mount(&mut image);
    let data = pattern(1300);
    let head = write_chain(&mut volume, &data);
    assert_eq!(volume.fat_area().chain_length(head).unwrap(), 3);

    let mut file = File::new(head, data.len() as u32);
    assert_eq!(read_all(&mut volume, &mut file, 100), data);
    assert!(file.is_eof());
    assert_eq!(file.position(), 1300);
    let mut buf = [0u8; 16];
    assert_eq!(file.read(&mut volume, &mut buf).unwrap(), 0);
    assert_eq!(file.read(&mut volume, &mut buf).unwrap(), 0);
}

#[test]
fn read_everything_at_once() {
    let spec = ImageSpec {
        sectors_per_cluster: 2,
        ..ImageSpec::default()
    };
    let mut image = format(&spec);
    let mut volume = mount(&mut image);
    let data = pattern(2500);
    let head = write_chain(&mut volume, &data);
    assert_eq!(volume.fat_area().chain_length(head).unwrap(), 3);

    let mut file = File::new(head, data.len() as u32);
    let mut buf = vec![0u8; 4096];
    assert_eq!(file.read(&mut volume, &mut buf).unwrap(), 2500);
    assert_eq!(&buf[..2500], &data[..]);
    assert_eq!(file.read(&mut volume, &mut buf).unwrap(), 0);
}

#[test]
fn size_bounds_the_chain() {
    let mut image = default_image();
    let mut volume = mount(&mut image);
    let data = pattern(1024);
    let head = write_chain(&mut volume, &data);
    let mut file = File::new(head, 10);
    assert_eq!(read_all(&mut volume, &mut file, 64), &data[..10]);

    // 簇链比文件大小短时, 读到链尾为止
    let mut file = File::new(head, 5000);
    assert_eq!(read_all(&mut volume, &mut file, 300), data);
    assert!(file.is_eof());
    assert_eq!(file.position(), 1024);
}

#[test]
fn empty_file() {
    let mut image = default_image();
    let mut volume = mount(&mut image);
    let mut file = File::new(0, 0);
    assert!(file.is_eof());
    let mut buf = [0u8; 8];
    assert_eq!(file.read(&mut volume, &mut buf).unwrap(), 0);
    assert_eq!(file.size(), 0);
}

#[test]
fn reset_rewinds() {
    let mut image = default_image();
    let mut volume = mount(&mut image);
    let data = pattern(700);
    let head = write_chain(&mut volume, &data);
    let mut file = File::new(head, 700);
    let mut buf = [0u8; 600];
    assert_eq!(file.read(&mut volume, &mut buf).unwrap(), 600);
    file.reset();
    assert_eq!(file.position(), 0);
    assert_eq!(read_all(&mut volume, &mut file, 512), data);
}

#[test]
fn short_read_on_device_error() {
    let mut image = default_image();
    let device = FlakyDevice::new(&mut image);
    let mut volume = Volume::new(&device, 0).unwrap();
    let data = pattern(1024);
    let head = write_chain(&mut volume, &data);
    volume.flush().unwrap();
    let second = volume.fat_area().next_cluster(head).unwrap().unwrap();
    let failing = volume.first_sector_of_cluster(second).unwrap();
    device.fail_reads_of(Some(failing));

    let mut file = File::new(head, 1024);
    let mut buf = [0u8; 1024];
    assert_eq!(file.read(&mut volume, &mut buf).unwrap(), 512);
    assert_eq!(&buf[..512], &data[..512]);
    assert!(matches!(
        file.read(&mut volume, &mut buf),
        Err(FSError::Device(_))
    ));
    device.fail_reads_of(None);
    assert_eq!(file.read(&mut volume, &mut buf).unwrap(), 512);
    assert_eq!(&buf[..512], &data[512..]);
    assert_eq!(file.read(&mut volume, &mut buf).unwrap(), 0);
}
