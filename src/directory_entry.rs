// 32 字节目录项的编解码
use bitflags::bitflags;

pub const DIRENT_SZ: usize = 32; // 目录项字节数
pub const DIR_ENTRY_DELETED_FLAG: u8 = 0xE5;
pub const DIR_ENTRY_NO_MORE: u8 = 0x00;
const DIR_ENTRY_KANJI_E5: u8 = 0x05; // 名字首字节真的是 0xE5 时存成 0x05
pub const SHORT_FILE_NAME_LEN: usize = 8;
pub const SHORT_FILE_EXT_LEN: usize = 3;
pub const SHORT_FILE_NAME_PADDING: u8 = b' ';
pub const SHORT_NAME_LEN: usize = SHORT_FILE_NAME_LEN + SHORT_FILE_EXT_LEN;
pub const LONG_NAME_LEN: usize = 13;
pub const LAST_LONG_ENTRY: u8 = 0x40;
const LONG_ORDER_MASK: u8 = 0x3F;
const START_YEAR: u16 = 1980;

// 长目录项里 13 个字符单元的字节偏移, 每个单元两个字节, 只用低字节
const LONG_NAME_CELLS: [usize; LONG_NAME_LEN] = [1, 3, 5, 7, 9, 14, 16, 18, 20, 22, 24, 28, 30];
const LONG_ATTRIBUTE_OFFSET: usize = 11;
const LONG_CHECKSUM_OFFSET: usize = 13;
const LONG_CLUSTER_OFFSET: usize = 26;

bitflags! {
    /// A FAT file attributes.
    /// 目录项 ATTRIBUTE 字节最高两位是保留不用的
    #[derive(Default)]
    pub struct FileAttributes: u8 {
        const READ_ONLY  = 0x01;
        const HIDDEN     = 0x02;
        const SYSTEM     = 0x04;
        const VOLUME_ID  = 0x08;
        const DIRECTORY  = 0x10;
        const ARCHIVE    = 0x20;    // 确定是否需要写回外存,在文件的创建,调整,重命名时需要置位
        const LONG_NAME  = Self::READ_ONLY.bits | Self::HIDDEN.bits
                        | Self::SYSTEM.bits | Self::VOLUME_ID.bits;
        const LONG_NAME_MASK = Self::READ_ONLY.bits | Self::HIDDEN.bits
                            | Self::SYSTEM.bits | Self::VOLUME_ID.bits
                            | Self::DIRECTORY.bits | Self::ARCHIVE.bits;
    }
}

fn le16(raw: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([raw[offset], raw[offset + 1]])
}

fn put16(raw: &mut [u8], offset: usize, value: u16) {
    raw[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

/// 日期: bits 0-4 日, 5-8 月, 9-15 年份减 1980
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct FatDate {
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

impl FatDate {
    pub fn new(year: u16, month: u8, day: u8) -> Self {
        Self { year, month, day }
    }
    pub fn from_raw(raw: u16) -> Self {
        Self {
            year: (raw >> 9) + START_YEAR,
            month: ((raw >> 5) & 0x0F) as u8,
            day: (raw & 0x1F) as u8,
        }
    }
    pub fn to_raw(&self) -> u16 {
        (self.year.saturating_sub(START_YEAR) << 9)
            | (u16::from(self.month & 0x0F) << 5)
            | u16::from(self.day & 0x1F)
    }
}

/// 时间: bits 0-4 秒数除以 2, 5-10 分, 11-15 时
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct FatTime {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl FatTime {
    pub fn new(hour: u8, minute: u8, second: u8) -> Self {
        Self {
            hour,
            minute,
            second,
        }
    }
    pub fn from_raw(raw: u16) -> Self {
        Self {
            hour: (raw >> 11) as u8,
            minute: ((raw >> 5) & 0x3F) as u8,
            second: ((raw & 0x1F) << 1) as u8, // 秒数需要*2
        }
    }
    pub fn to_raw(&self) -> u16 {
        (u16::from(self.hour & 0x1F) << 11)
            | (u16::from(self.minute & 0x3F) << 5)
            | u16::from((self.second / 2) & 0x1F)
    }
}

/// 短目录项里除名字之外的信息
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct EntryInfo {
    pub attribute: FileAttributes,
    pub creation_tenths: u8,
    pub creation_time: FatTime,
    pub creation_date: FatDate,
    pub last_access_date: FatDate,
    pub modification_time: FatTime,
    pub modification_date: FatDate,
    pub start_cluster: u32,
    pub size: u32, // 目录为 0
}

impl EntryInfo {
    pub fn new(attribute: FileAttributes, start_cluster: u32, size: u32) -> Self {
        Self {
            attribute,
            start_cluster,
            size,
            ..Self::default()
        }
    }
    /// 创建, 修改, 访问时间都设成同一个时刻
    pub fn stamped(mut self, date: FatDate, time: FatTime) -> Self {
        self.creation_date = date;
        self.creation_time = time;
        self.modification_date = date;
        self.modification_time = time;
        self.last_access_date = date;
        self
    }
    pub fn is_dir(&self) -> bool {
        self.attribute.contains(FileAttributes::DIRECTORY)
    }
    pub fn is_volume(&self) -> bool {
        self.attribute.contains(FileAttributes::VOLUME_ID)
    }
    pub fn is_file(&self) -> bool {
        (!self.is_dir()) && (!self.is_volume())
    }
}

/// 短目录项,也适用于当前目录项和上级目录项
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ShortDirectoryEntry {
    pub name: [u8; SHORT_NAME_LEN], // 8 + 3, 空格填充
    pub info: EntryInfo,
}

impl ShortDirectoryEntry {
    pub fn new(name: [u8; SHORT_NAME_LEN], info: EntryInfo) -> Self {
        Self { name, info }
    }
    /// "." 和 ".." 目录项
    pub fn dot(dots: usize, info: EntryInfo) -> Self {
        let mut name = [SHORT_FILE_NAME_PADDING; SHORT_NAME_LEN];
        name[..dots.min(2)].fill(b'.');
        Self { name, info }
    }
    pub fn parse(raw: &[u8]) -> Self {
        let mut name = [0u8; SHORT_NAME_LEN];
        name.copy_from_slice(&raw[..SHORT_NAME_LEN]);
        if name[0] == DIR_ENTRY_KANJI_E5 {
            name[0] = DIR_ENTRY_DELETED_FLAG;
        }
        let info = EntryInfo {
            attribute: FileAttributes::from_bits_truncate(raw[11]),
            creation_tenths: raw[13],
            creation_time: FatTime::from_raw(le16(raw, 14)),
            creation_date: FatDate::from_raw(le16(raw, 16)),
            last_access_date: FatDate::from_raw(le16(raw, 18)),
            modification_time: FatTime::from_raw(le16(raw, 22)),
            modification_date: FatDate::from_raw(le16(raw, 24)),
            start_cluster: (u32::from(le16(raw, 20)) << 16) | u32::from(le16(raw, 26)),
            size: u32::from_le_bytes([raw[28], raw[29], raw[30], raw[31]]),
        };
        Self { name, info }
    }
    pub fn write_to(&self, raw: &mut [u8]) {
        raw[..SHORT_NAME_LEN].copy_from_slice(&self.name);
        if raw[0] == DIR_ENTRY_DELETED_FLAG {
            raw[0] = DIR_ENTRY_KANJI_E5;
        }
        raw[11] = self.info.attribute.bits();
        raw[12] = 0;
        raw[13] = self.info.creation_tenths;
        put16(raw, 14, self.info.creation_time.to_raw());
        put16(raw, 16, self.info.creation_date.to_raw());
        put16(raw, 18, self.info.last_access_date.to_raw());
        put16(raw, 20, (self.info.start_cluster >> 16) as u16);
        put16(raw, 22, self.info.modification_time.to_raw());
        put16(raw, 24, self.info.modification_date.to_raw());
        put16(raw, 26, (self.info.start_cluster & 0xFFFF) as u16);
        raw[28..32].copy_from_slice(&self.info.size.to_le_bytes());
    }
    pub fn checksum(&self) -> u8 {
        checksum(&self.name)
    }
    pub fn is_dot(&self) -> bool {
        self.name[0] == b'.'
    }
    /// 写成 "NAME.EXT", 返回写入的长度
    pub fn format_name(&self, buf: &mut [u8]) -> usize {
        format_short_name(&self.name, buf)
    }
}

/// 短文件名校验和, 长目录项里每一项都存一份
pub fn checksum(short_name: &[u8; SHORT_NAME_LEN]) -> u8 {
    short_name.iter().fold(0u8, |sum, &b| {
        ((sum & 1) << 7).wrapping_add(sum >> 1).wrapping_add(b)
    })
}

/// 把 8.3 名字写成 "NAME.EXT", 缓冲区不够时截断
pub fn format_short_name(short_name: &[u8; SHORT_NAME_LEN], buf: &mut [u8]) -> usize {
    let base = &short_name[..SHORT_FILE_NAME_LEN];
    let ext = &short_name[SHORT_FILE_NAME_LEN..];
    let base_len = base
        .iter()
        .rposition(|&c| c != SHORT_FILE_NAME_PADDING)
        .map_or(0, |i| i + 1);
    let ext_len = ext
        .iter()
        .rposition(|&c| c != SHORT_FILE_NAME_PADDING)
        .map_or(0, |i| i + 1);
    let mut len = 0;
    let mut push = |c: u8| {
        if len < buf.len() {
            buf[len] = c;
            len += 1;
        }
    };
    base[..base_len].iter().for_each(|&c| push(c));
    if ext_len > 0 {
        push(b'.');
        ext[..ext_len].iter().for_each(|&c| push(c));
    }
    len
}

fn short_name_char(c: u8) -> u8 {
    match c.to_ascii_uppercase() {
        c @ (b'A'..=b'Z' | b'0'..=b'9') => c,
        c @ (b'$' | b'%' | b'\'' | b'-' | b'_' | b'@' | b'~' | b'`' | b'!' | b'(' | b')'
        | b'{' | b'}' | b'^' | b'#' | b'&') => c,
        _ => b'~',
    }
}

fn fill_short_part(part: &[u8], dst: &mut [u8]) {
    let cap = dst.len();
    if part.len() > cap {
        for (d, &c) in dst[..cap - 1].iter_mut().zip(part) {
            *d = short_name_char(c);
        }
        dst[cap - 1] = b'~';
    } else {
        for (d, &c) in dst.iter_mut().zip(part) {
            *d = short_name_char(c);
        }
    }
}

/// 由长名字生成 8.3 名字: 大写, 不允许的字符和截断处都换成 '~'.
/// 重名时不加数字后缀
pub fn short_name_from_long(name: &[u8]) -> [u8; SHORT_NAME_LEN] {
    let mut short = [SHORT_FILE_NAME_PADDING; SHORT_NAME_LEN];
    let (base, ext) = match name.iter().rposition(|&c| c == b'.') {
        Some(dot) => (&name[..dot], &name[dot + 1..]),
        None => (name, &name[name.len()..]),
    };
    if base.is_empty() {
        short[0] = b'~';
    } else {
        fill_short_part(base, &mut short[..SHORT_FILE_NAME_LEN]);
    }
    fill_short_part(ext, &mut short[SHORT_FILE_NAME_LEN..]);
    short
}

/// 长目录项, 一个长名字的 13 个字符
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct LongDirectoryEntry {
    order: u8, // 从1开始计数, 名字的最后一段或上 0x40
    chars: [u8; LONG_NAME_LEN],
    checksum: u8,
}

impl LongDirectoryEntry {
    /// fragment 最多 13 个字符
    pub fn new(order: u8, fragment: &[u8], checksum: u8) -> Self {
        let mut chars = [0u8; LONG_NAME_LEN];
        let len = fragment.len().min(LONG_NAME_LEN);
        chars[..len].copy_from_slice(&fragment[..len]);
        Self {
            order,
            chars,
            checksum,
        }
    }
    pub fn parse(raw: &[u8]) -> Self {
        let mut chars = [0u8; LONG_NAME_LEN];
        for (c, &offset) in chars.iter_mut().zip(LONG_NAME_CELLS.iter()) {
            *c = raw[offset];
            if *c == 0 {
                break;
            }
        }
        Self {
            order: raw[0],
            chars,
            checksum: raw[LONG_CHECKSUM_OFFSET],
        }
    }
    /// 名字结束后写一个 0x0000, 剩下的单元填 0xFFFF
    pub fn write_to(&self, raw: &mut [u8]) {
        raw[0] = self.order;
        raw[LONG_ATTRIBUTE_OFFSET] = FileAttributes::LONG_NAME.bits();
        raw[12] = 0;
        raw[LONG_CHECKSUM_OFFSET] = self.checksum;
        put16(raw, LONG_CLUSTER_OFFSET, 0);
        let len = self.name_len();
        for (i, &offset) in LONG_NAME_CELLS.iter().enumerate() {
            let cell = match i {
                i if i < len => u16::from(self.chars[i]),
                i if i == len => 0x0000,
                _ => 0xFFFF,
            };
            put16(raw, offset, cell);
        }
    }
    pub fn order(&self) -> u8 {
        self.order
    }
    /// 去掉 0x40 之后的序号
    pub fn sequence(&self) -> u8 {
        self.order & LONG_ORDER_MASK
    }
    pub fn is_last(&self) -> bool {
        (self.order & LAST_LONG_ENTRY) != 0
    }
    pub fn checksum(&self) -> u8 {
        self.checksum
    }
    pub fn name_len(&self) -> usize {
        self.chars
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(LONG_NAME_LEN)
    }
    pub fn name(&self) -> &[u8] {
        &self.chars[..self.name_len()]
    }
}

/// 一个 32 字节槽位解码之后的样子
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DirectoryEntry {
    /// 0xE5, 后面还有在用的目录项
    FreeAvailable,
    /// 0x00, 后面都没有在用的目录项了
    FreeNoMore,
    Info(ShortDirectoryEntry),
    Name(LongDirectoryEntry),
}

impl DirectoryEntry {
    pub fn decode(raw: &[u8]) -> Self {
        match raw[0] {
            DIR_ENTRY_NO_MORE => DirectoryEntry::FreeNoMore,
            DIR_ENTRY_DELETED_FLAG => DirectoryEntry::FreeAvailable,
            _ => {
                let attribute = FileAttributes::from_bits_truncate(raw[LONG_ATTRIBUTE_OFFSET]);
                if attribute & FileAttributes::LONG_NAME_MASK == FileAttributes::LONG_NAME {
                    DirectoryEntry::Name(LongDirectoryEntry::parse(raw))
                } else {
                    DirectoryEntry::Info(ShortDirectoryEntry::parse(raw))
                }
            }
        }
    }
    /// 空闲的槽位只改首字节
    pub fn encode(&self, raw: &mut [u8]) {
        match self {
            DirectoryEntry::FreeAvailable => raw[0] = DIR_ENTRY_DELETED_FLAG,
            DirectoryEntry::FreeNoMore => raw[0] = DIR_ENTRY_NO_MORE,
            DirectoryEntry::Info(entry) => entry.write_to(raw),
            DirectoryEntry::Name(entry) => entry.write_to(raw),
        }
    }
    pub fn is_free(&self) -> bool {
        matches!(
            self,
            DirectoryEntry::FreeAvailable | DirectoryEntry::FreeNoMore
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_of_known_names() {
        assert_eq!(checksum(b"README  TXT"), 0x73);
        assert_eq!(checksum(b"FOO     BAR"), 0x53);
    }

    #[test]
    fn short_names() {
        assert_eq!(&short_name_from_long(b"readme.txt"), b"README  TXT");
        assert_eq!(
            &short_name_from_long(b"a_name_of_exactly_thirteen"),
            b"A_NAME_~   "
        );
        assert_eq!(&short_name_from_long(b"archive.tar.gz"), b"ARCHIVE~GZ ");
        assert_eq!(&short_name_from_long(b"my file.html"), b"MY~FILE HT~");
        assert_eq!(&short_name_from_long(b".profile"), b"~       PR~");
    }

    #[test]
    fn format_short() {
        let mut buf = [0u8; 12];
        let n = format_short_name(b"README  TXT", &mut buf);
        assert_eq!(&buf[..n], b"README.TXT");
        let n = format_short_name(b"NOEXT      ", &mut buf);
        assert_eq!(&buf[..n], b"NOEXT");
        let mut small = [0u8; 4];
        let n = format_short_name(b"README  TXT", &mut small);
        assert_eq!(&small[..n], b"READ");
    }

    #[test]
    fn date_and_time_packing() {
        let date = FatDate::new(2024, 3, 15);
        assert_eq!(date.to_raw(), (44 << 9) | (3 << 5) | 15);
        assert_eq!(FatDate::from_raw(date.to_raw()), date);
        let time = FatTime::new(13, 45, 58);
        assert_eq!(time.to_raw(), (13 << 11) | (45 << 5) | 29);
        assert_eq!(FatTime::from_raw(time.to_raw()), time);
        // 奇数秒只能存到偶数秒
        assert_eq!(FatTime::from_raw(FatTime::new(0, 0, 7).to_raw()).second, 6);
    }

    #[test]
    fn long_entry_layout() {
        let mut raw = [0u8; DIRENT_SZ];
        let entry = LongDirectoryEntry::new(0x41, b"hello", 0x73);
        DirectoryEntry::Name(entry).encode(&mut raw);
        assert_eq!(raw[0], 0x41);
        assert_eq!(raw[11], 0x0F);
        assert_eq!(raw[13], 0x73);
        assert_eq!(&raw[1..11], &[b'h', 0, b'e', 0, b'l', 0, b'l', 0, b'o', 0]);
        // 0x0000 结束, 然后全是 0xFFFF
        assert_eq!(&raw[14..18], &[0, 0, 0xFF, 0xFF]);
        assert_eq!(&raw[28..32], &[0xFF; 4]);
        match DirectoryEntry::decode(&raw) {
            DirectoryEntry::Name(decoded) => {
                assert_eq!(decoded.name(), b"hello");
                assert_eq!(decoded.sequence(), 1);
                assert!(decoded.is_last());
                assert_eq!(decoded.checksum(), 0x73);
            }
            other => panic!("decoded as {:?}", other),
        }
    }

    #[test]
    fn short_entry_layout() {
        let info = EntryInfo::new(FileAttributes::ARCHIVE, 0x0012_3456, 1000)
            .stamped(FatDate::new(2000, 1, 2), FatTime::new(3, 4, 6));
        let entry = ShortDirectoryEntry::new(*b"README  TXT", info);
        let mut raw = [0u8; DIRENT_SZ];
        entry.write_to(&mut raw);
        assert_eq!(&raw[20..22], &[0x12, 0x00]);
        assert_eq!(&raw[26..28], &[0x56, 0x34]);
        assert_eq!(&raw[28..32], &1000u32.to_le_bytes());
        assert_eq!(DirectoryEntry::decode(&raw), DirectoryEntry::Info(entry));
    }

    #[test]
    fn free_slots() {
        let mut raw = [0u8; DIRENT_SZ];
        assert_eq!(DirectoryEntry::decode(&raw), DirectoryEntry::FreeNoMore);
        raw[0] = DIR_ENTRY_DELETED_FLAG;
        raw[11] = 0x0F;
        assert_eq!(DirectoryEntry::decode(&raw), DirectoryEntry::FreeAvailable);
        raw[0] = DIR_ENTRY_KANJI_E5;
        raw[11] = 0x20;
        match DirectoryEntry::decode(&raw) {
            DirectoryEntry::Info(entry) => assert_eq!(entry.name[0], 0xE5),
            other => panic!("decoded as {:?}", other),
        }
    }
}
