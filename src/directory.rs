// 目录: 簇链上的 32 字节目录项稀疏数组
use super::{
    BlockDevice, DirectoryEntry, EntryInfo, FATAreaList, FSError, FatDate, FatTime,
    FileAttributes, LongDirectoryEntry, ShortDirectoryEntry, Volume, DIRENT_SZ,
    DIR_ENTRY_DELETED_FLAG, DIR_ENTRY_NO_MORE, LAST_LONG_ENTRY, LONG_NAME_LEN, SHORT_NAME_LEN,
};
use crate::config::{LONG_NAME_MAX, MAX_LONG_NAME_ENTRIES, SECTOR_SIZE};
use crate::directory_entry::{checksum, format_short_name, short_name_from_long};
use log::{debug, error};

const ENTRIES_PER_SECTOR: u32 = (SECTOR_SIZE / DIRENT_SZ) as u32;

/// 目录项下标: 线性编号, 以及算物理位置要用的 (簇, 簇内编号)
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Index {
    entry: u32,
    cluster: u32,
    local: u32,
    end_of_array: bool,
}

impl Index {
    pub fn new(first_cluster: u32) -> Self {
        Self {
            entry: 0,
            cluster: first_cluster,
            local: 0,
            end_of_array: first_cluster == 0,
        }
    }
    pub fn entry(&self) -> u32 {
        self.entry
    }
    pub fn cluster(&self) -> u32 {
        self.cluster
    }
    pub fn local_entry(&self) -> u32 {
        self.local
    }
    pub fn is_end_of_array(&self) -> bool {
        self.end_of_array
    }
    /// 目录项所在的 (绝对扇区号, 扇区内偏移)
    pub fn position<D: BlockDevice>(&self, volume: &Volume<D>) -> Result<(u32, usize), FSError> {
        if self.end_of_array {
            return Err(FSError::EndOfArray);
        }
        let sector_id = volume
            .data_area()
            .sector_of(self.cluster, self.local / ENTRIES_PER_SECTOR)?;
        let offset = (self.local % ENTRIES_PER_SECTOR) as usize * DIRENT_SZ;
        Ok((sector_id, offset))
    }
    /// 走到下一个目录项, 簇链走完时置 end_of_array
    pub fn increment<D: BlockDevice>(&mut self, volume: &mut Volume<D>) -> Result<(), FSError> {
        if self.end_of_array {
            return Err(FSError::EndOfArray);
        }
        let entries_per_cluster = ENTRIES_PER_SECTOR * volume.sectors_per_cluster();
        if self.local + 1 < entries_per_cluster {
            self.local += 1;
        } else {
            match volume.fat_area().next_cluster(self.cluster)? {
                Some(next) => {
                    self.cluster = next;
                    self.local = 0;
                }
                None => self.end_of_array = true,
            }
        }
        self.entry += 1;
        Ok(())
    }
    /// 目录刚追加了簇 cluster, 从它的第一个目录项继续
    fn continue_into(&mut self, cluster: u32) {
        self.cluster = cluster;
        self.local = 0;
        self.end_of_array = false;
    }
}

/// 一个逻辑目录项: 短目录项加上它前面的长名字
#[derive(Debug, Copy, Clone)]
pub struct LongEntry {
    pub info: EntryInfo,
    pub short_name: [u8; SHORT_NAME_LEN],
    /// 写进名字缓冲区的字节数
    pub name_len: usize,
    /// 第一个槽位
    pub first: Index,
    /// 短目录项的槽位
    pub info_index: Index,
    /// 后面的第一个槽位
    pub next: Index,
}

impl LongEntry {
    pub fn is_dir(&self) -> bool {
        self.info.is_dir()
    }
    pub fn is_dot(&self) -> bool {
        self.short_name[0] == b'.'
    }
}

#[derive(Debug, Copy, Clone)]
pub struct Directory {
    first_cluster: u32,
}

impl Directory {
    pub fn new(first_cluster: u32) -> Self {
        Self { first_cluster }
    }
    pub fn root<D: BlockDevice>(volume: &Volume<D>) -> Self {
        Self::new(volume.root_directory_first_cluster())
    }
    pub fn first_cluster(&self) -> u32 {
        self.first_cluster
    }
    pub fn begin(&self) -> Index {
        Index::new(self.first_cluster)
    }
    pub fn cd(&mut self, cluster: u32) {
        self.first_cluster = cluster;
    }
    /// 进入子目录, ".." 里存的 0 表示根目录
    pub fn enter<D: BlockDevice>(
        &mut self,
        volume: &Volume<D>,
        entry: &LongEntry,
    ) -> Result<(), FSError> {
        if !entry.is_dir() {
            return Err(FSError::NotDirectory);
        }
        match entry.info.start_cluster {
            0 => self.cd(volume.root_directory_first_cluster()),
            cluster => self.cd(cluster),
        }
        Ok(())
    }

    pub fn read_short_entry<D: BlockDevice>(
        &self,
        volume: &mut Volume<D>,
        index: &Index,
    ) -> Result<DirectoryEntry, FSError> {
        let (sector_id, offset) = index.position(volume)?;
        let mut raw = [0u8; DIRENT_SZ];
        volume.driver().read_bytes(sector_id, offset, &mut raw)?;
        Ok(DirectoryEntry::decode(&raw))
    }
    fn write_short_entry<D: BlockDevice>(
        &self,
        volume: &mut Volume<D>,
        index: &Index,
        entry: &DirectoryEntry,
    ) -> Result<(), FSError> {
        let (sector_id, offset) = index.position(volume)?;
        let mut raw = [0u8; DIRENT_SZ];
        volume.driver().read_bytes(sector_id, offset, &mut raw)?;
        entry.encode(&mut raw);
        volume.driver().write_bytes(sector_id, offset, &raw)?;
        Ok(())
    }

    /// 从 start 开始读下一个逻辑目录项, 名字写进 name (放不下就截断).
    /// 目录结束时返回 None
    pub fn read_long_entry<D: BlockDevice>(
        &self,
        volume: &mut Volume<D>,
        start: Index,
        name: &mut [u8],
    ) -> Result<Option<LongEntry>, FSError> {
        let mut index = start;
        // 跳过删除了的槽位
        loop {
            if index.is_end_of_array() {
                return Ok(None);
            }
            match self.read_short_entry(volume, &index)? {
                DirectoryEntry::FreeAvailable => index.increment(volume)?,
                DirectoryEntry::FreeNoMore => return Ok(None),
                _ => break,
            }
        }
        let first = index;
        // (下一段的序号, 校验和)
        let mut expected: Option<(u8, u8)> = None;
        let mut name_len = 0;
        loop {
            if index.is_end_of_array() {
                error!("long entry at {} runs past the directory", first.entry);
                return Err(FSError::CorruptedLongEntry);
            }
            match self.read_short_entry(volume, &index)? {
                DirectoryEntry::Name(fragment) => {
                    let sequence = fragment.sequence();
                    let consistent = match expected {
                        None => {
                            name_len = (usize::from(sequence).max(1) - 1) * LONG_NAME_LEN
                                + fragment.name_len();
                            fragment.is_last()
                                && usize::from(sequence) <= MAX_LONG_NAME_ENTRIES
                        }
                        Some((want, sum)) => {
                            !fragment.is_last() && sequence == want && fragment.checksum() == sum
                        }
                    };
                    if !consistent || sequence == 0 {
                        error!(
                            "corrupted long entry at {}: order {:#04X}",
                            index.entry,
                            fragment.order()
                        );
                        return Err(FSError::CorruptedLongEntry);
                    }
                    let at = (usize::from(sequence) - 1) * LONG_NAME_LEN;
                    for (i, &c) in fragment.name().iter().enumerate() {
                        if let Some(dst) = name.get_mut(at + i) {
                            *dst = c;
                        }
                    }
                    expected = Some((sequence - 1, fragment.checksum()));
                    index.increment(volume)?;
                }
                DirectoryEntry::Info(short) => {
                    match expected {
                        Some((want, sum)) if want != 0 || short.checksum() != sum => {
                            error!("long entry at {} does not match its short entry", first.entry);
                            return Err(FSError::CorruptedLongEntry);
                        }
                        Some(_) => name_len = name_len.min(name.len()),
                        None => name_len = short.format_name(name),
                    }
                    let info_index = index;
                    index.increment(volume)?;
                    return Ok(Some(LongEntry {
                        info: short.info,
                        short_name: short.name,
                        name_len,
                        first,
                        info_index,
                        next: index,
                    }));
                }
                DirectoryEntry::FreeAvailable | DirectoryEntry::FreeNoMore => {
                    error!("long entry at {} interrupted by a free slot", first.entry);
                    return Err(FSError::CorruptedLongEntry);
                }
            }
        }
    }
    /// 只返回属性包含 attribute 的目录项 (ls 文件 / ls 目录)
    pub fn read_long_entry_with_attribute<D: BlockDevice>(
        &self,
        volume: &mut Volume<D>,
        start: Index,
        attribute: FileAttributes,
        name: &mut [u8],
    ) -> Result<Option<LongEntry>, FSError> {
        let mut index = start;
        while let Some(entry) = self.read_long_entry(volume, index, name)? {
            if entry.info.attribute.contains(attribute) {
                return Ok(Some(entry));
            }
            index = entry.next;
        }
        Ok(None)
    }

    /// 找 slots 个连续的同一种空闲槽位, 目录不够长就追加一个清零的簇
    pub fn find_first_free_long_entry<D: BlockDevice>(
        &self,
        volume: &mut Volume<D>,
        slots: u32,
    ) -> Result<Index, FSError> {
        let mut index = self.begin();
        let mut run_start = index;
        let mut run_len = 0;
        let mut run_kind = DirectoryEntry::FreeNoMore;
        loop {
            if index.is_end_of_array() {
                let mut list = FATAreaList::new(index.cluster());
                let cluster = list.push_back_cluster_fill_with(volume, 0)?;
                debug!("directory {} grows by cluster {}", self.first_cluster, cluster);
                index.continue_into(cluster);
            }
            let entry = self.read_short_entry(volume, &index)?;
            if entry.is_free() {
                if run_len > 0 && entry == run_kind {
                    run_len += 1;
                } else {
                    run_start = index;
                    run_len = 1;
                    run_kind = entry;
                }
                if run_len >= slots {
                    return Ok(run_start);
                }
            } else {
                run_len = 0;
            }
            index.increment(volume)?;
        }
    }

    /// 写一个长名字加短目录项, 返回短目录项的下标
    pub fn new_long_entry<D: BlockDevice>(
        &self,
        volume: &mut Volume<D>,
        info: &EntryInfo,
        name: &[u8],
    ) -> Result<Index, FSError> {
        if name.is_empty() || !name.iter().all(|&c| c.is_ascii() && c != 0 && c != b'/') {
            return Err(FSError::InvalidName);
        }
        if name.len() > LONG_NAME_MAX {
            return Err(FSError::NameTooLong);
        }
        let fragments = (name.len() + LONG_NAME_LEN - 1) / LONG_NAME_LEN;
        let short_name = short_name_from_long(name);
        let sum = checksum(&short_name);
        let mut index = self.find_first_free_long_entry(volume, fragments as u32 + 1)?;
        // 最后一段先写
        for sequence in (1..=fragments).rev() {
            let begin = (sequence - 1) * LONG_NAME_LEN;
            let end = (begin + LONG_NAME_LEN).min(name.len());
            let mut order = sequence as u8;
            if sequence == fragments {
                order |= LAST_LONG_ENTRY;
            }
            let fragment = LongDirectoryEntry::new(order, &name[begin..end], sum);
            self.write_short_entry(volume, &index, &DirectoryEntry::Name(fragment))?;
            index.increment(volume)?;
        }
        let short = ShortDirectoryEntry::new(short_name, *info);
        self.write_short_entry(volume, &index, &DirectoryEntry::Info(short))?;
        debug!(
            "new long entry at {} ({} slots) in directory {}",
            index.entry,
            fragments + 1,
            self.first_cluster
        );
        Ok(index)
    }

    /// 槽位后面已经没有在用的目录项时写 0x00, 否则写 0xE5
    pub fn remove_short_entry<D: BlockDevice>(
        &self,
        volume: &mut Volume<D>,
        index: &Index,
    ) -> Result<(), FSError> {
        let (sector_id, offset) = index.position(volume)?;
        let mut next = *index;
        next.increment(volume)?;
        let no_more = next.is_end_of_array()
            || self.read_short_entry(volume, &next)? == DirectoryEntry::FreeNoMore;
        let marker = if no_more {
            DIR_ENTRY_NO_MORE
        } else {
            DIR_ENTRY_DELETED_FLAG
        };
        volume.driver().write(sector_id, offset, marker)
    }
    /// 从短目录项往前, 逐个释放整组槽位
    pub fn remove_long_entry<D: BlockDevice>(
        &self,
        volume: &mut Volume<D>,
        entry: &LongEntry,
    ) -> Result<(), FSError> {
        let slots = entry.info_index.entry - entry.first.entry;
        for k in (0..=slots).rev() {
            let mut index = entry.first;
            for _ in 0..k {
                index.increment(volume)?;
            }
            self.remove_short_entry(volume, &index)?;
        }
        debug!(
            "removed entry at {} from directory {}",
            entry.first.entry, self.first_cluster
        );
        Ok(())
    }

    /// 按名字找 (长名字或 8.3 名字, 不分大小写)
    pub fn find<D: BlockDevice>(
        &self,
        volume: &mut Volume<D>,
        name: &[u8],
    ) -> Result<LongEntry, FSError> {
        let mut buf = [0u8; LONG_NAME_MAX];
        let mut short = [0u8; SHORT_NAME_LEN + 1];
        let mut index = self.begin();
        while let Some(entry) = self.read_long_entry(volume, index, &mut buf)? {
            let short_len = format_short_name(&entry.short_name, &mut short);
            if !entry.info.is_volume()
                && (buf[..entry.name_len].eq_ignore_ascii_case(name)
                    || short[..short_len].eq_ignore_ascii_case(name))
            {
                return Ok(entry);
            }
            index = entry.next;
        }
        Err(FSError::NotFound)
    }
    fn check_new_name<D: BlockDevice>(
        &self,
        volume: &mut Volume<D>,
        name: &[u8],
    ) -> Result<(), FSError> {
        if name == b"." || name == b".." {
            return Err(FSError::InvalidName);
        }
        match self.find(volume, name) {
            Ok(_) => Err(FSError::AlreadyExists),
            Err(FSError::NotFound) => Ok(()),
            Err(e) => Err(e),
        }
    }
    /// 新建空文件, 还没有簇 (起始簇为 0)
    pub fn create_file<D: BlockDevice>(
        &self,
        volume: &mut Volume<D>,
        name: &[u8],
        date: FatDate,
        time: FatTime,
    ) -> Result<Index, FSError> {
        self.check_new_name(volume, name)?;
        let info = EntryInfo::new(FileAttributes::ARCHIVE, 0, 0).stamped(date, time);
        self.new_long_entry(volume, &info, name)
    }
    /// 新建子目录, 返回它的第一个簇
    pub fn create_directory<D: BlockDevice>(
        &self,
        volume: &mut Volume<D>,
        name: &[u8],
        date: FatDate,
        time: FatTime,
    ) -> Result<u32, FSError> {
        self.check_new_name(volume, name)?;
        let cluster = volume.fat_area().new_list()?;
        match self.init_directory(volume, cluster, name, date, time) {
            Ok(()) => Ok(cluster),
            Err(e) => {
                // 清理失败只记日志, 返回最初的错误
                if let Err(cleanup) = volume.fat_area().remove_list(cluster) {
                    error!("failed to free cluster {} of unfinished directory: {}", cluster, cleanup);
                }
                Err(e)
            }
        }
    }
    fn init_directory<D: BlockDevice>(
        &self,
        volume: &mut Volume<D>,
        cluster: u32,
        name: &[u8],
        date: FatDate,
        time: FatTime,
    ) -> Result<(), FSError> {
        let (data, driver) = volume.data_and_driver();
        data.clear_cluster(driver, cluster)?;
        let parent = if self.first_cluster == volume.root_directory_first_cluster() {
            0
        } else {
            self.first_cluster
        };
        let child = Directory::new(cluster);
        let mut index = child.begin();
        let dot = EntryInfo::new(FileAttributes::DIRECTORY, cluster, 0).stamped(date, time);
        child.write_short_entry(
            volume,
            &index,
            &DirectoryEntry::Info(ShortDirectoryEntry::dot(1, dot)),
        )?;
        index.increment(volume)?;
        let dotdot = EntryInfo::new(FileAttributes::DIRECTORY, parent, 0).stamped(date, time);
        child.write_short_entry(
            volume,
            &index,
            &DirectoryEntry::Info(ShortDirectoryEntry::dot(2, dotdot)),
        )?;
        self.new_long_entry(volume, &dot, name)?;
        Ok(())
    }
    /// 只有 "." 和 ".."
    pub fn is_empty<D: BlockDevice>(&self, volume: &mut Volume<D>) -> Result<bool, FSError> {
        let mut buf = [0u8; LONG_NAME_MAX];
        let mut index = self.begin();
        while let Some(entry) = self.read_long_entry(volume, index, &mut buf)? {
            if !entry.is_dot() {
                return Ok(false);
            }
            index = entry.next;
        }
        Ok(true)
    }
    /// 删除文件或空目录, 簇链一起归还
    pub fn remove<D: BlockDevice>(
        &self,
        volume: &mut Volume<D>,
        name: &[u8],
    ) -> Result<(), FSError> {
        if name == b"." || name == b".." {
            return Err(FSError::InvalidName);
        }
        let entry = self.find(volume, name)?;
        if entry.is_dir() {
            let mut child = *self;
            child.enter(volume, &entry)?;
            if !child.is_empty(volume)? {
                return Err(FSError::DirectoryNotEmpty);
            }
        }
        if entry.info.start_cluster != 0 {
            volume.fat_area().remove_list(entry.info.start_cluster)?;
        }
        self.remove_long_entry(volume, &entry)
    }
}
