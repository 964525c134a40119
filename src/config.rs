/// 可以自行调整的变量

pub const SECTOR_SIZE: usize = 512; // 内存里只放一个扇区, 单片机的 RAM 只有几 KB

pub const LONG_NAME_MAX: usize = 255; // 长文件名最大字符数
pub const MAX_LONG_NAME_ENTRIES: usize = 20; // 一个长目录项最多的名字片段数
