/* rufs 的整体架构，自上而下 */

// 门面层：格式化、挂载以及基于路径的文件操作
mod vfs;

// 路径解析层：沿 `/` 分隔的路径逐级查找 inode
mod path;

// 目录层：目录项的查找、插入与删除
mod dir;

// 卷管理层：已挂载卷的上下文，负责位图分配与 inode 读写
mod volume;

// 磁盘数据结构层：磁盘记录的编解码
mod layout;

mod config;
mod error;

pub use block_dev::{BlockDevice, BlockFile, MemDisk};

pub use self::{
    config::{Geometry, Owner},
    dir::dir_capacity,
    error::{Error, Result},
    layout::{DirEntry, DiskInode, DiskInodeKind, SuperBlock},
    path::split,
    vfs::{Attributes, DirItem, FileSystem, StatKind},
    volume::Volume,
};

pub const MAGIC: u32 = 0x5255_4653;

/// 根目录的 inode 编号
pub const ROOT_INO: u32 = 0;

/// 每个 inode 的直接索引数量，文件大小上限为 `DIRECT_COUNT * block_size`
pub const DIRECT_COUNT: usize = 16;
