use std::sync::Arc;

use rufs::{FileSystem, Geometry, MemDisk, SuperBlock};

/// 在恰好够用的内存盘上格式化一个卷
pub fn mem_fs(geometry: Geometry) -> FileSystem {
    let blocks = SuperBlock::new(&geometry).total_blocks();
    FileSystem::format(Arc::new(MemDisk::new(geometry.block_size, blocks)), geometry).unwrap()
}

pub fn names(fs: &FileSystem, path: &str) -> Vec<String> {
    fs.list_directory(path)
        .unwrap()
        .into_iter()
        .map(|item| item.name)
        .collect()
}
