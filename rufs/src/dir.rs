//! # 目录层
//!
//! 目录的数据块里紧密排列着定长的 [`DirEntry`]，每块 `块大小 / DirEntry::SIZE` 个。
//! 目录只使用直接索引，遇到第一个为 0 的索引即视为没有更多的块，
//! 因此一个目录最多容纳 `DIRECT_COUNT * 每块目录项数` 个目录项。

use crate::layout::{DirEntry, DiskInode};
use crate::volume::{Volume, now};
use crate::{DIRECT_COUNT, Error, Result};

/// 目录项在磁盘上的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Slot {
    pub block_id: u32,
    pub index: usize,
}

impl Volume {
    /// 在目录下通过名字查找目录项，只查找这一层
    pub fn find_entry(&self, dir_ino: u32, name: &str) -> Result<DirEntry> {
        let dir = self.read_inode(dir_ino)?;
        self.lookup(&dir, name)?
            .map(|(_, entry)| entry)
            .ok_or(Error::NotFound)
    }

    /// 向目录加入目录项。
    ///
    /// 同名的有效目录项已存在时返回 [`Error::AlreadyExists`]；
    /// 直接索引用尽且已有块中没有空槽位时返回 [`Error::Full`]。
    /// 成功后目录的 inode 已写回磁盘。
    pub fn add_entry(&mut self, dir: &mut DiskInode, ino: u32, name: &str) -> Result<()> {
        let entry = DirEntry::new(name, ino)?;
        if self.lookup(dir, name)?.is_some() {
            return Err(Error::AlreadyExists);
        }

        match self.free_slot(dir)? {
            Some(slot) => {
                let mut block = self.read_block(slot.block_id)?;
                entry.encode(&mut block[slot.index * DirEntry::SIZE..]);
                self.write_block(slot.block_id, &block)?;
            }
            None => {
                // 先确认有空的直接索引，再分配，避免泄漏数据块
                let direct_index = dir
                    .direct
                    .iter()
                    .position(|&block_id| block_id == 0)
                    .ok_or(Error::Full)?;
                let block_id = self.alloc_data()?;

                let mut block = self.zeroed_block();
                entry.encode(&mut block);
                self.write_block(block_id, &block)?;
                dir.direct[direct_index] = block_id;
            }
        }

        dir.size += DirEntry::SIZE as u32;
        dir.mtime = now();
        dir.ctime = dir.mtime;
        self.write_inode(dir)?;
        log::debug!("dir {}: added {name:?} -> inode {ino}", dir.ino);

        Ok(())
    }

    /// 将目录项置为无效并返回它，槽位留给之后的插入复用
    pub fn remove_entry(&mut self, dir: &mut DiskInode, name: &str) -> Result<DirEntry> {
        let (slot, entry) = self.lookup(dir, name)?.ok_or(Error::NotFound)?;

        let mut block = self.read_block(slot.block_id)?;
        let mut removed = entry.clone();
        removed.invalidate();
        removed.encode(&mut block[slot.index * DirEntry::SIZE..]);
        self.write_block(slot.block_id, &block)?;

        dir.size -= DirEntry::SIZE as u32;
        dir.mtime = now();
        dir.ctime = dir.mtime;
        self.write_inode(dir)?;
        log::debug!("dir {}: removed {name:?}", dir.ino);

        Ok(entry)
    }

    /// 按磁盘顺序列出全部有效目录项
    pub fn entries(&self, dir: &DiskInode) -> Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        self.scan(dir, |_, entry| {
            if entry.is_valid() {
                entries.push(entry);
            }
            false
        })?;

        Ok(entries)
    }

    /// 再加入一个目录项需要新分配的数据块数；目录已满时为空
    pub fn blocks_for_entry(&self, dir: &DiskInode) -> Result<Option<u32>> {
        if self.free_slot(dir)?.is_some() {
            Ok(Some(0))
        } else if dir.direct.contains(&0) {
            Ok(Some(1))
        } else {
            Ok(None)
        }
    }

    /// 为新目录写入 `.`（指向自身）与 `..`（指向父目录）
    pub(crate) fn init_dir(&mut self, dir: &mut DiskInode, parent_ino: u32) -> Result<()> {
        let ino = dir.ino;
        self.add_entry(dir, ino, ".")?;
        self.add_entry(dir, parent_ino, "..")
    }

    pub(crate) fn lookup(&self, dir: &DiskInode, name: &str) -> Result<Option<(Slot, DirEntry)>> {
        let mut found = None;
        self.scan(dir, |slot, entry| {
            if entry.matches(name) {
                found = Some((slot, entry));
                true
            } else {
                false
            }
        })?;

        Ok(found)
    }

    /// 已分配的块中第一个无效槽位
    fn free_slot(&self, dir: &DiskInode) -> Result<Option<Slot>> {
        let mut free = None;
        self.scan(dir, |slot, entry| {
            if entry.is_valid() {
                false
            } else {
                free = Some(slot);
                true
            }
        })?;

        Ok(free)
    }

    /// 依次读出目录各块中的目录项交给 `f`，`f` 返回真时停止
    fn scan(&self, dir: &DiskInode, mut f: impl FnMut(Slot, DirEntry) -> bool) -> Result<()> {
        if !dir.is_dir() {
            return Err(Error::NotADirectory);
        }
        let per_block = self.block_size() / DirEntry::SIZE;

        for &block_id in dir.direct.iter().take_while(|&&block_id| block_id != 0) {
            let block = self.read_block(block_id)?;
            for (index, raw) in block.chunks_exact(DirEntry::SIZE).take(per_block).enumerate() {
                if f(Slot { block_id, index }, DirEntry::decode(raw)?) {
                    return Ok(());
                }
            }
        }

        Ok(())
    }
}

/// 一个目录最多容纳的目录项个数
#[inline]
pub fn dir_capacity(block_size: usize) -> usize {
    DIRECT_COUNT * (block_size / DirEntry::SIZE)
}
