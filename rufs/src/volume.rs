//! # 卷管理层
//!
//! 已挂载卷的上下文：超级块、两张位图与块设备。
//! 上层的每一次调用都以引用的方式拿到它，不存在全局状态。

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use block_dev::BlockDevice;

use crate::layout::*;
use crate::{Error, Geometry, Owner, ROOT_INO, Result};

#[derive(Debug)]
pub struct Volume {
    block_device: Arc<dyn BlockDevice>,
    super_block: SuperBlock,
    inode_bitmap: Bitmap,
    data_bitmap: Bitmap,
    /// 新建 inode 的属主
    owner: Owner,
}

impl Volume {
    /// 在块设备上构建全新的卷，包括只含 `.` 与 `..` 的根目录
    pub fn format(block_device: Arc<dyn BlockDevice>, geometry: Geometry) -> Result<Self> {
        geometry.validate()?;
        if block_device.block_size() != geometry.block_size {
            return Err(Error::InvalidGeometry(
                "block size differs from the device's block size",
            ));
        }

        let super_block = SuperBlock::new(&geometry);
        let need = super_block.total_blocks();
        let have = block_device.num_blocks();
        if have < need {
            return Err(Error::DeviceTooSmall { need, have });
        }

        let mut volume = Self {
            inode_bitmap: Bitmap::new(
                super_block.i_bitmap_blk,
                super_block.inode_bitmap_blocks(),
                super_block.max_inum,
                geometry.block_size,
            ),
            data_bitmap: Bitmap::new(
                super_block.d_bitmap_blk,
                super_block.data_bitmap_blocks(),
                super_block.max_dnum,
                geometry.block_size,
            ),
            block_device,
            super_block,
            owner: Owner::current(),
        };

        let mut block = volume.zeroed_block();
        super_block.encode(&mut block);
        volume.write_block(0, &block)?;

        volume.inode_bitmap.store(volume.block_device.as_ref())?;
        volume.data_bitmap.store(volume.block_device.as_ref())?;

        // 重新格式化时，旧的 inode 记录不能残留
        let zeroed = volume.zeroed_block();
        for block_id in super_block.i_start_blk..super_block.d_start_blk {
            volume.write_block(block_id, &zeroed)?;
        }

        assert_eq!(volume.alloc_inode()?, ROOT_INO);
        let mut root = DiskInode::new(
            ROOT_INO,
            DiskInodeKind::Directory,
            crate::StatKind::DIR as u32 | 0o755,
            volume.owner,
            now(),
        );
        // 根目录的 `..` 指向自身；第一个数据块就是数据块区域的第一块
        volume.init_dir(&mut root, ROOT_INO)?;
        debug_assert_eq!(root.direct[0], super_block.d_start_blk);

        log::info!(
            "formatted volume: {} inodes, {} data blocks of {} bytes, data area at block {}",
            super_block.max_inum,
            super_block.max_dnum,
            super_block.block_size,
            super_block.d_start_blk,
        );

        Ok(volume)
    }

    /// 打开块设备上已有的卷，读入超级块与两张位图
    pub fn open(block_device: Arc<dyn BlockDevice>) -> Result<Self> {
        let mut block = vec![0; block_device.block_size()];
        if block.len() < SuperBlock::SIZE {
            return Err(Error::InvalidGeometry("device block smaller than superblock"));
        }
        block_device.read_block(0, &mut block)?;
        let super_block = SuperBlock::decode(&block);
        super_block.check()?;

        if super_block.block_size as usize != block_device.block_size() {
            return Err(Error::Corrupted("block size differs from the device's"));
        }
        let need = super_block.total_blocks();
        let have = block_device.num_blocks();
        if have < need {
            return Err(Error::DeviceTooSmall { need, have });
        }

        let inode_bitmap = Bitmap::load(
            block_device.as_ref(),
            super_block.i_bitmap_blk,
            super_block.inode_bitmap_blocks(),
            super_block.max_inum,
        )?;
        let data_bitmap = Bitmap::load(
            block_device.as_ref(),
            super_block.d_bitmap_blk,
            super_block.data_bitmap_blocks(),
            super_block.max_dnum,
        )?;
        if !inode_bitmap.is_set(ROOT_INO) {
            return Err(Error::Corrupted("root inode is not allocated"));
        }
        log::info!(
            "opened volume: {}/{} inodes free, {}/{} data blocks free",
            inode_bitmap.free(),
            super_block.max_inum,
            data_bitmap.free(),
            super_block.max_dnum,
        );

        Ok(Self {
            block_device,
            super_block,
            inode_bitmap,
            data_bitmap,
            owner: Owner::current(),
        })
    }

    /// 释放内存中的状态并落盘。
    /// 每次操作都已同步写回，这里只需要冲刷块设备。
    pub fn close(self) -> Result<()> {
        self.block_device.flush()?;
        log::info!("volume closed");
        Ok(())
    }

    #[inline]
    pub fn super_block(&self) -> &SuperBlock {
        &self.super_block
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.super_block.block_size as usize
    }

    #[inline]
    pub fn owner(&self) -> Owner {
        self.owner
    }

    #[inline]
    pub fn set_owner(&mut self, owner: Owner) {
        self.owner = owner;
    }

    /// 在磁盘上分配新的 inode 并返回其ID
    pub fn alloc_inode(&mut self) -> Result<u32> {
        let ino = self
            .inode_bitmap
            .alloc(self.block_device.as_ref())?
            .ok_or(Error::Exhausted)?;
        log::debug!("allocated inode {ino}");
        Ok(ino)
    }

    /// 在磁盘上分配新的数据块并返回其**绝对**块ID
    pub fn alloc_data(&mut self) -> Result<u32> {
        let slot = self
            .data_bitmap
            .alloc(self.block_device.as_ref())?
            .ok_or(Error::Exhausted)?;
        let block_id = self.super_block.d_start_blk + slot;
        log::debug!("allocated data block {block_id}");
        Ok(block_id)
    }

    #[inline]
    pub fn free_inodes(&self) -> u32 {
        self.inode_bitmap.free()
    }

    #[inline]
    pub fn free_data(&self) -> u32 {
        self.data_bitmap.free()
    }

    #[inline]
    pub fn is_inode_allocated(&self, ino: u32) -> bool {
        ino < self.super_block.max_inum && self.inode_bitmap.is_set(ino)
    }

    /// 绝对块ID所对应的数据块是否已分配
    pub fn is_data_allocated(&self, block_id: u32) -> bool {
        block_id
            .checked_sub(self.super_block.d_start_blk)
            .is_some_and(|slot| slot < self.super_block.max_dnum && self.data_bitmap.is_set(slot))
    }

    /// 通过ID获取 inode 在磁盘上的位置：**块ID**以及**块内偏移**
    pub fn disk_inode_pos(&self, ino: u32) -> (u32, usize) {
        let byte_offset = ino as usize * DiskInode::SIZE;
        let block_id = self.super_block.i_start_blk + (byte_offset / self.block_size()) as u32;
        let block_offset = byte_offset % self.block_size();

        (block_id, block_offset)
    }

    pub fn read_inode(&self, ino: u32) -> Result<DiskInode> {
        if ino >= self.super_block.max_inum {
            return Err(Error::InvalidInode(ino));
        }
        let (block_id, block_offset) = self.disk_inode_pos(ino);
        let block = self.read_block(block_id)?;

        DiskInode::decode(&block[block_offset..block_offset + DiskInode::SIZE])
    }

    /// 读出 inode 所在的整块，替换其中这一条记录后整块写回，
    /// 同块的其它记录保持不变
    pub fn write_inode(&self, inode: &DiskInode) -> Result<()> {
        if inode.ino >= self.super_block.max_inum {
            return Err(Error::InvalidInode(inode.ino));
        }
        let (block_id, block_offset) = self.disk_inode_pos(inode.ino);
        let mut block = self.read_block(block_id)?;
        inode.encode(&mut block[block_offset..block_offset + DiskInode::SIZE]);

        self.write_block(block_id, &block)
    }

    #[inline]
    pub(crate) fn zeroed_block(&self) -> Vec<u8> {
        vec![0; self.block_size()]
    }

    pub(crate) fn read_block(&self, block_id: u32) -> Result<Vec<u8>> {
        let mut block = self.zeroed_block();
        self.block_device.read_block(block_id as usize, &mut block)?;
        Ok(block)
    }

    #[inline]
    pub(crate) fn write_block(&self, block_id: u32, block: &[u8]) -> Result<()> {
        self.block_device.write_block(block_id as usize, block)?;
        Ok(())
    }
}

/// 距 Unix 纪元的秒数
pub(crate) fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs() as i64)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use block_dev::MemDisk;

    use super::*;

    fn mem_volume(geometry: Geometry) -> Volume {
        let blocks = SuperBlock::new(&geometry).total_blocks();
        let disk = Arc::new(MemDisk::new(geometry.block_size, blocks));
        Volume::format(disk, geometry).unwrap()
    }

    #[test]
    fn inode_round_trip_keeps_neighbours() {
        let volume = mem_volume(Geometry::new(512, 64, 64));

        // 4 个 inode 共享同一块
        let mut written = Vec::new();
        for ino in 1..5 {
            let mut inode =
                DiskInode::new(ino, DiskInodeKind::File, 0o100644, Owner { uid: ino, gid: 7 }, 99);
            inode.size = ino * 10;
            inode.direct[ino as usize] = 100 + ino;
            volume.write_inode(&inode).unwrap();
            written.push(inode);
        }

        for inode in &written {
            assert_eq!(&volume.read_inode(inode.ino).unwrap(), inode);
        }
        assert!(volume.read_inode(0).unwrap().is_dir());
        assert!(matches!(volume.read_inode(64), Err(Error::InvalidInode(64))));
    }

    #[test]
    fn inode_position() {
        let volume = mem_volume(Geometry::new(512, 64, 64));
        let start = volume.super_block().i_start_blk;

        assert_eq!(volume.disk_inode_pos(0), (start, 0));
        assert_eq!(volume.disk_inode_pos(3), (start, 384));
        assert_eq!(volume.disk_inode_pos(4), (start + 1, 0));
        assert_eq!(volume.disk_inode_pos(63), (start + 15, 384));
    }

    #[test]
    fn allocations_are_unique_and_persisted() {
        let geometry = Geometry::new(512, 32, 16);
        let blocks = SuperBlock::new(&geometry).total_blocks();
        let disk = Arc::new(MemDisk::new(512, blocks));
        let mut volume = Volume::format(disk.clone(), geometry).unwrap();

        let mut seen = HashSet::from([ROOT_INO]);
        while let Ok(ino) = volume.alloc_inode() {
            assert!(seen.insert(ino), "inode {ino} handed out twice");
        }
        assert_eq!(seen.len(), 32);
        assert!(matches!(volume.alloc_inode(), Err(Error::Exhausted)));

        let d_start = volume.super_block().d_start_blk;
        let data: Vec<u32> = (0..15).map(|_| volume.alloc_data().unwrap()).collect();
        assert_eq!(data, (d_start + 1..d_start + 16).collect::<Vec<_>>());
        assert!(matches!(volume.alloc_data(), Err(Error::Exhausted)));

        let reopened = Volume::open(disk).unwrap();
        assert_eq!(reopened.free_inodes(), 0);
        assert_eq!(reopened.free_data(), 0);
        assert!((0..32).all(|ino| reopened.is_inode_allocated(ino)));
    }

    #[test]
    fn fresh_volume_reserves_root() {
        let volume = mem_volume(Geometry::new(512, 64, 64));
        let d_start = volume.super_block().d_start_blk;

        assert!(volume.is_inode_allocated(ROOT_INO));
        assert!(!volume.is_inode_allocated(1));
        assert!(volume.is_data_allocated(d_start));
        assert!(!volume.is_data_allocated(d_start + 1));
        assert!(!volume.is_data_allocated(0));
        assert_eq!(volume.free_inodes(), 63);
        assert_eq!(volume.free_data(), 63);

        let root = volume.read_inode(ROOT_INO).unwrap();
        assert!(root.valid);
        assert_eq!(root.link, 2);
        assert_eq!(root.mode, 0o40755);
        assert_eq!(root.direct[0], d_start);
        assert_eq!(root.size, 2 * DirEntry::SIZE as u32);
    }

    #[test]
    fn format_checks_device() {
        let geometry = Geometry::new(512, 64, 64);
        let small = Arc::new(MemDisk::new(512, 10));
        assert!(matches!(
            Volume::format(small, geometry),
            Err(Error::DeviceTooSmall { need: 83, have: 10 })
        ));

        let mismatched = Arc::new(MemDisk::new(1024, 100));
        assert!(matches!(
            Volume::format(mismatched, geometry),
            Err(Error::InvalidGeometry(_))
        ));

        let blank = Arc::new(MemDisk::new(512, 100));
        assert!(matches!(Volume::open(blank), Err(Error::BadMagic(0))));
    }
}
