use crate::layout::{DirEntry, DiskInode};
use crate::{DIRECT_COUNT, Error, Result};

/// 卷的容量参数，格式化时确定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub block_size: usize,
    /// inode 总数
    pub max_inodes: u32,
    /// 数据块总数
    pub max_blocks: u32,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            block_size: 4096,
            max_inodes: 1024,
            max_blocks: 16384,
        }
    }
}

impl Geometry {
    #[inline]
    pub fn new(block_size: usize, max_inodes: u32, max_blocks: u32) -> Self {
        Self {
            block_size,
            max_inodes,
            max_blocks,
        }
    }

    pub fn validate(&self) -> Result<()> {
        // 记录不得跨块
        let record = DiskInode::SIZE.max(DirEntry::SIZE);
        if self.block_size < record || self.block_size % record != 0 {
            return Err(Error::InvalidGeometry(
                "block size must be a nonzero multiple of 128",
            ));
        }
        // 文件大小以 u32 记录
        if self.block_size > u32::MAX as usize / DIRECT_COUNT {
            return Err(Error::InvalidGeometry("block size too large"));
        }
        if self.max_inodes == 0 {
            return Err(Error::InvalidGeometry("volume needs at least one inode"));
        }
        if self.max_blocks == 0 {
            return Err(Error::InvalidGeometry("volume needs at least one data block"));
        }

        // 块ID以 u32 记录，整个卷都必须能被寻址
        let block_size = self.block_size as u64;
        let block_bits = block_size * 8;
        let max_inodes = self.max_inodes as u64;
        let max_blocks = self.max_blocks as u64;
        let total_blocks = 1
            + max_inodes.div_ceil(block_bits)
            + max_blocks.div_ceil(block_bits)
            + (max_inodes * DiskInode::SIZE as u64).div_ceil(block_size)
            + max_blocks;
        if total_blocks > u32::MAX as u64 {
            return Err(Error::InvalidGeometry("volume exceeds 32-bit block addressing"));
        }

        Ok(())
    }
}

/// 新建 inode 的属主
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Owner {
    pub uid: u32,
    pub gid: u32,
}

impl Owner {
    /// 当前进程的属主
    #[cfg(unix)]
    pub fn current() -> Self {
        // SAFETY: getuid/getgid 总是成功且没有副作用
        unsafe {
            Self {
                uid: libc::getuid(),
                gid: libc::getgid(),
            }
        }
    }

    #[cfg(not(unix))]
    pub fn current() -> Self {
        Self::default()
    }
}
