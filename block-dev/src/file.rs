use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use crate::{BlockDevice, check_access};

/// 以宿主机文件为后备存储的块设备
///
/// 文件游标由互斥锁保护，`seek` 与读写是一个整体。
#[derive(Debug)]
pub struct BlockFile {
    file: Mutex<File>,
    block_size: usize,
    num_blocks: usize,
}

impl BlockFile {
    /// 创建（或截断）一个恰好 `block_size * num_blocks` 字节的后备文件
    pub fn create(path: impl AsRef<Path>, block_size: usize, num_blocks: usize) -> io::Result<Self> {
        let path = path.as_ref();
        let fd = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        fd.set_len((block_size * num_blocks) as u64)?;
        log::info!("created backing store {path:?}: {num_blocks} blocks of {block_size} bytes");

        Ok(Self {
            file: Mutex::new(fd),
            block_size,
            num_blocks,
        })
    }

    /// 打开已有的后备文件，其长度必须是块大小的整数倍
    pub fn open(path: impl AsRef<Path>, block_size: usize) -> io::Result<Self> {
        let path = path.as_ref();
        let fd = OpenOptions::new().read(true).write(true).open(path)?;
        let len = fd.metadata()?.len() as usize;
        if block_size == 0 || len % block_size != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{path:?} is {len} bytes, not a multiple of {block_size}"),
            ));
        }
        log::debug!("opened backing store {path:?} ({len} bytes)");

        Ok(Self {
            file: Mutex::new(fd),
            block_size,
            num_blocks: len / block_size,
        })
    }

    /// 落盘并关闭
    pub fn close(self) -> io::Result<()> {
        self.flush()
    }
}

impl BlockDevice for BlockFile {
    #[inline]
    fn block_size(&self) -> usize {
        self.block_size
    }

    #[inline]
    fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> io::Result<()> {
        check_access(block_id, buf.len(), self.block_size, self.num_blocks)?;
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.seek(SeekFrom::Start((block_id * self.block_size) as u64))?;
        file.read_exact(buf)
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> io::Result<()> {
        check_access(block_id, buf.len(), self.block_size, self.num_blocks)?;
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.seek(SeekFrom::Start((block_id * self.block_size) as u64))?;
        file.write_all(buf)
    }

    fn flush(&self) -> io::Result<()> {
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.flush()?;
        file.sync_data()
    }
}
