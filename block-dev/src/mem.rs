use std::io;
use std::sync::{Mutex, PoisonError};

use crate::{BlockDevice, check_access};

/// 内存盘
#[derive(Debug)]
pub struct MemDisk {
    data: Mutex<Vec<u8>>,
    block_size: usize,
    num_blocks: usize,
}

impl MemDisk {
    pub fn new(block_size: usize, num_blocks: usize) -> Self {
        Self {
            data: Mutex::new(vec![0; block_size * num_blocks]),
            block_size,
            num_blocks,
        }
    }
}

impl BlockDevice for MemDisk {
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
        let data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        let start = block_id * self.block_size;
        buf.copy_from_slice(&data[start..start + self.block_size]);
        Ok(())
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> io::Result<()> {
        check_access(block_id, buf.len(), self.block_size, self.num_blocks)?;
        let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        let start = block_id * self.block_size;
        data[start..start + self.block_size].copy_from_slice(buf);
        Ok(())
    }
}
