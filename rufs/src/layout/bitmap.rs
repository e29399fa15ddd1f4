use std::io;

use block_dev::BlockDevice;

/// 位图区域，记录其指示区域的分配情况
///
/// 第 i 位位于第 `i / 8` 字节的第 `i % 8` 位（低位在前），置位即已分配。
/// 内存中持有整个区域的副本，每次修改都立即写回所在的块。
#[derive(Debug)]
pub struct Bitmap {
    /// 位图的起始块
    start_block_id: u32,
    /// 可分配的项数
    capacity: u32,
    block_size: usize,
    bits: Vec<u8>,
}

impl Bitmap {
    /// 全空的位图，占用 `blocks` 块
    pub fn new(start_block_id: u32, blocks: u32, capacity: u32, block_size: usize) -> Self {
        Self {
            start_block_id,
            capacity,
            block_size,
            bits: vec![0; blocks as usize * block_size],
        }
    }

    /// 从磁盘读入位图
    pub fn load(
        block_device: &dyn BlockDevice,
        start_block_id: u32,
        blocks: u32,
        capacity: u32,
    ) -> io::Result<Self> {
        let mut bitmap = Self::new(start_block_id, blocks, capacity, block_device.block_size());
        for (block_index, chunk) in bitmap.bits.chunks_mut(bitmap.block_size).enumerate() {
            block_device.read_block(start_block_id as usize + block_index, chunk)?;
        }

        Ok(bitmap)
    }

    /// 写回整个位图区域
    pub fn store(&self, block_device: &dyn BlockDevice) -> io::Result<()> {
        for (block_index, chunk) in self.bits.chunks(self.block_size).enumerate() {
            block_device.write_block(self.start_block_id as usize + block_index, chunk)?;
        }

        Ok(())
    }

    #[inline]
    pub fn is_set(&self, index: u32) -> bool {
        let index = index as usize;
        self.bits[index / 8] & (1 << (index % 8)) != 0
    }

    /// 空闲项数
    pub fn free(&self) -> u32 {
        (0..self.capacity).filter(|&i| !self.is_set(i)).count() as u32
    }

    /// 分配编号最小的空闲项。
    /// 若位图的空间用尽，则返回空。
    pub fn alloc(&mut self, block_device: &dyn BlockDevice) -> io::Result<Option<u32>> {
        // 容量之外的位从不置位，所以第一个 0 位若越界，界内也就没有空闲项了
        let Some(index) = self
            .bits
            .iter()
            .enumerate()
            .find_map(|(byte_index, &bits)| {
                (bits != u8::MAX).then_some(byte_index * 8 + bits.trailing_ones() as usize)
            })
            .filter(|&index| index < self.capacity as usize)
        else {
            return Ok(None);
        };

        self.set(block_device, index as u32)?;
        Ok(Some(index as u32))
    }

    /// 置位并写回所在的块
    pub fn set(&mut self, block_device: &dyn BlockDevice, index: u32) -> io::Result<()> {
        if index >= self.capacity {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("bit {index} is beyond the bitmap capacity {}", self.capacity),
            ));
        }
        let byte_index = index as usize / 8;
        self.bits[byte_index] |= 1 << (index % 8);

        let block_index = byte_index / self.block_size;
        let chunk = &self.bits[block_index * self.block_size..(block_index + 1) * self.block_size];
        block_device.write_block(self.start_block_id as usize + block_index, chunk)
    }
}
