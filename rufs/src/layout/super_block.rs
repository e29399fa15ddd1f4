use super::{DiskInode, get_u32, put_u32};
use crate::{Error, Geometry, MAGIC, Result};

/// 超级块：
/// - 提供文件系统合法性校验；
/// - 定位其它连续区域
///
/// 各区域的起始块只在格式化时计算一次，挂载时原样读回。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuperBlock {
    /// 魔数：用于校验文件系统合法性
    magic: u32,
    pub block_size: u32,
    pub max_inum: u32,
    pub max_dnum: u32,
    /// 索引节点位图的起始块
    pub i_bitmap_blk: u32,
    /// 数据块位图的起始块
    pub d_bitmap_blk: u32,
    /// 索引节点区域的起始块
    pub i_start_blk: u32,
    /// 数据块区域的起始块
    pub d_start_blk: u32,
}

impl SuperBlock {
    /// 编码后的字节数
    pub const SIZE: usize = 32;

    /// 由容量参数推导磁盘布局
    pub fn new(geometry: &Geometry) -> Self {
        let block_size = geometry.block_size;
        let block_bits = block_size * 8;
        let max_inum = geometry.max_inodes as usize;
        let max_dnum = geometry.max_blocks as usize;

        let i_bitmap_blk = 1;
        let d_bitmap_blk = i_bitmap_blk + max_inum.div_ceil(block_bits);
        let i_start_blk = d_bitmap_blk + max_dnum.div_ceil(block_bits);
        let d_start_blk = i_start_blk + (max_inum * DiskInode::SIZE).div_ceil(block_size);

        Self {
            magic: MAGIC,
            block_size: block_size as u32,
            max_inum: geometry.max_inodes,
            max_dnum: geometry.max_blocks,
            i_bitmap_blk: i_bitmap_blk as u32,
            d_bitmap_blk: d_bitmap_blk as u32,
            i_start_blk: i_start_blk as u32,
            d_start_blk: d_start_blk as u32,
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.magic == MAGIC
    }

    #[inline]
    pub fn magic(&self) -> u32 {
        self.magic
    }

    #[inline]
    pub fn geometry(&self) -> Geometry {
        Geometry::new(self.block_size as usize, self.max_inum, self.max_dnum)
    }

    /// 卷占据的总块数
    #[inline]
    pub fn total_blocks(&self) -> usize {
        self.d_start_blk as usize + self.max_dnum as usize
    }

    #[inline]
    pub fn inode_bitmap_blocks(&self) -> u32 {
        self.d_bitmap_blk - self.i_bitmap_blk
    }

    #[inline]
    pub fn data_bitmap_blocks(&self) -> u32 {
        self.i_start_blk - self.d_bitmap_blk
    }

    /// 读回的布局是否自洽
    pub fn check(&self) -> Result<()> {
        if !self.is_valid() {
            return Err(Error::BadMagic(self.magic));
        }
        self.geometry().validate()?;

        let block_bits = self.block_size as u64 * 8;
        let ordered = self.i_bitmap_blk == 1
            && self.i_bitmap_blk < self.d_bitmap_blk
            && self.d_bitmap_blk < self.i_start_blk
            && self.i_start_blk < self.d_start_blk;
        if !ordered {
            return Err(Error::Corrupted("regions out of order"));
        }
        if (self.inode_bitmap_blocks() as u64) * block_bits < self.max_inum as u64
            || (self.data_bitmap_blocks() as u64) * block_bits < self.max_dnum as u64
        {
            return Err(Error::Corrupted("bitmap smaller than capacity"));
        }
        let table_bytes = (self.d_start_blk - self.i_start_blk) as u64 * self.block_size as u64;
        if table_bytes < self.max_inum as u64 * DiskInode::SIZE as u64 {
            return Err(Error::Corrupted("inode table smaller than capacity"));
        }

        Ok(())
    }

    pub fn encode(&self, buf: &mut [u8]) {
        put_u32(buf, 0, self.magic);
        put_u32(buf, 4, self.block_size);
        put_u32(buf, 8, self.max_inum);
        put_u32(buf, 12, self.max_dnum);
        put_u32(buf, 16, self.i_bitmap_blk);
        put_u32(buf, 20, self.d_bitmap_blk);
        put_u32(buf, 24, self.i_start_blk);
        put_u32(buf, 28, self.d_start_blk);
    }

    pub fn decode(buf: &[u8]) -> Self {
        Self {
            magic: get_u32(buf, 0),
            block_size: get_u32(buf, 4),
            max_inum: get_u32(buf, 8),
            max_dnum: get_u32(buf, 12),
            i_bitmap_blk: get_u32(buf, 16),
            d_bitmap_blk: get_u32(buf, 20),
            i_start_blk: get_u32(buf, 24),
            d_start_blk: get_u32(buf, 28),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_of_small_volume() {
        let sb = SuperBlock::new(&Geometry::new(512, 64, 64));

        assert_eq!(sb.i_bitmap_blk, 1);
        assert_eq!(sb.d_bitmap_blk, 2);
        assert_eq!(sb.i_start_blk, 3);
        // 64 个 inode，每个 128 字节，占 16 块
        assert_eq!(sb.d_start_blk, 19);
        assert_eq!(sb.total_blocks(), 19 + 64);
        sb.check().unwrap();
    }

    #[test]
    fn bitmaps_span_several_blocks() {
        let sb = SuperBlock::new(&Geometry::new(128, 2048, 1025));

        // 每块 1024 位
        assert_eq!(sb.inode_bitmap_blocks(), 2);
        assert_eq!(sb.data_bitmap_blocks(), 2);
        assert_eq!(sb.d_start_blk - sb.i_start_blk, 2048);
    }

    #[test]
    fn decode_what_was_encoded() {
        let sb = SuperBlock::new(&Geometry::default());
        let mut buf = [0; SuperBlock::SIZE];
        sb.encode(&mut buf);

        assert_eq!(&buf[..4], &MAGIC.to_le_bytes());
        assert_eq!(SuperBlock::decode(&buf), sb);
    }

    #[test]
    fn detects_garbage() {
        let buf = [0xff; SuperBlock::SIZE];
        assert!(matches!(
            SuperBlock::decode(&buf).check(),
            Err(Error::BadMagic(0xffff_ffff))
        ));

        let mut sb = SuperBlock::new(&Geometry::new(512, 64, 64));
        sb.i_start_blk = sb.d_start_blk;
        assert!(matches!(sb.check(), Err(Error::Corrupted(_))));
    }
}
