//! # 块设备接口层
//!
//! 块设备是以**块**为单位存储数据的设备，
//! [`BlockDevice`] 就是对读写块设备的抽象，实现了此特质的类型称为**块设备驱动**。
//!
//! - [`BlockFile`]：以宿主机上的文件作为后备存储；
//! - [`MemDisk`]：以内存作为后备存储，供测试与工具使用。

mod file;
mod mem;

use std::fmt;
use std::io;

pub use self::{file::BlockFile, mem::MemDisk};

/// 块设备驱动特质
///
/// 每次读写恰好传输一个块，`buf.len()` 必须等于 [`BlockDevice::block_size`]。
pub trait BlockDevice: Send + Sync + fmt::Debug {
    /// 块大小（字节）
    fn block_size(&self) -> usize;

    /// 设备总块数
    fn num_blocks(&self) -> usize;

    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> io::Result<()>;

    fn write_block(&self, block_id: usize, buf: &[u8]) -> io::Result<()>;

    /// 将已写入的数据落盘
    fn flush(&self) -> io::Result<()> {
        Ok(())
    }
}

/// 校验块编号与缓冲区长度
pub(crate) fn check_access(
    block_id: usize,
    buf_len: usize,
    block_size: usize,
    num_blocks: usize,
) -> io::Result<()> {
    if block_id >= num_blocks {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("block {block_id} out of range (device has {num_blocks} blocks)"),
        ));
    }
    if buf_len != block_size {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("buffer of {buf_len} bytes is not a complete block of {block_size}"),
        ));
    }

    Ok(())
}
