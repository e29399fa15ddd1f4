//! 磁盘上的 inode 记录，定长 128 字节，紧密排列在索引节点区域中。
//!
//! 只有直接索引：`direct` 中为 0 的槽位表示尚未分配数据块，
//! 数据块区域总是从非零块开始，所以 0 不会是合法的数据块ID。

use super::{get_i64, get_u32, put_i64, put_u32};
use crate::{DIRECT_COUNT, Error, Owner, Result};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiskInode {
    /// ID
    pub ino: u32,
    /// 是否有效
    pub valid: bool,
    /// 类型
    pub kind: DiskInodeKind,
    /// 硬链接个数
    pub link: u32,
    /// 文件大小；目录的大小为有效目录项个数乘以目录项大小
    pub size: u32,
    /// 直接索引块，存储容量：DIRECT_COUNT * 块大小 字节
    pub direct: [u32; DIRECT_COUNT],
    pub uid: u32,
    pub gid: u32,
    /// 类型位与权限位
    pub mode: u32,
    pub nlink: u32,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
}

#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub enum DiskInodeKind {
    #[default]
    File,
    Directory,
}

impl DiskInode {
    pub const SIZE: usize = 128;

    /// 新建有效的 inode，目录的链接数为 2（`.` 与父目录中的项）
    pub fn new(ino: u32, kind: DiskInodeKind, mode: u32, owner: Owner, now: i64) -> Self {
        let links = match kind {
            DiskInodeKind::File => 1,
            DiskInodeKind::Directory => 2,
        };

        Self {
            ino,
            valid: true,
            kind,
            link: links,
            uid: owner.uid,
            gid: owner.gid,
            mode,
            nlink: links,
            atime: now,
            mtime: now,
            ctime: now,
            ..Default::default()
        }
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind == DiskInodeKind::Directory
    }

    /// 已分配的数据块个数
    #[inline]
    pub fn data_blocks(&self) -> usize {
        self.direct.iter().filter(|&&block_id| block_id != 0).count()
    }

    /// 链接数同时记录在 `link` 与属性中的 `nlink`
    #[inline]
    pub fn set_links(&mut self, links: u32) {
        self.link = links;
        self.nlink = links;
    }

    pub fn encode(&self, buf: &mut [u8]) {
        let buf = &mut buf[..Self::SIZE];
        buf.fill(0);

        put_u32(buf, 0, self.ino);
        buf[4] = self.valid as u8;
        buf[5] = match self.kind {
            DiskInodeKind::File => 0,
            DiskInodeKind::Directory => 1,
        };
        put_u32(buf, 8, self.link);
        put_u32(buf, 12, self.size);
        for (i, &block_id) in self.direct.iter().enumerate() {
            put_u32(buf, 16 + i * 4, block_id);
        }
        put_u32(buf, 80, self.uid);
        put_u32(buf, 84, self.gid);
        put_u32(buf, 88, self.mode);
        put_u32(buf, 92, self.nlink);
        put_i64(buf, 96, self.atime);
        put_i64(buf, 104, self.mtime);
        put_i64(buf, 112, self.ctime);
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let kind = match buf[5] {
            0 => DiskInodeKind::File,
            1 => DiskInodeKind::Directory,
            _ => return Err(Error::Corrupted("unknown inode kind")),
        };
        let mut direct = [0; DIRECT_COUNT];
        for (i, block_id) in direct.iter_mut().enumerate() {
            *block_id = get_u32(buf, 16 + i * 4);
        }

        Ok(Self {
            ino: get_u32(buf, 0),
            valid: buf[4] != 0,
            kind,
            link: get_u32(buf, 8),
            size: get_u32(buf, 12),
            direct,
            uid: get_u32(buf, 80),
            gid: get_u32(buf, 84),
            mode: get_u32(buf, 88),
            nlink: get_u32(buf, 92),
            atime: get_i64(buf, 96),
            mtime: get_i64(buf, 104),
            ctime: get_i64(buf, 112),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeroed_record_is_invalid_file() {
        let inode = DiskInode::decode(&[0; DiskInode::SIZE]).unwrap();
        assert!(!inode.valid);
        assert_eq!(inode.kind, DiskInodeKind::File);
        assert_eq!(inode.data_blocks(), 0);
    }

    #[test]
    fn byte_layout() {
        let mut inode = DiskInode::new(7, DiskInodeKind::Directory, 0o40755, Owner::default(), 42);
        inode.size = 256;
        inode.direct[0] = 19;
        inode.direct[15] = 0x0102_0304;
        let mut buf = [0xee; DiskInode::SIZE];
        inode.encode(&mut buf);

        assert_eq!(&buf[0..4], &[7, 0, 0, 0]);
        assert_eq!(buf[4], 1);
        assert_eq!(buf[5], 1);
        assert_eq!(&buf[8..12], &[2, 0, 0, 0]);
        assert_eq!(&buf[16..20], &[19, 0, 0, 0]);
        assert_eq!(&buf[76..80], &[4, 3, 2, 1]);
        assert_eq!(&buf[120..], &[0; 8]);
        assert_eq!(DiskInode::decode(&buf).unwrap(), inode);
    }

    #[test]
    fn rejects_unknown_kind() {
        let mut buf = [0; DiskInode::SIZE];
        buf[5] = 9;
        assert!(matches!(DiskInode::decode(&buf), Err(Error::Corrupted(_))));
    }
}
