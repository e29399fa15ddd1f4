//! # 门面层
//!
//! 基于路径的文件系统操作。所有操作都在同一把全局锁下执行，
//! 锁保护已挂载卷的上下文（超级块、两张位图与块设备），各层自身不做并发控制。
//!
//! 文件只有 [`DIRECT_COUNT`] 个直接索引，大小上限为 `DIRECT_COUNT * 块大小`。
//! 删除只解除目录项并减少链接数，inode 与数据块不会被回收。

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;

use block_dev::{BlockDevice, BlockFile};
use enumflags2::bitflags;
use spin::Mutex;

use crate::layout::{DirEntry, DiskInode, DiskInodeKind, SuperBlock};
use crate::path::split;
use crate::volume::{Volume, now};
use crate::{DIRECT_COUNT, Error, Geometry, Owner, ROOT_INO, Result};

#[derive(Debug)]
pub struct FileSystem {
    volume: Mutex<Volume>,
}

/// 对外可见的文件属性
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attributes {
    pub ino: u32,
    pub kind: StatKind,
    pub size: u64,
    /// 占用的数据块数
    pub blocks: u64,
    pub uid: u32,
    pub gid: u32,
    pub nlink: u32,
    pub mode: u32,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
}

/// 目录列表中的一项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirItem {
    pub name: String,
    pub ino: u32,
}

#[allow(clippy::upper_case_acronyms)]
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatKind {
    DIR = 0o040000,
    #[default]
    FILE = 0o100000,
}

/// 权限位
const PERM_MASK: u32 = 0o7777;

impl FileSystem {
    /// 格式化块设备并挂载
    pub fn format(block_device: Arc<dyn BlockDevice>, geometry: Geometry) -> Result<Self> {
        Ok(Self::from(Volume::format(block_device, geometry)?))
    }

    /// 挂载块设备上已有的卷
    pub fn open(block_device: Arc<dyn BlockDevice>) -> Result<Self> {
        Ok(Self::from(Volume::open(block_device)?))
    }

    /// 挂载以宿主机文件为后备存储的卷。
    ///
    /// 文件不存在、不足一个超级块或魔数不符时，按 `geometry` 重新创建并格式化；
    /// 否则卷的布局（包括块大小）以超级块为准，`geometry` 被忽略。
    /// 长度不是块大小整数倍的已有卷不会被格式化，而是返回 I/O 错误。
    pub fn mount(path: impl AsRef<Path>, geometry: Geometry) -> Result<Self> {
        let path = path.as_ref();
        geometry.validate()?;

        if let Some(super_block) = Self::read_super_block(path)? {
            let block_file = BlockFile::open(path, super_block.block_size as usize)?;
            return Self::open(Arc::new(block_file));
        }

        let blocks = SuperBlock::new(&geometry).total_blocks();
        let block_file = BlockFile::create(path, geometry.block_size, blocks)?;
        Self::format(Arc::new(block_file), geometry)
    }

    /// 卸载：释放内存中的超级块与位图，冲刷并关闭块设备
    pub fn unmount(self) -> Result<()> {
        self.volume.into_inner().close()
    }

    pub fn geometry(&self) -> Geometry {
        self.volume.lock().super_block().geometry()
    }

    /// 之后新建的 inode 的属主
    pub fn set_owner(&self, owner: Owner) {
        self.volume.lock().set_owner(owner);
    }

    /// (空闲 inode 数, 空闲数据块数)
    pub fn free_space(&self) -> (u32, u32) {
        let volume = self.volume.lock();
        (volume.free_inodes(), volume.free_data())
    }

    pub fn get_attributes(&self, path: &str) -> Result<Attributes> {
        let volume = self.volume.lock();
        let inode = volume.resolve(path, ROOT_INO)?;
        log::debug!("getattr {path:?} -> inode {}", inode.ino);

        Ok(Attributes::from(&inode))
    }

    pub fn list_directory(&self, path: &str) -> Result<Vec<DirItem>> {
        let volume = self.volume.lock();
        let dir = volume.resolve(path, ROOT_INO)?;
        let items = volume
            .entries(&dir)?
            .into_iter()
            .map(|entry| DirItem {
                name: entry.name().into_owned(),
                ino: entry.ino(),
            })
            .collect();

        Ok(items)
    }

    /// 确认路径指向普通文件，返回其 inode ID
    pub fn open_file(&self, path: &str) -> Result<u32> {
        let inode = self.volume.lock().resolve(path, ROOT_INO)?;
        if inode.is_dir() {
            return Err(Error::IsADirectory);
        }

        Ok(inode.ino)
    }

    /// 确认路径指向目录，返回其 inode ID
    pub fn open_directory(&self, path: &str) -> Result<u32> {
        let inode = self.volume.lock().resolve(path, ROOT_INO)?;
        if !inode.is_dir() {
            return Err(Error::NotADirectory);
        }

        Ok(inode.ino)
    }

    /// 创建目录，其中 `..` 指向父目录
    pub fn make_directory(&self, path: &str, mode: u32) -> Result<()> {
        let (parent_path, name) = split(path)?;
        let mut volume = self.volume.lock();
        // `.` 与 `..` 所需的块数，块内只放得下一个目录项时为 2
        let dir_blocks = 2u32.div_ceil((volume.block_size() / DirEntry::SIZE) as u32);
        let mut parent = Self::creation_parent(&volume, parent_path, name, dir_blocks)?;

        let ino = volume.alloc_inode()?;
        let mut inode = DiskInode::new(
            ino,
            DiskInodeKind::Directory,
            StatKind::DIR as u32 | (mode & PERM_MASK),
            volume.owner(),
            now(),
        );
        volume.init_dir(&mut inode, parent.ino)?;

        // 子目录的 `..` 也是父目录的一个链接，随目录项一起写回
        parent.set_links(parent.link + 1);
        volume.add_entry(&mut parent, ino, name)?;
        log::debug!("mkdir {path:?} -> inode {ino}");

        Ok(())
    }

    /// 创建空的普通文件
    pub fn create_file(&self, path: &str, mode: u32) -> Result<()> {
        let (parent_path, name) = split(path)?;
        let mut volume = self.volume.lock();
        let mut parent = Self::creation_parent(&volume, parent_path, name, 0)?;

        let ino = volume.alloc_inode()?;
        let inode = DiskInode::new(
            ino,
            DiskInodeKind::File,
            StatKind::FILE as u32 | (mode & PERM_MASK),
            volume.owner(),
            now(),
        );
        volume.write_inode(&inode)?;
        volume.add_entry(&mut parent, ino, name)?;
        log::debug!("create {path:?} -> inode {ino}");

        Ok(())
    }

    /// 从 `offset` 起读出至多 `len` 字节，读到文件末尾为止。
    /// 文件内未分配数据块的部分读出为 0。
    pub fn read_data(&self, path: &str, offset: u64, len: usize) -> Result<Vec<u8>> {
        let volume = self.volume.lock();
        let inode = volume.resolve(path, ROOT_INO)?;
        if inode.is_dir() {
            return Err(Error::IsADirectory);
        }

        let size = inode.size as u64;
        if offset >= size || len == 0 {
            return Ok(Vec::new());
        }
        let block_size = volume.block_size();
        let mut start = offset as usize;
        let end = offset.saturating_add(len as u64).min(size) as usize;

        let mut data = Vec::with_capacity(end - start);
        while start < end {
            // 当前块的逻辑索引
            let block_index = start / block_size;
            let current_block_end = ((block_index + 1) * block_size).min(end);
            let in_block = start % block_size..start % block_size + (current_block_end - start);

            match inode.direct[block_index] {
                0 => data.resize(data.len() + in_block.len(), 0),
                block_id => data.extend_from_slice(&volume.read_block(block_id)?[in_block]),
            }
            start = current_block_end;
        }
        log::debug!("read {path:?}: {} bytes at {offset}", data.len());

        Ok(data)
    }

    /// 从 `offset` 起写入 `buf`，按需分配数据块，返回写入的字节数。
    ///
    /// 写入范围越过 `DIRECT_COUNT * 块大小` 时返回 [`Error::CapacityExceeded`]，
    /// 空闲数据块不足时返回 [`Error::Exhausted`]，两者都在写入任何数据之前判定。
    pub fn write_data(&self, path: &str, offset: u64, buf: &[u8]) -> Result<usize> {
        let mut volume = self.volume.lock();
        let mut inode = volume.resolve(path, ROOT_INO)?;
        if inode.is_dir() {
            return Err(Error::IsADirectory);
        }
        if buf.is_empty() {
            return Ok(0);
        }

        let block_size = volume.block_size();
        let capacity = (DIRECT_COUNT * block_size) as u64;
        let end = offset
            .checked_add(buf.len() as u64)
            .filter(|&end| end <= capacity)
            .ok_or(Error::CapacityExceeded)? as usize;
        let mut start = offset as usize;

        let first_block = start / block_size;
        let last_block = (end - 1) / block_size;
        let missing = inode.direct[first_block..=last_block]
            .iter()
            .filter(|&&block_id| block_id == 0)
            .count();
        if missing > volume.free_data() as usize {
            return Err(Error::Exhausted);
        }

        let mut written = 0;
        while start < end {
            let block_index = start / block_size;
            let current_block_end = ((block_index + 1) * block_size).min(end);
            let block_write_size = current_block_end - start;
            let in_block = start % block_size;

            let (block_id, mut block) = match inode.direct[block_index] {
                0 => {
                    let block_id = volume.alloc_data()?;
                    inode.direct[block_index] = block_id;
                    (block_id, volume.zeroed_block())
                }
                // 整块覆盖时无需读出旧数据
                block_id if block_write_size == block_size => (block_id, volume.zeroed_block()),
                block_id => (block_id, volume.read_block(block_id)?),
            };
            block[in_block..in_block + block_write_size]
                .copy_from_slice(&buf[written..written + block_write_size]);
            volume.write_block(block_id, &block)?;

            written += block_write_size;
            start = current_block_end;
        }

        inode.size = inode.size.max(end as u32);
        inode.mtime = now();
        inode.ctime = inode.mtime;
        volume.write_inode(&inode)?;
        log::debug!("write {path:?}: {written} bytes at {offset}, size {}", inode.size);

        Ok(written)
    }

    /// 删除普通文件的目录项并减少链接数，不回收 inode 与数据块
    pub fn remove_file(&self, path: &str) -> Result<()> {
        let (parent_path, name) = split(path)?;
        let mut volume = self.volume.lock();
        let mut parent = volume.resolve(parent_path, ROOT_INO)?;
        let (_, entry) = volume.lookup(&parent, name)?.ok_or(Error::NotFound)?;

        let mut inode = volume.read_inode(entry.ino())?;
        if inode.is_dir() {
            return Err(Error::IsADirectory);
        }
        volume.remove_entry(&mut parent, name)?;

        inode.set_links(inode.link.saturating_sub(1));
        inode.ctime = now();
        volume.write_inode(&inode)?;
        log::debug!("unlink {path:?}: inode {} has {} links", inode.ino, inode.link);

        Ok(())
    }

    /// 删除只含 `.` 与 `..` 的目录，不回收 inode 与数据块
    pub fn remove_directory(&self, path: &str) -> Result<()> {
        let (parent_path, name) = split(path)?;
        let mut volume = self.volume.lock();
        let mut parent = volume.resolve(parent_path, ROOT_INO)?;
        let (_, entry) = volume.lookup(&parent, name)?.ok_or(Error::NotFound)?;

        let mut inode = volume.read_inode(entry.ino())?;
        if !inode.is_dir() {
            return Err(Error::NotADirectory);
        }
        let is_empty = volume
            .entries(&inode)?
            .iter()
            .all(|entry| matches!(entry.name_bytes(), b"." | b".."));
        if !is_empty {
            return Err(Error::DirectoryNotEmpty);
        }

        parent.set_links(parent.link.saturating_sub(1));
        volume.remove_entry(&mut parent, name)?;

        inode.set_links(0);
        inode.ctime = now();
        volume.write_inode(&inode)?;
        log::debug!("rmdir {path:?}: inode {}", inode.ino);

        Ok(())
    }

    /// 设置访问与修改时间
    pub fn set_times(&self, path: &str, atime: i64, mtime: i64) -> Result<()> {
        let volume = self.volume.lock();
        let mut inode = volume.resolve(path, ROOT_INO)?;
        inode.atime = atime;
        inode.mtime = mtime;
        inode.ctime = now();
        volume.write_inode(&inode)
    }
}

impl FileSystem {
    /// 在按块打开文件之前读出其开头的超级块。
    /// 文件不存在、过短或魔数不符时返回空，交由调用者格式化。
    fn read_super_block(path: &Path) -> Result<Option<SuperBlock>> {
        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                log::info!("{path:?} does not exist, formatting a new volume");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        let mut buf = [0; SuperBlock::SIZE];
        match file.read_exact(&mut buf) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                log::warn!("{path:?} is too short to hold a superblock, formatting it");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        }

        let super_block = SuperBlock::decode(&buf);
        if !super_block.is_valid() {
            log::warn!("{path:?} has magic {:#x}, formatting it", super_block.magic());
            return Ok(None);
        }

        Ok(Some(super_block))
    }

    /// 新建项之前的检查：父目录存在且是目录、名字合法且未被占用、父目录还有空间，
    /// 以及空闲的 inode 与数据块（新项自身需要 `own_blocks` 块）足够。
    /// 全部在分配之前完成，失败时卷保持不变。
    fn creation_parent(
        volume: &Volume,
        parent_path: &str,
        name: &str,
        own_blocks: u32,
    ) -> Result<DiskInode> {
        DirEntry::check_name(name)?;
        let parent = volume.resolve(parent_path, ROOT_INO)?;
        if !parent.is_dir() {
            return Err(Error::NotADirectory);
        }
        if volume.lookup(&parent, name)?.is_some() {
            return Err(Error::AlreadyExists);
        }
        let entry_blocks = volume.blocks_for_entry(&parent)?.ok_or(Error::Full)?;

        if volume.free_inodes() == 0 || volume.free_data() < own_blocks + entry_blocks {
            return Err(Error::Exhausted);
        }

        Ok(parent)
    }
}

impl From<Volume> for FileSystem {
    #[inline]
    fn from(volume: Volume) -> Self {
        Self {
            volume: Mutex::new(volume),
        }
    }
}

impl From<&DiskInode> for Attributes {
    fn from(inode: &DiskInode) -> Self {
        Self {
            ino: inode.ino,
            kind: inode.kind.into(),
            size: inode.size as u64,
            blocks: inode.data_blocks() as u64,
            uid: inode.uid,
            gid: inode.gid,
            nlink: inode.nlink,
            mode: inode.mode,
            atime: inode.atime,
            mtime: inode.mtime,
            ctime: inode.ctime,
        }
    }
}

impl From<DiskInodeKind> for StatKind {
    #[inline]
    fn from(kind: DiskInodeKind) -> Self {
        match kind {
            DiskInodeKind::Directory => Self::DIR,
            DiskInodeKind::File => Self::FILE,
        }
    }
}
