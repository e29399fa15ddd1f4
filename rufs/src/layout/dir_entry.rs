use std::borrow::Cow;

use super::{get_u16, get_u32, put_u16, put_u32};
use crate::{Error, Result};

const NAME_MAX_LEN: usize = 120;

/// 文件系统项的元信息
///
/// 字节布局：inode ID (u32) | 有效位 (u8) | 保留 (u8) | 名字长度 (u16) | 名字
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    ino: u32,
    valid: bool,
    len: u16,
    name: [u8; NAME_MAX_LEN],
}

impl DirEntry {
    /// 元信息大小恒为128字节
    pub const SIZE: usize = 128;

    pub const NAME_MAX_LEN: usize = NAME_MAX_LEN;

    pub fn new(name: &str, ino: u32) -> Result<Self> {
        Self::check_name(name)?;
        let bytes = name.as_bytes();
        let mut buf = [0; NAME_MAX_LEN];
        buf[..bytes.len()].copy_from_slice(bytes);

        Ok(Self {
            ino,
            valid: true,
            len: bytes.len() as u16,
            name: buf,
        })
    }

    /// 名字不能为空、不能含 `/` 与 `\0`，且不超过 [`DirEntry::NAME_MAX_LEN`] 字节
    pub fn check_name(name: &str) -> Result<()> {
        if name.is_empty() || name.contains(['/', '\0']) {
            return Err(Error::InvalidName);
        }
        if name.len() > NAME_MAX_LEN {
            return Err(Error::NameTooLong);
        }

        Ok(())
    }

    #[inline]
    pub fn ino(&self) -> u32 {
        self.ino
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    #[inline]
    pub fn name_bytes(&self) -> &[u8] {
        &self.name[..self.len as usize]
    }

    pub fn name(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.name_bytes())
    }

    /// 有效且名字（长度与字节）完全一致
    #[inline]
    pub fn matches(&self, name: &str) -> bool {
        self.valid && self.name_bytes() == name.as_bytes()
    }

    #[inline]
    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    pub fn encode(&self, buf: &mut [u8]) {
        let buf = &mut buf[..Self::SIZE];
        buf.fill(0);

        put_u32(buf, 0, self.ino);
        buf[4] = self.valid as u8;
        put_u16(buf, 6, self.len);
        buf[8..].copy_from_slice(&self.name);
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let len = get_u16(buf, 6);
        if len as usize > NAME_MAX_LEN {
            return Err(Error::Corrupted("directory entry name too long"));
        }
        let mut name = [0; NAME_MAX_LEN];
        name.copy_from_slice(&buf[8..Self::SIZE]);

        Ok(Self {
            ino: get_u32(buf, 0),
            valid: buf[4] != 0,
            len,
            name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_rules() {
        assert!(matches!(DirEntry::new("", 1), Err(Error::InvalidName)));
        assert!(matches!(DirEntry::new("a/b", 1), Err(Error::InvalidName)));
        assert!(matches!(
            DirEntry::new(&"x".repeat(121), 1),
            Err(Error::NameTooLong)
        ));
        assert_eq!(DirEntry::new(&"x".repeat(120), 1).unwrap().name().len(), 120);
    }

    #[test]
    fn match_needs_exact_length() {
        let entry = DirEntry::new("abc", 3).unwrap();
        assert!(entry.matches("abc"));
        assert!(!entry.matches("ab"));
        assert!(!entry.matches("abcd"));

        let mut entry = entry;
        entry.invalidate();
        assert!(!entry.matches("abc"));
    }

    #[test]
    fn byte_layout() {
        let entry = DirEntry::new("..", 5).unwrap();
        let mut buf = [0xff; DirEntry::SIZE];
        entry.encode(&mut buf);

        assert_eq!(&buf[..8], &[5, 0, 0, 0, 1, 0, 2, 0]);
        assert_eq!(&buf[8..10], b"..");
        assert!(buf[10..].iter().all(|&b| b == 0));
        assert_eq!(DirEntry::decode(&buf).unwrap(), entry);
    }
}
