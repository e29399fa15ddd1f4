//! # 路径解析层

use crate::layout::DiskInode;
use crate::volume::Volume;
use crate::{Error, ROOT_INO, Result};

impl Volume {
    /// 从 `start` 出发，沿 `/` 分隔的路径逐级查找目标 inode。
    ///
    /// 路径恰为 `/` 时直接返回根目录；空的路径分量会被跳过。
    /// 用循环而非递归，栈的使用与路径深度无关。
    pub fn resolve(&self, path: &str, start: u32) -> Result<DiskInode> {
        if path == "/" {
            return self.read_inode(ROOT_INO);
        }

        let mut current = self.read_inode(start)?;
        for name in path.split('/').filter(|name| !name.is_empty()) {
            if !current.is_dir() {
                return Err(Error::NotADirectory);
            }
            let (_, entry) = self.lookup(&current, name)?.ok_or(Error::NotFound)?;
            current = self.read_inode(entry.ino())?;
        }

        Ok(current)
    }
}

/// 将路径拆分为父目录路径与最后一个分量，相当于 `dirname` 与 `basename`。
///
/// 末尾的 `/` 会被忽略；没有最后一个分量（如 `/`）或最后一个分量为 `.`、`..` 时
/// 返回 [`Error::InvalidName`]。
pub fn split(path: &str) -> Result<(&str, &str)> {
    let trimmed = path.trim_end_matches('/');

    let (parent, name) = match trimmed.rfind('/') {
        Some(pos) => {
            let parent = trimmed[..pos].trim_end_matches('/');
            (if parent.is_empty() { "/" } else { parent }, &trimmed[pos + 1..])
        }
        None => ("", trimmed),
    };

    if name.is_empty() || name == "." || name == ".." {
        return Err(Error::InvalidName);
    }

    Ok((parent, name))
}
