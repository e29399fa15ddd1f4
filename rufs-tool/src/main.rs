mod cli;

use std::fs;
use std::io::{self, Write};
use std::sync::Arc;

use clap::Parser;
use rufs::{BlockFile, Error, FileSystem, Geometry, StatKind, SuperBlock};
use typed_bytesize::ByteSizeIec;

pub use self::cli::{Cli, Command};

fn main() -> rufs::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let geometry = Geometry::from(&cli.geometry);
    log::info!("image={:?}", cli.image);

    let fs = match cli.command {
        Command::Mkfs => {
            geometry.validate()?;
            let blocks = SuperBlock::new(&geometry).total_blocks();
            let image = BlockFile::create(&cli.image, geometry.block_size, blocks)?;
            FileSystem::format(Arc::new(image), geometry)?
        }
        _ => FileSystem::mount(&cli.image, geometry)?,
    };

    execute(&fs, cli.command)?;
    fs.unmount()
}

fn execute(fs: &FileSystem, command: Command) -> rufs::Result<()> {
    match command {
        Command::Mkfs => {
            let geometry = fs.geometry();
            let blocks = SuperBlock::new(&geometry).total_blocks();
            println!(
                "{} image: {} inodes, {} data blocks of {} bytes",
                ByteSizeIec((blocks * geometry.block_size) as u64),
                geometry.max_inodes,
                geometry.max_blocks,
                geometry.block_size,
            );
        }
        Command::Pack { source, dir } => {
            if fs.open_directory(&dir).is_err() {
                fs.make_directory(&dir, 0o755)?;
            }

            for entry in fs::read_dir(&source)? {
                let entry = entry?;
                if !entry.file_type()?.is_file() {
                    continue;
                }
                let Ok(name) = entry.file_name().into_string() else {
                    log::warn!("skipping non-UTF-8 name {:?}", entry.file_name());
                    continue;
                };

                let data = fs::read(entry.path())?;
                let path = join(&dir, &name);
                fs.create_file(&path, host_mode(&entry.metadata()?))?;
                fs.write_data(&path, 0, &data)?;
                log::info!("packed {path:?}: {} bytes", data.len());
            }

            let (inodes, blocks) = fs.free_space();
            println!("{inodes} inodes and {blocks} data blocks left");
        }
        Command::Ls { path } => {
            for item in fs.list_directory(&path)? {
                let attr = fs.get_attributes(&join(&path, &item.name))?;
                let kind = if attr.kind == StatKind::DIR { 'd' } else { '-' };
                println!(
                    "{kind}{:04o} {:>3} {:>5} {:>5} {:>10} {}",
                    attr.mode & 0o7777,
                    attr.nlink,
                    attr.uid,
                    attr.gid,
                    attr.size,
                    item.name,
                );
            }
        }
        Command::Stat { path } => {
            let attr = fs.get_attributes(&path)?;
            println!("  File: {path}");
            println!(
                "  Size: {:<10} Blocks: {:<6} {:?}",
                attr.size, attr.blocks, attr.kind
            );
            println!("Inode: {:<10} Links: {}", attr.ino, attr.nlink);
            println!(
                " Mode: {:#o}  Uid: {}  Gid: {}",
                attr.mode, attr.uid, attr.gid
            );
            println!("Access: {}\nModify: {}\nChange: {}", attr.atime, attr.mtime, attr.ctime);
        }
        Command::Mkdir { path, mode } => fs.make_directory(&path, mode)?,
        Command::Touch { path, mode } => match fs.create_file(&path, mode) {
            Err(Error::AlreadyExists) => {
                let now = now();
                fs.set_times(&path, now, now)?;
            }
            created => created?,
        },
        Command::Put { host, path, offset } => {
            let data = fs::read(&host)?;
            if let Err(Error::NotFound) = fs.open_file(&path) {
                fs.create_file(&path, 0o644)?;
            }
            let written = fs.write_data(&path, offset, &data)?;
            println!("{written} bytes written to {path}");
        }
        Command::Cat { path } => {
            let size = fs.get_attributes(&path)?.size;
            let data = fs.read_data(&path, 0, size as usize)?;
            io::stdout().write_all(&data)?;
        }
        Command::Rm { path } => fs.remove_file(&path)?,
        Command::Rmdir { path } => fs.remove_directory(&path)?,
    }

    Ok(())
}

fn join(dir: &str, name: &str) -> String {
    format!("{}/{name}", dir.trim_end_matches('/'))
}

#[cfg(unix)]
fn host_mode(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;

    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn host_mode(metadata: &fs::Metadata) -> u32 {
    if metadata.permissions().readonly() { 0o444 } else { 0o644 }
}

fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_paths() {
        assert_eq!(join("/", "a"), "/a");
        assert_eq!(join("/usr/bin/", "ls"), "/usr/bin/ls");
        assert_eq!(join("/usr", "ls"), "/usr/ls");
    }

    #[test]
    fn pack_and_read_back() {
        let source = tempfile::tempdir().unwrap();
        fs::write(source.path().join("hello.txt"), b"hello").unwrap();
        fs::write(source.path().join("empty"), b"").unwrap();
        fs::create_dir(source.path().join("nested")).unwrap();

        let image = source.path().join("nested/fs.img");
        let fs = FileSystem::mount(&image, Geometry::new(512, 32, 64)).unwrap();
        execute(
            &fs,
            Command::Pack {
                source: source.path().to_owned(),
                dir: "/usr/bin".into(),
            },
        )
        .unwrap_err();

        execute(&fs, Command::Mkdir { path: "/usr".into(), mode: 0o755 }).unwrap();
        execute(
            &fs,
            Command::Pack {
                source: source.path().to_owned(),
                dir: "/usr/bin".into(),
            },
        )
        .unwrap();

        assert_eq!(fs.read_data("/usr/bin/hello.txt", 0, 64).unwrap(), b"hello");
        assert_eq!(fs.get_attributes("/usr/bin/empty").unwrap().size, 0);
        assert!(matches!(fs.get_attributes("/usr/bin/nested"), Err(Error::NotFound)));
        fs.unmount().unwrap();
    }
}
