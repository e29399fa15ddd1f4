mod common;

use common::{mem_fs, names};
use rufs::{DirItem, Error, Geometry, Owner, StatKind};

#[test]
fn fresh_root() {
    let fs = mem_fs(Geometry::new(512, 64, 64));

    let root = fs.get_attributes("/").unwrap();
    assert_eq!(root.ino, 0);
    assert_eq!(root.kind, StatKind::DIR);
    assert_eq!(root.mode, 0o40755);
    assert_eq!(root.nlink, 2);
    assert_eq!(root.blocks, 1);

    assert_eq!(
        fs.list_directory("/").unwrap(),
        [
            DirItem { name: ".".into(), ino: 0 },
            DirItem { name: "..".into(), ino: 0 },
        ]
    );
}

#[test]
fn hello_scenario() {
    let fs = mem_fs(Geometry::new(512, 64, 64));

    fs.make_directory("/a", 0o755).unwrap();
    fs.create_file("/a/b.txt", 0o644).unwrap();
    assert_eq!(fs.write_data("/a/b.txt", 0, b"hello").unwrap(), 5);

    assert_eq!(fs.read_data("/a/b.txt", 0, 5).unwrap(), b"hello");
    let attr = fs.get_attributes("/a/b.txt").unwrap();
    assert_eq!(attr.size, 5);
    assert_eq!(attr.kind, StatKind::FILE);
    assert_eq!(attr.mode, 0o100644);
    assert_eq!(attr.nlink, 1);
    assert_eq!(attr.blocks, 1);
}

#[test]
fn directory_links() {
    let fs = mem_fs(Geometry::new(512, 64, 64));
    fs.make_directory("/a", 0o700).unwrap();
    fs.make_directory("/a/b", 0o755).unwrap();

    let a = fs.get_attributes("/a").unwrap();
    assert_eq!(a.mode, 0o40700);
    // `.`、父目录中的项、子目录的 `..`
    assert_eq!(a.nlink, 3);
    assert_eq!(fs.get_attributes("/").unwrap().nlink, 3);

    assert_eq!(names(&fs, "/a"), [".", "..", "b"]);
    let b = fs.list_directory("/a/b").unwrap();
    assert_eq!(b[0], DirItem { name: ".".into(), ino: fs.get_attributes("/a/b").unwrap().ino });
    assert_eq!(b[1], DirItem { name: "..".into(), ino: a.ino });
    assert_eq!(fs.get_attributes("/a/b/..").unwrap().ino, a.ino);
}

#[test]
fn creation_errors() {
    let fs = mem_fs(Geometry::new(512, 64, 64));
    fs.create_file("/f", 0o644).unwrap();

    assert!(matches!(fs.create_file("/f", 0o644), Err(Error::AlreadyExists)));
    assert!(matches!(fs.make_directory("/f", 0o755), Err(Error::AlreadyExists)));
    assert!(matches!(fs.create_file("/missing/x", 0o644), Err(Error::NotFound)));
    assert!(matches!(fs.create_file("/f/x", 0o644), Err(Error::NotADirectory)));
    assert!(matches!(fs.make_directory("/", 0o755), Err(Error::InvalidName)));
    assert!(matches!(
        fs.create_file(&format!("/{}", "n".repeat(121)), 0o644),
        Err(Error::NameTooLong)
    ));
    assert!(matches!(fs.get_attributes("/nope"), Err(Error::NotFound)));

    // 失败的创建不占用 inode
    assert_eq!(fs.free_space().0, 62);
}

#[test]
fn inode_exhaustion() {
    // 根目录加一个空闲 inode
    let fs = mem_fs(Geometry::new(512, 2, 64));

    fs.create_file("/first", 0o644).unwrap();
    let err = fs.create_file("/second", 0o644).unwrap_err();
    assert!(matches!(err, Error::Exhausted));
    assert_eq!(err.errno(), libc::ENOSPC);
    assert!(matches!(fs.make_directory("/dir", 0o755), Err(Error::Exhausted)));
    assert_eq!(names(&fs, "/"), [".", "..", "first"]);
}

#[test]
fn directory_full() {
    // 块大小 128：每块一个目录项，目录最多 16 项
    let fs = mem_fs(Geometry::new(128, 64, 64));

    // 根目录的 `.` 与 `..` 已占两块
    for i in 0..14 {
        fs.create_file(&format!("/f{i}"), 0o644).unwrap();
    }
    let free = fs.free_space();
    assert!(matches!(fs.create_file("/f14", 0o644), Err(Error::Full)));
    assert_eq!(fs.free_space(), free);
    assert_eq!(fs.list_directory("/").unwrap().len(), 16);
}

#[test]
fn open_checks_kind() {
    let fs = mem_fs(Geometry::new(512, 64, 64));
    fs.make_directory("/d", 0o755).unwrap();
    fs.create_file("/d/f", 0o600).unwrap();

    assert_eq!(fs.open_directory("/d").unwrap(), fs.get_attributes("/d").unwrap().ino);
    assert_eq!(fs.open_file("/d/f").unwrap(), fs.get_attributes("/d/f").unwrap().ino);
    assert!(matches!(fs.open_file("/d"), Err(Error::IsADirectory)));
    assert!(matches!(fs.open_directory("/d/f"), Err(Error::NotADirectory)));
    assert!(matches!(fs.list_directory("/d/f"), Err(Error::NotADirectory)));
    assert!(matches!(fs.open_file("/d/g"), Err(Error::NotFound)));
}

#[test]
fn owner_and_times() {
    let fs = mem_fs(Geometry::new(512, 64, 64));
    fs.set_owner(Owner { uid: 1000, gid: 100 });
    fs.create_file("/f", 0o644).unwrap();

    let attr = fs.get_attributes("/f").unwrap();
    assert_eq!((attr.uid, attr.gid), (1000, 100));
    assert!(attr.mtime > 0);

    fs.set_times("/f", 10, 20).unwrap();
    let attr = fs.get_attributes("/f").unwrap();
    assert_eq!((attr.atime, attr.mtime), (10, 20));
}

#[test]
fn remove_entries() {
    let fs = mem_fs(Geometry::new(512, 64, 64));
    fs.make_directory("/d", 0o755).unwrap();
    fs.create_file("/d/f", 0o644).unwrap();

    assert!(matches!(fs.remove_directory("/d"), Err(Error::DirectoryNotEmpty)));
    assert!(matches!(fs.remove_file("/d"), Err(Error::IsADirectory)));
    assert!(matches!(fs.remove_directory("/d/f"), Err(Error::NotADirectory)));

    let free = fs.free_space();
    fs.remove_file("/d/f").unwrap();
    assert!(matches!(fs.get_attributes("/d/f"), Err(Error::NotFound)));
    fs.remove_directory("/d").unwrap();
    assert_eq!(names(&fs, "/"), [".", ".."]);
    assert_eq!(fs.get_attributes("/").unwrap().nlink, 2);
    assert_eq!(fs.get_attributes("/").unwrap().size, 256);
    // 不回收
    assert_eq!(fs.free_space(), free);

    assert!(matches!(fs.remove_file("/d/f"), Err(Error::NotFound)));
    assert!(matches!(fs.remove_directory("/"), Err(Error::InvalidName)));

    // 名字可以再次使用
    fs.create_file("/d", 0o644).unwrap();
}
