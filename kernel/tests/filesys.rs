// 持久文件系统的端到端测试: 路径解析, 建删查, 链式文件头, 落盘一致性

use std::sync::Arc;

use component::fs::{
    OpenFile, PersistBitmap, SectorDevice, FREE_MAP_SECTOR, MAX_FILE_SIZE, NUM_SECTORS,
};
use nos::fs::FileSystem;
use nos::machine::disk::DiskImage;

fn fresh_fs() -> (Arc<DiskImage>, FileSystem) {
    let disk = DiskImage::in_memory();
    let fs = FileSystem::new(disk.clone() as Arc<dyn SectorDevice>, true);
    (disk, fs)
}

fn free_sectors(disk: &Arc<DiskImage>) -> usize {
    let free_map_file = OpenFile::new(disk.clone() as Arc<dyn SectorDevice>, FREE_MAP_SECTOR);
    let mut free_map = PersistBitmap::new(NUM_SECTORS);
    free_map.fetch_from(&free_map_file);
    free_map.num_clear()
}

#[test]
fn create_then_open() {
    let (_disk, fs) = fresh_fs();

    // 没建之前打不开
    assert!(fs.open("/f.txt").is_none());
    assert!(fs.create("/f.txt", 100, false));
    let file = fs.open("/f.txt").expect("created file must open");
    assert_eq!(file.length(), 100);

    // 重名拒绝
    assert!(!fs.create("/f.txt", 10, false));
}

#[test]
fn bad_paths_are_rejected() {
    let (_disk, fs) = fresh_fs();

    assert!(!fs.create("", 10, false));
    assert!(!fs.create("/", 10, false));
    assert!(fs.open("").is_none());
    assert!(fs.open("/ghost").is_none());
    assert!(!fs.remove("/ghost"));

    // 中间分量是文件而不是目录
    assert!(fs.create("/plain", 10, false));
    assert!(!fs.create("/plain/child", 10, false));
    assert!(fs.open("/plain/child").is_none());
}

#[test]
fn directories_nest_and_protect() {
    let (_disk, fs) = fresh_fs();

    assert!(fs.create("/home", 0, true));
    assert!(fs.create("/home/user", 0, true));
    assert!(fs.create("/home/user/note", 64, false));

    assert!(fs.open("/home/user/note").is_some());
    // 目录不可按文件打开, 也不可删除
    assert!(fs.open("/home/user").is_none());
    assert!(!fs.remove("/home"));

    // 同名文件可以挂在不同目录下
    assert!(fs.create("/note", 32, false));
    assert_eq!(fs.open("/note").unwrap().length(), 32);
    assert_eq!(fs.open("/home/user/note").unwrap().length(), 64);

    fs.list("/home");
}

#[test]
fn write_then_read_round_trip() {
    let (_disk, fs) = fresh_fs();
    assert!(fs.create("/data", 1095, false));
    let file = fs.open("/data").unwrap();

    let data: Vec<u8> = (0..1095u32).map(|i| (i * 7 % 256) as u8).collect();
    assert_eq!(file.write_at(&data, 0), 1095);

    let reread = fs.open("/data").unwrap();
    let mut back = vec![0u8; 1095];
    assert_eq!(reread.read_at(&mut back, 0), 1095);
    assert_eq!(back, data);
}

// 场景: 建一个 MaxFileSize+100 的文件, 应该链出两个文件头;
// 在 MaxFileSize 偏移处写 100 个不同字节, 读回须逐字节一致
#[test]
fn files_larger_than_one_header_chain() {
    let (_disk, fs) = fresh_fs();
    assert!(fs.create("/big", MAX_FILE_SIZE + 100, false));

    let file = fs.open("/big").unwrap();
    assert_eq!(file.length(), MAX_FILE_SIZE + 100);
    assert!(
        file.header().next().is_some(),
        "a file beyond MaxFileSize must chain a second header"
    );

    let tail: Vec<u8> = (0..100u8).collect();
    assert_eq!(file.write_at(&tail, MAX_FILE_SIZE), 100);

    let mut back = vec![0u8; 100];
    assert_eq!(file.read_at(&mut back, MAX_FILE_SIZE), 100);
    assert_eq!(back, tail);
}

#[test]
fn remove_returns_every_sector_to_the_free_map() {
    let (disk, fs) = fresh_fs();
    let baseline = free_sectors(&disk);

    assert!(fs.create("/big", MAX_FILE_SIZE + 100, false));
    assert!(free_sectors(&disk) < baseline);

    assert!(fs.remove("/big"));
    assert_eq!(free_sectors(&disk), baseline);

    // 空间可以整体重用
    assert!(fs.create("/big", MAX_FILE_SIZE + 100, false));
    assert!(fs.remove("/big"));
    assert_eq!(free_sectors(&disk), baseline);
}

#[test]
fn image_survives_a_reboot() {
    let path = std::env::temp_dir().join(format!(
        "nos-disk-reboot-{}-{:?}",
        std::process::id(),
        std::thread::current().id()
    ));
    let _ = std::fs::remove_file(&path);

    let data: Vec<u8> = (0..300u32).map(|i| (i % 251) as u8).collect();
    {
        let disk = DiskImage::open(&path).unwrap();
        let fs = FileSystem::new(disk as Arc<dyn SectorDevice>, true);
        assert!(fs.create("/persist", 300, false));
        let file = fs.open("/persist").unwrap();
        assert_eq!(file.write_at(&data, 0), 300);
    }

    // 重新挂载, 不格式化
    let disk = DiskImage::open(&path).unwrap();
    let fs = FileSystem::new(disk as Arc<dyn SectorDevice>, false);
    let file = fs.open("/persist").expect("file must survive a reboot");
    let mut back = vec![0u8; 300];
    assert_eq!(file.read_at(&mut back, 0), 300);
    assert_eq!(back, data);

    let _ = std::fs::remove_file(&path);
}

#[test]
fn put_imports_a_host_file() {
    let (_disk, fs) = fresh_fs();

    let host_path = std::env::temp_dir().join(format!(
        "nos-put-{}-{:?}",
        std::process::id(),
        std::thread::current().id()
    ));
    let payload = b"imported from the host file system".to_vec();
    std::fs::write(&host_path, &payload).unwrap();

    assert!(fs.put(&host_path, "/imported"));
    let file = fs.open("/imported").unwrap();
    assert_eq!(file.length(), payload.len());
    let mut back = vec![0u8; payload.len()];
    assert_eq!(file.read_at(&mut back, 0), payload.len());
    assert_eq!(back, payload);

    fs.print_file("/imported");
    let _ = std::fs::remove_file(&host_path);
}
