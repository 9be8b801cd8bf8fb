use core::sync::atomic::{AtomicUsize, Ordering};
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

use component::fs::{SectorDevice, NUM_SECTORS, SECTOR_SIZE};
use logger::info;
use spin::Mutex;

// 扇区级磁盘映像. 原始磁盘模拟器属于外部协作者,
// 这里提供它的同步包装面貌: 定长扇区的读写, 立即完成
//
// 整盘驻留内存; 有宿主文件时写操作直写回文件
pub struct DiskImage {
    inner: Mutex<DiskInner>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

struct DiskInner {
    sectors: Vec<u8>,
    backing: Option<std::fs::File>,
}

impl DiskImage {
    /// 打开(或新建全零的)磁盘映像文件
    pub fn open(path: &Path) -> std::io::Result<Arc<DiskImage>> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        let mut sectors = vec![0u8; NUM_SECTORS * SECTOR_SIZE];
        let len = file.metadata()?.len() as usize;
        if len == 0 {
            info!("creating fresh disk image: {}", path.display());
            file.write_all(&sectors)?;
        } else {
            file.seek(SeekFrom::Start(0))?;
            file.read_exact(&mut sectors)?;
        }

        Ok(Arc::new(Self {
            inner: Mutex::new(DiskInner {
                sectors,
                backing: Some(file),
            }),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }))
    }

    /// 无宿主文件的内存盘, 测试专用
    pub fn in_memory() -> Arc<DiskImage> {
        Arc::new(Self {
            inner: Mutex::new(DiskInner {
                sectors: vec![0u8; NUM_SECTORS * SECTOR_SIZE],
                backing: None,
            }),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        })
    }

    pub fn num_reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn num_writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

impl SectorDevice for DiskImage {
    fn read_sector(&self, sector: usize, buf: &mut [u8]) {
        assert!(sector < NUM_SECTORS, "sector {} out of range", sector);
        assert_eq!(buf.len(), SECTOR_SIZE);
        self.reads.fetch_add(1, Ordering::Relaxed);

        let inner = self.inner.lock();
        buf.copy_from_slice(&inner.sectors[sector * SECTOR_SIZE..(sector + 1) * SECTOR_SIZE]);
    }

    fn write_sector(&self, sector: usize, buf: &[u8]) {
        assert!(sector < NUM_SECTORS, "sector {} out of range", sector);
        assert_eq!(buf.len(), SECTOR_SIZE);
        self.writes.fetch_add(1, Ordering::Relaxed);

        let mut inner = self.inner.lock();
        inner.sectors[sector * SECTOR_SIZE..(sector + 1) * SECTOR_SIZE].copy_from_slice(buf);

        // 直写宿主文件, 保证映像跨次启动可见
        if let Some(file) = inner.backing.as_mut() {
            let _ = file.seek(SeekFrom::Start((sector * SECTOR_SIZE) as u64));
            let _ = file.write_all(buf);
        }
    }
}
