use core::cmp::min;
use core::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::{FileHeader, SectorDevice, SECTOR_SIZE};

// 打开的文件: 文件头 + 读写游标
// 设备句柄随文件保存, 读写时不必再把设备传来传去
//
// 文件大小在创建时就固定了, 读写都不会越过文件末尾
pub struct OpenFile {
    hdr: FileHeader,
    seek_position: AtomicUsize,
    dev: Arc<dyn SectorDevice>,
}

impl OpenFile {
    pub fn new(dev: Arc<dyn SectorDevice>, sector: usize) -> Self {
        let mut hdr = FileHeader::new();
        hdr.fetch_from(dev.as_ref(), sector);
        Self {
            hdr,
            seek_position: AtomicUsize::new(0),
            dev,
        }
    }

    pub fn length(&self) -> usize {
        self.hdr.file_length()
    }

    pub fn header(&self) -> &FileHeader {
        &self.hdr
    }

    pub fn device(&self) -> &Arc<dyn SectorDevice> {
        &self.dev
    }

    pub fn seek(&self, position: usize) {
        self.seek_position.store(position, Ordering::Relaxed);
    }

    /// 从游标处读, 游标随之推进
    pub fn read(&self, buf: &mut [u8]) -> usize {
        let position = self.seek_position.load(Ordering::Relaxed);
        let result = self.read_at(buf, position);
        self.seek_position.store(position + result, Ordering::Relaxed);
        result
    }

    /// 从游标处写, 游标随之推进
    pub fn write(&self, buf: &[u8]) -> usize {
        let position = self.seek_position.load(Ordering::Relaxed);
        let result = self.write_at(buf, position);
        self.seek_position.store(position + result, Ordering::Relaxed);
        result
    }

    /// 不动游标, 从 position 读至多 buf.len() 字节, 返回实际读到的字节数
    pub fn read_at(&self, buf: &mut [u8], position: usize) -> usize {
        let file_length = self.length();
        let mut num_bytes = buf.len();
        if num_bytes == 0 || position >= file_length {
            return 0;
        }
        if position + num_bytes > file_length {
            num_bytes = file_length - position;
        }

        let first_sector = position / SECTOR_SIZE;
        let last_sector = (position + num_bytes - 1) / SECTOR_SIZE;

        let mut sector_buf = [0u8; SECTOR_SIZE];
        let mut copied = 0usize;
        for sector_index in first_sector..=last_sector {
            let sector = self.hdr.byte_to_sector(sector_index * SECTOR_SIZE);
            self.dev.read_sector(sector, &mut sector_buf);

            let start = if sector_index == first_sector {
                position % SECTOR_SIZE
            } else {
                0
            };
            let end = min(SECTOR_SIZE, position + num_bytes - sector_index * SECTOR_SIZE);
            buf[copied..copied + (end - start)].copy_from_slice(&sector_buf[start..end]);
            copied += end - start;
        }
        num_bytes
    }

    /// 不动游标, 向 position 写至多 buf.len() 字节, 返回实际写入的字节数
    /// 文件不可扩展, 越过文件末尾的部分被截断
    pub fn write_at(&self, buf: &[u8], position: usize) -> usize {
        let file_length = self.length();
        let mut num_bytes = buf.len();
        if num_bytes == 0 || position >= file_length {
            return 0;
        }
        if position + num_bytes > file_length {
            num_bytes = file_length - position;
        }

        let first_sector = position / SECTOR_SIZE;
        let last_sector = (position + num_bytes - 1) / SECTOR_SIZE;

        let mut sector_buf = [0u8; SECTOR_SIZE];
        let mut written = 0usize;
        for sector_index in first_sector..=last_sector {
            let sector = self.hdr.byte_to_sector(sector_index * SECTOR_SIZE);

            let start = if sector_index == first_sector {
                position % SECTOR_SIZE
            } else {
                0
            };
            let end = min(SECTOR_SIZE, position + num_bytes - sector_index * SECTOR_SIZE);

            // 只覆盖扇区一部分时, 先读出原有内容
            if start != 0 || end != SECTOR_SIZE {
                self.dev.read_sector(sector, &mut sector_buf);
            }
            sector_buf[start..end].copy_from_slice(&buf[written..written + (end - start)]);
            self.dev.write_sector(sector, &sector_buf);
            written += end - start;
        }
        num_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::Bitmap;
    use crate::fs::testdev::MemDevice;
    use crate::fs::NUM_SECTORS;

    fn make_file(dev: &Arc<MemDevice>, size: usize) -> OpenFile {
        let mut free_map = Bitmap::new(NUM_SECTORS);
        free_map.mark(0); // 头扇区
        let mut hdr = FileHeader::new();
        assert!(hdr.allocate(&mut free_map, size));
        hdr.write_back(dev.as_ref(), 0);
        OpenFile::new(dev.clone() as Arc<dyn SectorDevice>, 0)
    }

    #[test]
    fn write_then_read_round_trip() {
        let dev = Arc::new(MemDevice::new());
        let file = make_file(&dev, 1095);

        let data: Vec<u8> = (0..1095u32).map(|i| (i % 251) as u8).collect();
        assert_eq!(file.write_at(&data, 0), 1095);

        let mut back = vec![0u8; 1095];
        assert_eq!(file.read_at(&mut back, 0), 1095);
        assert_eq!(back, data);
    }

    #[test]
    fn unaligned_read_and_write() {
        let dev = Arc::new(MemDevice::new());
        let file = make_file(&dev, 400);

        // 跨扇区边界的写
        let chunk = [0xabu8; 100];
        assert_eq!(file.write_at(&chunk, 100), 100);

        let mut back = [0u8; 100];
        assert_eq!(file.read_at(&mut back, 100), 100);
        assert_eq!(back, chunk);
    }

    #[test]
    fn writes_are_bounded_by_file_length() {
        let dev = Arc::new(MemDevice::new());
        let file = make_file(&dev, 100);

        let data = [1u8; 150];
        // 只有文件内的部分被写入
        assert_eq!(file.write_at(&data, 0), 100);
        assert_eq!(file.write_at(&data, 100), 0);
        assert_eq!(file.read_at(&mut [0u8; 10], 100), 0);
    }

    #[test]
    fn seek_cursor_advances() {
        let dev = Arc::new(MemDevice::new());
        let file = make_file(&dev, 64);

        assert_eq!(file.write(&[7u8; 10]), 10);
        assert_eq!(file.write(&[9u8; 10]), 10);

        file.seek(0);
        let mut back = [0u8; 20];
        assert_eq!(file.read(&mut back), 20);
        assert_eq!(&back[..10], &[7u8; 10]);
        assert_eq!(&back[10..], &[9u8; 10]);
    }
}
