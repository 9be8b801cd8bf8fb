use core::cmp::min;

use super::{get_i32, put_i32, SectorDevice, MAX_FILE_SIZE, NUM_DIRECT, SECTOR_SIZE};
use crate::bitmap::Bitmap;

// 文件头(类似 inode), 恰好占一个扇区:
// num_bytes(i32) | num_sectors(i32) | next_sector(i32) | data_sectors[NUM_DIRECT]
//
// 超过 MAX_FILE_SIZE 的文件通过 next_sector 链出下一个文件头,
// 内存中链节点由前驱所有, 磁盘上以 next_sector == -1 结束
pub struct FileHeader {
    num_bytes: i32,
    num_sectors: i32,
    next_sector: i32,
    data_sectors: [i32; NUM_DIRECT],
    next: Option<Box<FileHeader>>,
}

impl FileHeader {
    pub fn new() -> Self {
        Self {
            num_bytes: -1,
            num_sectors: -1,
            next_sector: -1,
            data_sectors: [0; NUM_DIRECT],
            next: None,
        }
    }

    /// 为新文件分配数据扇区, 空间不足返回 false
    /// (调用方负责回滚, 见内核文件系统的 create)
    pub fn allocate(&mut self, free_map: &mut Bitmap, file_size: usize) -> bool {
        let num_total_sectors = (file_size + SECTOR_SIZE - 1) / SECTOR_SIZE;
        let want = min(num_total_sectors, NUM_DIRECT);
        self.num_bytes = min(file_size, MAX_FILE_SIZE) as i32;
        // num_sectors 随实际占用推进, 失败时 deallocate 才能只回滚拿到手的部分
        self.num_sectors = 0;

        if free_map.num_clear() < want {
            return false; // not enough space
        }

        for i in 0..want {
            match free_map.find_and_set() {
                Some(sector) => {
                    self.data_sectors[i] = sector as i32;
                    self.num_sectors += 1;
                }
                None => return false,
            }
        }

        if num_total_sectors > NUM_DIRECT {
            // 剩余部分挂到下一个文件头
            match free_map.find_and_set() {
                Some(sector) => {
                    logger::debug!("Allocate next part of file header: {}", sector);
                    self.next_sector = sector as i32;
                    let mut next = Box::new(FileHeader::new());
                    let ok = next.allocate(free_map, file_size - MAX_FILE_SIZE);
                    self.next = Some(next);
                    ok
                }
                None => false,
            }
        } else {
            true
        }
    }

    /// 归还整条链占用的数据扇区与链上的头扇区
    /// (链首的头扇区由目录层负责归还)
    pub fn deallocate(&mut self, free_map: &mut Bitmap) {
        if let Some(next) = self.next.as_mut() {
            logger::debug!("Deallocate next part of file header: {}", self.next_sector);
            next.deallocate(free_map);
        }
        if self.next_sector != -1 {
            free_map.clear(self.next_sector as usize);
        }

        for i in 0..self.num_sectors as usize {
            // clear 内部断言该位确实处于占用状态
            free_map.clear(self.data_sectors[i] as usize);
        }
    }

    /// 从磁盘读入整条文件头链
    pub fn fetch_from(&mut self, dev: &dyn SectorDevice, sector: usize) {
        logger::debug!("Fetch file header data from sector: {}", sector);
        let mut buf = [0u8; SECTOR_SIZE];
        dev.read_sector(sector, &mut buf);
        self.read_fields(&buf);

        // 链的展开采用迭代, 防止超长文件压爆调用栈
        let mut tail: &mut FileHeader = self;
        while tail.next_sector != -1 {
            let mut hdr = FileHeader::new();
            let mut buf = [0u8; SECTOR_SIZE];
            dev.read_sector(tail.next_sector as usize, &mut buf);
            hdr.read_fields(&buf);
            tail.next = Some(Box::new(hdr));
            tail = tail.next.as_deref_mut().unwrap();
        }
    }

    /// 把整条链写回磁盘
    pub fn write_back(&self, dev: &dyn SectorDevice, sector: usize) {
        logger::debug!("Write file header to sector: {}", sector);
        let mut cur: &FileHeader = self;
        let mut sec = sector;
        loop {
            let mut buf = [0u8; SECTOR_SIZE];
            cur.write_fields(&mut buf);
            dev.write_sector(sec, &buf);

            if cur.next_sector == -1 {
                break;
            }
            sec = cur.next_sector as usize;
            cur = cur.next.as_deref().expect("chained header missing in memory");
        }
    }

    /// 文件内偏移 -> 所在扇区号
    pub fn byte_to_sector(&self, offset: usize) -> usize {
        let mut cur: &FileHeader = self;
        let mut off = offset;
        while off >= MAX_FILE_SIZE {
            cur = cur.next.as_deref().expect("offset beyond file header chain");
            off -= MAX_FILE_SIZE;
        }
        cur.data_sectors[off / SECTOR_SIZE] as usize
    }

    /// 逻辑文件长度 = 链上各头 num_bytes 之和
    pub fn file_length(&self) -> usize {
        let mut total = 0usize;
        let mut cur = Some(self);
        while let Some(hdr) = cur {
            total += hdr.num_bytes as usize;
            cur = hdr.next.as_deref();
        }
        total
    }

    pub fn num_sectors(&self) -> usize {
        self.num_sectors as usize
    }

    pub fn data_sector(&self, i: usize) -> usize {
        self.data_sectors[i] as usize
    }

    pub fn next(&self) -> Option<&FileHeader> {
        self.next.as_deref()
    }

    pub fn this_bytes(&self) -> usize {
        self.num_bytes as usize
    }

    fn read_fields(&mut self, buf: &[u8]) {
        self.num_bytes = get_i32(buf, 0);
        self.num_sectors = get_i32(buf, 4);
        self.next_sector = get_i32(buf, 8);
        for i in 0..self.num_sectors as usize {
            self.data_sectors[i] = get_i32(buf, 12 + i * 4);
        }
    }

    fn write_fields(&self, buf: &mut [u8]) {
        put_i32(buf, 0, self.num_bytes);
        put_i32(buf, 4, self.num_sectors);
        put_i32(buf, 8, self.next_sector);
        for i in 0..self.num_sectors as usize {
            put_i32(buf, 12 + i * 4, self.data_sectors[i]);
        }
    }
}

impl Default for FileHeader {
    fn default() -> Self {
        Self::new()
    }
}
