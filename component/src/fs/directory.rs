use super::{get_i32, put_i32, OpenFile, DIR_ENTRY_SIZE, FILE_NAME_MAX_LEN};

// 目录: 定长目录项表, 本身作为一个普通文件存储
pub struct DirectoryEntry {
    in_use: bool,
    is_dir: bool,
    // 该文件(或子目录)文件头所在扇区
    sector: i32,
    // NUL 填充
    name: [u8; FILE_NAME_MAX_LEN + 1],
}

impl DirectoryEntry {
    fn empty() -> Self {
        Self {
            in_use: false,
            is_dir: false,
            sector: -1,
            name: [0; FILE_NAME_MAX_LEN + 1],
        }
    }

    fn name_str(&self) -> &str {
        let end = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.name.len());
        core::str::from_utf8(&self.name[..end]).unwrap_or("")
    }
}

pub struct Directory {
    table: Vec<DirectoryEntry>,
}

impl Directory {
    pub fn new(size: usize) -> Self {
        Self {
            table: (0..size).map(|_| DirectoryEntry::empty()).collect(),
        }
    }

    pub fn fetch_from(&mut self, file: &OpenFile) {
        let mut buf = vec![0u8; self.table.len() * DIR_ENTRY_SIZE];
        file.read_at(&mut buf, 0);
        for (i, entry) in self.table.iter_mut().enumerate() {
            let base = i * DIR_ENTRY_SIZE;
            entry.in_use = get_i32(&buf, base) != 0;
            entry.is_dir = get_i32(&buf, base + 4) != 0;
            entry.sector = get_i32(&buf, base + 8);
            entry.name.copy_from_slice(&buf[base + 12..base + DIR_ENTRY_SIZE]);
        }
    }

    pub fn write_back(&self, file: &OpenFile) {
        let mut buf = vec![0u8; self.table.len() * DIR_ENTRY_SIZE];
        for (i, entry) in self.table.iter().enumerate() {
            let base = i * DIR_ENTRY_SIZE;
            put_i32(&mut buf, base, entry.in_use as i32);
            put_i32(&mut buf, base + 4, entry.is_dir as i32);
            put_i32(&mut buf, base + 8, entry.sector);
            buf[base + 12..base + DIR_ENTRY_SIZE].copy_from_slice(&entry.name);
        }
        file.write_at(&buf, 0);
    }

    // 名字超过 FILE_NAME_MAX_LEN 的部分被截断, 查找与存储同规则,
    // 所以长名字可用, 只是前缀相同的名字会相互碰撞
    fn clip(name: &str) -> &[u8] {
        &name.as_bytes()[..name.len().min(FILE_NAME_MAX_LEN)]
    }

    fn find_index(&self, name: &str) -> Option<usize> {
        let clipped = Self::clip(name);
        self.table
            .iter()
            .position(|entry| entry.in_use && entry.name_str().as_bytes() == clipped)
    }

    /// 按名字查文件头扇区
    pub fn find(&self, name: &str) -> Option<usize> {
        self.find_index(name).map(|i| self.table[i].sector as usize)
    }

    pub fn is_dir(&self, name: &str) -> bool {
        match self.find_index(name) {
            Some(i) => self.table[i].is_dir,
            None => false,
        }
    }

    /// 登记一个新名字, 重名或目录已满返回 false
    pub fn add(&mut self, name: &str, sector: usize, is_dir: bool) -> bool {
        if self.find_index(name).is_some() {
            return false;
        }

        let clipped = Self::clip(name);
        match self.table.iter().position(|entry| !entry.in_use) {
            Some(i) => {
                let entry = &mut self.table[i];
                entry.in_use = true;
                entry.is_dir = is_dir;
                entry.sector = sector as i32;
                entry.name = [0; FILE_NAME_MAX_LEN + 1];
                entry.name[..clipped.len()].copy_from_slice(clipped);
                true
            }
            None => false, // 目录满
        }
    }

    pub fn remove(&mut self, name: &str) -> bool {
        match self.find_index(name) {
            Some(i) => {
                self.table[i].in_use = false;
                true
            }
            None => false,
        }
    }

    /// (name, is_dir, sector) 列表, 供 ls / 打印使用
    pub fn entries(&self) -> impl Iterator<Item = (&str, bool, usize)> {
        self.table
            .iter()
            .filter(|entry| entry.in_use)
            .map(|entry| (entry.name_str(), entry.is_dir, entry.sector as usize))
    }
}
