use std::sync::Arc;

use component::fs::OpenFile;
use sys_interface::config::MAX_NUM_USER_OPEN_FILES;

// 线程私有的打开文件表, 定长. 文件描述符即下标
pub struct OpenFileTable {
    entries: [Option<Arc<OpenFile>>; MAX_NUM_USER_OPEN_FILES],
}

impl OpenFileTable {
    pub fn new() -> Self {
        Self {
            entries: std::array::from_fn(|_| None),
        }
    }

    /// 分配最小的空闲描述符, 表满返回 None
    pub fn add(&mut self, file: Arc<OpenFile>) -> Option<usize> {
        match self.entries.iter().position(|e| e.is_none()) {
            Some(fd) => {
                self.entries[fd] = Some(file);
                Some(fd)
            }
            None => None,
        }
    }

    /// 释放描述符, 底下的句柄随之丢弃
    pub fn remove(&mut self, fd: i32) -> bool {
        if fd < 0 || fd as usize >= MAX_NUM_USER_OPEN_FILES {
            return false;
        }
        self.entries[fd as usize].take().is_some()
    }

    pub fn get(&self, fd: i32) -> Option<Arc<OpenFile>> {
        if fd < 0 || fd as usize >= MAX_NUM_USER_OPEN_FILES {
            return None;
        }
        self.entries[fd as usize].clone()
    }

    pub fn clear(&mut self) {
        self.entries.iter_mut().for_each(|e| *e = None);
    }
}

impl Default for OpenFileTable {
    fn default() -> Self {
        Self::new()
    }
}
