use core::ops::{Deref, DerefMut};

use super::OpenFile;
use crate::bitmap::Bitmap;

/// 可持久化的位图: 空闲扇区表以普通文件的形式落盘
pub struct PersistBitmap {
    inner: Bitmap,
}

impl PersistBitmap {
    pub fn new(num_bits: usize) -> Self {
        Self {
            inner: Bitmap::new(num_bits),
        }
    }

    pub fn fetch_from(&mut self, file: &OpenFile) {
        let mut buf = vec![0u8; self.inner.byte_len()];
        file.read_at(&mut buf, 0);
        self.inner.restore_from(&buf);
    }

    pub fn write_back(&self, file: &OpenFile) {
        file.write_at(&self.inner.to_bytes(), 0);
    }
}

impl Deref for PersistBitmap {
    type Target = Bitmap;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for PersistBitmap {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}
