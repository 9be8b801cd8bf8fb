use std::sync::Arc;

use component::bitmap::Bitmap;

use crate::kernel::Kernel;
use crate::memory::address_space::AddrSpace;
use crate::sync::lock::Lock;
use crate::sync::unicore::UPSafeCell;

// 全局物理页帧分配器.
//
// 内核里唯一用锁而不是关中断保护的共享结构:
// 它会在开着中断的上下文(缺页路径)被访问, 而锁本身就睡得起
pub struct FrameManager {
    pub(crate) lock: Arc<Lock>,
    bitmap: UPSafeCell<Bitmap>,
}

impl FrameManager {
    pub fn new(num_frames: usize) -> Self {
        Self {
            lock: Lock::new("lock for frame management"),
            bitmap: unsafe { UPSafeCell::new(Bitmap::new(num_frames)) },
        }
    }
}

impl Kernel {
    /// 原子地申请一个空闲页帧
    pub fn acquire_frame(&self) -> Option<usize> {
        let lock = self.frame_manager.lock.clone();
        lock.acquire(self);
        let frame = self
            .frame_manager
            .bitmap
            .exclusive_session(|b| b.find_and_set());
        lock.release(self);
        frame
    }

    /// 原子地归还页帧
    pub fn release_frame(&self, ppn: usize) {
        let lock = self.frame_manager.lock.clone();
        lock.acquire(self);
        self.frame_manager
            .bitmap
            .exclusive_session(|b| b.clear(ppn));
        lock.release(self);
    }

    pub fn num_avail_frames(&self) -> usize {
        let lock = self.frame_manager.lock.clone();
        lock.acquire(self);
        let avail = self
            .frame_manager
            .bitmap
            .exclusive_session(|b| b.num_clear());
        lock.release(self);
        avail
    }

    /// 线程销毁时归还其地址空间占用的全部页帧, 并抹掉核心映射里的属主
    pub(crate) fn reclaim_space(&self, space: &Arc<AddrSpace>) {
        for ppn in space.resident_frames() {
            self.core_map.exclusive_session(|m| m.forget(ppn));
            self.release_frame(ppn);
        }
    }
}
