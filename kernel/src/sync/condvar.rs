use std::collections::VecDeque;
use std::sync::Arc;

use crate::kernel::Kernel;
use crate::sync::lock::Lock;
use crate::sync::unicore::UPSafeCell;
use crate::thread::Thread;

// Mesa 语义的条件变量: signal 只把等待者放回就绪队列,
// 等待者醒来后必须重新拿监视器锁并重查谓词(调用方用 while 包住 wait)
pub struct Condition {
    name: String,
    inner: UPSafeCell<ConditionInner>,
}

struct ConditionInner {
    wait_queue: VecDeque<Arc<Thread>>,
}

impl Condition {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            inner: unsafe {
                UPSafeCell::new(ConditionInner {
                    wait_queue: VecDeque::new(),
                })
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 原子地释放监视器锁并睡下; 醒来后重新拿锁
    pub fn wait(&self, kernel: &Kernel, condition_lock: &Arc<Lock>) {
        assert!(
            condition_lock.is_held_by_current(kernel),
            "Condition::wait without holding the monitor lock"
        );
        let current = kernel.current_thread();

        let guard = kernel.intr_off();
        self.inner
            .exclusive_session(|i| i.wait_queue.push_back(current));
        condition_lock.release(kernel);
        kernel.sleep_current(false);
        drop(guard);

        condition_lock.acquire(kernel);
    }

    /// 唤醒队首等待者(若有). 调用方必须持有监视器锁
    pub fn signal(&self, kernel: &Kernel, condition_lock: &Arc<Lock>) {
        assert!(
            condition_lock.is_held_by_current(kernel),
            "Condition::signal without holding the monitor lock"
        );

        let guard = kernel.intr_off();
        let head = self.inner.exclusive_session(|i| i.wait_queue.pop_front());
        if let Some(thread) = head {
            kernel.ready_to_run(thread);
        }
        drop(guard);
    }

    /// 唤醒所有等待者
    pub fn broadcast(&self, kernel: &Kernel, condition_lock: &Arc<Lock>) {
        while !self.inner.exclusive_session(|i| i.wait_queue.is_empty()) {
            self.signal(kernel, condition_lock);
        }
    }
}
