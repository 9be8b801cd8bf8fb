use std::collections::VecDeque;
use std::sync::Arc;

use crate::kernel::Kernel;
use crate::sync::unicore::UPSafeCell;
use crate::thread::Thread;

// 经典计数信号量, 等待者按 FIFO 排队
pub struct Semaphore {
    name: String,
    inner: UPSafeCell<SemaphoreInner>,
}

struct SemaphoreInner {
    value: i32,
    queue: VecDeque<Arc<Thread>>,
}

impl Semaphore {
    pub fn new(name: &str, initial_value: i32) -> Self {
        assert!(initial_value >= 0);
        Self {
            name: name.to_string(),
            inner: unsafe {
                UPSafeCell::new(SemaphoreInner {
                    value: initial_value,
                    queue: VecDeque::new(),
                })
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// P: 值为 0 则睡下等待. 被唤醒后重查条件(Mesa 语义不保证醒来时值仍可用)
    pub fn p(&self, kernel: &Kernel) {
        let current = kernel.current_thread();
        let guard = kernel.intr_off();

        loop {
            let available = self.inner.exclusive_session(|i| i.value > 0);
            if available {
                break;
            }
            self.inner
                .exclusive_session(|i| i.queue.push_back(current.clone()));
            kernel.sleep_current(false);
        }
        self.inner.exclusive_session(|i| i.value -= 1);

        drop(guard);
    }

    /// V: 唤醒队首等待者(若有), 值加一
    pub fn v(&self, kernel: &Kernel) {
        let guard = kernel.intr_off();

        let head = self.inner.exclusive_session(|i| i.queue.pop_front());
        if let Some(thread) = head {
            kernel.ready_to_run(thread);
        }
        self.inner.exclusive_session(|i| i.value += 1);

        drop(guard);
    }
}
