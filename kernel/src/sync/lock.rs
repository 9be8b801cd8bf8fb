use std::collections::VecDeque;
use std::sync::Arc;

use logger::debug;

use crate::kernel::Kernel;
use crate::sync::unicore::UPSafeCell;
use crate::thread::Thread;

// 互斥锁, 带优先级捐赠:
// 获取失败的线程先把有效优先级捐给持有者, 再挂到等待队列上.
// 约定只有持有者可以释放
pub struct Lock {
    name: String,
    inner: UPSafeCell<LockInner>,
}

struct LockInner {
    locked: bool,
    holder: Option<Arc<Thread>>,
    wait_queue: VecDeque<Arc<Thread>>,
}

impl Lock {
    pub fn new(name: &str) -> Arc<Lock> {
        Arc::new(Lock {
            name: name.to_string(),
            inner: unsafe {
                UPSafeCell::new(LockInner {
                    locked: false,
                    holder: None,
                    wait_queue: VecDeque::new(),
                })
            },
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_held_by_current(&self, kernel: &Kernel) -> bool {
        let current = kernel.current_thread();
        self.inner.exclusive_session(|i| {
            i.holder
                .as_ref()
                .map_or(false, |h| Arc::ptr_eq(h, &current))
        })
    }

    pub(crate) fn holder(&self) -> Option<Arc<Thread>> {
        self.inner.exclusive_session(|i| i.holder.clone())
    }

    pub fn acquire(self: &Arc<Self>, kernel: &Kernel) {
        // 持有者重入非法
        assert!(
            !self.is_held_by_current(kernel),
            "lock {} re-acquired by its holder",
            self.name
        );

        let current = kernel.current_thread();
        let guard = kernel.intr_off();

        loop {
            let locked = self.inner.exclusive_session(|i| i.locked);
            if !locked {
                break;
            }

            // 先捐优先级, 再记下自己在等谁, 然后睡
            self.donate_priority_to_lock_holder(kernel, &current);
            current.set_desired_lock(Arc::downgrade(self));
            self.inner
                .exclusive_session(|i| i.wait_queue.push_back(current.clone()));
            kernel.sleep_current(false);
        }

        self.inner.exclusive_session(|i| {
            i.locked = true;
            i.holder = Some(current.clone());
        });
        current.reset_desired_lock();

        debug!("Lock: {} is held by {}", self.name, current.name());
        drop(guard);
    }

    pub fn release(&self, kernel: &Kernel) {
        {
            let inner = self.inner.exclusive_access();
            assert!(inner.locked);
        }
        assert!(
            self.is_held_by_current(kernel),
            "lock {} released by a non-holder",
            self.name
        );

        let guard = kernel.intr_off();

        let was_donated = self.clean_donated_priority(kernel);

        // 整个等待队列全部唤醒, 谁先上台由调度策略裁决
        // (与逐个唤醒的约定相悖, 但这是参考行为, 保留)
        loop {
            let head = self.inner.exclusive_session(|i| i.wait_queue.pop_front());
            match head {
                Some(thread) => kernel.ready_to_run(thread),
                None => break,
            }
        }

        self.inner.exclusive_session(|i| {
            i.holder = None;
            i.locked = false;
        });

        debug!("Lock: {} is released", self.name);
        drop(guard);

        // 曾被捐赠说明有高优先级线程等着, 立刻让出
        if kernel.is_preemptive() && was_donated {
            kernel.yield_now();
        }
    }

    pub(crate) fn donate_priority_to_lock_holder(&self, kernel: &Kernel, donor: &Arc<Thread>) {
        if let Some(holder) = self.holder() {
            kernel.donate_priority(donor, &holder);
        }
    }

    // 撤销持有者身上的捐赠, 返回它此前是否被捐赠过
    fn clean_donated_priority(&self, kernel: &Kernel) -> bool {
        let holder = self.holder().expect("lock has no holder");
        debug!(
            "Lock: {}, reset donated priority of lock holder: {}",
            self.name,
            holder.name()
        );
        kernel.reset_effective_priority(&holder)
    }
}
