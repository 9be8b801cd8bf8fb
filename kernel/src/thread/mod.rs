pub mod fd_table;
pub(crate) mod gate;
pub mod scheduler;

use core::cell::RefMut;
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

use logger::debug;

use crate::interrupt::IntStatus;
use crate::kernel::Kernel;
use crate::machine::NUM_TOTAL_REGS;
use crate::memory::address_space::AddrSpace;
use crate::sync::condvar::Condition;
use crate::sync::lock::Lock;
use crate::sync::unicore::UPSafeCell;
use crate::thread::fd_table::OpenFileTable;
use crate::thread::gate::DispatchGate;
use crate::{BURST_ALPHA, INITIAL_BURST, MAX_PRIORITY, STACK_FENCEPOST, STACK_WORDS};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ThreadStatus {
    JustCreated,
    Ready,
    Running,
    Blocked,
}

// 线程控制块.
// 不变式: 全机同一时刻只有一个线程处于 Running, 且就是内核的 current 指针所指
pub struct Thread {
    name: String,
    joinable: bool,
    // 宿主线程的停车位
    pub(crate) gate: DispatchGate,

    // Finish/Join 三条件变量握手, 保证析构发生在别人的栈上
    pub(crate) join_lock: Arc<Lock>,
    pub(crate) join_wait: Condition,
    pub(crate) finish_wait: Condition,
    pub(crate) delete_wait: Condition,

    inner: UPSafeCell<ThreadInner>,
}

pub struct ThreadInner {
    pub status: ThreadStatus,

    // 基础优先级 0..=7, 7 最高
    pub priority: i32,
    // 捐赠格: 生效时覆盖基础优先级
    pub donated_priority: i32,
    pub is_donated: bool,

    // SJF 的 CPU burst 预测与上次上台时刻
    pub burst_time: i32,
    pub start_ticks: usize,

    // 正在等谁: 锁 / join 目标, 捐赠沿这两条边传播
    pub desired_lock: Option<Weak<Lock>>,
    pub desired_join: Option<Weak<Thread>>,

    // 模拟内核栈, 栈底是金丝雀字
    pub stack: Option<Box<[u32]>>,
    pub host: Option<JoinHandle<()>>,

    pub user_registers: [i32; NUM_TOTAL_REGS],
    pub open_files: OpenFileTable,
    pub space: Option<Arc<AddrSpace>>,

    // join 握手进度, 由 join_lock 保护
    pub join_called: bool,
    pub finish_called: bool,
    pub ready_to_finish: bool,
    pub fork_called: bool,
}

impl Thread {
    pub fn new(name: &str, priority: i32, joinable: bool) -> Arc<Thread> {
        let priority = priority.clamp(0, MAX_PRIORITY);
        Arc::new(Thread {
            name: name.to_string(),
            joinable,
            gate: DispatchGate::new(),
            join_lock: Lock::new("Join lock"),
            join_wait: Condition::new("Join() called CV"),
            finish_wait: Condition::new("Finish() called CV"),
            delete_wait: Condition::new("Permission to delete CV"),
            inner: unsafe {
                UPSafeCell::new(ThreadInner {
                    status: ThreadStatus::JustCreated,
                    priority,
                    donated_priority: 0,
                    is_donated: false,
                    burst_time: INITIAL_BURST,
                    start_ticks: 0,
                    desired_lock: None,
                    desired_join: None,
                    stack: None,
                    host: None,
                    user_registers: [0; NUM_TOTAL_REGS],
                    open_files: OpenFileTable::new(),
                    space: None,
                    join_called: false,
                    finish_called: false,
                    ready_to_finish: false,
                    fork_called: false,
                })
            },
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_joinable(&self) -> bool {
        self.joinable
    }

    pub(crate) fn ex_inner(&self) -> RefMut<'_, ThreadInner> {
        self.inner.exclusive_access()
    }

    pub fn status(&self) -> ThreadStatus {
        self.ex_inner().status
    }

    pub(crate) fn set_status(&self, status: ThreadStatus) {
        self.ex_inner().status = status;
    }

    pub fn priority(&self) -> i32 {
        self.ex_inner().priority
    }

    pub(crate) fn set_priority(&self, new_priority: i32) -> i32 {
        let new_priority = new_priority.clamp(0, MAX_PRIORITY);
        let mut inner = self.ex_inner();
        let old = inner.priority;
        inner.priority = new_priority;
        old
    }

    /// 有效优先级: 被捐赠时取捐赠值, 否则取基础优先级
    pub fn effective_priority(&self) -> i32 {
        let inner = self.ex_inner();
        if inner.is_donated {
            inner.donated_priority
        } else {
            inner.priority
        }
    }

    pub fn burst_time(&self) -> i32 {
        self.ex_inner().burst_time
    }

    pub(crate) fn set_desired_lock(&self, lock: Weak<Lock>) {
        self.ex_inner().desired_lock = Some(lock);
    }

    pub(crate) fn reset_desired_lock(&self) {
        self.ex_inner().desired_lock = None;
    }

    pub(crate) fn set_desired_join(&self, join: Weak<Thread>) {
        self.ex_inner().desired_join = Some(join);
    }

    pub(crate) fn reset_desired_join(&self) {
        self.ex_inner().desired_join = None;
    }

    pub fn has_space(&self) -> bool {
        self.ex_inner().space.is_some()
    }

    pub fn space(&self) -> Option<Arc<AddrSpace>> {
        self.ex_inner().space.clone()
    }

    pub fn set_space(&self, space: Arc<AddrSpace>) {
        self.ex_inner().space = Some(space);
    }

    // 打开文件表
    pub fn add_open_file(&self, file: Arc<component::fs::OpenFile>) -> Option<usize> {
        self.ex_inner().open_files.add(file)
    }

    pub fn remove_open_file(&self, fd: i32) -> bool {
        self.ex_inner().open_files.remove(fd)
    }

    pub fn get_open_file(&self, fd: i32) -> Option<Arc<component::fs::OpenFile>> {
        self.ex_inner().open_files.get(fd)
    }

    fn stack_allocate(&self) {
        let mut stack = vec![0u32; STACK_WORDS].into_boxed_slice();
        stack[0] = STACK_FENCEPOST;
        self.ex_inner().stack = Some(stack);
    }

    /// 栈底金丝雀被改写说明栈已经溢出过, 立即终止模拟
    pub(crate) fn check_overflow(&self) {
        let inner = self.ex_inner();
        if let Some(stack) = inner.stack.as_ref() {
            assert_eq!(
                stack[0], STACK_FENCEPOST,
                "thread {} overflowed its stack",
                self.name
            );
        }
    }

    /// 按 α 指数平滑更新 burst 预测, 在每次主动让出/睡眠时调用
    pub(crate) fn update_burst(&self, kernel: &Kernel) {
        let user_ticks = kernel.stats.exclusive_access().user_ticks;
        let mut inner = self.ex_inner();
        let actual = user_ticks.saturating_sub(inner.start_ticks) as f64;
        let predicted = BURST_ALPHA * actual + (1.0 - BURST_ALPHA) * inner.burst_time as f64;
        debug!(
            "Actual burst time: {}, predict next burst time: {}",
            actual, predicted as i32
        );
        inner.burst_time = predicted as i32;
    }

    pub(crate) fn save_user_state(&self, kernel: &Kernel) {
        let registers = kernel.machine.exclusive_access().registers;
        self.ex_inner().user_registers = registers;
    }

    pub(crate) fn restore_user_state(&self, kernel: &Kernel) {
        let registers = self.ex_inner().user_registers;
        kernel.machine.exclusive_access().registers = registers;
    }

    /// 派生一个并发执行 func 的线程:
    /// 准备好栈与宿主线程(停在闸门上), 然后进就绪队列.
    /// 抢占式调度下派生者立即让出, 让优先级说话
    pub fn fork<F>(self: &Arc<Self>, kernel: &Arc<Kernel>, func: F)
    where
        F: FnOnce(&Arc<Kernel>) + Send + 'static,
    {
        debug!("Forking thread: {}", self.name);
        self.stack_allocate();

        let host = {
            let kernel = Arc::clone(kernel);
            let thread = Arc::clone(self);
            std::thread::Builder::new()
                .name(self.name.clone())
                .spawn(move || {
                    // 线程根: 等待首次上台, 清理前任, 开中断, 运行, 收尾
                    thread.gate.wait();
                    kernel.thread_begin();
                    func(&kernel);
                    kernel.finish_current();
                })
                .expect("failed to spawn host thread")
        };

        {
            let guard = kernel.intr_off();
            self.ex_inner().host = Some(host);
            kernel.ready_to_run(self.clone());
            self.ex_inner().fork_called = true;
            drop(guard);
        }

        if kernel.is_preemptive() {
            kernel.yield_now();
        }
    }

    /// 等待线程终结. 只能由别的线程调用, 且该线程必须是 joinable 的
    pub fn join(self: &Arc<Self>, kernel: &Kernel) {
        let current = kernel.current_thread();
        assert!(!Arc::ptr_eq(self, &current), "a thread cannot join itself");
        assert!(self.joinable);
        assert!(!self.ex_inner().join_called);
        assert!(self.ex_inner().fork_called);

        let guard = kernel.intr_off();
        debug!("Joining thread: {}", self.name);

        let join_lock = self.join_lock.clone();
        join_lock.acquire(kernel);
        self.ex_inner().join_called = true;

        while !self.ex_inner().finish_called {
            if kernel.is_preemptive() {
                // 把自己的有效优先级借给被等待者, 让它尽快跑完
                let inner_guard = kernel.intr_off();
                current.set_desired_join(Arc::downgrade(self));
                kernel.donate_priority(&current, self);
                drop(inner_guard);
            }
            self.finish_wait.wait(kernel, &join_lock);
        }

        current.reset_desired_join();
        self.join_wait.signal(kernel, &join_lock);

        self.ex_inner().ready_to_finish = true;
        self.delete_wait.signal(kernel, &join_lock);

        join_lock.release(kernel);
        drop(guard);
    }
}

impl Kernel {
    /// 线程根序幕: 清理上一个终结的线程, 然后开中断
    pub(crate) fn thread_begin(&self) {
        let current = self.current_thread();
        debug!("Beginning thread: {}", current.name());
        self.check_to_be_destroyed();
        self.set_level(IntStatus::IntOn);
    }

    /// 当前线程谢幕. joinable 线程先与 join 方完成三段握手,
    /// 保证真正的析构发生在别的线程的栈上
    pub fn finish_current(&self) {
        self.set_level(IntStatus::IntOff);
        let current = self.current_thread();
        debug!("Finishing thread: {}", current.name());

        if current.is_joinable() {
            let join_lock = current.join_lock.clone();
            join_lock.acquire(self);
            current.ex_inner().finish_called = true;

            while !current.ex_inner().join_called {
                current.join_wait.wait(self, &join_lock);
                self.set_level(IntStatus::IntOff);
            }

            current.finish_wait.signal(self, &join_lock);

            if self.is_preemptive() {
                // 压到最低优先级并撤销捐赠, 便于尽快被收尸而不饿死别人
                current.set_priority(0);
                self.reset_effective_priority(&current);
            }

            while !current.ex_inner().ready_to_finish {
                current.delete_wait.wait(self, &join_lock);
                self.set_level(IntStatus::IntOff);
            }

            join_lock.release(self);
            debug!(
                "Wholly finishing thread after Join() called: {}",
                current.name()
            );
        }

        self.sleep_current(true);
        // 控制流不再回来, 宿主线程停摆等待收尸
    }
}
