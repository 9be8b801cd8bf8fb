use core::cmp::Ordering;
use std::sync::Arc;

use logger::debug;

use crate::kernel::Kernel;
use crate::thread::{Thread, ThreadStatus};
use crate::MAX_DONATION_DEPTH;

// 调度策略. 比较器由策略决定, 就绪队列是该比较器下的有序序列
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SchedulerKind {
    Fcfs,
    RoundRobin,
    Priority,
    Sjf,
}

// 睡到点的线程: (线程, 唤醒时刻), 睡眠队列按唤醒时刻升序
pub struct PendingWakeup {
    pub thread: Arc<Thread>,
    pub when: usize,
}

pub struct Scheduler {
    kind: SchedulerKind,
    preemptive: bool,
    ready_list: Vec<Arc<Thread>>,
    sleep_list: Vec<PendingWakeup>,
    pub(crate) to_be_destroyed: Option<Arc<Thread>>,
}

impl Scheduler {
    pub fn new(kind: SchedulerKind, preemptive: bool) -> Self {
        // FCFS 永不抢占, 抢占式 FCFS 是配置错误
        assert!(
            !(preemptive && kind == SchedulerKind::Fcfs),
            "preemptive FCFS is not a valid configuration"
        );
        Self {
            kind,
            preemptive,
            ready_list: Vec::new(),
            sleep_list: Vec::new(),
            to_be_destroyed: None,
        }
    }

    pub fn kind(&self) -> SchedulerKind {
        self.kind
    }

    pub fn is_preemptive(&self) -> bool {
        self.preemptive
    }

    /// Less 表示 a 更优先. 同序(Equal)保持到达顺序
    pub fn compare(&self, a: &Arc<Thread>, b: &Arc<Thread>) -> Ordering {
        match self.kind {
            SchedulerKind::Fcfs | SchedulerKind::RoundRobin => Ordering::Equal,
            SchedulerKind::Priority => {
                if self.preemptive {
                    // 抢占式下比较有效优先级, 捐赠立即可见
                    b.effective_priority().cmp(&a.effective_priority())
                } else {
                    b.priority().cmp(&a.priority())
                }
            }
            SchedulerKind::Sjf => a.burst_time().cmp(&b.burst_time()),
        }
    }

    // 稳定有序插入: 插在第一个比它劣的元素之前
    pub(crate) fn insert_ready(&mut self, thread: Arc<Thread>) {
        let pos = self
            .ready_list
            .iter()
            .position(|other| self.compare(&thread, other) == Ordering::Less)
            .unwrap_or(self.ready_list.len());
        self.ready_list.insert(pos, thread);
    }

    pub(crate) fn front_ready(&self) -> Option<Arc<Thread>> {
        self.ready_list.first().cloned()
    }

    pub(crate) fn pop_front_ready(&mut self) -> Option<Arc<Thread>> {
        if self.ready_list.is_empty() {
            None
        } else {
            Some(self.ready_list.remove(0))
        }
    }

    pub(crate) fn remove_ready(&mut self, thread: &Arc<Thread>) -> bool {
        match self.ready_list.iter().position(|t| Arc::ptr_eq(t, thread)) {
            Some(pos) => {
                self.ready_list.remove(pos);
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_in_ready_list(&self, thread: &Arc<Thread>) -> bool {
        self.ready_list.iter().any(|t| Arc::ptr_eq(t, thread))
    }

    pub fn num_ready(&self) -> usize {
        self.ready_list.len()
    }

    pub fn num_sleeping(&self) -> usize {
        self.sleep_list.len()
    }

    pub(crate) fn insert_sleeper(&mut self, pending: PendingWakeup) {
        let pos = self
            .sleep_list
            .iter()
            .position(|other| pending.when < other.when)
            .unwrap_or(self.sleep_list.len());
        self.sleep_list.insert(pos, pending);
    }

    pub(crate) fn earliest_wakeup(&self) -> Option<usize> {
        self.sleep_list.first().map(|p| p.when)
    }

    pub(crate) fn pop_due_sleeper(&mut self, now: usize) -> Option<Arc<Thread>> {
        match self.sleep_list.first() {
            Some(front) if front.when <= now => Some(self.sleep_list.remove(0).thread),
            _ => None,
        }
    }
}

impl Kernel {
    pub fn scheduler_kind(&self) -> SchedulerKind {
        self.scheduler.exclusive_access().kind()
    }

    pub fn is_preemptive(&self) -> bool {
        self.scheduler.exclusive_access().is_preemptive()
    }

    // 时钟中断是否应当触发抢占: RR 靠时间片轮转, 抢占式策略随时让位给更优者
    pub(crate) fn scheduler_preempts(&self) -> bool {
        let s = self.scheduler.exclusive_access();
        s.is_preemptive() || s.kind() == SchedulerKind::RoundRobin
    }

    pub fn compare_thread(&self, a: &Arc<Thread>, b: &Arc<Thread>) -> Ordering {
        self.scheduler.exclusive_access().compare(a, b)
    }

    pub fn current_thread(&self) -> Arc<Thread> {
        self.current
            .exclusive_access()
            .as_ref()
            .expect("no current thread")
            .clone()
    }

    pub(crate) fn set_current(&self, thread: Arc<Thread>) {
        *self.current.exclusive_access() = Some(thread);
    }

    /// 标记线程就绪并插入就绪队列
    pub fn ready_to_run(&self, thread: Arc<Thread>) {
        self.assert_int_off();
        debug!("Putting thread on ready list: {}", thread.name());
        thread.set_status(ThreadStatus::Ready);
        self.scheduler.exclusive_access().insert_ready(thread);
    }

    /// 选出下一个上台的线程.
    /// 非抢占: 就绪队首; 抢占: 队首与现任比较, 不劣于现任才换人
    pub fn find_next_to_run(&self) -> Option<Arc<Thread>> {
        self.assert_int_off();
        let current = self.current_thread();
        let mut s = self.scheduler.exclusive_access();

        if !s.is_preemptive() {
            s.pop_front_ready()
        } else if current.status() == ThreadStatus::Blocked {
            s.pop_front_ready()
        } else {
            match s.front_ready() {
                None => Some(current),
                Some(front) => {
                    if s.compare(&front, &current) != Ordering::Greater {
                        s.pop_front_ready()
                    } else {
                        Some(current)
                    }
                }
            }
        }
    }

    /// 把 CPU 交给 next. finishing 为真时现任线程将在对方的栈上被回收
    pub(crate) fn switch_to(&self, next: Arc<Thread>, finishing: bool) {
        let old = self.current_thread();
        self.assert_int_off();

        if finishing {
            self.scheduler.exclusive_session(|s| {
                assert!(s.to_be_destroyed.is_none());
                s.to_be_destroyed = Some(old.clone());
            });
        }

        if old.has_space() {
            // 用户程序线程: 保存用户寄存器堆
            old.save_user_state(self);
        }
        self.clean_tlb();

        old.check_overflow();

        self.set_current(next.clone());
        next.set_status(ThreadStatus::Running);
        let user_ticks = self.stats.exclusive_access().user_ticks;
        next.ex_inner().start_ticks = user_ticks;

        debug!("Switching from: {} to: {}", old.name(), next.name());

        // 换栈: 放行 next, 自己停进闸门
        next.gate.pass();
        if finishing {
            // Finish 永不返回: 这个栈已经没人需要了, 宿主线程在此停摆,
            // 残骸由下一个线程在它自己的栈上清理
            loop {
                std::thread::park();
            }
        }
        old.gate.wait();

        // 回到 old 的栈上, 中断仍是关闭的
        self.assert_int_off();
        debug!("Now in thread: {}", old.name());

        self.check_to_be_destroyed();
        if old.has_space() {
            old.restore_user_state(self);
        }
    }

    /// 收拾上一个终结线程的残骸. 不能在它自己的栈上做, 所以延迟到现在
    pub fn check_to_be_destroyed(&self) {
        let victim = self.scheduler.exclusive_session(|s| s.to_be_destroyed.take());
        if let Some(thread) = victim {
            debug!("Deleting thread: {}", thread.name());
            assert!(!Arc::ptr_eq(&thread, &self.current_thread()));

            let (host, space) = {
                let mut inner = thread.ex_inner();
                (inner.host.take(), inner.space.take())
            };
            // 宿主线程停在终结停摆里, 丢弃句柄即可
            drop(host);
            if let Some(space) = space {
                self.reclaim_space(&space);
            }
        }
    }

    /// 主动让出 CPU. 存在不劣于自己的就绪线程时重新排队并切换
    pub fn yield_now(&self) {
        let guard = self.intr_off();
        let current = self.current_thread();
        debug!("Yielding thread: {}", current.name());

        if let Some(next) = self.find_next_to_run() {
            if !Arc::ptr_eq(&next, &current) {
                current.update_burst(self);
                self.ready_to_run(current);
                self.switch_to(next, false);
            }
        }
        drop(guard);
    }

    /// 现任线程阻塞(或终结). 没有可运行线程时空转推进时钟等待唤醒
    pub fn sleep_current(&self, finishing: bool) {
        let current = self.current_thread();
        self.assert_int_off();
        debug!("Sleeping thread: {}", current.name());

        current.update_burst(self);
        current.set_status(ThreadStatus::Blocked);

        let next = loop {
            match self.find_next_to_run() {
                Some(next) => break next,
                None => self.idle(),
            }
        };
        self.switch_to(next, finishing);
    }

    /// 睡 sleep_ticks 个时钟单位, 到点由时钟中断唤醒
    pub fn set_sleep(&self, sleep_ticks: usize) {
        assert!(sleep_ticks > 0, "sleep time must be positive");
        let current = self.current_thread();

        let guard = self.intr_off();
        let when = self.stats.exclusive_access().total_ticks + sleep_ticks;
        self.scheduler.exclusive_session(|s| {
            s.insert_sleeper(PendingWakeup {
                thread: current,
                when,
            })
        });
        self.sleep_current(false);
        drop(guard);
    }

    /// 唤醒所有到点的睡眠者, 由时钟中断(或空转)调用, 中断已关
    pub fn wake_up_sleeping_thread(&self) {
        loop {
            let due = {
                let now = self.stats.exclusive_access().total_ticks;
                self.scheduler.exclusive_session(|s| s.pop_due_sleeper(now))
            };
            match due {
                Some(thread) => self.ready_to_run(thread),
                None => break,
            }
        }
    }

    /// 优先级捐赠: donor 比 donee 优先时把有效优先级借给它,
    /// 并沿 donee 的 desired_lock / desired_join 等待边继续传播.
    /// 传播深度有界, 环不会导致死循环
    pub fn donate_priority(&self, donor: &Arc<Thread>, donee: &Arc<Thread>) {
        self.assert_int_off();
        assert!(!Arc::ptr_eq(donor, donee));
        debug!(
            "Thread: {} ({}) donates effective priority to Thread: {} ({})",
            donor.name(),
            donor.effective_priority(),
            donee.name(),
            donee.effective_priority()
        );

        let mut donor = donor.clone();
        let mut donee = donee.clone();
        for _ in 0..MAX_DONATION_DEPTH {
            if self.compare_thread(&donor, &donee) != Ordering::Less {
                break;
            }

            let donated = donor.effective_priority();
            {
                let mut inner = donee.ex_inner();
                inner.donated_priority = donated;
                inner.is_donated = true;
            }
            self.update_ready_list(&donee);

            // 继续沿 donee 自己的等待边传递
            let (waited_lock, waited_join) = {
                let inner = donee.ex_inner();
                (inner.desired_lock.clone(), inner.desired_join.clone())
            };
            let next = if let Some(lock) = waited_lock.and_then(|w| w.upgrade()) {
                lock.holder()
            } else {
                waited_join.and_then(|w| w.upgrade())
            };

            match next {
                Some(next) if !Arc::ptr_eq(&next, &donee) => {
                    donor = donee;
                    donee = next;
                }
                _ => break,
            }
        }
    }

    /// 优先级变动后让就绪队列回到有序状态
    pub fn update_ready_list(&self, thread: &Arc<Thread>) -> bool {
        self.assert_int_off();
        let mut s = self.scheduler.exclusive_access();
        if !s.is_in_ready_list(thread) {
            return false;
        }
        s.remove_ready(thread);
        s.insert_ready(thread.clone());
        true
    }

    /// 撤销捐赠, 返回此前是否处于被捐赠状态
    pub(crate) fn reset_effective_priority(&self, thread: &Arc<Thread>) -> bool {
        self.assert_int_off();
        let was_donated = {
            let mut inner = thread.ex_inner();
            let old = inner.is_donated;
            inner.is_donated = false;
            old
        };
        if was_donated {
            self.update_ready_list(thread);
        }
        was_donated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preemptive_fcfs_is_rejected() {
        let result = std::panic::catch_unwind(|| Scheduler::new(SchedulerKind::Fcfs, true));
        assert!(result.is_err());
    }

    #[test]
    fn ready_list_sorted_by_priority() {
        let mut s = Scheduler::new(SchedulerKind::Priority, false);
        let low = Thread::new("low", 1, false);
        let high = Thread::new("high", 6, false);
        let mid = Thread::new("mid", 3, false);

        s.insert_ready(low.clone());
        s.insert_ready(high.clone());
        s.insert_ready(mid.clone());

        assert_eq!(s.pop_front_ready().unwrap().name(), "high");
        assert_eq!(s.pop_front_ready().unwrap().name(), "mid");
        assert_eq!(s.pop_front_ready().unwrap().name(), "low");
    }

    #[test]
    fn fcfs_preserves_arrival_order_on_ties() {
        let mut s = Scheduler::new(SchedulerKind::Fcfs, false);
        let a = Thread::new("a", 3, false);
        let b = Thread::new("b", 5, false);
        s.insert_ready(a.clone());
        s.insert_ready(b.clone());
        // FCFS 无视优先级, 到达序就是出队序
        assert_eq!(s.pop_front_ready().unwrap().name(), "a");
        assert_eq!(s.pop_front_ready().unwrap().name(), "b");
    }

    #[test]
    fn sjf_orders_by_predicted_burst() {
        let mut s = Scheduler::new(SchedulerKind::Sjf, false);
        let slow = Thread::new("slow", 0, false);
        let fast = Thread::new("fast", 0, false);
        slow.ex_inner().burst_time = 40;
        fast.ex_inner().burst_time = 5;

        s.insert_ready(slow);
        s.insert_ready(fast);
        assert_eq!(s.pop_front_ready().unwrap().name(), "fast");
    }

    #[test]
    fn sleep_list_sorted_by_wakeup() {
        let mut s = Scheduler::new(SchedulerKind::Fcfs, false);
        let a = Thread::new("a", 0, false);
        let b = Thread::new("b", 0, false);
        s.insert_sleeper(PendingWakeup {
            thread: a,
            when: 50,
        });
        s.insert_sleeper(PendingWakeup {
            thread: b,
            when: 10,
        });

        assert_eq!(s.earliest_wakeup(), Some(10));
        assert_eq!(s.pop_due_sleeper(9).map(|t| t.name().to_string()), None);
        assert_eq!(
            s.pop_due_sleeper(10).map(|t| t.name().to_string()),
            Some("b".to_string())
        );
        assert_eq!(s.earliest_wakeup(), Some(50));
    }
}
