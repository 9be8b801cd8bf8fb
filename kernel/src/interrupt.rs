use logger::debug;

use crate::kernel::Kernel;
use crate::{SYSTEM_TICK, TIMER_TICKS, USER_TICK};

// 中断屏蔽与模拟时钟
//
// 单处理器上内核内部的互斥全靠关中断: 关中断期间不会发生时钟中断,
// 也就不会发生抢占. 锁等更高级的原语都建立在这之上
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum IntStatus {
    IntOff,
    IntOn,
}

pub struct Interrupt {
    pub(crate) level: IntStatus,
    // 下一次时钟中断的绝对时刻
    pub(crate) next_timer_due: usize,
    // 时钟中断处理中发现需要抢占时置位, 回到开中断状态时兑现
    pub(crate) yield_on_return: bool,
}

impl Interrupt {
    pub fn new() -> Self {
        Self {
            level: IntStatus::IntOff,
            next_timer_due: TIMER_TICKS,
            yield_on_return: false,
        }
    }
}

impl Default for Interrupt {
    fn default() -> Self {
        Self::new()
    }
}

/// 作用域化的关中断: 离开作用域时恢复进入前的电平,
/// 所有出口路径(包括提前 return)都不会漏掉恢复
pub struct IntrGuard<'a> {
    kernel: &'a Kernel,
    old: IntStatus,
}

impl Drop for IntrGuard<'_> {
    fn drop(&mut self) {
        self.kernel.set_level(self.old);
    }
}

impl Kernel {
    pub fn int_level(&self) -> IntStatus {
        self.interrupt.exclusive_access().level
    }

    pub(crate) fn assert_int_off(&self) {
        assert_eq!(
            self.int_level(),
            IntStatus::IntOff,
            "interrupts must be disabled here"
        );
    }

    pub fn intr_off(&self) -> IntrGuard<'_> {
        let old = self.set_level(IntStatus::IntOff);
        IntrGuard { kernel: self, old }
    }

    /// 切换中断电平并返回旧电平; 从关到开的那一刻推进一次模拟时间
    pub fn set_level(&self, now: IntStatus) -> IntStatus {
        let old = self.interrupt.exclusive_session(|i| {
            let old = i.level;
            i.level = now;
            old
        });

        if old == IntStatus::IntOff && now == IntStatus::IntOn {
            self.one_tick(false);
        }
        old
    }

    /// 模拟时间前进一步. user 为真表示消耗的是用户态指令时间
    /// (由外部的 CPU 模拟器按指令调用, 测试中直接驱动)
    pub fn one_tick(&self, user: bool) {
        {
            let mut stats = self.stats.exclusive_access();
            if user {
                stats.total_ticks += USER_TICK;
                stats.user_ticks += USER_TICK;
            } else {
                stats.total_ticks += SYSTEM_TICK;
                stats.system_ticks += SYSTEM_TICK;
            }
            logger::publish_ticks(stats.total_ticks);
        }

        // 处理中断期间硬件自动关中断; 这里直接改电平而不走 set_level,
        // 免得推进时间的动作再递归推进时间
        let old = self.interrupt.exclusive_session(|i| {
            let old = i.level;
            i.level = IntStatus::IntOff;
            old
        });
        self.check_if_due();
        self.interrupt.exclusive_session(|i| i.level = old);

        // 时钟中断要求抢占的话, 在这里兑现
        let do_yield = self.interrupt.exclusive_session(|i| {
            if i.yield_on_return && i.level == IntStatus::IntOn {
                i.yield_on_return = false;
                true
            } else {
                false
            }
        });
        if do_yield {
            self.yield_now();
        }
    }

    /// CPU 契约入口: 执行了 n 条用户指令
    pub fn tick_user(&self, n: usize) {
        for _ in 0..n {
            self.one_tick(true);
        }
    }

    // 补发所有到期的时钟中断
    fn check_if_due(&self) {
        loop {
            let fire = {
                let total = self.stats.exclusive_access().total_ticks;
                self.interrupt.exclusive_session(|i| {
                    if total >= i.next_timer_due {
                        i.next_timer_due += TIMER_TICKS;
                        true
                    } else {
                        false
                    }
                })
            };
            if !fire {
                break;
            }

            debug!("timer interrupt");
            self.wake_up_sleeping_thread();
            if self.scheduler_preempts() {
                self.interrupt.exclusive_session(|i| i.yield_on_return = true);
            }
        }
    }

    /// 就绪队列空时把时钟直接拨到下一个唤醒点.
    /// 既没有就绪线程又没有定时唤醒, 说明机器死锁, 这是致命错误
    pub(crate) fn idle(&self) {
        let when = self.scheduler.exclusive_session(|s| s.earliest_wakeup());
        let when = when.unwrap_or_else(|| {
            panic!("machine idled with no pending wakeups: all threads blocked")
        });

        {
            let mut stats = self.stats.exclusive_access();
            if when > stats.total_ticks {
                stats.idle_ticks += when - stats.total_ticks;
                stats.total_ticks = when;
                logger::publish_ticks(stats.total_ticks);
            }
        }
        // 空转跳过的时钟中断不再补发
        {
            let total = self.stats.exclusive_access().total_ticks;
            self.interrupt.exclusive_session(|i| {
                while i.next_timer_due <= total {
                    i.next_timer_due += TIMER_TICKS;
                }
            });
        }
        self.wake_up_sleeping_thread();
    }
}
