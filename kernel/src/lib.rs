#![allow(dead_code)]

#[macro_use]
extern crate bitflags;

pub mod fs;
pub mod interrupt;
pub mod kernel;
pub mod machine;
pub mod memory;
pub mod stats;
pub mod sync;
pub mod syscall;
pub mod thread;

pub use crate::kernel::{BootArgs, FsCmd, Kernel};

use logger::LogLevel;
const LOG_LEVEL: LogLevel = LogLevel::WARN;

// 配置信息
// ---------------------------------------------------------------------

// 模拟时间: 每次开中断推进 10 tick, 用户态每条指令 1 tick,
// 时钟设备每 100 tick 触发一次中断
pub const USER_TICK: usize = 1;
pub const SYSTEM_TICK: usize = 10;
pub const TIMER_TICKS: usize = 100;

// 线程优先级取值 0..=7, 7 最高
pub const MAX_PRIORITY: i32 = 7;

// SJF 的指数平滑系数与初始预测值
pub const BURST_ALPHA: f64 = 0.5;
pub const INITIAL_BURST: i32 = 10;

// 捐赠沿 desired_lock / desired_join 传播的最大深度, 防环
pub const MAX_DONATION_DEPTH: usize = 8;

// 模拟内核栈大小(以字计), 栈底放金丝雀字, 每次换出时检查
pub const STACK_WORDS: usize = 1024;
pub const STACK_FENCEPOST: u32 = 0x0ded_beef;

// 一次启动最多排队执行的用户程序数
pub const MAX_USER_PROGRAMS: usize = 5;
