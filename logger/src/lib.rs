use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};
use std::io::Write;

use spin::Mutex;

// 模拟时钟. 内核每次推进模拟时间时发布最新的 tick 数,
// 日志行的时间戳读的就是这里, 而不是宿主机的真实时间
static SIM_TICKS: AtomicUsize = AtomicUsize::new(0);

// 串行化输出, 防止多条日志交错
static SINK: Mutex<()> = Mutex::new(());

/// 由内核时钟调用, 发布当前模拟时间
pub fn publish_ticks(ticks: usize) {
    SIM_TICKS.store(ticks, Ordering::Relaxed);
}

pub fn logger_now() -> usize {
    SIM_TICKS.load(Ordering::Relaxed)
}

pub fn logger_print(args: fmt::Arguments) {
    let _guard = SINK.lock();
    let stderr = std::io::stderr();
    let mut handle = stderr.lock();
    let _ = handle.write_fmt(args);
}

#[derive(Debug)]
pub enum Color {
    Red = 31,
    Yellow = 93,
    Blue = 35,
    Green = 32,
    Gray = 34,
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    ERROR = 50,
    WARN = 40,
    INFO = 30,
    DEBUG = 20,
    TRACE = 10,
}

/// 通用打印
/// 类似样式
/// [        79 ticks][INFO]   [kernel] Create file: f.txt succeed
#[macro_export]
macro_rules! log {
    ($color:expr, $level:literal, $($arg:tt)*) => {
        $crate::logger_print(format_args!("\x1B[90m[{:10} ticks]\x1B[0m\x1B[{}m[{}]\t[kernel] {}\x1B[0m\n", $crate::logger_now(), ($color as i32), $level, format_args!($($arg)*)))
    }
}

/// 宏定义中加 $ 和不加 $ 区别:
/// 加 $ 的 $crate 是去当前 crate(即 logger crate) 中寻找
/// 不加 $ 的 $crate 是去使用 logger 的那个 crate 中寻找
/// 比如 crate::LOG_LEVEL 就是由外部 crate 自定义的, 用以控制打印层级, 所以不加 $
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        if $crate::LogLevel::ERROR >= crate::LOG_LEVEL {
            $crate::log!($crate::Color::Red, "ERROR", $($arg)*)
        }
    }
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        if $crate::LogLevel::WARN >= crate::LOG_LEVEL {
            $crate::log!($crate::Color::Yellow, "WARN", $($arg)*)
        }
    }
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        if $crate::LogLevel::INFO >= crate::LOG_LEVEL {
            $crate::log!($crate::Color::Blue, "INFO", $($arg)*)
        }
    }
}

#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        if $crate::LogLevel::DEBUG >= crate::LOG_LEVEL {
            $crate::log!($crate::Color::Green, "DEBUG", $($arg)*)
        }
    }
}

#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {
        if $crate::LogLevel::TRACE >= crate::LOG_LEVEL {
            $crate::log!($crate::Color::Gray, "TRACE", $($arg)*)
        }
    }
}
