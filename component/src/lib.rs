extern crate logger;
#[allow(dead_code)]
const LOG_LEVEL: logger::LogLevel = logger::LogLevel::INFO;

/// 本库用于放置与内核无关的可配置组件,
/// 包括位图分配器, 置换算法, 以及持久文件系统的磁盘结构
pub mod bitmap;
pub mod fs;
pub mod replacement;
