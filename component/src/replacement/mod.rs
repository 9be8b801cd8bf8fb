// 可插拔的置换算法, 作用于一组下标连续且从 0 开始的候选槽位

mod fifo;
mod lru;

pub use fifo::ReplacementFifo;
pub use lru::ReplacementLru;

pub trait ReplacementStrategy: Send {
    /// 选出本轮被置换的槽位下标
    fn find_one_to_replace(&mut self) -> usize;

    /// 更新某个槽位的权重, now 为当前模拟时刻
    fn update_element_weight(&mut self, id: usize, now: usize);

    /// 上下文切换时重置内部状态
    fn reset_status(&mut self);
}
