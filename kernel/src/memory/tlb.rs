use component::replacement::ReplacementStrategy;
use logger::debug;

use crate::kernel::Kernel;
use crate::memory::page_table::{EntryFlags, TranslationEntry};

// 定容转换缓存. 槽位选择: 先挑无效槽, 没有则请置换策略点名.
// 上下文切换时整体失效并复位策略状态
pub struct TlbManager {
    entries: Vec<TranslationEntry>,
    strategy: Box<dyn ReplacementStrategy>,
}

impl TlbManager {
    pub fn new(size: usize, strategy: Box<dyn ReplacementStrategy>) -> Self {
        assert!(size > 0);
        Self {
            entries: (0..size).map(|_| TranslationEntry::invalid(0)).collect(),
            strategy,
        }
    }

    /// 线性探查 vpn, 命中返回槽位号
    pub fn probe(&self, vpn: usize) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.flags.contains(EntryFlags::VALID) && e.vpn == vpn)
    }

    pub fn entry_mut(&mut self, slot: usize) -> &mut TranslationEntry {
        &mut self.entries[slot]
    }

    pub fn touch(&mut self, slot: usize, now: usize) {
        self.strategy.update_element_weight(slot, now);
    }

    // 给新条目找槽位
    fn find_entry_to_cache(&mut self) -> usize {
        match self
            .entries
            .iter()
            .position(|e| !e.flags.contains(EntryFlags::VALID))
        {
            Some(slot) => slot,
            None => self.strategy.find_one_to_replace(),
        }
    }

    // 取走所有有效项并整体失效, 复位策略
    fn drain_valid(&mut self) -> Vec<TranslationEntry> {
        let valid: Vec<_> = self
            .entries
            .iter()
            .copied()
            .filter(|e| e.flags.contains(EntryFlags::VALID))
            .collect();
        for entry in self.entries.iter_mut() {
            entry.flags.remove(EntryFlags::VALID | EntryFlags::DIRTY);
        }
        self.strategy.reset_status();
        valid
    }
}

impl Kernel {
    /// 带权重维护的 TLB 查询, 未命中返回 None
    pub fn fetch_page_entry(&self, vpn: usize) -> Option<TranslationEntry> {
        let now = self.stats.exclusive_access().total_ticks;
        let mut tlb = self.tlb.exclusive_access();
        match tlb.probe(vpn) {
            Some(slot) => {
                tlb.touch(slot, now);
                Some(*tlb.entry_mut(slot))
            }
            None => None,
        }
    }

    /// 把页表项拷入 TLB. 驱逐有效项前先把 use/dirty 写回属主页表
    pub fn cache_page_entry(&self, entry: TranslationEntry) {
        let now = self.stats.exclusive_access().total_ticks;

        let (slot, victim) = {
            let mut tlb = self.tlb.exclusive_access();
            let slot = tlb.find_entry_to_cache();
            let old = *tlb.entry_mut(slot);
            let victim = old.flags.contains(EntryFlags::VALID).then_some(old);
            (slot, victim)
        };

        if let Some(victim) = victim {
            self.sync_page(victim.ppn, victim.vpn, &victim);
        }

        {
            let mut tlb = self.tlb.exclusive_access();
            let cached = tlb.entry_mut(slot);
            *cached = entry;
            cached.flags.insert(EntryFlags::VALID);
            tlb.touch(slot, now);
        }
        debug!("TLB [{}] cache page: {}", slot, entry.vpn);
    }

    /// 上下文切换: 全部失效, 属主页表收走 use/dirty 位
    pub fn clean_tlb(&self) {
        let victims = self.tlb.exclusive_session(|t| t.drain_valid());
        for victim in victims {
            self.sync_page(victim.ppn, victim.vpn, &victim);
        }
        debug!("Clean all TLB entries");
    }
}
