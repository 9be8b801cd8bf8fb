use std::sync::{Arc, Weak};

use logger::debug;

use crate::kernel::Kernel;
use crate::memory::address_space::AddrSpace;

// 核心映射: 物理页帧 -> (虚拟页号, 属主地址空间) 的反向表.
// TLB 补填经由它回到权威页表
pub struct CoreMapEntry {
    pub vpn: usize,
    pub owner: Option<Weak<AddrSpace>>,
}

pub struct CoreMapManager {
    entries: Vec<CoreMapEntry>,
}

impl CoreMapManager {
    pub fn new(size: usize) -> Self {
        Self {
            entries: (0..size)
                .map(|_| CoreMapEntry {
                    vpn: 0,
                    owner: None,
                })
                .collect(),
        }
    }

    fn lookup(&self, space: &Arc<AddrSpace>, vpn: usize) -> Option<usize> {
        self.entries.iter().position(|e| {
            e.vpn == vpn
                && e.owner
                    .as_ref()
                    .and_then(|w| w.upgrade())
                    .map_or(false, |owner| Arc::ptr_eq(&owner, space))
        })
    }

    fn record(&mut self, ppn: usize, vpn: usize, owner: &Arc<AddrSpace>) {
        self.entries[ppn].vpn = vpn;
        self.entries[ppn].owner = Some(Arc::downgrade(owner));
    }

    pub(crate) fn forget(&mut self, ppn: usize) {
        self.entries[ppn].owner = None;
    }

    fn owner_of(&self, ppn: usize) -> Option<Arc<AddrSpace>> {
        self.entries[ppn].owner.as_ref().and_then(|w| w.upgrade())
    }
}

impl Kernel {
    /// 把当前线程的 vpn 对应页表项送进 TLB.
    /// 页不在内存时申请页帧并从映像载入(换出路径未实现, 帧耗尽即终止).
    /// 地址越界或当前线程没有地址空间返回 false
    pub fn push_entry_to_tlb(&self, vpn: usize) -> bool {
        let space = match self.current_thread().space() {
            Some(space) => space,
            None => return false,
        };
        if vpn >= space.num_pages() {
            return false;
        }

        // 1. 核心映射里找该页
        let resident = self
            .core_map
            .exclusive_session(|m| m.lookup(&space, vpn).is_some());
        let mut target = if resident { space.page_entry(vpn) } else { None };

        // 2. 不在内存: 要帧, 载入, 登记
        if target.is_none() {
            let ppn = self.acquire_frame().unwrap_or_else(|| {
                panic!("out of physical frames and page replacement is not implemented")
            });
            debug!("Available Physical Page Entry: {}", ppn);

            let entry = space.load_page_from_disk(self, vpn, ppn);
            self.core_map
                .exclusive_session(|m| m.record(ppn, vpn, &space));
            self.stats.exclusive_session(|s| s.num_page_faults += 1);
            target = Some(entry);
        }

        // 3. 送进 TLB
        self.cache_page_entry(target.unwrap());
        true
    }

    /// 把 TLB 条目的 use/dirty 位同步回属主地址空间的权威页表项
    pub fn sync_page(
        &self,
        ppn: usize,
        vpn: usize,
        tlb_entry: &crate::memory::page_table::TranslationEntry,
    ) {
        let owner = self.core_map.exclusive_session(|m| m.owner_of(ppn));
        if let Some(owner) = owner {
            owner.sync_page_attributes(vpn, tlb_entry);
        }
    }
}
