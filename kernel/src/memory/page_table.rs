bitflags! {
    pub struct EntryFlags: u8 {
        const VALID     = 1 << 0;
        const READ_ONLY = 1 << 1;
        // 引用位与脏位由硬件(这里是 ReadMem/WriteMem)维护,
        // 上下文切换与 TLB 驱逐时写回属主页表
        const USE       = 1 << 2;
        const DIRTY     = 1 << 3;
    }
}

/// 页表项. TLB 里放的是它的非属主拷贝, 权威版本始终在地址空间的页表里
#[derive(Clone, Copy, Debug)]
pub struct TranslationEntry {
    pub vpn: usize,
    pub ppn: usize,
    pub flags: EntryFlags,
}

impl TranslationEntry {
    pub fn invalid(vpn: usize) -> Self {
        Self {
            vpn,
            ppn: 0,
            flags: EntryFlags::empty(),
        }
    }
}
