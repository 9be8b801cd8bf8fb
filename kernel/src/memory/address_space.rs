use std::sync::Arc;

use component::fs::OpenFile;
use logger::{debug, info, warn};

use crate::kernel::Kernel;
use crate::machine::{NEXT_PC_REG, NUM_TOTAL_REGS, PAGE_SIZE, PC_REG, STACK_REG};
use crate::memory::page_table::{EntryFlags, TranslationEntry};
use crate::sync::unicore::UPSafeCell;

// 用户栈页数, 挂在映像之后
pub const USER_STACK_PAGES: usize = 8;

// 地址空间: 页表 + 常驻打开的程序映像.
// 页帧在缺页时才通过全局页帧管理器取得(见核心映射的补填路径),
// 线程销毁时由内核统一归还
pub struct AddrSpace {
    num_pages: usize,
    page_table: UPSafeCell<Vec<TranslationEntry>>,
    exec_file: OpenFile,
}

impl AddrSpace {
    /// 以模拟文件系统中的映像文件建立地址空间.
    /// 映像是平坦字节串, 代码+数据从虚拟地址 0 开始, 其后是用户栈
    pub fn new(kernel: &Kernel, path: &str) -> Option<Arc<AddrSpace>> {
        let exec_file = kernel.fs_open(path)?;
        let image_bytes = exec_file.length();
        let size = image_bytes + USER_STACK_PAGES * PAGE_SIZE;
        let num_pages = (size + PAGE_SIZE - 1) / PAGE_SIZE;

        info!(
            "address space for {}: {} pages ({} image bytes)",
            path, num_pages, image_bytes
        );

        Some(Arc::new(AddrSpace {
            num_pages,
            page_table: unsafe {
                UPSafeCell::new((0..num_pages).map(TranslationEntry::invalid).collect())
            },
            exec_file,
        }))
    }

    pub fn num_pages(&self) -> usize {
        self.num_pages
    }

    /// 权威页表项(仅在页驻留内存时有)
    pub fn page_entry(&self, vpn: usize) -> Option<TranslationEntry> {
        let page_table = self.page_table.exclusive_access();
        let entry = page_table[vpn];
        entry.flags.contains(EntryFlags::VALID).then_some(entry)
    }

    /// 缺页载入: 从映像读一页到指定页帧, 超出映像的部分(栈/bss)保持全零
    pub(crate) fn load_page_from_disk(
        &self,
        kernel: &Kernel,
        vpn: usize,
        ppn: usize,
    ) -> TranslationEntry {
        debug!("load vpn {} into frame {}", vpn, ppn);

        let mut page = [0u8; PAGE_SIZE];
        let _ = self.exec_file.read_at(&mut page, vpn * PAGE_SIZE);
        kernel.fill_physical_page(ppn, &page);

        let mut page_table = self.page_table.exclusive_access();
        let entry = &mut page_table[vpn];
        entry.ppn = ppn;
        entry.flags = EntryFlags::VALID;
        *entry
    }

    /// TLB 条目的 use/dirty 位写回权威页表
    pub(crate) fn sync_page_attributes(&self, vpn: usize, tlb_entry: &TranslationEntry) {
        let mut page_table = self.page_table.exclusive_access();
        if vpn < page_table.len() {
            let carried = tlb_entry.flags & (EntryFlags::USE | EntryFlags::DIRTY);
            page_table[vpn].flags.insert(carried);
        }
    }

    /// 仍驻留内存的页帧号列表
    pub(crate) fn resident_frames(&self) -> Vec<usize> {
        self.page_table
            .exclusive_access()
            .iter()
            .filter(|e| e.flags.contains(EntryFlags::VALID))
            .map(|e| e.ppn)
            .collect()
    }

    /// 为进入用户态准备寄存器堆: PC 从 0 开始, 栈顶留出空隙
    pub fn init_registers(&self, kernel: &Kernel) {
        for reg in 0..NUM_TOTAL_REGS {
            kernel.write_register(reg, 0);
        }
        kernel.write_register(PC_REG, 0);
        kernel.write_register(NEXT_PC_REG, 4);
        let stack_top = self.num_pages * PAGE_SIZE - 16;
        kernel.write_register(STACK_REG, stack_top as i32);
        debug!("stack register initialized to {:#x}", stack_top);
    }

    /// 用户程序入口. 指令译码属于外部的 CPU 模拟器;
    /// 内核侧初始化寄存器并把映像各页预触一遍,
    /// 走完整的 TLB 缺失 -> 核心映射 -> 缺页载入路径
    pub fn execute(&self, kernel: &Kernel) {
        self.init_registers(kernel);

        let image_pages = (self.exec_file.length() + PAGE_SIZE - 1) / PAGE_SIZE;
        for vpn in 0..image_pages {
            if kernel.read_mem(vpn * PAGE_SIZE, 4).is_none() {
                warn!("prefault of vpn {} failed", vpn);
                break;
            }
            kernel.tick_user(1);
        }
        info!(
            "program mapped: {} image pages, {} pages total",
            image_pages, self.num_pages
        );
    }
}
