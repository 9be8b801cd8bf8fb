use logger::info;

// 各种运行统计, 停机时打印
pub struct Stats {
    pub total_ticks: usize,
    pub idle_ticks: usize,
    pub system_ticks: usize,
    pub user_ticks: usize,

    pub num_page_faults: usize,
    pub num_disk_reads: usize,
    pub num_disk_writes: usize,
    pub num_console_chars_written: usize,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            total_ticks: 0,
            idle_ticks: 0,
            system_ticks: 0,
            user_ticks: 0,
            num_page_faults: 0,
            num_disk_reads: 0,
            num_disk_writes: 0,
            num_console_chars_written: 0,
        }
    }

    pub fn print(&self) {
        info!(
            "Ticks: total {}, idle {}, system {}, user {}",
            self.total_ticks, self.idle_ticks, self.system_ticks, self.user_ticks
        );
        info!("Paging: faults {}", self.num_page_faults);
        info!(
            "Disk I/O: reads {}, writes {}",
            self.num_disk_reads, self.num_disk_writes
        );
        info!("Console I/O: chars written {}", self.num_console_chars_written);
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}
