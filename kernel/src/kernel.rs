use std::path::PathBuf;
use std::sync::Arc;

use component::fs::SectorDevice;
use component::replacement::{ReplacementFifo, ReplacementLru, ReplacementStrategy};
use logger::{debug, info, warn};

use crate::fs::FileSystem;
use crate::interrupt::{IntStatus, Interrupt};
use crate::machine::console::ConsoleOutput;
use crate::machine::disk::DiskImage;
use crate::machine::{Machine, NUM_PHYS_PAGES, TLB_SIZE};
use crate::memory::address_space::AddrSpace;
use crate::memory::coremap::CoreMapManager;
use crate::memory::frame::FrameManager;
use crate::memory::tlb::TlbManager;
use crate::stats::Stats;
use crate::sync::unicore::UPSafeCell;
use crate::thread::scheduler::{Scheduler, SchedulerKind};
use crate::thread::{Thread, ThreadStatus};
use crate::MAX_USER_PROGRAMS;

// 文件系统命令, 由命令行旗标选定, 启动后执行一条
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FsCmd {
    Unused,
    Put { local: PathBuf, nos: String },
    Mkdir(String),
    List(String),
    Remove(String),
    Print,
    Cat(String),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TlbPolicy {
    Fifo,
    Lru,
}

// 启动参数. 二进制从 argv 解析; 测试直接构造
pub struct BootArgs {
    pub debug_user_prog: bool,
    pub execute_files: Vec<String>,
    pub format: bool,
    pub fs_cmd: FsCmd,
    pub scheduler_kind: SchedulerKind,
    pub preemptive: bool,
    pub tlb_policy: TlbPolicy,
    // None 表示测试用的内存盘
    pub disk_path: Option<PathBuf>,
    pub console_echo: bool,
}

impl Default for BootArgs {
    fn default() -> Self {
        Self {
            debug_user_prog: false,
            execute_files: Vec::new(),
            format: false,
            fs_cmd: FsCmd::Unused,
            scheduler_kind: SchedulerKind::Fcfs,
            preemptive: false,
            tlb_policy: TlbPolicy::Lru,
            disk_path: None,
            console_echo: false,
        }
    }
}

impl BootArgs {
    pub fn parse(args: &[String]) -> BootArgs {
        let mut opts = BootArgs {
            disk_path: Some(PathBuf::from("DISK")),
            console_echo: true,
            ..BootArgs::default()
        };

        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "-s" => opts.debug_user_prog = true,
                "-e" => {
                    assert!(i + 1 < args.len(), "-e needs an executable path");
                    opts.execute_files.push(args[i + 1].clone());
                    i += 1;
                }
                "-format" => opts.format = true,
                "-put" => {
                    assert!(i + 2 < args.len(), "-put needs host and nos paths");
                    opts.fs_cmd = FsCmd::Put {
                        local: PathBuf::from(&args[i + 1]),
                        nos: args[i + 2].clone(),
                    };
                    i += 2;
                }
                "-mkdir" => {
                    assert!(i + 1 < args.len(), "-mkdir needs a path");
                    opts.fs_cmd = FsCmd::Mkdir(args[i + 1].clone());
                    i += 1;
                }
                "-ls" => {
                    assert!(i + 1 < args.len(), "-ls needs a path");
                    opts.fs_cmd = FsCmd::List(args[i + 1].clone());
                    i += 1;
                }
                "-rm" => {
                    assert!(i + 1 < args.len(), "-rm needs a path");
                    opts.fs_cmd = FsCmd::Remove(args[i + 1].clone());
                    i += 1;
                }
                "-p" => opts.fs_cmd = FsCmd::Print,
                "-cat" => {
                    assert!(i + 1 < args.len(), "-cat needs a path");
                    opts.fs_cmd = FsCmd::Cat(args[i + 1].clone());
                    i += 1;
                }
                "-u" => {
                    println!(
                        "Partial usage: nos [-s] [-e filename] [-format] \
                         [-put host nos] [-mkdir path] [-ls path] [-rm path] [-p] [-cat path]"
                    );
                }
                other => warn!("unknown flag: {}", other),
            }
            i += 1;
        }
        opts
    }
}

// 内核: 把各组件装配在一起的那个东西.
// 整台模拟机的状态都在这里, 测试可以并行开多台互不相扰.
// "当前线程"等全局量以显式句柄的方式穿过各模块
pub struct Kernel {
    pub(crate) opts: BootArgs,

    pub(crate) interrupt: UPSafeCell<Interrupt>,
    pub(crate) stats: UPSafeCell<Stats>,
    pub(crate) scheduler: UPSafeCell<Scheduler>,
    pub(crate) current: UPSafeCell<Option<Arc<Thread>>>,

    pub(crate) machine: UPSafeCell<Machine>,
    pub(crate) tlb: UPSafeCell<TlbManager>,
    pub(crate) frame_manager: FrameManager,
    pub(crate) core_map: UPSafeCell<CoreMapManager>,

    pub(crate) console: ConsoleOutput,
    pub(crate) disk: Arc<DiskImage>,
    pub(crate) file_system: UPSafeCell<Option<FileSystem>>,

    pub(crate) halted: UPSafeCell<bool>,
}

impl Kernel {
    pub fn new(opts: BootArgs) -> Arc<Kernel> {
        let disk = match &opts.disk_path {
            Some(path) => DiskImage::open(path).expect("cannot open disk image"),
            None => DiskImage::in_memory(),
        };
        let strategy: Box<dyn ReplacementStrategy> = match opts.tlb_policy {
            TlbPolicy::Fifo => Box::new(ReplacementFifo::new(TLB_SIZE)),
            TlbPolicy::Lru => Box::new(ReplacementLru::new(TLB_SIZE)),
        };

        let console_echo = opts.console_echo;
        let scheduler = Scheduler::new(opts.scheduler_kind, opts.preemptive);

        Arc::new(Kernel {
            opts,
            interrupt: unsafe { UPSafeCell::new(Interrupt::new()) },
            stats: unsafe { UPSafeCell::new(Stats::new()) },
            scheduler: unsafe { UPSafeCell::new(scheduler) },
            current: unsafe { UPSafeCell::new(None) },
            machine: unsafe { UPSafeCell::new(Machine::new()) },
            tlb: unsafe { UPSafeCell::new(TlbManager::new(TLB_SIZE, strategy)) },
            frame_manager: FrameManager::new(NUM_PHYS_PAGES),
            core_map: unsafe { UPSafeCell::new(CoreMapManager::new(NUM_PHYS_PAGES)) },
            console: ConsoleOutput::new(console_echo),
            disk,
            file_system: unsafe { UPSafeCell::new(None) },
            halted: unsafe { UPSafeCell::new(false) },
        })
    }

    /// 装配: 调用者的宿主线程就地成为 main 模拟线程,
    /// 挂载(必要时格式化)文件系统, 然后开中断
    pub fn initialize(self: &Arc<Self>) {
        info!("kernel initializing...");

        let main = Thread::new("main", 0, false);
        main.set_status(ThreadStatus::Running);
        self.set_current(main);

        let fs = FileSystem::new(self.disk.clone() as Arc<dyn SectorDevice>, self.opts.format);
        *self.file_system.exclusive_access() = Some(fs);

        self.set_level(IntStatus::IntOn);
    }

    /// 执行选定的文件系统命令, 派生排队的用户程序, 然后守到全部收工
    pub fn run(self: &Arc<Self>) {
        match self.opts.fs_cmd.clone() {
            FsCmd::Unused => {}
            FsCmd::Put { local, nos } => {
                self.fs_put(&local, &nos);
            }
            FsCmd::Mkdir(path) => {
                self.fs_create(&path, 0, true);
            }
            FsCmd::List(path) => self.fs_list(&path),
            FsCmd::Remove(path) => {
                self.fs_remove(&path);
            }
            FsCmd::Print => self.fs_print(),
            FsCmd::Cat(path) => self.fs_cat(&path),
        }

        let queued: Vec<String> = self
            .opts
            .execute_files
            .iter()
            .take(MAX_USER_PROGRAMS)
            .cloned()
            .collect();
        debug!("#User Program: {}", queued.len());

        for path in queued {
            match AddrSpace::new(self, &path) {
                Some(space) => {
                    let thread = Thread::new(&path, 0, false);
                    thread.set_space(space);
                    thread.fork(self, |kernel| {
                        let current = kernel.current_thread();
                        debug!("Path of executable file: {}", current.name());
                        let space = current.space().expect("user thread without address space");
                        space.execute(kernel);
                    });
                }
                None => warn!("cannot load executable {}", path),
            }
        }

        self.run_until_idle();
    }

    /// main 线程反复让出, 直到就绪与睡眠队列都空
    pub fn run_until_idle(&self) {
        loop {
            if self.is_halted() {
                break;
            }
            let (ready, sleeping) = {
                let s = self.scheduler.exclusive_access();
                (s.num_ready(), s.num_sleeping())
            };
            if ready == 0 && sleeping == 0 {
                break;
            }
            if ready == 0 {
                let guard = self.intr_off();
                self.idle();
                drop(guard);
            } else {
                self.yield_now();
            }
        }
    }

    /// 停机: 打印统计并立 halted 旗
    pub fn halt(&self) {
        info!("Machine halting!");
        self.print_stats();
        *self.halted.exclusive_access() = true;
    }

    pub fn is_halted(&self) -> bool {
        *self.halted.exclusive_access()
    }

    pub fn teardown(self: &Arc<Self>) {
        if !self.is_halted() {
            self.halt();
        }
    }

    pub fn print_stats(&self) {
        let mut stats = self.stats.exclusive_access();
        stats.num_disk_reads = self.disk.num_reads();
        stats.num_disk_writes = self.disk.num_writes();
        stats.num_console_chars_written = self.console.chars_written();
        stats.print();
    }

    pub fn console(&self) -> &ConsoleOutput {
        &self.console
    }

    pub fn total_ticks(&self) -> usize {
        self.stats.exclusive_access().total_ticks
    }

    pub fn num_page_faults(&self) -> usize {
        self.stats.exclusive_access().num_page_faults
    }

    pub fn num_ready_threads(&self) -> usize {
        self.scheduler.exclusive_access().num_ready()
    }

    pub fn num_sleeping_threads(&self) -> usize {
        self.scheduler.exclusive_access().num_sleeping()
    }
}
