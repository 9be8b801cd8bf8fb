// 系统调用派发层的端到端测试.
// 陷入帧按约定手工摆好(调用号 r2, 参数 r4-r7), 直接敲 ExceptionHandler,
// 等价于外部 CPU 模拟器译码出一条 syscall 指令

use std::sync::Arc;

use nos::kernel::{BootArgs, Kernel};
use nos::machine::{ExceptionType, ARG1_REG, ARG2_REG, ARG3_REG, PAGE_SIZE, RET_REG};
use nos::memory::address_space::AddrSpace;
use sys_interface::config::MAX_NUM_USER_OPEN_FILES;
use sys_interface::syscall::*;

fn boot_user() -> Arc<Kernel> {
    let kernel = Kernel::new(BootArgs {
        format: true,
        ..BootArgs::default()
    });
    kernel.initialize();

    // 给 main 挂一个地址空间: 映像文件放在模拟文件系统里
    assert!(kernel.fs_create("prog", 512, false));
    let space = AddrSpace::new(&kernel, "prog").expect("address space");
    kernel.current_thread().set_space(space);
    kernel
}

// 把 NUL 结尾字符串逐字节写进用户内存
fn put_string(kernel: &Kernel, addr: usize, s: &str) {
    for (i, byte) in s.bytes().enumerate() {
        assert!(kernel.write_mem(addr + i, 1, byte as i32));
    }
    assert!(kernel.write_mem(addr + s.len(), 1, 0));
}

fn syscall1(kernel: &Kernel, no: usize, a1: i32) -> i32 {
    kernel.write_register(RET_REG, no as i32);
    kernel.write_register(ARG1_REG, a1);
    kernel.exception_handler(ExceptionType::Syscall);
    kernel.read_register(RET_REG)
}

fn syscall3(kernel: &Kernel, no: usize, a1: i32, a2: i32, a3: i32) -> i32 {
    kernel.write_register(RET_REG, no as i32);
    kernel.write_register(ARG1_REG, a1);
    kernel.write_register(ARG2_REG, a2);
    kernel.write_register(ARG3_REG, a3);
    kernel.exception_handler(ExceptionType::Syscall);
    kernel.read_register(RET_REG)
}

// 场景: Create 序列 0, -1, -1, -1, 0, -1, 与用户程序打印的串
#[test]
fn create_sequence() {
    let kernel = boot_user();

    let name = 8i32; // "f.txt"
    let empty = 64i32; // ""
    let other = 128i32; // "abc"
    put_string(&kernel, name as usize, "f.txt");
    put_string(&kernel, empty as usize, "");
    put_string(&kernel, other as usize, "abc");

    // 0 是空指针
    let sequence = [name, empty, 0, name, other, empty];

    let mut results = Vec::new();
    for addr in sequence {
        let result = syscall1(&kernel, SYSCALL_CREATE, addr);
        results.push(result);

        // 用户程序随手把结果打出来
        syscall1(&kernel, SYSCALL_PRINT_INT, result);
        syscall1(&kernel, SYSCALL_PRINT_CHAR, ',' as i32);
    }

    assert_eq!(results, vec![0, -1, -1, -1, 0, -1]);
    assert_eq!(kernel.console().transcript(), "0,-1,-1,-1,0,-1,");
}

// 场景: 打开第六个文件失败; 关掉 fd=2 后重开拿回 fd=2
#[test]
fn open_overflow_and_fd_reuse() {
    let kernel = boot_user();
    assert_eq!(MAX_NUM_USER_OPEN_FILES, 5);

    for i in 0..6 {
        assert!(kernel.fs_create(&format!("f{}", i), 64, false));
    }

    let name_addr = 8usize;
    for i in 0..5 {
        put_string(&kernel, name_addr, &format!("f{}", i));
        assert_eq!(syscall1(&kernel, SYSCALL_OPEN, name_addr as i32), i as i32);
    }

    // 表满
    put_string(&kernel, name_addr, "f5");
    assert_eq!(syscall1(&kernel, SYSCALL_OPEN, name_addr as i32), -1);

    // 释放 2 号, 最小空闲分配策略拿回 2 号
    assert_eq!(syscall1(&kernel, SYSCALL_CLOSE, 2), 0);
    put_string(&kernel, name_addr, "f2");
    assert_eq!(syscall1(&kernel, SYSCALL_OPEN, name_addr as i32), 2);
}

#[test]
fn open_rejects_bad_names() {
    let kernel = boot_user();
    // 空指针
    assert_eq!(syscall1(&kernel, SYSCALL_OPEN, 0), -1);
    put_string(&kernel, 8, "");
    assert_eq!(syscall1(&kernel, SYSCALL_OPEN, 8), -1);
    put_string(&kernel, 8, "ghost");
    assert_eq!(syscall1(&kernel, SYSCALL_OPEN, 8), -1);
}

#[test]
fn write_then_read_through_user_memory() {
    let kernel = boot_user();

    put_string(&kernel, 8, "data");
    assert_eq!(syscall1(&kernel, SYSCALL_CREATE, 8), 0);
    let fd = syscall1(&kernel, SYSCALL_OPEN, 8);
    assert!(fd >= 0);

    // 用户缓冲区: 100 个已知字节
    let buf_addr = 2 * PAGE_SIZE;
    for i in 0..100 {
        assert!(kernel.write_mem(buf_addr + i, 1, ((i * 3) % 256) as i32));
    }

    assert_eq!(
        syscall3(&kernel, SYSCALL_WRITE, buf_addr as i32, 100, fd),
        100
    );
    assert_eq!(syscall1(&kernel, SYSCALL_CLOSE, fd), 0);

    // 重新打开, 游标回到文件头
    let fd = syscall1(&kernel, SYSCALL_OPEN, 0);
    let back_addr = 4 * PAGE_SIZE;
    assert_eq!(
        syscall3(&kernel, SYSCALL_READ, back_addr as i32, 100, fd),
        100
    );

    for i in 0..100 {
        assert_eq!(
            kernel.read_mem(back_addr + i, 1),
            Some(((i * 3) % 256) as i32)
        );
    }
}

#[test]
fn write_boundary_cases() {
    let kernel = boot_user();

    put_string(&kernel, 8, "w.txt");
    // 写到无效 fd
    assert_eq!(syscall3(&kernel, SYSCALL_WRITE, 64, 4, -1), -1);
    assert_eq!(syscall3(&kernel, SYSCALL_WRITE, 64, 4, 0), -1);

    assert_eq!(syscall1(&kernel, SYSCALL_CREATE, 8), 0);
    let fd = syscall1(&kernel, SYSCALL_OPEN, 8);

    // n < 0 非法, n == 0 合法且写 0 字节
    assert_eq!(syscall3(&kernel, SYSCALL_WRITE, 64, -1, fd), -1);
    assert_eq!(syscall3(&kernel, SYSCALL_WRITE, 64, 0, fd), 0);

    // 1095 字节一次写完
    let buf_addr = 2 * PAGE_SIZE;
    for i in 0..1095 {
        assert!(kernel.write_mem(buf_addr + i, 1, (i % 251) as i32));
    }
    assert_eq!(
        syscall3(&kernel, SYSCALL_WRITE, buf_addr as i32, 1095, fd),
        1095
    );
}

#[test]
fn read_boundary_cases() {
    let kernel = boot_user();

    put_string(&kernel, 8, "r.txt");
    assert_eq!(syscall1(&kernel, SYSCALL_CREATE, 8), 0);
    let fd = syscall1(&kernel, SYSCALL_OPEN, 8);

    // n <= 0 一律 -1
    assert_eq!(syscall3(&kernel, SYSCALL_READ, 64, 0, fd), -1);
    assert_eq!(syscall3(&kernel, SYSCALL_READ, 64, -1, fd), -1);
    // 无效 fd
    assert_eq!(syscall3(&kernel, SYSCALL_READ, 64, 10, 4), -1);
    assert_eq!(syscall3(&kernel, SYSCALL_READ, 64, 10, -7), -1);
}

#[test]
fn close_boundary_cases() {
    let kernel = boot_user();
    assert_eq!(syscall1(&kernel, SYSCALL_CLOSE, -1), -1);
    assert_eq!(syscall1(&kernel, SYSCALL_CLOSE, 0), -1);

    put_string(&kernel, 8, "c.txt");
    assert_eq!(syscall1(&kernel, SYSCALL_CREATE, 8), 0);
    let fd = syscall1(&kernel, SYSCALL_OPEN, 8);
    assert_eq!(syscall1(&kernel, SYSCALL_CLOSE, fd), 0);
    // 已经关了
    assert_eq!(syscall1(&kernel, SYSCALL_CLOSE, fd), -1);
}

#[test]
fn remove_via_syscall() {
    let kernel = boot_user();

    put_string(&kernel, 8, "gone.txt");
    assert_eq!(syscall1(&kernel, SYSCALL_CREATE, 8), 0);
    assert_eq!(syscall1(&kernel, SYSCALL_REMOVE, 8), 0);
    assert_eq!(syscall1(&kernel, SYSCALL_OPEN, 8), -1);
    assert_eq!(syscall1(&kernel, SYSCALL_REMOVE, 8), -1);
}

// TLB 缺失经核心映射补填; 已驻留的页不再计缺页
#[test]
fn page_fault_accounting() {
    let kernel = boot_user();
    assert_eq!(kernel.num_page_faults(), 0);

    // 触碰 6 个不同的页, 每页一次缺页载入
    for vpn in 0..6 {
        assert!(kernel.write_mem(vpn * PAGE_SIZE, 1, vpn as i32 + 1));
    }
    assert_eq!(kernel.num_page_faults(), 6);

    // 容量为 4 的 TLB 里最老的两页已被驱逐
    assert!(kernel.fetch_page_entry(5).is_some());
    assert!(kernel.fetch_page_entry(0).is_none());

    // 0 号页虽不在 TLB, 但仍驻留内存: 补填不再计缺页
    assert_eq!(kernel.read_mem(0, 1), Some(1));
    assert_eq!(kernel.num_page_faults(), 6);
    assert!(kernel.fetch_page_entry(0).is_some());
}
