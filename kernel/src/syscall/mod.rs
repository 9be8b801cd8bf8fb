use std::sync::Arc;

use logger::{debug, error};
use sys_interface::config::MAX_PATH_LEN;
use sys_interface::syscall::*;

use component::fs::MAX_FILE_SIZE;

use crate::kernel::Kernel;
use crate::machine::{
    ExceptionType, ARG1_REG, ARG2_REG, ARG3_REG, NEXT_PC_REG, PC_REG, PREV_PC_REG, RET_REG,
};

// 陷入内核的总入口. 系统调用约定:
// 调用号在 r2, 参数在 r4-r7, 返回值写回 r2, 返回前推进 PC
// (否则用户程序会永远重复同一条系统调用)
//
// 用户程序经 Create 建出的文件取单个文件头的最大容量,
// 之后的 Write 以实际写入量为准

const USER_CREATE_FILE_SIZE: usize = MAX_FILE_SIZE;

impl Kernel {
    pub fn exception_handler(&self, which: ExceptionType) {
        match which {
            ExceptionType::Syscall => self.handle_syscall(),
            _ => panic!("Unexpected user mode exception {:?}", which),
        }
    }

    fn handle_syscall(&self) {
        let ty = self.read_register(RET_REG) as usize;
        match ty {
            SYSCALL_HALT => {
                debug!("Shutdown, initiated by user program");
                self.halt();
            }
            SYSCALL_EXIT => {
                let code = self.read_register(ARG1_REG);
                debug!("Exit with return value: {}, initiated by user program", code);
                self.finish_current();
                // 不再返回
            }
            SYSCALL_CREATE => {
                let result = self.sys_create();
                self.write_register(RET_REG, result);
                self.advance_pc();
            }
            SYSCALL_OPEN => {
                let result = self.sys_open();
                self.write_register(RET_REG, result);
                self.advance_pc();
            }
            SYSCALL_READ => {
                let result = self.sys_read();
                self.write_register(RET_REG, result);
                self.advance_pc();
            }
            SYSCALL_WRITE => {
                let result = self.sys_write();
                self.write_register(RET_REG, result);
                self.advance_pc();
            }
            SYSCALL_CLOSE => {
                let result = self.sys_close();
                self.write_register(RET_REG, result);
                self.advance_pc();
            }
            SYSCALL_REMOVE => {
                let result = self.sys_remove();
                self.write_register(RET_REG, result);
                self.advance_pc();
            }
            SYSCALL_PRINT_INT => {
                let value = self.read_register(ARG1_REG);
                debug!("Print integer to console");
                self.console.put_int(value);
                self.advance_pc();
            }
            SYSCALL_PRINT_CHAR => {
                let value = self.read_register(ARG1_REG);
                debug!("Print char to console");
                self.console.put_char((value as u8) as char);
                self.advance_pc();
            }
            _ => {
                error!("Unexpected system call {}", ty);
                panic!("unexpected system call {}", ty);
            }
        }
    }

    fn advance_pc(&self) {
        self.write_register(PREV_PC_REG, self.read_register(PC_REG));
        self.write_register(PC_REG, self.read_register(NEXT_PC_REG));
        let pc = self.read_register(PC_REG);
        self.write_register(NEXT_PC_REG, pc + 4);
    }

    /// 从用户空间读 NUL 结尾字符串, 至多 limit 字节.
    /// 空指针或读穿地址空间返回 None
    fn read_string_from_user(&self, addr: i32, limit: usize) -> Option<String> {
        if addr == 0 {
            return None;
        }

        let mut bytes = Vec::new();
        for i in 0..limit {
            let ch = self.read_mem(addr as usize + i, 1)?;
            if ch == 0 {
                break;
            }
            bytes.push(ch as u8);
        }
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn sys_create(&self) -> i32 {
        let addr = self.read_register(ARG1_REG);
        match self.read_string_from_user(addr, MAX_PATH_LEN) {
            None => {
                debug!("Illegal file name string at address: {:#x}", addr);
                -1
            }
            Some(name) if name.is_empty() => -1,
            Some(name) => {
                if self.fs_create(&name, USER_CREATE_FILE_SIZE, false) {
                    debug!("Create file: {} succeed", name);
                    0
                } else {
                    debug!("Create file: {} failed", name);
                    -1
                }
            }
        }
    }

    fn sys_open(&self) -> i32 {
        let addr = self.read_register(ARG1_REG);
        let name = match self.read_string_from_user(addr, MAX_PATH_LEN) {
            None => {
                debug!("Illegal file name string at address: {:#x}", addr);
                return -1;
            }
            Some(name) if name.is_empty() => return -1,
            Some(name) => name,
        };

        match self.fs_open(&name) {
            None => {
                debug!("Fail to open file: {}", name);
                -1
            }
            Some(file) => {
                let current = self.current_thread();
                match current.add_open_file(Arc::new(file)) {
                    Some(fd) => {
                        debug!("Open file: {} with fd: {}", name, fd);
                        fd as i32
                    }
                    None => {
                        // 句柄随 Arc 一起丢弃
                        debug!("No room for handling more file descriptor of file: {}", name);
                        -1
                    }
                }
            }
        }
    }

    /// Read(bufAddr, n, fd): 逐字节拷出到用户缓冲区, 返回读到的字节数
    fn sys_read(&self) -> i32 {
        let buf_addr = self.read_register(ARG1_REG);
        let num_bytes = self.read_register(ARG2_REG);
        let fd = self.read_register(ARG3_REG);

        if num_bytes <= 0 {
            return -1;
        }
        let file = match self.current_thread().get_open_file(fd) {
            Some(file) => file,
            None => return -1,
        };

        let mut data = vec![0u8; num_bytes as usize];
        let count = file.read(&mut data);

        for (i, &byte) in data.iter().take(count).enumerate() {
            if !self.write_mem(buf_addr as usize + i, 1, byte as i32) {
                return -1;
            }
        }
        count as i32
    }

    /// Write(bufAddr, n, fd): 逐字节从用户缓冲区拷入, 返回实际写入的字节数
    fn sys_write(&self) -> i32 {
        let buf_addr = self.read_register(ARG1_REG);
        let num_bytes = self.read_register(ARG2_REG);
        let fd = self.read_register(ARG3_REG);

        if num_bytes < 0 {
            return -1;
        }
        let file = match self.current_thread().get_open_file(fd) {
            Some(file) => file,
            None => return -1,
        };

        let mut data = Vec::with_capacity(num_bytes as usize);
        for i in 0..num_bytes as usize {
            match self.read_mem(buf_addr as usize + i, 1) {
                Some(byte) => data.push(byte as u8),
                None => return -1,
            }
        }

        file.write(&data) as i32
    }

    fn sys_close(&self) -> i32 {
        let fd = self.read_register(ARG1_REG);
        if self.current_thread().remove_open_file(fd) {
            0
        } else {
            -1
        }
    }

    fn sys_remove(&self) -> i32 {
        let addr = self.read_register(ARG1_REG);
        match self.read_string_from_user(addr, MAX_PATH_LEN) {
            None => -1,
            Some(name) if name.is_empty() => -1,
            Some(name) => {
                if self.fs_remove(&name) {
                    0
                } else {
                    -1
                }
            }
        }
    }
}
