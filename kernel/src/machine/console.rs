use core::sync::atomic::{AtomicUsize, Ordering};

use spin::Mutex;

// 同步控制台输出设备: PrintInt / PrintChar 系统调用的落点
//
// 输出同时进入一份捕获缓冲, 测试据此断言用户程序打印的序列
pub struct ConsoleOutput {
    echo: bool,
    captured: Mutex<Vec<u8>>,
    chars_written: AtomicUsize,
}

impl ConsoleOutput {
    pub fn new(echo: bool) -> Self {
        Self {
            echo,
            captured: Mutex::new(Vec::new()),
            chars_written: AtomicUsize::new(0),
        }
    }

    pub fn put_char(&self, ch: char) {
        let mut buf = [0u8; 4];
        let bytes = ch.encode_utf8(&mut buf).as_bytes();
        self.captured.lock().extend_from_slice(bytes);
        self.chars_written.fetch_add(1, Ordering::Relaxed);
        if self.echo {
            print!("{}", ch);
        }
    }

    pub fn put_int(&self, value: i32) {
        let text = value.to_string();
        self.captured.lock().extend_from_slice(text.as_bytes());
        self.chars_written.fetch_add(text.len(), Ordering::Relaxed);
        if self.echo {
            print!("{}", text);
        }
    }

    /// 迄今为止的完整输出
    pub fn transcript(&self) -> String {
        String::from_utf8_lossy(&self.captured.lock()).into_owned()
    }

    pub fn chars_written(&self) -> usize {
        self.chars_written.load(Ordering::Relaxed)
    }
}
