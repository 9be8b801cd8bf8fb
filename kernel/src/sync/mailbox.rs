use std::sync::Arc;

use crate::kernel::Kernel;
use crate::sync::condvar::Condition;
use crate::sync::lock::Lock;
use crate::sync::unicore::UPSafeCell;

// 单槽信箱会合: 每次成功的 Send 恰好与一次 Receive 配对.
// Send 等到既有 Receive 在场又有空槽才投递; Receive 等到槽里有值才取走
pub struct Mailbox {
    name: String,
    mb_lock: Arc<Lock>,
    send_wait: Condition,
    recv_wait: Condition,
    inner: UPSafeCell<MailboxInner>,
}

struct MailboxInner {
    buffer: i32,
    buffer_writable: bool,
    num_recv_called: i32,
}

impl Mailbox {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            mb_lock: Lock::new("Lock for mailbox"),
            send_wait: Condition::new("CV for waiting Send"),
            recv_wait: Condition::new("CV for waiting Receive"),
            inner: unsafe {
                UPSafeCell::new(MailboxInner {
                    buffer: 0,
                    buffer_writable: true,
                    num_recv_called: 0,
                })
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn send(&self, kernel: &Kernel, message: i32) {
        self.mb_lock.acquire(kernel);

        loop {
            let deliverable = self
                .inner
                .exclusive_session(|i| i.buffer_writable && i.num_recv_called > 0);
            if deliverable {
                break;
            }
            self.send_wait.wait(kernel, &self.mb_lock);
        }

        self.inner.exclusive_session(|i| {
            i.buffer = message;
            i.buffer_writable = false;
        });

        self.recv_wait.signal(kernel, &self.mb_lock);
        self.mb_lock.release(kernel);
    }

    pub fn receive(&self, kernel: &Kernel) -> i32 {
        self.mb_lock.acquire(kernel);

        // 先亮出身份, 叫醒可能在等接收者的发送方
        self.inner.exclusive_session(|i| i.num_recv_called += 1);
        self.send_wait.signal(kernel, &self.mb_lock);

        while self.inner.exclusive_session(|i| i.buffer_writable) {
            self.recv_wait.wait(kernel, &self.mb_lock);
        }

        let message = self.inner.exclusive_session(|i| {
            i.num_recv_called -= 1;
            i.buffer_writable = true;
            i.buffer
        });

        self.mb_lock.release(kernel);
        message
    }
}
