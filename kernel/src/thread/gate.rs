use std::sync::{Condvar, Mutex};

// 调度闸门: 架构相关的换栈在宿主上的对应物.
//
// 每个模拟线程由一个宿主线程承载, 不在 CPU 上时停在自己的闸门里.
// 切换 = 放行对方的闸门, 然后停进自己的闸门.
// 放行与停靠之间自己不再碰任何内核状态, 因此任意时刻
// 至多一个模拟线程在内核结构上执行
pub(crate) struct DispatchGate {
    runnable: Mutex<bool>,
    cv: Condvar,
}

impl DispatchGate {
    pub fn new() -> Self {
        Self {
            runnable: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    // 放行对方
    pub fn pass(&self) {
        let mut runnable = self.runnable.lock().unwrap();
        *runnable = true;
        self.cv.notify_one();
    }

    // 停进闸门, 直到被放行
    pub fn wait(&self) {
        let mut runnable = self.runnable.lock().unwrap();
        while !*runnable {
            runnable = self.cv.wait(runnable).unwrap();
        }
        *runnable = false;
    }
}
