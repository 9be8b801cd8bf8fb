use core::cell::{RefCell, RefMut};

pub struct UPSafeCell<T> {
    /// inner data
    inner: RefCell<T>,
}

// 模拟机是单处理器: 调度闸门保证任意时刻只有一个模拟线程在执行,
// 因此不存在真正的并发访问, 我们据此向编译器保证 UPSafeCell 是 Sync 的.
// 代价是借用不得跨越任何可能的挂起点(换栈, 开中断), 违反会在运行时 panic
unsafe impl<T> Sync for UPSafeCell<T> {}

impl<T> UPSafeCell<T> {
    /// 使用者需要保证同一时刻只有一个执行流访问该变量
    pub unsafe fn new(value: T) -> Self {
        Self {
            inner: RefCell::new(value),
        }
    }

    /// 以可变借用形式访问
    /// 由于是 borrow_mut 所以相比原生的 RefCell 它不再允许多个读操作同时存在
    pub fn exclusive_access(&self) -> RefMut<'_, T> {
        self.inner.borrow_mut()
    }

    /// 在闭包内完成一次独占访问, 离开闭包即归还借用
    pub fn exclusive_session<F, V>(&self, f: F) -> V
    where
        F: FnOnce(&mut T) -> V,
    {
        f(&mut self.inner.borrow_mut())
    }
}
