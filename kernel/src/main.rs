use nos::{BootArgs, Kernel};

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let opts = BootArgs::parse(&args);

    let kernel = Kernel::new(opts);
    kernel.initialize();
    kernel.run();
    kernel.teardown();
    // 正常停机以 0 退出
}
