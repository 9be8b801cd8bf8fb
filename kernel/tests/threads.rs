// 线程, 调度与同步原语的端到端测试.
// 每个用例启动一台独立的模拟机, 测试线程本身就是它的 main 线程

use std::sync::{Arc, Mutex};

use nos::kernel::{BootArgs, Kernel};
use nos::sync::{Condition, Lock, Mailbox, Semaphore};
use nos::thread::scheduler::SchedulerKind;
use nos::thread::Thread;

fn boot(kind: SchedulerKind, preemptive: bool) -> Arc<Kernel> {
    let opts = BootArgs {
        scheduler_kind: kind,
        preemptive,
        format: true,
        ..BootArgs::default()
    };
    let kernel = Kernel::new(opts);
    kernel.initialize();
    kernel
}

#[test]
fn fcfs_ping_pong_alternates() {
    let kernel = boot(SchedulerKind::Fcfs, false);
    let log: Arc<Mutex<Vec<(i32, i32)>>> = Arc::new(Mutex::new(Vec::new()));

    let forked = Thread::new("forked thread", 0, false);
    {
        let log = log.clone();
        forked.fork(&kernel, move |k| {
            for num in 0..5 {
                log.lock().unwrap().push((1, num));
                k.yield_now();
            }
        });
    }

    for num in 0..5 {
        log.lock().unwrap().push((0, num));
        kernel.yield_now();
    }
    kernel.run_until_idle();

    let log = log.lock().unwrap();
    let expected: Vec<(i32, i32)> = (0..5).flat_map(|n| [(0, n), (1, n)]).collect();
    assert_eq!(*log, expected);
}

#[test]
fn semaphore_ping_pong() {
    let kernel = boot(SchedulerKind::Fcfs, false);
    let ping = Arc::new(Semaphore::new("ping", 0));
    let pong = Arc::new(Semaphore::new("pong", 0));
    let rounds = Arc::new(Mutex::new(0));

    let helper = Thread::new("ping helper", 0, false);
    {
        let (ping, pong, rounds) = (ping.clone(), pong.clone(), rounds.clone());
        helper.fork(&kernel, move |k| {
            for _ in 0..10 {
                ping.p(k);
                *rounds.lock().unwrap() += 1;
                pong.v(k);
            }
        });
    }

    for _ in 0..10 {
        ping.v(&kernel);
        pong.p(&kernel);
    }
    kernel.run_until_idle();

    assert_eq!(*rounds.lock().unwrap(), 10);
}

#[test]
fn lock_provides_mutual_exclusion() {
    let kernel = boot(SchedulerKind::Fcfs, false);
    let lock = Lock::new("counter lock");
    let state = Arc::new(Mutex::new((0i32, false, false))); // (counter, in_critical, violated)

    let mut workers = Vec::new();
    for i in 0..2 {
        let worker = Thread::new(&format!("worker{}", i), 0, false);
        let lock = lock.clone();
        let state = state.clone();
        worker.fork(&kernel, move |k| {
            for _ in 0..20 {
                lock.acquire(k);
                {
                    let mut s = state.lock().unwrap();
                    if s.1 {
                        s.2 = true; // 有第二个线程闯进了临界区
                    }
                    s.1 = true;
                }
                // 在临界区里主动让出, 引诱别人进来
                k.yield_now();
                {
                    let mut s = state.lock().unwrap();
                    s.1 = false;
                    s.0 += 1;
                }
                lock.release(k);
            }
        });
        workers.push(worker);
    }

    kernel.run_until_idle();
    let s = state.lock().unwrap();
    assert_eq!(s.0, 40);
    assert!(!s.2, "two threads were inside the critical section");
}

#[test]
fn condition_handles_producer_consumer() {
    let kernel = boot(SchedulerKind::Fcfs, false);
    let lock = Lock::new("buffer lock");
    let not_empty = Arc::new(Condition::new("not empty"));
    let not_full = Arc::new(Condition::new("not full"));
    // 容量为 1 的缓冲
    let slot: Arc<Mutex<Option<i32>>> = Arc::new(Mutex::new(None));
    let received = Arc::new(Mutex::new(Vec::new()));

    let producer = Thread::new("producer", 0, false);
    {
        let (lock, not_empty, not_full, slot) =
            (lock.clone(), not_empty.clone(), not_full.clone(), slot.clone());
        producer.fork(&kernel, move |k| {
            for item in 0..8 {
                lock.acquire(k);
                while slot.lock().unwrap().is_some() {
                    not_full.wait(k, &lock);
                }
                *slot.lock().unwrap() = Some(item);
                not_empty.signal(k, &lock);
                lock.release(k);
            }
        });
    }

    let consumer = Thread::new("consumer", 0, false);
    {
        let (lock, not_empty, not_full, slot, received) = (
            lock.clone(),
            not_empty.clone(),
            not_full.clone(),
            slot.clone(),
            received.clone(),
        );
        consumer.fork(&kernel, move |k| {
            for _ in 0..8 {
                lock.acquire(k);
                while slot.lock().unwrap().is_none() {
                    not_empty.wait(k, &lock);
                }
                let item = slot.lock().unwrap().take().unwrap();
                received.lock().unwrap().push(item);
                not_full.signal(k, &lock);
                lock.release(k);
            }
        });
    }

    kernel.run_until_idle();
    assert_eq!(*received.lock().unwrap(), (0..8).collect::<Vec<_>>());
}

#[test]
fn mailbox_pairs_send_with_receive() {
    let kernel = boot(SchedulerKind::Fcfs, false);
    let mailbox = Arc::new(Mailbox::new("mb"));
    let log = Arc::new(Mutex::new(Vec::new()));

    let sender = Thread::new("sender", 0, false);
    {
        let (mailbox, log) = (mailbox.clone(), log.clone());
        sender.fork(&kernel, move |k| {
            mailbox.send(k, 42);
            log.lock().unwrap().push("sent".to_string());
        });
    }

    let receiver = Thread::new("receiver", 0, false);
    {
        let (mailbox, log) = (mailbox.clone(), log.clone());
        receiver.fork(&kernel, move |k| {
            let message = mailbox.receive(k);
            log.lock().unwrap().push(format!("got {}", message));
        });
    }

    kernel.run_until_idle();
    let log = log.lock().unwrap();
    assert!(log.contains(&"sent".to_string()));
    assert!(log.contains(&"got 42".to_string()));
}

#[test]
fn join_waits_for_child_to_finish() {
    let kernel = boot(SchedulerKind::Fcfs, false);
    let done = Arc::new(Mutex::new(false));

    let child = Thread::new("child", 0, true);
    {
        let done = done.clone();
        child.fork(&kernel, move |_k| {
            *done.lock().unwrap() = true;
        });
    }

    child.join(&kernel);
    assert!(*done.lock().unwrap(), "join returned before the child finished");
    kernel.run_until_idle();
}

// 场景: H(6) 抢占式优先级调度下等 L(1) 持有的锁,
// L 的有效优先级被抬到 6, 释放后回落到 1
#[test]
fn priority_donation_through_a_lock() {
    let kernel = boot(SchedulerKind::Priority, true);
    let lock = Lock::new("donated lock");
    let gate = Arc::new(Semaphore::new("gate", 0));
    let log = Arc::new(Mutex::new(Vec::new()));

    let low = Thread::new("L", 1, false);
    {
        let (lock, gate, log) = (lock.clone(), gate.clone(), log.clone());
        low.fork(&kernel, move |k| {
            lock.acquire(k);
            log.lock().unwrap().push("L acquired".to_string());
            // 握着锁等 main 放行, 维持"持锁被等"的局面
            gate.p(k);
            log.lock().unwrap().push("L releasing".to_string());
            lock.release(k);
        });
    }
    // L 的优先级高于 main, fork 之后它已经跑到 gate.p 处阻塞
    assert_eq!(low.effective_priority(), 1);

    let high = Thread::new("H", 6, false);
    {
        let (lock, log) = (lock.clone(), log.clone());
        high.fork(&kernel, move |k| {
            log.lock().unwrap().push("H acquiring".to_string());
            lock.acquire(k);
            log.lock().unwrap().push("H acquired".to_string());
            lock.release(k);
        });
    }

    // H 已经试图拿锁并阻塞, 有效优先级捐给了 L
    assert_eq!(low.effective_priority(), 6);
    assert_eq!(low.priority(), 1);

    gate.v(&kernel);
    kernel.run_until_idle();

    // 释放之后捐赠撤销
    assert_eq!(low.effective_priority(), 1);
    let log = log.lock().unwrap();
    assert_eq!(
        *log,
        vec![
            "L acquired".to_string(),
            "H acquiring".to_string(),
            "L releasing".to_string(),
            "H acquired".to_string(),
        ]
    );
}

// 场景: SetSleep(50) 与 SetSleep(10) 同时挂起, 后者先醒且不早于第 10 tick
#[test]
fn sleep_queue_wakes_in_deadline_order() {
    let kernel = boot(SchedulerKind::Fcfs, false);
    let log: Arc<Mutex<Vec<(String, usize)>>> = Arc::new(Mutex::new(Vec::new()));
    let base = kernel.total_ticks();

    let slow = Thread::new("slow", 0, false);
    {
        let log = log.clone();
        slow.fork(&kernel, move |k| {
            k.set_sleep(50);
            log.lock().unwrap().push(("slow".to_string(), k.total_ticks()));
        });
    }
    let fast = Thread::new("fast", 0, false);
    {
        let log = log.clone();
        fast.fork(&kernel, move |k| {
            k.set_sleep(10);
            log.lock().unwrap().push(("fast".to_string(), k.total_ticks()));
        });
    }

    kernel.run_until_idle();

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].0, "fast");
    assert_eq!(log[1].0, "slow");
    assert!(log[0].1 >= base + 10, "woke before its deadline");
    assert!(log[1].1 >= base + 50, "woke before its deadline");
}

// 场景: α=0.5, 初始预测 10, 实际 burst 依次 20 和 40, 预测应为 27
#[test]
fn sjf_burst_prediction_smoothing() {
    let kernel = boot(SchedulerKind::Sjf, false);

    let worker = Thread::new("worker", 0, false);
    worker.fork(&kernel, move |k| {
        k.tick_user(20);
        k.yield_now();
        k.tick_user(40);
        k.yield_now();
    });

    assert_eq!(worker.burst_time(), 10);

    // 第一轮: 0.5*20 + 0.5*10 = 15
    kernel.yield_now();
    assert_eq!(worker.burst_time(), 15);

    // 第二轮: 0.5*40 + 0.5*15 = 27.5 -> 27
    kernel.yield_now();
    assert_eq!(worker.burst_time(), 27);

    kernel.run_until_idle();
}

#[test]
#[should_panic]
fn zero_sleep_is_a_contract_violation() {
    let kernel = boot(SchedulerKind::Fcfs, false);
    kernel.set_sleep(0);
}

#[test]
fn frame_allocator_accounting() {
    let kernel = boot(SchedulerKind::Fcfs, false);
    let total = nos::machine::NUM_PHYS_PAGES;
    assert_eq!(kernel.num_avail_frames(), total);

    let mut frames = Vec::new();
    while let Some(ppn) = kernel.acquire_frame() {
        frames.push(ppn);
    }
    assert_eq!(frames.len(), total);
    assert_eq!(kernel.num_avail_frames(), 0);

    // 互不重复
    let mut sorted = frames.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sorted.len(), total);

    kernel.release_frame(frames[7]);
    assert_eq!(kernel.num_avail_frames(), 1);
    assert_eq!(kernel.acquire_frame(), Some(frames[7]));
}
