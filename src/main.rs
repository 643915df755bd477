//! # rtk demo firmware
//!
//! Three tasks exercising the kernel's scheduling guarantees:
//!
//! | Task | Priority | Behavior |
//! |------|----------|----------|
//! | `heartbeat_task` | 5 | Wakes every tick, always preempts the other two |
//! | `producer_task` | 3 | Does a short burst, then activates `consumer_task` and delays |
//! | `consumer_task` | 2 | Starts suspended; only runs once `producer_task` releases it |
//!
//! With no eligible task among these three, the idle task (priority 0,
//! registered automatically by `kernel::init`) runs instead and halts
//! the core with `wfi` until the next tick.

#![no_std]
#![no_main]

use cortex_m_rt::entry;
use panic_halt as _;

use rtk::kernel;
use rtk::task::Autostart;

/// Handle of `consumer_task`, filled in by `main` after `create_task`
/// returns it. Read only by `producer_task`, after the handle has been
/// assigned and before the scheduler starts — no concurrent writer ever
/// exists, so no critical section guards the read.
static mut CONSUMER_HANDLE: usize = 0;

/// **Heartbeat task** (priority 5, highest).
///
/// Always preempts the other two the moment it becomes eligible: it
/// does a trivial amount of work, then `delay`s one tick and is put
/// back to sleep until `SysTick` wakes it again. Demonstrates that a
/// higher-priority task always wins the dispatcher regardless of what
/// the lower-priority tasks are doing.
extern "C" fn heartbeat_task() -> ! {
    loop {
        kernel::delay(1);
    }
}

/// **Producer task** (priority 3).
///
/// Does a short burst of work, releases `consumer_task` with
/// `activate_task`, then delays for a few ticks before repeating.
/// Demonstrates the suspend/activate handshake: `consumer_task` never
/// wakes up on its own, only when explicitly activated here.
extern "C" fn producer_task() -> ! {
    let mut work: u32 = 0;
    loop {
        for _ in 0..1000 {
            work = work.wrapping_add(1);
        }
        let consumer = unsafe { CONSUMER_HANDLE };
        kernel::activate_task(consumer).expect("consumer handle is always valid");
        kernel::delay(10);
    }
}

/// **Consumer task** (priority 2).
///
/// Starts `Suspended`; each time `producer_task` activates it, it does
/// a short burst of work and then suspends itself again, waiting for
/// the next activation.
extern "C" fn consumer_task() -> ! {
    loop {
        let mut work: u32 = 0;
        for _ in 0..500 {
            work = work.wrapping_add(1);
        }
        kernel::suspend();
    }
}

#[entry]
fn main() -> ! {
    let cp = cortex_m::Peripherals::take().unwrap();

    kernel::init();

    kernel::create_task(heartbeat_task, 5, Autostart::AutoStart)
        .expect("failed to create heartbeat_task");
    kernel::create_task(producer_task, 3, Autostart::AutoStart)
        .expect("failed to create producer_task");
    let consumer = kernel::create_task(consumer_task, 2, Autostart::StartSuspended)
        .expect("failed to create consumer_task");
    unsafe {
        CONSUMER_HANDLE = consumer;
    }

    kernel::start(cp)
}
