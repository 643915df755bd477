//! # rtk — a minimal fixed-priority preemptive kernel core
//!
//! A small real-time kernel for ARMv7-M (Cortex-M3/M4): a TCB table, a
//! fixed-priority dispatcher, and the PendSV/SysTick context-switch
//! mechanism that drives it.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                    Application Tasks                    │
//! ├────────────────────────────────────────────────────────┤
//! │                 Kernel API (kernel.rs)                  │
//! │    init() · create_task() · start()                     │
//! │    delay() · suspend() · activate_task() · get_clock()  │
//! ├──────────────┬───────────────────────┬─────────────────┤
//! │  Task Model  │   Sync Primitives     │   HAL Seam      │
//! │  task.rs     │   sync.rs             │   hal.rs        │
//! │  ─ Tcb       │   ─ critical_section  │   ─ HeartbeatSink│
//! │  ─ TaskState │                       │                 │
//! ├──────────────┴───────────────────────┴─────────────────┤
//! │            Arch Port (arch/cortex_m.rs)                  │
//! │    PendSV · SysTick · Stack Init · Interrupt Priorities │
//! ├────────────────────────────────────────────────────────┤
//! │             ARMv7-M Hardware (Thumb-2)                   │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Scheduling model
//!
//! Every task has a fixed priority assigned at creation; the dispatcher
//! always runs the highest-priority task that is `Ready` or `Running`,
//! breaking ties in favor of the lowest task handle. There is no time
//! slicing and no priority inheritance — a higher-priority task always
//! preempts a lower-priority one the instant it becomes eligible, on the
//! next tick or the next blocking call.
//!
//! ## Memory model
//!
//! - No heap, no `alloc`: every task's stack is a fixed-size array
//!   embedded directly in its TCB (`task::Stack`).
//! - The TCB table itself is a fixed-size array sized at compile time
//!   (`config::MAX_TASKS + 1`, the `+1` for the idle task).
//! - All cross-context shared state goes through
//!   `sync::critical_section`, never through a lock that could block.

#![no_std]

pub mod arch;
pub mod config;
pub mod hal;
pub mod kernel;
pub mod sync;
pub mod task;
