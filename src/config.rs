//! # Kernel Configuration
//!
//! Compile-time constants governing task capacity, stack sizing, and the
//! system tick. All limits are fixed at compile time — no dynamic
//! allocation anywhere in this crate.

/// Maximum number of *user* tasks the kernel can manage (excludes idle).
/// The TCB table itself has capacity `MAX_TASKS + 1`, the extra slot
/// reserved for the idle task created by [`crate::kernel::Kernel::start`].
pub const MAX_TASKS: usize = 8;

/// Per-task stack size, in 32-bit machine words. Must be large enough for
/// the deepest call chain plus one exception frame from the tick handler
/// and the trampoline (16 words minimum for the synthesized initial frame
/// alone).
pub const STACK_SIZE: usize = 256;

/// System tick period, in microseconds. This is the unit `delay` counts
/// in: `delay(k)` waits for `k` periods of this length.
pub const TICK_PERIOD_US: u32 = 1000;

/// System clock frequency in Hz, used to compute the SysTick reload value
/// from [`TICK_PERIOD_US`].
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

/// Whether the tick handler drives an optional heartbeat ("is-alive")
/// output. When `false`, [`crate::hal::HeartbeatSink`] is never invoked
/// and the heartbeat bookkeeping in [`crate::kernel::Kernel::tick`]
/// compiles out to nothing observable.
pub const ENABLE_HEARTBEAT: bool = false;

/// Heartbeat toggle period, in microseconds. Must be a multiple of
/// [`TICK_PERIOD_US`]; the tick handler toggles the heartbeat output once
/// every `HEARTBEAT_PERIOD_US / TICK_PERIOD_US` ticks.
pub const HEARTBEAT_PERIOD_US: u32 = 500_000;
