//! # Critical Sections
//!
//! Every multi-field access to the kernel singleton from thread mode must
//! be guarded against the tick interrupt, which can run between any two
//! instructions and otherwise observe or mutate the same TCB fields
//! mid-update.

use cortex_m::interrupt;

/// Execute a closure with interrupts masked, returning its result.
///
/// This masks *all* interrupts, not just the tick source — the kernel has
/// no way to know what else an integrating application has wired up, and
/// a partial mask would reintroduce the same race with anything sharing
/// priority with `SysTick`.
///
/// # Performance
/// Keep critical sections short: the longer interrupts stay masked, the
/// later `SysTick` fires relative to its programmed period.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(&interrupt::CriticalSection) -> R,
{
    interrupt::free(f)
}
