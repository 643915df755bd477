//! # Hardware Abstraction Seam
//!
//! The kernel core is hardware-agnostic beyond the ARMv7-M exception
//! mechanics in [`crate::arch::cortex_m`]. The one optional exception is
//! the heartbeat ("is-alive") diagnostic output: a single GPIO pin toggled
//! periodically by the tick handler so an external observer (logic
//! analyzer, LED) can see the kernel is still ticking.
//!
//! Integrating firmware implements this trait against its concrete GPIO
//! peripheral and registers an instance with
//! [`crate::arch::cortex_m::register_heartbeat_sink`] before calling
//! [`crate::kernel::start`]. The kernel never constructs or owns a
//! concrete GPIO type itself.

/// A single-bit output the tick handler can toggle at a configured
/// period. See [`crate::config::ENABLE_HEARTBEAT`] and
/// [`crate::config::HEARTBEAT_PERIOD_US`].
pub trait HeartbeatSink {
    /// Drive the heartbeat output high (`true`) or low (`false`).
    fn set(&mut self, level: bool);
}
