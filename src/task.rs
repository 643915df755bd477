//! # Task Control Block
//!
//! Defines the per-task record the kernel schedules: its state, priority,
//! saved stack pointer, wakeup countdown, and private stack storage.
//!
//! ```text
//!   ┌──────────┐    dispatch()     ┌─────────┐
//!   │  Ready   │ ─────────────────►│ Running │
//!   └──────────┘                   └─────────┘
//!        ▲                              │  │
//!        │        tick() wakeup         │  │ delay()
//!        │   ┌──────────────────────────┘  ▼
//!        │   │                        ┌──────────┐
//!        └───┤                        │ Waiting  │
//!            │                        └──────────┘
//!            │   activate_task()           │
//!            │   ┌──────────────────────────┘
//!            ▼   │
//!        ┌───────────┐
//!        │ Suspended │◄── suspend()
//!        └───────────┘
//! ```

use crate::config::STACK_SIZE;

// ---------------------------------------------------------------------------
// Task handle
// ---------------------------------------------------------------------------

/// Opaque handle identifying a task: its slot index in the TCB table.
///
/// Handles are assigned densely starting from 0 by
/// [`crate::kernel::Kernel::create_task`]; the idle task created internally
/// by [`crate::kernel::Kernel::start`] always occupies handle 0.
pub type TaskHandle = usize;

/// Sentinel handle meaning "no task" — the value of `current` before the
/// first context switch.
pub const NO_TASK: TaskHandle = usize::MAX;

// ---------------------------------------------------------------------------
// Task state machine
// ---------------------------------------------------------------------------

/// Execution state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Eligible for selection by the dispatcher.
    Ready,
    /// Currently executing on the CPU. At most one task is `Running` at
    /// any instant observable between interrupts.
    Running,
    /// Blocked on a tick deadline (`local_tick` counts down to 0).
    Waiting,
    /// Blocked indefinitely; only [`crate::kernel::Kernel::activate_task`]
    /// from another task releases it.
    Suspended,
}

/// Whether a newly created task starts `Ready` or `Suspended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Autostart {
    /// Task starts in [`TaskState::Ready`].
    AutoStart,
    /// Task starts in [`TaskState::Suspended`] and must be released with
    /// [`crate::kernel::Kernel::activate_task`].
    StartSuspended,
}

// ---------------------------------------------------------------------------
// Stack storage
// ---------------------------------------------------------------------------

/// A task's private stack, 8-byte aligned per the ARMv7-M AAPCS stack
/// alignment requirement at exception entry.
#[repr(align(8))]
pub struct Stack(pub [u32; STACK_SIZE]);

impl Stack {
    /// A zeroed stack.
    pub const EMPTY: Stack = Stack([0u32; STACK_SIZE]);
}

// ---------------------------------------------------------------------------
// Task Control Block
// ---------------------------------------------------------------------------

/// Task Control Block (TCB) — the per-task record the dispatcher operates
/// on and the context-switch mechanism reads/writes.
///
/// Each TCB owns its stack for the process lifetime; TCBs are never
/// destroyed once created.
pub struct Tcb {
    /// Higher value = higher priority.
    pub priority: u8,
    /// Current execution state.
    pub state: TaskState,
    /// Saved stack pointer. Valid whenever `state != Running`; always
    /// points strictly within `stack`.
    pub sp: *mut u32,
    /// Task entry function. Takes no arguments and must never return.
    pub entry: extern "C" fn() -> !,
    /// Remaining ticks until wakeup while `Waiting`; unused otherwise.
    pub local_tick: u32,
    /// Private stack storage.
    pub stack: Stack,
}

// Safety: `sp` always points into this TCB's own `stack`. Every access to
// a `Tcb` held by the kernel happens inside a critical section (thread
// mode) or with interrupts already serialized by priority (ISR context)
// — see `sync::critical_section`.
unsafe impl Send for Tcb {}
unsafe impl Sync for Tcb {}

impl Tcb {
    /// Entry used to fill unallocated slots. Never scheduled — only
    /// `state`/`priority` default values matter before [`Tcb::init`]
    /// runs; this is a `wfi`-looping stub so a stray invocation (which
    /// should be unreachable) halts rather than jumping to address 0.
    extern "C" fn unallocated_entry() -> ! {
        loop {
            cortex_m::asm::wfi();
        }
    }

    /// An empty (unallocated) TCB, suitable for initializing the static
    /// table. `state` is `Suspended` so an unallocated slot is never
    /// accidentally selected by the dispatcher before it scans `n_tasks`.
    pub const EMPTY: Tcb = Tcb {
        priority: 0,
        state: TaskState::Suspended,
        sp: core::ptr::null_mut(),
        entry: Tcb::unallocated_entry,
        local_tick: 0,
        stack: Stack::EMPTY,
    };

    /// Fill in a freshly allocated slot's non-stack fields. The stack
    /// frame itself is synthesized separately by
    /// `arch::cortex_m::init_task_stack`, since it is architecture-specific.
    pub fn init(&mut self, priority: u8, entry: extern "C" fn() -> !, autostart: Autostart) {
        self.priority = priority;
        self.entry = entry;
        self.local_tick = 0;
        self.state = match autostart {
            Autostart::AutoStart => TaskState::Ready,
            Autostart::StartSuspended => TaskState::Suspended,
        };
    }

    /// Eligible for dispatcher selection: `Ready` or currently `Running`.
    #[inline]
    pub fn is_eligible(&self) -> bool {
        matches!(self.state, TaskState::Ready | TaskState::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn dummy_entry() -> ! {
        loop {}
    }

    #[test]
    fn empty_tcb_is_suspended_and_ineligible() {
        let tcb = Tcb::EMPTY;
        assert_eq!(tcb.state, TaskState::Suspended);
        assert!(!tcb.is_eligible());
    }

    #[test]
    fn init_autostart_sets_ready() {
        let mut tcb = Tcb::EMPTY;
        tcb.init(3, dummy_entry, Autostart::AutoStart);
        assert_eq!(tcb.state, TaskState::Ready);
        assert_eq!(tcb.priority, 3);
        assert_eq!(tcb.local_tick, 0);
        assert!(tcb.is_eligible());
    }

    #[test]
    fn init_start_suspended_sets_suspended() {
        let mut tcb = Tcb::EMPTY;
        tcb.init(1, dummy_entry, Autostart::StartSuspended);
        assert_eq!(tcb.state, TaskState::Suspended);
        assert!(!tcb.is_eligible());
    }

    #[test]
    fn running_is_eligible() {
        let mut tcb = Tcb::EMPTY;
        tcb.init(0, dummy_entry, Autostart::AutoStart);
        tcb.state = TaskState::Running;
        assert!(tcb.is_eligible());
    }

    #[test]
    fn waiting_and_suspended_are_not_eligible() {
        let mut tcb = Tcb::EMPTY;
        tcb.init(0, dummy_entry, Autostart::AutoStart);
        tcb.state = TaskState::Waiting;
        assert!(!tcb.is_eligible());
        tcb.state = TaskState::Suspended;
        assert!(!tcb.is_eligible());
    }
}
