//! # Kernel Singleton
//!
//! The scheduler's state (the TCB table, the current/next handles, the
//! tick counter) and the public API that operates on it. A single
//! [`Kernel`] instance lives as a `static mut`; the raw pointer alongside
//! it is what the architecture layer's interrupt handlers dereference,
//! since they cannot hold a `&mut` borrow across calls the way ordinary
//! Rust code would.
//!
//! Every public function here that touches more than one TCB field wraps
//! its body in [`sync::critical_section`] — the tick interrupt can
//! otherwise run between any two of the function's instructions.

use crate::arch::cortex_m as arch;
use crate::config::MAX_TASKS;
use crate::sync;
use crate::task::{Autostart, TaskHandle, TaskState, Tcb, NO_TASK};

/// Errors returned by the kernel's task-management API.
///
/// Marked `#[non_exhaustive]` so new failure modes can be added without
/// breaking callers that already match exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum KernelError {
    /// [`create_task`] was called with the TCB table already full.
    TableFull,
    /// A handle passed to [`activate_task`] does not name a registered
    /// task.
    InvalidHandle,
    /// A kernel function other than [`init`] was called before `init`
    /// ran.
    NotInitialized,
}

impl core::fmt::Display for KernelError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            KernelError::TableFull => write!(f, "task table is full"),
            KernelError::InvalidHandle => write!(f, "task handle is not registered"),
            KernelError::NotInitialized => write!(f, "kernel::init was not called"),
        }
    }
}

/// Whether [`Kernel::dispatch`] was invoked from interrupt context or
/// from a task's own thread-mode call. The register-save convention this
/// port uses (explicit R4-R11 push/pop in the PendSV trampoline, see
/// `arch::cortex_m`) does not need to branch on this to compute a stack
/// offset the way the alternative in-line-asm convention would, but it
/// is kept for diagnostics and to make the call site explicit in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchKind {
    FromIsr,
    FromThread,
}

/// The kernel's scheduler state: the TCB table plus the bookkeeping
/// needed to select and switch to the next task.
pub struct Kernel {
    /// Number of registered tasks, including the idle task.
    pub n_tasks: usize,
    /// Handle of the task currently `Running`, or [`NO_TASK`] before the
    /// first switch.
    pub current: TaskHandle,
    /// Handle chosen by the most recent [`Kernel::dispatch`] run.
    pub next: TaskHandle,
    /// Monotonic tick counter; wraps on overflow.
    pub global_tick: u32,
    /// Fixed-capacity TCB table; one slot is reserved for idle.
    pub tasks: [Tcb; MAX_TASKS + 1],
    /// Whether the boot-stack-to-idle transition has happened yet. The
    /// trampoline must not try to save an outgoing stack pointer for a
    /// task that was never actually running.
    pub first_switch: bool,
}

impl Kernel {
    pub const fn new() -> Self {
        Self {
            n_tasks: 0,
            current: NO_TASK,
            next: NO_TASK,
            global_tick: 0,
            tasks: [Tcb::EMPTY; MAX_TASKS + 1],
            first_switch: true,
        }
    }

    /// Register a task's metadata in the next free slot. Does not
    /// synthesize the initial stack frame — that is architecture-specific
    /// and handled by the free function [`create_task`] below, which
    /// calls both this and [`arch::init_task_stack`] under one critical
    /// section.
    pub fn create_task(
        &mut self,
        entry: extern "C" fn() -> !,
        priority: u8,
        autostart: Autostart,
    ) -> Result<TaskHandle, KernelError> {
        if self.n_tasks >= self.tasks.len() {
            return Err(KernelError::TableFull);
        }
        // Fields are written before the count is incremented: incrementing
        // first would make the dispatcher's `0..n_tasks` scan visit this
        // slot before `init` has run, briefly exposing a task with
        // priority 0 and an entry pointing at the previous occupant.
        let handle = self.n_tasks;
        self.tasks[handle].init(priority, entry, autostart);
        self.n_tasks += 1;
        Ok(handle)
    }

    /// Select the task to run next: the eligible task (`Ready` or
    /// `Running`) with the highest priority, ties broken in favor of the
    /// lowest handle. Returns whether the selection differs from
    /// `current` — i.e., whether a context switch is needed.
    pub fn dispatch(&mut self, kind: SwitchKind) -> bool {
        let mut best: TaskHandle = NO_TASK;
        let mut best_priority: i16 = -1;
        for i in 0..self.n_tasks {
            if self.tasks[i].is_eligible() && (self.tasks[i].priority as i16) > best_priority {
                best_priority = self.tasks[i].priority as i16;
                best = i;
            }
        }
        // The idle task is always Ready or Running, so some eligible task
        // always exists once init() has registered it. If this ever
        // fires, idle itself was left out of the table or put into a
        // blocking state, which is a kernel bug, not a runtime condition.
        debug_assert!(best != NO_TASK, "dispatcher found no eligible task");
        #[cfg(feature = "defmt-logging")]
        defmt::trace!(
            "dispatch({}): current={} next={}",
            match kind {
                SwitchKind::FromIsr => "isr",
                SwitchKind::FromThread => "thread",
            },
            self.current,
            best
        );
        self.next = best;
        self.next != self.current
    }

    /// Advance the tick counter, wake any task whose delay has expired,
    /// and run the dispatcher. Returns whether a context switch is
    /// needed. Called only from `SysTick`.
    pub fn tick(&mut self) -> bool {
        self.global_tick = self.global_tick.wrapping_add(1);
        for i in 0..self.n_tasks {
            if self.tasks[i].state == TaskState::Waiting {
                self.tasks[i].local_tick -= 1;
                if self.tasks[i].local_tick == 0 {
                    self.tasks[i].state = TaskState::Ready;
                }
            }
        }
        self.dispatch(SwitchKind::FromIsr)
    }

    /// Record the outgoing task's saved stack pointer. Called by the
    /// PendSV trampoline after it has pushed R4-R11 onto that task's
    /// stack, before [`Kernel::commit_switch`] runs.
    pub fn save_outgoing_sp(&mut self, sp: *mut u32) {
        if self.first_switch || self.current == NO_TASK {
            return;
        }
        self.tasks[self.current].sp = sp;
    }

    /// Commit the switch decided by the most recent [`Kernel::dispatch`]:
    /// demote the outgoing task from `Running` to `Ready` (it may already
    /// be `Waiting`/`Suspended` if it blocked itself before dispatching),
    /// promote `next` to `Running`, and return its saved stack pointer
    /// for the trampoline to restore. Called only from the PendSV
    /// trampoline.
    pub fn commit_switch(&mut self) -> *mut u32 {
        let outgoing = self.current;
        if outgoing != NO_TASK && self.tasks[outgoing].state == TaskState::Running {
            self.tasks[outgoing].state = TaskState::Ready;
        }
        self.current = self.next;
        self.tasks[self.current].state = TaskState::Running;
        self.first_switch = false;
        self.tasks[self.current].sp
    }
}

// ---------------------------------------------------------------------------
// Global singleton
// ---------------------------------------------------------------------------

static mut KERNEL: Kernel = Kernel::new();

/// Raw pointer to [`KERNEL`] for use from interrupt handlers, which
/// cannot hold a Rust borrow across the naked-asm boundary. Set once by
/// [`init`]; never null afterward.
#[no_mangle]
pub static mut KERNEL_PTR: *mut Kernel = core::ptr::null_mut();

extern "C" fn idle_task() -> ! {
    loop {
        cortex_m::asm::wfi();
    }
}

/// Initialize the kernel. Must be called exactly once, before any other
/// function in this module.
///
/// Registers the idle task as a side effect, claiming handle 0. Idle
/// creation is logically part of `start`'s boot sequence, but it must
/// physically happen here rather than in [`start`], because application
/// code calls [`create_task`] for its own tasks *between* `init` and
/// `start` — if idle were created inside `start`, it would claim
/// whatever handle came after the application's tasks instead of 0.
pub fn init() {
    unsafe {
        KERNEL = Kernel::new();
        KERNEL_PTR = core::ptr::addr_of_mut!(KERNEL);
    }
    let idle = create_task(idle_task, 0, Autostart::AutoStart)
        .expect("idle task registration cannot fail: the table is empty");
    debug_assert_eq!(idle, 0, "idle task must occupy handle 0");
}

/// Register a new task. Priority 0 is lowest; the idle task (handle 0)
/// always holds priority 0 and is always eligible, so an application
/// task should use priority 1 or higher to guarantee preference over it.
pub fn create_task(
    entry: extern "C" fn() -> !,
    priority: u8,
    autostart: Autostart,
) -> Result<TaskHandle, KernelError> {
    sync::critical_section(|_cs| unsafe {
        let kernel = &mut *KERNEL_PTR;
        let handle = kernel.create_task(entry, priority, autostart)?;
        arch::init_task_stack(&mut kernel.tasks[handle], entry);
        #[cfg(feature = "defmt-logging")]
        defmt::debug!("create_task: handle={} priority={}", handle, priority);
        Ok(handle)
    })
}

/// Block the calling task for `ticks` system ticks. `delay(0)` makes the
/// caller immediately eligible again without actually transitioning
/// through `Waiting`; the dispatcher may still keep it running if no
/// higher-priority task is eligible.
pub fn delay(ticks: u32) {
    let need_switch = sync::critical_section(|_cs| unsafe {
        let kernel = &mut *KERNEL_PTR;
        let current = kernel.current;
        if current != NO_TASK {
            if ticks == 0 {
                kernel.tasks[current].state = TaskState::Ready;
                kernel.tasks[current].local_tick = 0;
            } else {
                kernel.tasks[current].state = TaskState::Waiting;
                kernel.tasks[current].local_tick = ticks;
            }
        }
        kernel.dispatch(SwitchKind::FromThread)
    });
    if need_switch {
        arch::trigger_pendsv();
    }
}

/// Suspend the calling task indefinitely. Only [`activate_task`] can
/// make it eligible again.
pub fn suspend() {
    let need_switch = sync::critical_section(|_cs| unsafe {
        let kernel = &mut *KERNEL_PTR;
        let current = kernel.current;
        if current != NO_TASK {
            kernel.tasks[current].state = TaskState::Suspended;
        }
        kernel.dispatch(SwitchKind::FromThread)
    });
    if need_switch {
        arch::trigger_pendsv();
    }
}

/// Make `handle` eligible for scheduling, regardless of its previous
/// state, and run the dispatcher. Returns [`KernelError::InvalidHandle`]
/// if `handle` does not name a registered task.
pub fn activate_task(handle: TaskHandle) -> Result<(), KernelError> {
    let need_switch = sync::critical_section(|_cs| unsafe {
        let kernel = &mut *KERNEL_PTR;
        if handle >= kernel.n_tasks {
            return Err(KernelError::InvalidHandle);
        }
        kernel.tasks[handle].state = TaskState::Ready;
        Ok(kernel.dispatch(SwitchKind::FromThread))
    })?;
    if need_switch {
        arch::trigger_pendsv();
    }
    Ok(())
}

/// Read the global tick counter.
pub fn get_clock() -> u32 {
    sync::critical_section(|_cs| unsafe { (*KERNEL_PTR).global_tick })
}

/// Configure the tick source, pick the first task to run, and launch it.
/// Never returns.
pub fn start(mut core_peripherals: cortex_m::Peripherals) -> ! {
    arch::configure_systick(&mut core_peripherals.SYST);
    arch::set_interrupt_priorities();

    let first_sp = sync::critical_section(|_cs| unsafe {
        let kernel = &mut *KERNEL_PTR;
        debug_assert!(kernel.n_tasks > 0, "start() called before init()");
        kernel.global_tick = 0;
        kernel.current = NO_TASK;
        kernel.dispatch(SwitchKind::FromThread);
        let first = kernel.next;
        kernel.tasks[first].state = TaskState::Running;
        kernel.current = first;
        kernel.first_switch = false;
        kernel.tasks[first].sp as *const u32
    });

    unsafe { arch::start_first_task(first_sp) }
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn task_a() -> ! {
        loop {}
    }
    extern "C" fn task_b() -> ! {
        loop {}
    }

    #[test]
    fn create_task_assigns_dense_handles() {
        let mut k = Kernel::new();
        let h0 = k.create_task(task_a, 1, Autostart::AutoStart).unwrap();
        let h1 = k.create_task(task_b, 2, Autostart::AutoStart).unwrap();
        assert_eq!(h0, 0);
        assert_eq!(h1, 1);
        assert_eq!(k.n_tasks, 2);
    }

    #[test]
    fn create_task_fails_when_table_full() {
        let mut k = Kernel::new();
        for _ in 0..k.tasks.len() {
            k.create_task(task_a, 1, Autostart::AutoStart).unwrap();
        }
        assert_eq!(
            k.create_task(task_a, 1, Autostart::AutoStart),
            Err(KernelError::TableFull)
        );
    }

    #[test]
    fn dispatch_prefers_higher_priority() {
        let mut k = Kernel::new();
        k.create_task(task_a, 1, Autostart::AutoStart).unwrap();
        k.create_task(task_b, 5, Autostart::AutoStart).unwrap();
        k.dispatch(SwitchKind::FromThread);
        assert_eq!(k.next, 1);
    }

    #[test]
    fn dispatch_breaks_ties_on_lowest_handle() {
        let mut k = Kernel::new();
        k.create_task(task_a, 3, Autostart::AutoStart).unwrap();
        k.create_task(task_b, 3, Autostart::AutoStart).unwrap();
        k.dispatch(SwitchKind::FromThread);
        assert_eq!(k.next, 0);
    }

    #[test]
    fn dispatch_skips_suspended_and_waiting_tasks() {
        let mut k = Kernel::new();
        k.create_task(task_a, 5, Autostart::StartSuspended).unwrap();
        k.create_task(task_b, 1, Autostart::AutoStart).unwrap();
        k.dispatch(SwitchKind::FromThread);
        assert_eq!(k.next, 1);
    }

    #[test]
    fn tick_wakes_task_when_local_tick_reaches_zero() {
        let mut k = Kernel::new();
        let h = k.create_task(task_a, 1, Autostart::AutoStart).unwrap();
        k.tasks[h].state = TaskState::Waiting;
        k.tasks[h].local_tick = 2;
        k.tick();
        assert_eq!(k.tasks[h].state, TaskState::Waiting);
        assert_eq!(k.tasks[h].local_tick, 1);
        k.tick();
        assert_eq!(k.tasks[h].state, TaskState::Ready);
    }

    #[test]
    fn global_tick_wraps_instead_of_panicking() {
        let mut k = Kernel::new();
        k.global_tick = u32::MAX;
        k.tick();
        assert_eq!(k.global_tick, 0);
    }

    #[test]
    fn commit_switch_demotes_running_outgoing_to_ready() {
        let mut k = Kernel::new();
        let a = k.create_task(task_a, 1, Autostart::AutoStart).unwrap();
        let b = k.create_task(task_b, 2, Autostart::AutoStart).unwrap();
        k.current = a;
        k.tasks[a].state = TaskState::Running;
        k.first_switch = false;
        k.next = b;
        k.commit_switch();
        assert_eq!(k.tasks[a].state, TaskState::Ready);
        assert_eq!(k.tasks[b].state, TaskState::Running);
        assert_eq!(k.current, b);
    }

    #[test]
    fn commit_switch_preserves_outgoing_waiting_state() {
        // A task that called delay() has already moved itself to Waiting
        // before dispatch ran; commit_switch must not clobber that back
        // to Ready just because it was the outgoing task.
        let mut k = Kernel::new();
        let a = k.create_task(task_a, 1, Autostart::AutoStart).unwrap();
        let b = k.create_task(task_b, 2, Autostart::AutoStart).unwrap();
        k.current = a;
        k.tasks[a].state = TaskState::Waiting;
        k.tasks[a].local_tick = 5;
        k.first_switch = false;
        k.next = b;
        k.commit_switch();
        assert_eq!(k.tasks[a].state, TaskState::Waiting);
    }
}
