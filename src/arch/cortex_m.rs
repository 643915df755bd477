//! # ARMv7-M Port Layer
//!
//! Hardware-specific code for Cortex-M3/M4 (Thumb-2). Implements context
//! switching via PendSV, SysTick timer configuration, and interrupt
//! priority setup.
//!
//! ## Context switch mechanism
//!
//! Tasks run in Thread mode on the process stack (PSP); the kernel and
//! interrupt handlers use the main stack (MSP). On exception entry, the
//! hardware automatically stacks R0-R3, R12, LR, PC, and xPSR onto the
//! process stack. `PendSV` additionally pushes/pops R4-R11 by hand,
//! completing the full register set without relying on the compiler to
//! emit a particular callee-saved prologue — the alternative ±N-word SP
//! offset trick ties the save point to whatever the calling function
//! happened to push, which breaks the moment an unrelated code change
//! alters that function's register allocation.
//!
//! ## Interrupt priorities
//!
//! `SysTick` and `PendSV` both run at the lowest priority (0xFF). Keeping
//! `PendSV` lowest means it never preempts an application ISR — it only
//! runs once nothing else wants the CPU, exactly the point at which a
//! context switch is safe to perform.

use core::arch::asm;
use cortex_m::peripheral::syst::SystClkSource;

use crate::config::{SYSTEM_CLOCK_HZ, TICK_PERIOD_US};
use crate::hal::HeartbeatSink;
use crate::task::Tcb;

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

fn reload_value() -> u32 {
    // USEC_TO_COUNT(period_us, clock_hz): ticks = period_us * (clock_hz / 1e6).
    // Widened to u64 so the multiplication can't overflow for a fast clock
    // and a long tick period before the final divide.
    let ticks = (SYSTEM_CLOCK_HZ as u64 * TICK_PERIOD_US as u64) / 1_000_000;
    (ticks as u32).saturating_sub(1)
}

/// Configure the SysTick timer to fire every [`crate::config::TICK_PERIOD_US`].
pub fn configure_systick(syst: &mut cortex_m::peripheral::SYST) {
    syst.set_reload(reload_value());
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

/// Reprogram the reload value and clear the current count. Called from
/// `SysTick` itself every tick, so the period stays exact even if a
/// future config supports changing it at runtime; this mirrors the
/// reload-on-every-tick behavior of the RTOS this port is based on,
/// rather than relying purely on the timer's own auto-reload.
fn reload_systick() {
    const SYST_RVR: *mut u32 = 0xE000_E014 as *mut u32;
    const SYST_CVR: *mut u32 = 0xE000_E018 as *mut u32;
    unsafe {
        core::ptr::write_volatile(SYST_RVR, reload_value());
        core::ptr::write_volatile(SYST_CVR, 0);
    }
}

// ---------------------------------------------------------------------------
// PendSV trigger
// ---------------------------------------------------------------------------

/// Pend a `PendSV` exception, requesting a context switch. The switch
/// itself happens once the processor next has nothing higher-priority
/// to run — not synchronously with this call.
#[inline]
pub fn trigger_pendsv() {
    const ICSR: *mut u32 = 0xE000_ED04 as *mut u32;
    const PENDSVSET: u32 = 1 << 28;
    unsafe {
        core::ptr::write_volatile(ICSR, PENDSVSET);
    }
}

// ---------------------------------------------------------------------------
// Interrupt priority configuration
// ---------------------------------------------------------------------------

/// Set `PendSV` and `SysTick` to the lowest interrupt priority (0xFF).
pub fn set_interrupt_priorities() {
    const SHPR3: *mut u32 = 0xE000_ED20 as *mut u32;
    unsafe {
        let current = core::ptr::read_volatile(SHPR3);
        core::ptr::write_volatile(SHPR3, current | (0xFF << 16) | (0xFF << 24));
    }
}

// ---------------------------------------------------------------------------
// Initial stack frame synthesis
// ---------------------------------------------------------------------------

/// Fallback entry if a task's `extern "C" fn() -> !` somehow returns.
/// Tasks are contractually non-returning; this just halts instead of
/// falling off into whatever instructions happen to follow.
extern "C" fn task_exit() -> ! {
    loop {
        cortex_m::asm::wfi();
    }
}

/// Synthesize the initial stack frame for a freshly created task so that
/// the first time it is switched in, the trampoline's register restore
/// and exception return land it at `entry` with interrupts enabled.
///
/// Lays out, from low to high address: 8 software-saved registers
/// (R4-R11, all zero — a task's prologue never examines them), then the
/// hardware exception frame (R0-R3, R12, LR, PC, xPSR). `sp` is left
/// pointing at the first software-saved word.
pub fn init_task_stack(tcb: &mut Tcb, entry: extern "C" fn() -> !) {
    const FRAME_WORDS: usize = 16;
    let words = tcb.stack.0.len();
    debug_assert!(words >= FRAME_WORDS, "STACK_SIZE too small for one exception frame");
    let frame_ptr = unsafe { tcb.stack.0.as_mut_ptr().add(words - FRAME_WORDS) };

    unsafe {
        for i in 0..8 {
            *frame_ptr.add(i) = 0; // R4..R11
        }
        *frame_ptr.add(8) = 0; // R0
        *frame_ptr.add(9) = 0; // R1
        *frame_ptr.add(10) = 0; // R2
        *frame_ptr.add(11) = 0; // R3
        *frame_ptr.add(12) = 0; // R12
        *frame_ptr.add(13) = task_exit as usize as u32; // LR
        *frame_ptr.add(14) = entry as usize as u32; // PC
        *frame_ptr.add(15) = 0x0100_0000; // xPSR, Thumb bit set
    }

    tcb.sp = frame_ptr;
}

// ---------------------------------------------------------------------------
// First task launch
// ---------------------------------------------------------------------------

/// Switch to PSP and branch into the first task. Called once from
/// `kernel::start`; never returns.
///
/// # Safety
/// Must be called exactly once, with a stack pointer produced by
/// [`init_task_stack`], and only after interrupt priorities and SysTick
/// are already configured.
pub unsafe fn start_first_task(psp: *const u32) -> ! {
    asm!(
        "adds r0, #32",       // skip the 8 SW-saved words; psp is in r0
        "msr psp, r0",
        "movs r0, #2",        // CONTROL.SPSEL = 1: Thread mode uses PSP
        "msr control, r0",
        "isb",
        "pop {{r0-r3, r12}}", // hardware frame, part 1
        "pop {{r4}}",         // LR (task_exit, discarded — never returns here)
        "pop {{r5}}",         // PC (task entry)
        "pop {{r6}}",         // xPSR (discarded, processor resets its own)
        "cpsie i",
        "bx r5",
        in("r0") psp,
        options(noreturn)
    );
}

// ---------------------------------------------------------------------------
// PendSV handler (context switch trampoline)
// ---------------------------------------------------------------------------

/// `PendSV` — the context-switch trampoline.
///
/// 1. Push R4-R11 onto the outgoing task's stack (PSP).
/// 2. Record that stack pointer in the outgoing TCB.
/// 3. Commit the switch decided by the most recent `dispatch` call.
/// 4. Pop R4-R11 from the incoming task's stack.
/// 5. Return from exception; hardware restores R0-R3, R12, LR, PC, xPSR.
///
/// # Safety
/// Naked function invoked directly by the NVIC. Must preserve the exact
/// ARMv7-M exception entry/exit convention — there is no Rust-level
/// prologue or epilogue here at all.
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() {
    core::arch::naked_asm!(
        "mrs r0, psp",
        "stmdb r0!, {{r4-r11}}",
        "bl {save_outgoing}",
        "bl {commit}",
        "ldmia r0!, {{r4-r11}}",
        "msr psp, r0",
        "ldr r0, =0xFFFFFFFD", // EXC_RETURN: Thread mode, PSP, no FP
        "bx r0",
        save_outgoing = sym save_outgoing_context,
        commit = sym commit_context_switch,
    );
}

/// Store the outgoing task's post-push stack pointer. Called only from
/// `PendSV`'s assembly, with `r0` (the new PSP) passed as the argument.
///
/// # Safety
/// Must only be called from `PendSV` with interrupts already effectively
/// serialized by the exception itself.
#[no_mangle]
unsafe extern "C" fn save_outgoing_context(psp: *mut u32) {
    (*crate::kernel::KERNEL_PTR).save_outgoing_sp(psp);
}

/// Commit the pending switch and return the incoming task's stack
/// pointer. Called only from `PendSV`'s assembly.
///
/// # Safety
/// Same as [`save_outgoing_context`].
#[no_mangle]
unsafe extern "C" fn commit_context_switch() -> *mut u32 {
    (*crate::kernel::KERNEL_PTR).commit_switch()
}

// ---------------------------------------------------------------------------
// Heartbeat
// ---------------------------------------------------------------------------

static mut HEARTBEAT_SINK: Option<&'static mut dyn HeartbeatSink> = None;
static mut HEARTBEAT_TICKS: u32 = 0;
static mut HEARTBEAT_LEVEL: bool = false;

/// Register the output the tick handler toggles when
/// [`crate::config::ENABLE_HEARTBEAT`] is set. Call before
/// [`crate::kernel::start`].
pub fn register_heartbeat_sink(sink: &'static mut dyn HeartbeatSink) {
    unsafe {
        HEARTBEAT_SINK = Some(sink);
    }
}

fn refresh_heartbeat() {
    use crate::config::{ENABLE_HEARTBEAT, HEARTBEAT_PERIOD_US};
    if !ENABLE_HEARTBEAT {
        return;
    }
    let interval = (HEARTBEAT_PERIOD_US / TICK_PERIOD_US).max(1);
    unsafe {
        HEARTBEAT_TICKS += 1;
        if HEARTBEAT_TICKS >= interval {
            HEARTBEAT_TICKS = 0;
            HEARTBEAT_LEVEL = !HEARTBEAT_LEVEL;
            if let Some(sink) = HEARTBEAT_SINK.as_deref_mut() {
                sink.set(HEARTBEAT_LEVEL);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// SysTick handler
// ---------------------------------------------------------------------------

/// `SysTick` — the periodic tick source. Drives the optional heartbeat,
/// advances the kernel's tick counter, wakes expired delays, runs the
/// dispatcher, and reprograms the reload value for the next period.
#[no_mangle]
pub unsafe extern "C" fn SysTick() {
    refresh_heartbeat();
    let kernel = &mut *crate::kernel::KERNEL_PTR;
    let need_switch = kernel.tick();
    reload_systick();
    if need_switch {
        trigger_pendsv();
    }
}
