// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Real INTC backend, targeting the e200z-core INTC block found on the
//! reference MCU family (Current Priority Register / Interrupt
//! Acknowledge Register / End-Of-Interrupt Register, plus one
//! Software-Set/Clear Interrupt Register per four sources).
//!
//! This module owns raw register access only. The vector table, the
//! preemptable-flag array, and the decision of what to call live in
//! [`crate::intc`] — see its module docs for why that split exists.

use abi::Priority;
use core::arch::{asm, global_asm};
use core::ptr;

/// Base address of the INTC block. Reference-hardware-specific; adjust per
/// board support package.
const INTC_BASE: usize = 0xFFF4_8000;

const CPR_OFFSET: usize = 0x08;
const IACKR_OFFSET: usize = 0x10;
const EOIR_OFFSET: usize = 0x18;
/// Per-source priority select registers, one byte each; we only use the
/// low nibble (priorities 0..15).
const PSR_BASE_OFFSET: usize = 0x40;
/// Two 32-bit Software-Set/Clear Interrupt Registers cover the eight
/// software-triggered sources used as activation slots, four sources
/// packed per register in the top two bits of each byte.
const SSCIR_BASE_OFFSET: usize = 0x00;

unsafe fn mmio_read(offset: usize) -> u32 {
    unsafe { ptr::read_volatile((INTC_BASE + offset) as *const u32) }
}

unsafe fn mmio_write(offset: usize, value: u32) {
    unsafe { ptr::write_volatile((INTC_BASE + offset) as *mut u32, value) }
}

pub fn disable_external_interrupts() {
    unsafe { asm!("wrteei 0") }
}

pub fn enable_external_interrupts() {
    unsafe { asm!("wrteei 1") }
}

/// Full memory barrier: every store issued before this point must be
/// globally visible before any instruction after it executes.
pub fn memory_barrier() {
    unsafe { asm!("msync") }
}

/// Instruction-synchronizing barrier: flushes the pipeline so a priority
/// write just committed is observed by the interrupt logic before we
/// re-enable interrupts.
pub fn instruction_sync_barrier() {
    unsafe { asm!("isync") }
}

pub fn read_priority() -> Priority {
    Priority(unsafe { mmio_read(CPR_OFFSET) } as u8 & 0x0f)
}

pub fn write_priority(p: Priority) {
    unsafe { mmio_write(CPR_OFFSET, p.0 as u32) }
}

pub fn read_slot_registers() -> [u32; 2] {
    unsafe {
        [
            mmio_read(SSCIR_BASE_OFFSET),
            mmio_read(SSCIR_BASE_OFFSET + 4),
        ]
    }
}

/// Writes an entire Software-Set/Clear Interrupt Register. Must be a whole
/// word store: the INTC itself clears the in-service bit of a sibling slot
/// in this same word from interrupt context, and a read-modify-write here
/// would silently undo that.
pub fn write_slot_register(index: usize, value: u32) {
    unsafe { mmio_write(SSCIR_BASE_OFFSET + index * 4, value) }
}

pub fn write_vector_priority(index: usize, priority: Priority) {
    unsafe { mmio_write(PSR_BASE_OFFSET + index, priority.0 as u32) };
}

pub fn end_of_interrupt() {
    unsafe { mmio_write(EOIR_OFFSET, 0) }
}

/// Reads the Interrupt-Acknowledge register. On this hardware that single
/// read both identifies the highest-pending vector and causes the INTC to
/// start tracking its priority as "in service" — there is no separate
/// software step to elevate the current priority register.
///
/// # Safety
///
/// Must only be called from the External-Interrupt entry stub, once per
/// entry, before any other IACKR-adjacent state is touched.
#[no_mangle]
unsafe extern "C" fn acknowledge_interrupt() -> u32 {
    (unsafe { mmio_read(IACKR_OFFSET) }) & 0xff
}

// The External-Interrupt entry stub: saves the volatile GPRs and the
// exception-return registers (SRR0/SRR1) to the current stack, reads
// IACKR to learn the dispatched vector, hands it to
// `kern_intc_dispatch` (defined in `crate::intc`, which owns the vector
// table, the preemptable-flag array, and the re-enable decision), then on
// return disables interrupts again, performs the EOI write, restores
// context, and `rfi`s back out.
global_asm!(
    r#"
.section .text.intc_entry
.global intc_entry
.type intc_entry, @function
intc_entry:
    stwu    1, -80(1)
    stw     0, 4(1)
    stmw    3, 8(1)
    mfsrr0  3
    stw     3, 72(1)
    mfsrr1  3
    stw     3, 76(1)

    bl      acknowledge_interrupt
    mr      3, 3
    bl      kern_intc_dispatch

    wrteei  0
    li      3, 0
    stw     3, {eoir_reg}@l(0)

    lwz     3, 72(1)
    mtsrr0  3
    lwz     3, 76(1)
    mtsrr1  3
    lwz     0, 4(1)
    lmw     3, 8(1)
    addi    1, 1, 80
    rfi
"#,
    eoir_reg = const INTC_BASE + EOIR_OFFSET,
);

extern "C" {
    pub fn intc_entry();
}

/// Saved nonvolatile register context for one task-termination restore
/// point: GPRs r14-r31, the stack pointer, the link register, and the
/// condition register — the same set a PowerPC `setjmp` saves, since this
/// is exactly that operation.
#[derive(Copy, Clone)]
struct Continuation {
    buf: [u32; 21],
}

impl Continuation {
    const fn new() -> Self {
        Self { buf: [0; 21] }
    }
}

/// Bounds how deeply one task's dispatch may preempt another's before a
/// termination restore point is available for it — matches the slot
/// count, since that is also the hardware's own bound on simultaneously
/// in-service activations.
const MAX_CONTINUATION_DEPTH: usize = abi::SLOT_COUNT;

static mut CONTINUATION_STACK: [Continuation; MAX_CONTINUATION_DEPTH] = [Continuation::new(); MAX_CONTINUATION_DEPTH];
static mut CONTINUATION_DEPTH: usize = 0;

extern "C" {
    /// Saves the caller's nonvolatile context into `buf` and returns 0.
    /// If `kern_restore_continuation(buf, v)` is later called with the same
    /// `buf` (from anywhere, any depth of nested calls below this one),
    /// this call appears to return a second time, with return value `v`
    /// instead of 0 — the same contract as C's `setjmp`/`longjmp`.
    fn kern_save_continuation(buf: *mut u32) -> i32;
    fn kern_restore_continuation(buf: *const u32, return_value: i32) -> !;
}

global_asm!(
    r#"
.section .text.kern_save_continuation
.global kern_save_continuation
.type kern_save_continuation, @function
kern_save_continuation:
    stw     14, 0(3)
    stw     15, 4(3)
    stw     16, 8(3)
    stw     17, 12(3)
    stw     18, 16(3)
    stw     19, 20(3)
    stw     20, 24(3)
    stw     21, 28(3)
    stw     22, 32(3)
    stw     23, 36(3)
    stw     24, 40(3)
    stw     25, 44(3)
    stw     26, 48(3)
    stw     27, 52(3)
    stw     28, 56(3)
    stw     29, 60(3)
    stw     30, 64(3)
    stw     31, 68(3)
    stw     1,  72(3)
    mflr    0
    stw     0,  76(3)
    mfcr    0
    stw     0,  80(3)
    li      3, 0
    blr

.section .text.kern_restore_continuation
.global kern_restore_continuation
.type kern_restore_continuation, @function
kern_restore_continuation:
    lwz     14, 0(3)
    lwz     15, 4(3)
    lwz     16, 8(3)
    lwz     17, 12(3)
    lwz     18, 16(3)
    lwz     19, 20(3)
    lwz     20, 24(3)
    lwz     21, 28(3)
    lwz     22, 32(3)
    lwz     23, 36(3)
    lwz     24, 40(3)
    lwz     25, 44(3)
    lwz     26, 48(3)
    lwz     27, 52(3)
    lwz     28, 56(3)
    lwz     29, 60(3)
    lwz     30, 64(3)
    lwz     31, 68(3)
    lwz     1,  72(3)
    lwz     0,  76(3)
    mtlr    0
    lwz     0,  80(3)
    mtcr    0
    mr      3, 4
    blr
"#,
);

/// Runs `f` (a dispatched task body), returning `None` if it ran to
/// completion or `Some(error_code)` if it called [`terminate_current_task`]
/// partway through. Pushes a fresh restore point on [`CONTINUATION_STACK`]
/// so a task preempted by another task that is also terminated doesn't
/// clobber its own restore point — termination always unwinds to the
/// innermost still-running dispatch, never past it.
pub fn with_task_continuation(f: impl FnOnce()) -> Option<u32> {
    let depth = unsafe { CONTINUATION_DEPTH };
    if depth >= MAX_CONTINUATION_DEPTH {
        f();
        return None;
    }
    unsafe { CONTINUATION_DEPTH = depth + 1 };
    let rc = unsafe { kern_save_continuation(CONTINUATION_STACK[depth].buf.as_mut_ptr()) };
    if rc != 0 {
        unsafe { CONTINUATION_DEPTH = depth };
        return Some((rc - 1) as u32);
    }
    f();
    unsafe { CONTINUATION_DEPTH = depth };
    None
}

/// Abandons the currently dispatching task body partway through, recording
/// `error_code` for [`with_task_continuation`]'s caller to see. Never
/// returns to its own caller — control resumes inside
/// `with_task_continuation` instead, as if the task body had returned
/// normally right after the call that originally entered it.
pub fn terminate_current_task(error_code: u32) -> ! {
    let depth = unsafe { CONTINUATION_DEPTH };
    debug_assert!(depth > 0, "terminate_current_task called outside any dispatched task");
    let buf_ptr = unsafe { CONTINUATION_STACK[depth - 1].buf.as_ptr() };
    unsafe { kern_restore_continuation(buf_ptr, error_code as i32 + 1) }
}
