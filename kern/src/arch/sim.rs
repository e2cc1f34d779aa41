// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Host-testable stand-in for the INTC.
//!
//! Unlike the real hardware backend, this one never runs on the target; it
//! exists purely so `gate`, `slots`, `intc`, and `sched` can be exercised by
//! `cargo test` on the build host. State lives in a `thread_local!` rather
//! than a single shared global so that tests running concurrently on
//! separate threads (the default `cargo test` behavior) don't interfere
//! with each other.

use abi::Priority;
use std::cell::RefCell;

struct State {
    priority: u8,
    slot_regs: [u32; 2],
    vector_priorities: [u8; 256],
    in_service: Vec<u8>,
    irq_enabled: bool,
    disable_count: u32,
    next_acknowledged_vector: usize,
}

impl Default for State {
    fn default() -> Self {
        Self {
            priority: 0,
            slot_regs: [0; 2],
            vector_priorities: [0; 256],
            in_service: Vec::new(),
            irq_enabled: true,
            disable_count: 0,
            next_acknowledged_vector: 0,
        }
    }
}

thread_local! {
    static STATE: RefCell<State> = RefCell::new(State::default());
}

/// Resets all simulated register state. Call at the top of every test that
/// touches the sim so tests don't depend on execution order.
pub fn reset() {
    STATE.with(|s| *s.borrow_mut() = State::default());
}

pub fn disable_external_interrupts() {
    STATE.with(|s| {
        let mut s = s.borrow_mut();
        s.irq_enabled = false;
        s.disable_count += 1;
    });
}

pub fn enable_external_interrupts() {
    STATE.with(|s| s.borrow_mut().irq_enabled = true);
}

pub fn memory_barrier() {}

pub fn instruction_sync_barrier() {}

pub fn read_priority() -> Priority {
    STATE.with(|s| Priority(s.borrow().priority))
}

pub fn write_priority(p: Priority) {
    STATE.with(|s| s.borrow_mut().priority = p.0);
}

pub fn read_slot_registers() -> [u32; 2] {
    STATE.with(|s| s.borrow().slot_regs)
}

/// Matches the real SSCIR's write-1-to-set/write-1-to-clear behavior: a 0
/// bit in `value` leaves the corresponding bit alone rather than clearing
/// it, so a whole-register store that only sets one slot's bits can never
/// clobber a sibling slot packed into the same register. A flat assignment
/// here would silently undo whatever the INTC itself had just set.
pub fn write_slot_register(index: usize, value: u32) {
    STATE.with(|s| s.borrow_mut().slot_regs[index] |= value);
}

/// Simulates the INTC's own internal retirement of a slot (acknowledge
/// then end-of-interrupt), which really does zero the word — unlike a
/// software write through [`write_slot_register`], which can only ever add
/// bits. Test-only: real dispatch retires a slot through
/// [`acknowledge_interrupt`]/[`end_of_interrupt`], not a register write.
pub fn clear_slot_register(index: usize) {
    STATE.with(|s| s.borrow_mut().slot_regs[index] = 0);
}

pub fn write_vector_priority(index: usize, priority: Priority) {
    STATE.with(|s| s.borrow_mut().vector_priorities[index] = priority.0);
}

/// Emulates reading the Interrupt-Acknowledge register: on real hardware
/// this single read both identifies the highest-pending vector and causes
/// the INTC to start tracking its priority as "in service" (the current
/// priority register is updated as a side effect of the read). Here the
/// "which vector is pending" half is driven by
/// [`set_next_acknowledged_vector`] rather than a real arbitration model,
/// since the slot pool and scheduler logic are unit tested directly rather
/// than through a simulated full dispatch.
pub fn acknowledge_interrupt() -> usize {
    STATE.with(|s| {
        let mut s = s.borrow_mut();
        let vector_index = s.next_acknowledged_vector;
        let priority = s.vector_priorities[vector_index];
        s.in_service.push(priority);
        s.priority = priority;
        vector_index
    })
}

/// Emulates the end-of-interrupt write: pops the in-service stack and
/// restores whatever priority level was active before this interrupt was
/// acknowledged.
pub fn end_of_interrupt() {
    STATE.with(|s| {
        let mut s = s.borrow_mut();
        s.in_service.pop();
        s.priority = s.in_service.last().copied().unwrap_or(0);
    });
}

// --- test-only inspection and control helpers, not part of the arch
// --- contract implemented by the real hardware backend.

pub fn priority() -> Priority {
    read_priority()
}

pub fn set_priority(p: Priority) {
    write_priority(p);
}

pub fn slot_registers() -> [u32; 2] {
    read_slot_registers()
}

pub fn irq_enabled() -> bool {
    STATE.with(|s| s.borrow().irq_enabled)
}

pub fn disable_count() -> u32 {
    STATE.with(|s| s.borrow().disable_count)
}

pub fn set_next_acknowledged_vector(index: usize) {
    STATE.with(|s| s.borrow_mut().next_acknowledged_vector = index);
}

/// Carries a terminated task's error code up through an ordinary Rust
/// unwind. Never meant to cross a `catch_unwind` other than the one in
/// [`with_task_continuation`]; if it ever does, `resume_unwind` there sends
/// it on its way rather than swallowing an unrelated panic.
struct Terminated(u32);

/// Runs `f` (a dispatched task body) and catches an in-flight
/// [`terminate_current_task`] call the same way the hardware backend's
/// setjmp/longjmp pair does: by unwinding straight back out to here instead
/// of returning through every frame `f` called. `std`'s unwinding machinery
/// already does this correctly and is available in every build that uses
/// this backend, so there is no need for the hardware backend's hand-rolled
/// continuation stack on this side.
pub fn with_task_continuation(f: impl FnOnce() + std::panic::UnwindSafe) -> Option<u32> {
    match std::panic::catch_unwind(f) {
        Ok(()) => None,
        Err(payload) => match payload.downcast::<Terminated>() {
            Ok(t) => Some(t.0),
            Err(other) => std::panic::resume_unwind(other),
        },
    }
}

pub fn terminate_current_task(error_code: u32) -> ! {
    std::panic::panic_any(Terminated(error_code))
}
