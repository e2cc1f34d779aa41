// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The INTC Facade: vector table, per-vector priority, and the
//! External-Interrupt entry/exit contract.
//!
//! The preemptable flag for each vector is kept in a parallel array rather
//! than stolen from the high bit of the handler's function pointer. Packing
//! it into the pointer is a real space optimization on the reference
//! firmware, but it also means casting a `fn()` to an integer, masking a
//! bit out of it, and casting back — which is exactly the kind of pointer
//! surgery Rust makes deliberately awkward, for good reason (provenance).
//! A 256-entry `bool` array costs 256 bytes of `.bss` and stays honest.
//!
//! The table itself, and whether entries are registered or still the
//! diagnostic default, lives here rather than in `arch`: `arch` only knows
//! how to read and write raw registers, never what a vector index *means*.

use crate::arch;
use abi::{KernelError, Priority, TaskId};
use core::sync::atomic::{AtomicU32, Ordering};

const VECTOR_COUNT: usize = 256;

type Handler = fn();

fn diagnostic_default_handler() {
    // A vector fired that was never registered. In production the
    // per-vector priority is left at 0, so the INTC will never actually
    // dispatch here; if it does, something upstream misprogrammed a
    // priority register, and we want to know the vector index.
    #[cfg(debug_assertions)]
    {
        panic!("unregistered interrupt vector {}", DIAGNOSTIC_BAD_VECTOR.load(Ordering::Relaxed));
    }
}

/// Records the most recent vector to dispatch through the diagnostic
/// default handler. Debugger-visible; not part of any public API.
static DIAGNOSTIC_BAD_VECTOR: AtomicU32 = AtomicU32::new(u32::MAX);

struct VectorEntry {
    handler: Handler,
    preemptable: bool,
    registered: bool,
}

const UNREGISTERED: VectorEntry = VectorEntry {
    handler: diagnostic_default_handler,
    preemptable: false,
    registered: false,
};

/// `#[repr(align)]` can't be placed directly on a `static` or an array
/// type, only on a struct/union/enum definition, so the table is wrapped
/// in a single-field newtype purely to carry the alignment the INTC's
/// autocomputed handler address requires.
#[repr(align(2048))]
struct VectorTable([VectorEntry; VECTOR_COUNT]);

static mut VECTOR_TABLE: VectorTable = VectorTable([UNREGISTERED; VECTOR_COUNT]);

/// Must run once before any task or interrupt source is registered.
/// Installs the diagnostic default handler at priority 0 everywhere.
pub fn init() {
    for i in 0..VECTOR_COUNT {
        arch::write_vector_priority(i, Priority(0));
    }
}

/// Registers `handler` at `vector_index`, to run at `priority` (1..15).
/// `preemptable` controls whether external interrupts are re-enabled
/// before the handler runs, per step 3 of the entry contract.
pub fn register_handler(
    handler: Handler,
    vector_index: usize,
    priority: Priority,
    preemptable: bool,
) -> Result<(), KernelError> {
    if vector_index >= VECTOR_COUNT {
        return Err(KernelError::BadArgument);
    }
    if priority.0 > 15 {
        return Err(KernelError::BadPriority);
    }
    unsafe {
        VECTOR_TABLE.0[vector_index] = VectorEntry { handler, preemptable, registered: true };
    }
    arch::write_vector_priority(vector_index, priority);
    Ok(())
}

/// Installs `body` as the handler for `task_id`'s activation slot, at the
/// task's own priority. Tasks are always preemptable by strictly
/// higher-priority work; only the scheduler tick itself (registered
/// separately, at priority 15) runs non-preemptable.
pub fn register_task_trampoline(task_id: TaskId, body: Handler, priority: Priority) -> Result<(), KernelError> {
    register_handler(body, task_id.index(), priority, true)
}

/// The External-Interrupt body: steps 3 through 5 of the entry contract.
/// Step 1 (context save) and step 2 (IACKR read) happen before this is
/// called — in the assembly stub on real hardware, or explicitly in test
/// setup against the `sim` backend.
#[no_mangle]
pub extern "C" fn kern_intc_dispatch(vector_index: u32) {
    dispatch(vector_index as usize)
}

pub fn dispatch(vector_index: usize) {
    let entry_preemptable;
    let entry_handler;
    unsafe {
        let entry = &VECTOR_TABLE.0[vector_index];
        entry_preemptable = entry.preemptable;
        entry_handler = entry.handler;
        if !entry.registered {
            DIAGNOSTIC_BAD_VECTOR.store(vector_index as u32, Ordering::Relaxed);
        }
    }

    if entry_preemptable {
        arch::enable_external_interrupts();
    }

    entry_handler();

    arch::disable_external_interrupts();
    arch::end_of_interrupt();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::sim;
    use core::sync::atomic::{AtomicU32 as TestCounter, Ordering as TestOrdering};

    static CALLS: TestCounter = TestCounter::new(0);

    fn recording_handler() {
        CALLS.fetch_add(1, TestOrdering::Relaxed);
    }

    fn reset_calls() {
        CALLS.store(0, TestOrdering::Relaxed);
    }

    #[test]
    fn register_rejects_bad_vector_index() {
        sim::reset();
        let err = register_handler(recording_handler, VECTOR_COUNT, Priority(5), true).unwrap_err();
        assert_eq!(err, KernelError::BadArgument);
    }

    #[test]
    fn dispatch_calls_the_registered_handler_exactly_once() {
        sim::reset();
        reset_calls();
        register_handler(recording_handler, 3, Priority(5), true).unwrap();
        sim::set_next_acknowledged_vector(3);
        sim::acknowledge_interrupt();
        dispatch(3);
        assert_eq!(CALLS.load(TestOrdering::Relaxed), 1);
    }

    #[test]
    fn preemptable_handler_runs_with_interrupts_enabled() {
        sim::reset();
        reset_calls();
        register_handler(
            || {
                assert!(crate::arch::sim::irq_enabled(), "a preemptable handler must run with interrupts re-enabled");
                CALLS.fetch_add(1, TestOrdering::Relaxed);
            },
            4,
            Priority(6),
            true,
        )
        .unwrap();
        sim::set_next_acknowledged_vector(4);
        sim::acknowledge_interrupt();
        dispatch(4);
        assert_eq!(CALLS.load(TestOrdering::Relaxed), 1);
    }

    #[test]
    fn non_preemptable_handler_runs_with_interrupts_disabled() {
        sim::reset();
        reset_calls();
        register_handler(
            || {
                assert!(!crate::arch::sim::irq_enabled(), "a non-preemptable handler must not see interrupts re-enabled");
                CALLS.fetch_add(1, TestOrdering::Relaxed);
            },
            5,
            Priority(15),
            false,
        )
        .unwrap();
        sim::set_next_acknowledged_vector(5);
        sim::acknowledge_interrupt();
        dispatch(5);
        assert_eq!(CALLS.load(TestOrdering::Relaxed), 1);
    }

    #[test]
    fn dispatch_restores_prior_priority_after_eoi() {
        sim::reset();
        reset_calls();
        sim::set_priority(Priority(2));
        register_handler(recording_handler, 6, Priority(9), true).unwrap();
        sim::set_next_acknowledged_vector(6);
        sim::acknowledge_interrupt();
        assert_eq!(sim::priority(), Priority(9));
        dispatch(6);
        assert_eq!(sim::priority(), Priority(2), "end-of-interrupt must restore the priority that was active before acknowledge");
    }

    #[test]
    fn dispatch_leaves_interrupts_disabled_on_return() {
        sim::reset();
        register_handler(recording_handler, 7, Priority(5), true).unwrap();
        sim::set_next_acknowledged_vector(7);
        sim::acknowledge_interrupt();
        dispatch(7);
        assert!(!sim::irq_enabled(), "entry contract step 5 disables interrupts before the EOI write");
    }
}
