// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The Priority Gate: the only primitive the kernel needs for mutual
//! exclusion. Everything else — the slot pool's loss-counter race with the
//! tick, the safe variant's per-process counters — is built by bracketing a
//! critical section with these two calls.
//!
//! There is deliberately no software-maintained lock anywhere in this
//! kernel. The INTC already suppresses every interrupt source at or below
//! the current priority level; raising that level *is* the lock.

use abi::Priority;

/// Atomically reads the current INTC priority level and, if `p` is more
/// urgent, raises it to `p`. Returns the prior level so the caller can
/// restore it later with [`resume_down_to`].
///
/// Idempotent when `p` is not more urgent than the current level: the
/// register is left untouched and the current level is returned unchanged.
/// This is what makes nested `suspend_up_to`/`resume_down_to` pairs safe —
/// an OSEK-style `GetResource` inside another `GetResource` for a
/// lower-or-equal ceiling is a no-op, not a double-raise.
pub fn suspend_up_to(p: Priority) -> Priority {
    arch::disable_external_interrupts();
    arch::memory_barrier();
    let prior = arch::read_priority();
    let result = if p.is_more_urgent_than(prior) {
        arch::write_priority(p);
        prior
    } else {
        prior
    };
    arch::instruction_sync_barrier();
    arch::enable_external_interrupts();
    result
}

/// Atomically writes `p` into the INTC priority register.
///
/// # Safety contract (not enforced by the type system)
///
/// Callers must never pass a priority below their own statically assigned
/// level: doing so would let the INTC re-dispatch the caller's own
/// still-in-service activation, recursively, from inside itself. The caller
/// must also be the same task that previously called `suspend_up_to` for
/// this critical section, and must do so before it returns.
pub fn resume_down_to(p: Priority) {
    arch::disable_external_interrupts();
    arch::memory_barrier();
    arch::write_priority(p);
    arch::instruction_sync_barrier();
    arch::enable_external_interrupts();
}

use crate::arch;
