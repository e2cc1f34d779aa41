// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The bare kernel: OSEK/VDX BCC1/BCC2 over a hardware-vectored interrupt
//! controller.
//!
//! This is the application-independent portion of the operating system: the
//! part that owns the INTC, the task activation slots, and the due-time
//! scheduler. It does not know about memory protection, processes, or
//! system calls — that's `kern-safe`, layered on top.
//!
//! Design principles, in descending priority:
//!
//! 1. The hardware INTC does the hard part (priority arbitration, one-deep
//!    queueing, in-service bookkeeping). The kernel gets out of its way.
//! 2. Static configuration. All tasks are registered before `init_kernel`;
//!    nothing allocates or grows afterward.
//! 3. A strong preference for provably-correct whole-register writes over
//!    read-modify-write, because the INTC is also writing these registers
//!    concurrently from interrupt context.
//! 4. Simple, obviously-correct algorithms over fast, clever ones. The tick
//!    handler is O(tasks) and runs at the highest priority in the system;
//!    it has to stay short on its own merits, not through micro-tuning.

#![cfg_attr(not(any(test, feature = "sim")), no_std)]

#[macro_use]
pub mod arch;

pub mod diag;
pub mod fail;
pub mod gate;
pub mod intc;
pub mod sched;
pub mod slots;

pub use abi::{KernelError, Priority, TaskId};

/// A task body. Called with interrupts at the task's own registered
/// priority; runs to completion; return is the only way out.
pub type TaskBody = fn();

/// Immutable-after-registration description of one task, per the Data
/// Model's task descriptor. The first activation offset is not part of
/// this struct: it is supplied separately to `register_task`, matching the
/// External Interfaces signature, so one descriptor could in principle be
/// reused with a different phase.
#[derive(Copy, Clone)]
pub struct TaskDescriptor {
    pub body: TaskBody,
    /// Cycle period in milliseconds; 0 means "event-only", i.e. the task is
    /// never due-time scheduled and only runs via `activate_task`.
    pub cycle_ms: u32,
    pub priority: Priority,
}
