// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The safe kernel variant: OSEK/VDX BCC1/BCC2 plus memory-protected
//! processes, failure accounting, and the system-call gate, layered on
//! top of the bare kernel's INTC facade, slot pool, and activation
//! engine rather than duplicating them.
//!
//! `kern` owns the hardware and the due-time math; everything here is
//! process-awareness bolted on top of it — which process owns which task,
//! whether that process is suspended, what happens when one of its tasks
//! calls `terminate_task`, and the gated entry points a user process is
//! allowed to call into the kernel through at all.

#![cfg_attr(not(test), no_std)]

pub mod events;
pub mod fault;
pub mod process;
pub mod runtime;
pub mod syscall;

pub use abi::{ConformanceClass, FaultCause, KernelError, ProcessId};

/// Must run after every `install_process`/`create_event`/`register_*_task`
/// call and before the first tick, same as the bare kernel's own
/// `init_kernel`. Installs this crate's activation filter (so a suspended
/// process's tasks stop being activated at the tick/software-activation
/// level, not just at task-body-call time) before delegating to the bare
/// kernel's own `init_kernel` for the INTC setup this variant adds
/// nothing to.
pub fn init_kernel() {
    events::install_activation_filter();
    kern::sched::init_kernel();
}
