// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Events: the safe variant's activation primitive, layered on top of the
//! bare kernel's [`kern::sched`] so the due-time math and the INTC slot
//! pool are reused verbatim. An event is a pending due-time/priority
//! schedule entry; it becomes runnable only once a task body is attached
//! to it with [`register_user_task`], [`register_os_task`], or
//! [`register_init_task`].
//!
//! Every registered task runs behind a fixed trampoline ([`TRAMPOLINES`])
//! rather than the raw body. Suspension is enforced twice: the
//! [`kern::sched::ActivationFilter`] this crate installs
//! ([`install_activation_filter`]) stops a suspended owner's task from
//! ever being requested in the first place, whether the activation came
//! from a tick or from [`trigger_event`]; the trampoline's own check in
//! [`run_safe_task`] is the backstop for a task that was already pending
//! before its owner was suspended. Together these are how `kern-safe`
//! implements the "suspended processes are silently skipped" behavior on
//! top of a bare kernel that has no notion of processes at all.

use crate::runtime;
use abi::{EventId, KernelError, Priority, ProcessId, TaskId, MAX_EVENTS};
use kern::TaskBody;

#[derive(Copy, Clone)]
struct PendingEvent {
    cycle_ms: u32,
    first_offset_ms: u32,
    priority: Priority,
    min_pid_permitted_to_trigger: ProcessId,
}

#[derive(Copy, Clone)]
struct BoundEvent {
    pending: PendingEvent,
    task_id: TaskId,
    owner_pid: ProcessId,
}

struct EventTable {
    pending: [Option<PendingEvent>; MAX_EVENTS],
    bound: [Option<BoundEvent>; MAX_EVENTS],
    count: usize,
}

impl EventTable {
    const fn new() -> Self {
        Self {
            pending: [None; MAX_EVENTS],
            bound: [None; MAX_EVENTS],
            count: 0,
        }
    }

    fn create(&mut self, cycle_ms: u32, first_offset_ms: u32, priority: Priority, min_pid_permitted_to_trigger: ProcessId) -> Result<EventId, KernelError> {
        if !priority.in_task_range() {
            return Err(KernelError::BadPriority);
        }
        if cycle_ms > abi::MAX_CYCLIC_MS || first_offset_ms > abi::MAX_CYCLIC_MS {
            return Err(KernelError::BadCycle);
        }
        if self.count >= MAX_EVENTS {
            return Err(KernelError::OutOfSlots);
        }
        let id = EventId(self.count as u8);
        self.pending[self.count] = Some(PendingEvent { cycle_ms, first_offset_ms, priority, min_pid_permitted_to_trigger });
        self.count += 1;
        Ok(id)
    }

    fn bind(&mut self, event_id: EventId, owner_pid: ProcessId, task_id: TaskId) -> Result<(), KernelError> {
        let i = event_id.index();
        if i >= self.count {
            return Err(KernelError::NotRegistered);
        }
        if self.bound[i].is_some() {
            return Err(KernelError::BadArgument);
        }
        let pending = self.pending[i].expect("a created event always has a pending descriptor until bound");
        self.bound[i] = Some(BoundEvent { pending, task_id, owner_pid });
        Ok(())
    }

    fn get(&self, event_id: EventId) -> Result<&BoundEvent, KernelError> {
        let i = event_id.index();
        if i >= self.count {
            return Err(KernelError::NotRegistered);
        }
        self.bound[i].as_ref().ok_or(KernelError::NotRegistered)
    }
}

static mut EVENTS: EventTable = EventTable::new();

/// Per-slot storage for the real task body, indexed by dense `TaskId`. The
/// fixed trampoline functions below read out of this array rather than
/// being handed the body directly, since a bare `fn()` trampoline cannot
/// close over anything.
static mut TASK_BODIES: [Option<TaskBody>; MAX_EVENTS] = [None; MAX_EVENTS];
static mut TASK_OWNERS: [Option<ProcessId>; MAX_EVENTS] = [None; MAX_EVENTS];

/// The [`kern::sched::ActivationFilter`] this crate installs on the bare
/// kernel's single engine (see [`install_activation_filter`]): rejects
/// activation outright for any task whose owning process is suspended, so
/// the tick handler and software activation both stop writing slot
/// requests for it instead of only refusing to call into its body once
/// already dispatched.
fn task_activation_allowed(task_id: TaskId) -> bool {
    match unsafe { TASK_OWNERS[task_id.index()] } {
        Some(pid) => !runtime::is_process_suspended(pid),
        None => true,
    }
}

/// Installs [`task_activation_allowed`] as the bare kernel's activation
/// gate. Called once from [`crate::init_kernel`]; the bare kernel has no
/// other caller that would want this, since it has no notion of a process
/// to suspend.
pub(crate) fn install_activation_filter() {
    kern::sched::set_activation_filter(Some(task_activation_allowed));
}

fn run_safe_task(slot: usize) {
    let owner = unsafe { TASK_OWNERS[slot] };
    if let Some(pid) = owner {
        if runtime::is_process_suspended(pid) {
            return;
        }
    }
    if let Some(body) = unsafe { TASK_BODIES[slot] } {
        // A task that calls `terminate_task` — or that a fault handler
        // aborted via `fault::raise_fault` — unwinds straight back out to
        // here instead of returning through the rest of its own body; see
        // `kern::arch::with_task_continuation`. Either way that is a
        // recorded failure against the owning process, `crate::fault`
        // tells us which cause.
        if let Some(code) = kern::arch::with_task_continuation(body) {
            if let Some(pid) = owner {
                runtime::record_failure(pid, crate::fault::decode(code));
            }
        }
    }
}

macro_rules! trampoline {
    ($name:ident, $slot:expr) => {
        fn $name() {
            run_safe_task($slot)
        }
    };
}

trampoline!(trampoline_0, 0);
trampoline!(trampoline_1, 1);
trampoline!(trampoline_2, 2);
trampoline!(trampoline_3, 3);
trampoline!(trampoline_4, 4);
trampoline!(trampoline_5, 5);
trampoline!(trampoline_6, 6);
trampoline!(trampoline_7, 7);

const TRAMPOLINES: [TaskBody; MAX_EVENTS] = [
    trampoline_0, trampoline_1, trampoline_2, trampoline_3,
    trampoline_4, trampoline_5, trampoline_6, trampoline_7,
];

/// Reserves a due-time/priority schedule entry without yet attaching a
/// task body to it. Mirrors the bare kernel's registration, but splits it
/// into two steps so a single event's body can be supplied by whichever
/// of `register_user_task`/`register_os_task` applies once the owning
/// process is known.
pub fn create_event(cycle_ms: u32, first_offset_ms: u32, priority: Priority, min_pid_permitted_to_trigger: ProcessId) -> Result<EventId, KernelError> {
    unsafe { EVENTS.create(cycle_ms, first_offset_ms, priority, min_pid_permitted_to_trigger) }
}

/// Tracks how many trampolines have been handed out to `kern::register_task`
/// so far. `kern`'s own `ActivationEngine` assigns dense task ids in
/// registration order starting at 0, and this module is its only caller, so
/// the next id it will hand back is always predictable in advance — which
/// is what lets us pick the matching fixed trampoline *before* making the
/// call, instead of after, when it would already be too late to pass it in.
static mut NEXT_TASK_ID: usize = 0;

fn register_task_for(event_id: EventId, body: TaskBody, owner_pid: ProcessId) -> Result<(), KernelError> {
    let i = event_id.index();
    let pending = unsafe { EVENTS.pending.get(i).copied().flatten() }.ok_or(KernelError::NotRegistered)?;

    let predicted_slot = unsafe { NEXT_TASK_ID };
    if predicted_slot >= MAX_EVENTS {
        return Err(KernelError::OutOfSlots);
    }
    let task_id = kern::sched::register_task(TRAMPOLINES[predicted_slot], pending.cycle_ms, pending.first_offset_ms, pending.priority)?;
    debug_assert_eq!(task_id.index(), predicted_slot, "kern-safe must be the only caller of kern::sched::register_task");
    unsafe { NEXT_TASK_ID += 1 };

    let slot = task_id.index();
    unsafe {
        TASK_BODIES[slot] = Some(body);
        TASK_OWNERS[slot] = Some(owner_pid);
    }
    unsafe { EVENTS.bind(event_id, owner_pid, task_id) }
}

/// Attaches a user-process task body to a previously created event, owned
/// by `pid`. `max_execution_time_us` is the deadline-monitoring budget; 0
/// disables the check, matching the bare kernel's "cycle 0 means
/// event-only" convention.
pub fn register_user_task(event_id: EventId, body: TaskBody, pid: ProcessId, _max_execution_time_us: u32) -> Result<(), KernelError> {
    register_task_for(event_id, body, pid)
}

/// Attaches an OS-owned (kernel-process) task body. OS tasks are never
/// subject to a deadline budget or failure accounting against a user
/// process, since PID 0 is the kernel itself.
pub fn register_os_task(event_id: EventId, body: TaskBody) -> Result<(), KernelError> {
    register_task_for(event_id, body, ProcessId::KERNEL)
}

/// Registers and immediately triggers a one-shot initialization task for
/// `pid`, run once at the lowest task priority. Used for the per-process
/// entry point that runs before any cyclic event fires.
pub fn register_init_task(body: TaskBody, pid: ProcessId, max_execution_time_us: u32) -> Result<(), KernelError> {
    let event_id = create_event(0, 0, Priority::MIN_TASK, pid)?;
    register_user_task(event_id, body, pid, max_execution_time_us)?;
    trigger_event(event_id, pid)?;
    Ok(())
}

/// Software-triggers `event_id` on behalf of `caller_pid`. Rejected unless
/// the caller is at least as privileged as the event's configured minimum
/// (a strictly lower-privilege caller cannot wake a higher-privilege
/// event), and forwarded to the bare kernel's activation engine otherwise.
/// Returns the same success/loss result `kern::sched::activate_task` does
/// — including a silent `Ok(false)` if the event's task belongs to a
/// suspended process, since `kern::sched::activate_task` runs the
/// activation filter [`install_activation_filter`] installs before ever
/// touching the slot.
pub fn trigger_event(event_id: EventId, caller_pid: ProcessId) -> Result<bool, KernelError> {
    let bound = unsafe { EVENTS.get(event_id) }?;
    let min_pid = bound.pending.min_pid_permitted_to_trigger;
    if caller_pid.0 < min_pid.0 {
        return Err(KernelError::PermissionDenied);
    }
    kern::sched::activate_task(bound.task_id)
}

pub fn owner_of(event_id: EventId) -> Result<ProcessId, KernelError> {
    unsafe { EVENTS.get(event_id) }.map(|b| b.owner_pid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime;
    use core::sync::atomic::{AtomicU32, Ordering};

    static CALLS: AtomicU32 = AtomicU32::new(0);
    fn noop_body() {
        CALLS.fetch_add(1, Ordering::Relaxed);
    }

    fn reset() {
        kern::arch::sim::reset();
        kern::sched::reset_for_test();
        unsafe {
            EVENTS = EventTable::new();
            TASK_BODIES = [None; MAX_EVENTS];
            TASK_OWNERS = [None; MAX_EVENTS];
            NEXT_TASK_ID = 0;
        }
        CALLS.store(0, Ordering::Relaxed);
    }

    #[test]
    fn create_then_register_binds_a_task_id() {
        reset();
        let id = create_event(0, 0, Priority(5), ProcessId(1)).unwrap();
        register_user_task(id, noop_body, ProcessId(2), 0).unwrap();
        assert_eq!(owner_of(id).unwrap(), ProcessId(2));
    }

    #[test]
    fn registering_the_same_event_twice_is_rejected() {
        reset();
        let id = create_event(0, 0, Priority(5), ProcessId(1)).unwrap();
        register_user_task(id, noop_body, ProcessId(2), 0).unwrap();
        let err = register_user_task(id, noop_body, ProcessId(2), 0).unwrap_err();
        assert_eq!(err, KernelError::BadArgument);
    }

    #[test]
    fn trigger_below_minimum_privilege_is_denied() {
        reset();
        let id = create_event(0, 0, Priority(5), ProcessId(3)).unwrap();
        register_user_task(id, noop_body, ProcessId(3), 0).unwrap();
        let err = trigger_event(id, ProcessId(1)).unwrap_err();
        assert_eq!(err, KernelError::PermissionDenied);
    }

    #[test]
    fn trigger_at_or_above_minimum_privilege_succeeds() {
        reset();
        let id = create_event(0, 0, Priority(5), ProcessId(3)).unwrap();
        register_user_task(id, noop_body, ProcessId(3), 0).unwrap();
        assert!(trigger_event(id, ProcessId(4)).unwrap());
    }

    #[test]
    fn trigger_event_of_a_suspended_owner_never_requests_the_slot() {
        reset();
        install_activation_filter();
        let id = create_event(0, 0, Priority(5), ProcessId(2)).unwrap();
        register_user_task(id, noop_body, ProcessId(2), 0).unwrap();
        runtime::install_process(ProcessId(2), abi::RegionDesc { base: 0, size: 0, attributes: abi::RegionAttributes::empty() }, 0, 0);
        runtime::grant_permission_suspend_process(ProcessId(0), ProcessId(2));
        runtime::suspend_process(ProcessId(0), ProcessId(2)).unwrap();
        let task_id = unsafe { EVENTS.get(id) }.unwrap().task_id;

        assert!(!trigger_event(id, ProcessId(2)).unwrap(), "a suspended owner's activation must be discarded");
        assert!(!kern::slots::is_pending(task_id), "the slot must never be requested for a suspended owner");
    }

    #[test]
    fn dispatch_of_a_suspended_owner_silently_skips_the_body() {
        reset();
        let id = create_event(0, 0, Priority(5), ProcessId(2)).unwrap();
        register_user_task(id, noop_body, ProcessId(2), 0).unwrap();
        runtime::install_process(ProcessId(2), abi::RegionDesc { base: 0, size: 0, attributes: abi::RegionAttributes::empty() }, 0, 0);
        runtime::grant_permission_suspend_process(ProcessId(0), ProcessId(2));
        runtime::suspend_process(ProcessId(0), ProcessId(2)).unwrap();

        trigger_event(id, ProcessId(2)).unwrap();
        run_safe_task(unsafe { EVENTS.get(id) }.unwrap().task_id.index());
        assert_eq!(CALLS.load(Ordering::Relaxed), 0, "a suspended owner's task body must not run");
    }

    #[test]
    fn dispatch_of_an_active_owner_runs_the_body() {
        reset();
        let id = create_event(0, 0, Priority(5), ProcessId(2)).unwrap();
        register_user_task(id, noop_body, ProcessId(2), 0).unwrap();
        trigger_event(id, ProcessId(2)).unwrap();
        run_safe_task(unsafe { EVENTS.get(id) }.unwrap().task_id.index());
        assert_eq!(CALLS.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn a_raised_fault_is_recorded_against_the_owning_process_by_cause() {
        reset();
        runtime::install_process(ProcessId(2), abi::RegionDesc { base: 0, size: 0, attributes: abi::RegionAttributes::empty() }, 0, 0);
        fn faulting_body() {
            crate::fault::raise_fault(abi::FaultCause::MpuViolation);
        }
        let id = create_event(0, 0, Priority(5), ProcessId(2)).unwrap();
        register_user_task(id, faulting_body, ProcessId(2), 0).unwrap();
        trigger_event(id, ProcessId(2)).unwrap();

        run_safe_task(unsafe { EVENTS.get(id) }.unwrap().task_id.index());

        assert_eq!(runtime::failures(ProcessId(2), abi::FaultCause::MpuViolation).unwrap(), 1);
        assert_eq!(runtime::failures(ProcessId(2), abi::FaultCause::UserAbort).unwrap(), 0, "a raised fault must not be misrecorded as a user abort");
    }
}
