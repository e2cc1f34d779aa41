// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The System-Call Gate (C6): a fixed descriptor table indexed by system
//! call number, and the three conformance-class dispatch paths it can
//! route a call through.
//!
//! - [`ConformanceClass::Basic`] calls bypass this table entirely — they
//!   are raw entry points the caller jumps to directly, responsible for
//!   their own privilege and stack handling. `terminate_task` is the only
//!   one; see [`kern::arch::terminate_current_task`].
//! - [`ConformanceClass::Simple`] calls run with external interrupts
//!   disabled for their whole duration, via the same priority gate
//!   everything else in this kernel uses for mutual exclusion.
//! - [`ConformanceClass::Full`] calls run normally, preemptable by
//!   anything more urgent than the caller.

use crate::runtime;
use abi::{ConformanceClass, FaultCause, KernelError, ProcessId, RegionAttributes, SYSCALL_TABLE_SIZE};
use kern::TaskBody;
use kerncore::region_access_ok;

/// A contiguous byte range a caller wants to read, validated against the
/// caller's own granted memory region before any syscall handler is
/// allowed to trust a pointer argument.
struct ReadRange {
    base: u32,
    end: u32,
}

impl kerncore::AddressRange for ReadRange {
    fn is_empty(&self) -> bool {
        self.base == self.end
    }
    fn base_addr(&self) -> u32 {
        self.base
    }
    fn end_addr(&self) -> u32 {
        self.end
    }
}

fn readable(region: &abi::RegionDesc) -> bool {
    region.attributes.contains(RegionAttributes::READ)
}

/// Validates that `[addr, addr + len)` lies entirely within `pid`'s own
/// granted memory region. Every syscall that takes a user-supplied pointer
/// goes through this before dereferencing it.
pub fn check_user_read_ptr(pid: ProcessId, addr: u32, len: u32) -> bool {
    let region = match runtime::region_of(pid) {
        Ok(r) => r,
        Err(_) => return false,
    };
    let range = ReadRange { base: addr, end: addr.wrapping_add(len) };
    region_access_ok(range, core::slice::from_ref(&region), readable)
}

/// System call numbers this kernel actually implements. The descriptor
/// table has room for [`SYSCALL_TABLE_SIZE`] entries so a board-specific
/// build can register more without moving these.
pub const SYS_RUN_TASK: u8 = 0;
pub const SYS_TERMINATE_TASK: u8 = 1;
pub const SYS_GET_STACK_RESERVE: u8 = 2;
pub const SYS_GET_TOTAL_TASK_FAILURES: u8 = 3;
pub const SYS_GET_TASK_FAILURES: u8 = 4;

/// Looks up the conformance class a given syscall number must be
/// dispatched under. `Basic` calls (just `terminate_task`) never reach
/// `dispatch_syscall` — they're invoked through their own raw entry point —
/// so this only needs to distinguish `Simple` from `Full` for everything
/// else in the table.
fn class_of(sysnum: u8) -> Option<ConformanceClass> {
    match sysnum {
        SYS_RUN_TASK => Some(ConformanceClass::Full),
        SYS_TERMINATE_TASK => Some(ConformanceClass::Basic),
        SYS_GET_STACK_RESERVE | SYS_GET_TOTAL_TASK_FAILURES | SYS_GET_TASK_FAILURES => Some(ConformanceClass::Simple),
        _ if (sysnum as usize) < SYSCALL_TABLE_SIZE => None,
        _ => None,
    }
}

/// Value the currently-running `run_task` callee reads back with
/// [`current_task_param`]. `kern::TaskBody` is a bare `fn()`, so a
/// parameter can't be passed in an argument register the way it would be
/// on real hardware; this is the same information carried a different way.
static mut CURRENT_TASK_PARAM: u32 = 0;

pub fn current_task_param() -> u32 {
    unsafe { CURRENT_TASK_PARAM }
}

/// Synchronously invokes `body` as if it were a task owned by
/// `target_pid`, on behalf of `caller_pid`. Requires `caller_pid` to hold
/// a `grant_permission_run_task` grant naming `target_pid`; every other
/// caller gets `KernelError::PermissionDenied` back without `body` ever
/// running.
///
/// Returns `0` on normal completion, or a negative value encoding either a
/// `KernelError` (gate rejected the call) or a task-terminated error code
/// (the invoked body called `terminate_task`), so a C caller can test
/// `>= 0` for success without needing a second out-parameter.
pub fn run_task(caller_pid: ProcessId, target_pid: ProcessId, body: TaskBody, task_param: u32) -> i32 {
    if !runtime::can_run_task(caller_pid, target_pid) {
        return -(KernelError::PermissionDenied as i32) - 1;
    }
    unsafe { CURRENT_TASK_PARAM = task_param };
    match kern::arch::with_task_continuation(body) {
        Some(code) => {
            runtime::record_failure(target_pid, crate::fault::decode(code));
            -(code as i32) - 1
        }
        None => 0,
    }
}

/// The `Basic`-conformance-class termination call: abandons the currently
/// dispatching task partway through. Never returns to its caller.
pub fn terminate_task(error_code: u32) -> ! {
    kern::arch::terminate_current_task(error_code)
}

pub fn get_stack_reserve(pid: ProcessId) -> Result<u32, KernelError> {
    unsafe { runtime::stack_reserve(pid) }
}

pub fn get_total_task_failures(pid: ProcessId) -> Result<u32, KernelError> {
    runtime::total_failures(pid)
}

pub fn get_task_failures(pid: ProcessId, cause: FaultCause) -> Result<u32, KernelError> {
    runtime::failures(pid, cause)
}

/// Dispatches a `Simple` or `Full` conformance-class syscall by number.
/// `Basic` numbers (just [`SYS_TERMINATE_TASK`]) are rejected here — a real
/// caller reaches `terminate_task` through its own raw entry point, never
/// through this table, since by the time a `Basic` call could return
/// through an ordinary dispatch path it would already have defeated the
/// point of being `Basic`.
///
/// `Simple` calls are bracketed with the same priority gate everything
/// else in this kernel uses for mutual exclusion, raised to the tick's own
/// ceiling so nothing — not even the scheduler tick — can run concurrently
/// with them.
pub fn dispatch_syscall(sysnum: u8, caller_pid: ProcessId, a0: u32, a1: u32) -> Result<i32, KernelError> {
    let class = class_of(sysnum).ok_or(KernelError::BadArgument)?;
    match class {
        ConformanceClass::Basic => Err(KernelError::BadArgument),
        ConformanceClass::Simple => {
            let prior = kern::gate::suspend_up_to(abi::TICK_PRIORITY);
            let result = run_simple_or_full(sysnum, caller_pid, a0, a1);
            kern::gate::resume_down_to(prior);
            result
        }
        ConformanceClass::Full => run_simple_or_full(sysnum, caller_pid, a0, a1),
    }
}

fn run_simple_or_full(sysnum: u8, caller_pid: ProcessId, a0: u32, a1: u32) -> Result<i32, KernelError> {
    match sysnum {
        SYS_GET_STACK_RESERVE => get_stack_reserve(ProcessId(a0 as u8)).map(|v| v as i32),
        SYS_GET_TOTAL_TASK_FAILURES => get_total_task_failures(ProcessId(a0 as u8)).map(|v| v as i32),
        SYS_GET_TASK_FAILURES => {
            let cause = decode_fault_cause(a1).ok_or(KernelError::BadArgument)?;
            get_task_failures(ProcessId(a0 as u8), cause).map(|v| v as i32)
        }
        // `run_task` takes a function pointer and a 32-bit parameter, which
        // don't fit the two-register shape every other call in this table
        // uses. Callers reach it directly through `syscall::run_task`
        // instead of through this number; it's only here so `class_of`
        // has somewhere to classify it as `Full`.
        SYS_RUN_TASK => Err(KernelError::BadArgument),
        _ => {
            let _ = caller_pid;
            Err(KernelError::BadArgument)
        }
    }
}

fn decode_fault_cause(raw: u32) -> Option<FaultCause> {
    FaultCause::from_index(raw as usize)
}
