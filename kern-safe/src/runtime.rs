// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The single live [`ProcessTable`] instance, and the free functions that
//! operate on it. Mirrors the split `kern::sched` uses for its
//! `ActivationEngine`: the struct itself is plain, directly testable Rust;
//! only this file's handful of wrappers touch the one static the rest of
//! `kern-safe` actually calls into.

use crate::process::ProcessTable;
use abi::{FaultCause, KernelError, ProcessId, RegionDesc};

static mut PROCESSES: ProcessTable = ProcessTable::new();

/// Installs process `pid`'s stack region and small-data base pointers.
/// Called only during boot configuration, before `init_kernel`.
pub fn install_process(pid: ProcessId, stack: RegionDesc, sda_base: u32, sda2_base: u32) {
    unsafe { PROCESSES.install(pid, stack, sda_base, sda2_base) };
}

pub fn grant_permission_run_task(caller_pid: ProcessId, target_pid: ProcessId) {
    unsafe { PROCESSES.grant_permission_run_task(caller_pid, target_pid) };
}

pub fn grant_permission_suspend_process(caller_pid: ProcessId, target_pid: ProcessId) {
    unsafe { PROCESSES.grant_permission_suspend_process(caller_pid, target_pid) };
}

pub fn can_run_task(caller_pid: ProcessId, target_pid: ProcessId) -> bool {
    unsafe { PROCESSES.can_run_task(caller_pid, target_pid) }
}

/// Suspends `target_pid`'s tasks: the tick handler and software activation
/// both silently discard activations belonging to a suspended process from
/// this point on. Requires `caller_pid` to hold a suspend grant for
/// `target_pid`.
pub fn suspend_process(caller_pid: ProcessId, target_pid: ProcessId) -> Result<(), KernelError> {
    if !unsafe { PROCESSES.can_suspend(caller_pid, target_pid) } {
        return Err(KernelError::PermissionDenied);
    }
    match unsafe { PROCESSES.get_mut(target_pid) } {
        Some(p) => {
            p.suspend();
            Ok(())
        }
        None => Err(KernelError::BadArgument),
    }
}

pub fn is_process_suspended(pid: ProcessId) -> bool {
    unsafe { PROCESSES.get(pid) }.map(|p| p.is_suspended()).unwrap_or(false)
}

pub fn record_failure(pid: ProcessId, cause: FaultCause) {
    if let Some(p) = unsafe { PROCESSES.get_mut(pid) } {
        p.record_failure(cause);
    }
}

pub fn total_failures(pid: ProcessId) -> Result<u32, KernelError> {
    unsafe { PROCESSES.get(pid) }.map(|p| p.total_failures()).ok_or(KernelError::BadArgument)
}

pub fn failures(pid: ProcessId, cause: FaultCause) -> Result<u32, KernelError> {
    unsafe { PROCESSES.get(pid) }.map(|p| p.failures(cause)).ok_or(KernelError::BadArgument)
}

/// # Safety
///
/// Only safe to call once the process's stack region is known to be mapped
/// and was filled with the pattern at boot; see [`crate::process::Process::stack_reserve`].
pub unsafe fn stack_reserve(pid: ProcessId) -> Result<u32, KernelError> {
    let p = unsafe { PROCESSES.get(pid) }.ok_or(KernelError::BadArgument)?;
    Ok(unsafe { p.stack_reserve() })
}

pub fn region_of(pid: ProcessId) -> Result<RegionDesc, KernelError> {
    unsafe { PROCESSES.get(pid) }.map(|p| p.region()).ok_or(KernelError::BadArgument)
}

#[cfg(test)]
mod tests {
    use super::*;
    use abi::RegionAttributes;

    fn region() -> RegionDesc {
        RegionDesc { base: 0, size: 16, attributes: RegionAttributes::READ | RegionAttributes::WRITE }
    }

    fn reset() {
        unsafe { PROCESSES = ProcessTable::new() };
    }

    #[test]
    fn suspend_without_a_grant_is_denied() {
        reset();
        install_process(ProcessId(1), region(), 0, 0);
        let err = suspend_process(ProcessId(2), ProcessId(1)).unwrap_err();
        assert_eq!(err, KernelError::PermissionDenied);
        assert!(!is_process_suspended(ProcessId(1)));
    }

    #[test]
    fn suspend_with_a_grant_succeeds() {
        reset();
        install_process(ProcessId(1), region(), 0, 0);
        grant_permission_suspend_process(ProcessId(2), ProcessId(1));
        suspend_process(ProcessId(2), ProcessId(1)).unwrap();
        assert!(is_process_suspended(ProcessId(1)));
    }

    #[test]
    fn record_failure_is_visible_through_total_and_cause_queries() {
        reset();
        install_process(ProcessId(1), region(), 0, 0);
        record_failure(ProcessId(1), FaultCause::MpuViolation);
        assert_eq!(total_failures(ProcessId(1)).unwrap(), 1);
        assert_eq!(failures(ProcessId(1), FaultCause::MpuViolation).unwrap(), 1);
    }

    #[test]
    fn queries_against_an_uninstalled_process_are_rejected() {
        reset();
        assert_eq!(total_failures(ProcessId(3)).unwrap_err(), KernelError::BadArgument);
    }
}
