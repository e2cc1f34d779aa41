// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Process & Task Runtime (C5): per-process stack, failure accounting,
//! stack-reserve measurement, suspension, and the permission grants that
//! gate the privileged cross-process calls in [`crate::syscall`].

use abi::{FaultCause, ProcessId, RegionAttributes, RegionDesc, MAX_PROCESSES};
use kerncore::SaturatingCounter;

/// Byte value a process's stack is filled with at boot, before its first
/// task ever runs. [`Process::stack_reserve`] scans from the low end of
/// the stack for the first byte that no longer matches this pattern.
pub const STACK_FILL_PATTERN: u8 = 0xba;

#[derive(Copy, Clone)]
pub struct Process {
    region: RegionDesc,
    /// PowerPC EABI small-data area base pointers (r13/r2 in the real
    /// ABI); opaque to the kernel beyond being restored across a
    /// cross-process call.
    pub sda_base: u32,
    pub sda2_base: u32,
    total_failures: SaturatingCounter,
    cause_failures: [SaturatingCounter; FaultCause::COUNT],
    suspended: bool,
}

impl Process {
    pub const fn new(region: RegionDesc, sda_base: u32, sda2_base: u32) -> Self {
        Self {
            region,
            sda_base,
            sda2_base,
            total_failures: SaturatingCounter::new(),
            cause_failures: [SaturatingCounter::new(); FaultCause::COUNT],
            suspended: false,
        }
    }

    pub fn region(&self) -> RegionDesc {
        self.region
    }

    /// Accounts one failure of `cause` against this process: bumps both
    /// the cumulative total and the per-cause counter. Never panics and
    /// never clears — a process's failure history only grows, saturating
    /// like every other counter this kernel exposes.
    pub fn record_failure(&mut self, cause: FaultCause) {
        self.total_failures.bump();
        self.cause_failures[cause.index()].bump();
    }

    pub fn total_failures(&self) -> u32 {
        self.total_failures.get()
    }

    pub fn failures(&self, cause: FaultCause) -> u32 {
        self.cause_failures[cause.index()].get()
    }

    pub fn suspend(&mut self) {
        self.suspended = true;
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Scans the stack region, from its low (bottom) address upward, for
    /// the first byte that no longer matches [`STACK_FILL_PATTERN`], and
    /// returns the number of untouched bytes found before it. Monotonic
    /// non-increasing over the life of the process: once a byte has been
    /// written, the scan can never again report it as untouched, since
    /// nothing ever re-fills the stack after boot.
    ///
    /// # Safety
    ///
    /// The caller must guarantee `self.region` describes memory that is
    /// actually mapped and was filled with the pattern at boot; this
    /// function performs raw reads over that range.
    pub unsafe fn stack_reserve(&self) -> u32 {
        let base = self.region.base as *const u8;
        let len = self.region.size;
        let mut i = 0u32;
        while i < len {
            if unsafe { *base.add(i as usize) } != STACK_FILL_PATTERN {
                break;
            }
            i += 1;
        }
        i
    }
}

pub struct ProcessTable {
    processes: [Option<Process>; MAX_PROCESSES],
    run_task_grants: [Option<ProcessId>; MAX_PROCESSES],
    suspend_grants: [Option<ProcessId>; MAX_PROCESSES],
}

impl ProcessTable {
    pub const fn new() -> Self {
        Self {
            processes: [None; MAX_PROCESSES],
            run_task_grants: [None; MAX_PROCESSES],
            suspend_grants: [None; MAX_PROCESSES],
        }
    }

    pub fn install(&mut self, pid: ProcessId, stack: RegionDesc, sda_base: u32, sda2_base: u32) {
        self.processes[pid.0 as usize] = Some(Process::new(stack, sda_base, sda2_base));
    }

    pub fn get(&self, pid: ProcessId) -> Option<&Process> {
        self.processes.get(pid.0 as usize)?.as_ref()
    }

    pub fn get_mut(&mut self, pid: ProcessId) -> Option<&mut Process> {
        self.processes.get_mut(pid.0 as usize)?.as_mut()
    }

    /// Called only during initialization, before kernel start; immutable
    /// afterward, the same way task and event registration is closed once
    /// `init_kernel` has run.
    pub fn grant_permission_run_task(&mut self, caller_pid: ProcessId, target_pid: ProcessId) {
        self.run_task_grants[caller_pid.0 as usize] = Some(target_pid);
    }

    pub fn grant_permission_suspend_process(&mut self, caller_pid: ProcessId, target_pid: ProcessId) {
        self.suspend_grants[caller_pid.0 as usize] = Some(target_pid);
    }

    pub fn can_run_task(&self, caller_pid: ProcessId, target_pid: ProcessId) -> bool {
        self.run_task_grants[caller_pid.0 as usize] == Some(target_pid)
    }

    pub fn can_suspend(&self, caller_pid: ProcessId, target_pid: ProcessId) -> bool {
        self.suspend_grants[caller_pid.0 as usize] == Some(target_pid)
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}
