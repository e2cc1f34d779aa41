// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared types between the kernel, the safe-variant runtime, and (in a full
//! build) any host-side configuration tooling.
//!
//! This crate carries no logic beyond constructors and trivial predicates; it
//! exists so `kern` and `kern-safe` agree on wire-level representations
//! without one depending on the other's internals.

#![cfg_attr(not(test), no_std)]

use zerocopy_derive::FromBytes;

/// Number of hardware activation slots in the reference INTC. Also the
/// maximum number of tasks the bare kernel can register.
pub const SLOT_COUNT: usize = 8;

/// Number of bits available to a cyclic tick/due-time value before the
/// signed-subtraction "has passed" comparison becomes ambiguous.
pub const CYCLIC_TIME_BITS: u32 = 30;

/// Largest value a cycle period or first-activation offset may take on,
/// expressed in milliseconds, while still fitting in [`CYCLIC_TIME_BITS`].
pub const MAX_CYCLIC_MS: u32 = (1 << CYCLIC_TIME_BITS) - 1;

/// The scheduler tick itself runs at the highest INTC priority level, so it
/// can never be preempted by a task.
pub const TICK_PRIORITY: Priority = Priority(15);

/// Number of entries in the system-call descriptor table (safe variant).
pub const SYSCALL_TABLE_SIZE: usize = 64;

/// Number of processes supported by the safe variant, including the kernel
/// itself at PID 0.
pub const MAX_PROCESSES: usize = 5;

/// Number of safe-variant activation events the event table can hold.
/// Bounded by [`SLOT_COUNT`] since every bound event consumes one bare
/// kernel task slot.
pub const MAX_EVENTS: usize = SLOT_COUNT;

/// An INTC priority level, 0 (lowest) through 15 (highest, reserved for the
/// scheduler tick).
///
/// Unlike many kernels that treat a *smaller* number as more urgent, this
/// hardware's INTC treats a larger number as more urgent — level 15 can
/// suppress everything else, level 0 suppresses nothing. `is_more_urgent_than`
/// encodes that directly so call sites never have to remember the polarity.
#[derive(Copy, Clone, Debug, Eq, PartialEq, FromBytes)]
#[repr(transparent)]
pub struct Priority(pub u8);

impl Priority {
    /// Lowest task priority a registered task may hold.
    pub const MIN_TASK: Priority = Priority(1);
    /// Highest task priority a registered task may hold; one below the tick.
    pub const MAX_TASK: Priority = Priority(14);

    pub fn is_more_urgent_than(self, other: Priority) -> bool {
        self.0 > other.0
    }

    pub fn in_task_range(self) -> bool {
        self.0 >= Self::MIN_TASK.0 && self.0 <= Self::MAX_TASK.0
    }
}

/// Dense, zero-based task identifier. A task's slot index in the Task Slot
/// Pool always equals its `TaskId`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, FromBytes)]
#[repr(transparent)]
pub struct TaskId(pub u8);

impl TaskId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Process identifier. PID 0 is reserved for the kernel; higher PIDs carry
/// higher privilege.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, FromBytes)]
#[repr(transparent)]
pub struct ProcessId(pub u8);

impl ProcessId {
    pub const KERNEL: ProcessId = ProcessId(0);

    pub fn is_more_privileged_than(self, other: ProcessId) -> bool {
        self.0 > other.0
    }
}

/// Identifier for a safe-variant activation event (the safe kernel's
/// equivalent of a bare task registration, decoupled from the task body so
/// several tasks across processes can share one due-time schedule entry).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, FromBytes)]
#[repr(transparent)]
pub struct EventId(pub u8);

impl EventId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The small closed error set exposed across the kernel API. Kept as a
/// fieldless enum so it is cheap to return by value from `#[no_mangle]`
/// boundary functions and trivially encodable for a C caller.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum KernelError {
    NoError = 0,
    BadArgument = 1,
    OutOfSlots = 2,
    BadPriority = 3,
    BadCycle = 4,
    NotRegistered = 5,
    PermissionDenied = 6,
}

impl KernelError {
    pub fn is_ok(self) -> bool {
        matches!(self, KernelError::NoError)
    }
}

/// Cause recorded against a process's per-cause failure counters (safe
/// variant). Every cause that can abort a running task has exactly one
/// variant here; `get_task_failures(pid, cause)` indexes by this enum.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum FaultCause {
    DeadlineExceeded = 0,
    UserAbort = 1,
    MpuViolation = 2,
    PrivilegedInstruction = 3,
    MisalignedAccess = 4,
    UnknownSyscall = 5,
}

impl FaultCause {
    pub const COUNT: usize = 6;

    pub fn index(self) -> usize {
        self as u8 as usize
    }

    /// Inverse of [`FaultCause::index`]; `None` for anything outside
    /// `0..COUNT`. Shared by every caller that decodes a raw cause number,
    /// so the mapping is written once.
    pub fn from_index(i: usize) -> Option<Self> {
        Some(match i {
            0 => Self::DeadlineExceeded,
            1 => Self::UserAbort,
            2 => Self::MpuViolation,
            3 => Self::PrivilegedInstruction,
            4 => Self::MisalignedAccess,
            5 => Self::UnknownSyscall,
            _ => return None,
        })
    }
}

/// Conformance class of a system-call descriptor (safe variant).
///
/// Determines the privilege and interrupt environment the dispatched handler
/// runs under; see `kern-safe`'s syscall gate for the dispatch contract each
/// class implies.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum ConformanceClass {
    /// Raw assembly entry point; fully responsible for its own stack and
    /// privilege handling. Reserved for primitives like task termination.
    Basic = 0,
    /// Ordinary function invoked with external interrupts disabled. Must
    /// complete in O(us).
    Simple = 1,
    /// Ordinary function invoked under normal, preemptable conditions.
    Full = 2,
}

/// A memory region a process may be granted access to: used both for the
/// per-process stack range and for `check_user_read_ptr` validation.
///
/// Grounds `kerncore::MemoryRegion` and is deliberately much simpler than a
/// real MPU region descriptor — reference hardware's actual encoding is
/// an implementation detail of `kern-safe`'s arch backend, not part of this
/// shared ABI.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RegionDesc {
    pub base: u32,
    pub size: u32,
    pub attributes: RegionAttributes,
}

impl RegionDesc {
    pub fn end(&self) -> u32 {
        self.base.wrapping_add(self.size)
    }

    pub fn contains_addr(&self, addr: u32) -> bool {
        addr >= self.base && addr < self.end()
    }
}

bitflags::bitflags! {
    /// Access rights attached to a [`RegionDesc`].
    #[derive(FromBytes)]
    #[repr(transparent)]
    pub struct RegionAttributes: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXECUTE = 1 << 2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_polarity_is_larger_is_more_urgent() {
        assert!(Priority(7).is_more_urgent_than(Priority(3)));
        assert!(!Priority(3).is_more_urgent_than(Priority(7)));
        assert!(!Priority(5).is_more_urgent_than(Priority(5)));
    }

    #[test]
    fn task_priority_range_excludes_tick_level() {
        assert!(Priority(1).in_task_range());
        assert!(Priority(14).in_task_range());
        assert!(!Priority(15).in_task_range());
        assert!(!Priority(0).in_task_range());
    }

    #[test]
    fn region_contains_addr_is_half_open() {
        let r = RegionDesc { base: 0x1000, size: 0x100, attributes: RegionAttributes::READ };
        assert!(r.contains_addr(0x1000));
        assert!(r.contains_addr(0x10ff));
        assert!(!r.contains_addr(0x1100));
    }
}
