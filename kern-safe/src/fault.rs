// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fault injection (C5 — Failure catching).
//!
//! This reimplementation has no real MPU, illegal-instruction trap, or
//! program-exception handler to detect `FaultCause::MpuViolation` et al.
//! against — those causes exist in the ABI and in `process::Process`'s
//! per-cause counters, but nothing upstream of this module ever produced
//! one until now. [`raise_fault`] is the stand-in: it is the entry point a
//! real exception handler would call on target hardware (decoding the
//! architecture's own fault-status register the way the teacher's ARM
//! backend decodes CFSR into a `FaultInfo` before handing it to
//! `task::force_fault`), and the entry point test code calls directly in
//! its place here.
//!
//! It reuses the same non-local-exit mechanism `terminate_task` already
//! has: [`kern::arch::terminate_current_task`] unwinds straight back to
//! the trampoline's [`kern::arch::with_task_continuation`] call, which is
//! exactly where a real exception handler would also need to resume
//! dispatch once the faulting task has been torn down. The cause rides
//! along in the upper bit of the same `u32` `terminate_current_task`
//! already carries, so neither backend's save/restore code needs to know
//! about fault causes at all.

use abi::FaultCause;

/// Set in the encoded code to distinguish a fault cause from a plain
/// `terminate_task` error code. `FaultCause::COUNT` is tiny, so there is no
/// risk of a real error code colliding with this bit once set.
const FAULT_MARKER: u32 = 0x8000_0000;

fn encode(cause: FaultCause) -> u32 {
    FAULT_MARKER | cause.index() as u32
}

/// Decodes a code produced by [`kern::arch::with_task_continuation`] into
/// the cause that should be recorded against the task's owning process.
/// Anything without the fault marker set is an ordinary `terminate_task`
/// call, i.e. [`FaultCause::UserAbort`].
pub(crate) fn decode(code: u32) -> FaultCause {
    if code & FAULT_MARKER != 0 {
        FaultCause::from_index((code & !FAULT_MARKER) as usize).unwrap_or(FaultCause::UnknownSyscall)
    } else {
        FaultCause::UserAbort
    }
}

/// Aborts the currently dispatching task as if a CPU exception had just
/// fired against it: unwinds straight back to the nearest
/// `with_task_continuation` call, never returning here, and the
/// trampoline's epilogue records `cause` against the task's owning
/// process once it resumes. Exercised directly by tests in place of a
/// real MPU-violation/illegal-instruction/program-exception/misalignment
/// trap, which this workspace has no hardware to raise.
pub fn raise_fault(cause: FaultCause) -> ! {
    kern::arch::terminate_current_task(encode(cause))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_abort_code_decodes_to_user_abort() {
        assert_eq!(decode(3), FaultCause::UserAbort);
        assert_eq!(decode(0), FaultCause::UserAbort);
    }

    #[test]
    fn encoded_fault_causes_round_trip() {
        for &cause in &[
            FaultCause::DeadlineExceeded,
            FaultCause::UserAbort,
            FaultCause::MpuViolation,
            FaultCause::PrivilegedInstruction,
            FaultCause::MisalignedAccess,
            FaultCause::UnknownSyscall,
        ] {
            assert_eq!(decode(encode(cause)), cause);
        }
    }
}
