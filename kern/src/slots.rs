// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The Task Slot Pool: eight software-triggered interrupt sources, packed
//! four to a 32-bit register, each using the top two bits of its byte.
//!
//! The register is a write-1-to-set / write-1-to-clear design: writing a 0
//! into a byte's status bits is a no-op, it does *not* clear anything. That
//! is what makes [`request`]'s whole-register store safe: a word with every
//! byte zero except the target slot's set bit touches no other slot, even
//! though the store covers all four of them. A read-modify-write would be
//! actively wrong here, not just unnecessary — between the read and the
//! write, the INTC can clear a sibling slot's in-service bit on its own,
//! and writing back the stale read would re-assert a bit the hardware had
//! just cleared.

use crate::arch;
use abi::{KernelError, TaskId, SLOT_COUNT};
use kerncore::{decode_slot_state, SlotState, SLOT_REQUEST_BITS};

const SLOTS_PER_REGISTER: usize = 4;

/// Which register, and which byte within it, holds `task_id`'s slot. Fixed
/// for the lifetime of the kernel: a task's slot index always equals its
/// task id, and registration is closed after kernel start.
fn index_of(task_id: TaskId) -> (usize, usize) {
    let i = task_id.index();
    (i / SLOTS_PER_REGISTER, i % SLOTS_PER_REGISTER)
}

fn byte_of(word: u32, byte_index: usize) -> u8 {
    let byte = (word >> (byte_index * 8)) as u8;
    (byte & 0b1100_0000) >> 6
}

/// True if `task_id`'s slot is not idle (pending or running).
pub fn is_pending(task_id: TaskId) -> bool {
    let (reg, byte) = index_of(task_id);
    let regs = arch::read_slot_registers();
    let bits = byte_of(regs[reg], byte);
    !decode_slot_state(bits).is_idle()
}

/// Reads the raw 2-bit state of `task_id`'s slot without interpreting it,
/// for tests and diagnostics.
pub fn state_of(task_id: TaskId) -> SlotState {
    let (reg, byte) = index_of(task_id);
    let regs = arch::read_slot_registers();
    decode_slot_state(byte_of(regs[reg], byte))
}

/// Writes the "set" bit pattern into `task_id`'s slot with a whole-register
/// store that is all zero except that one slot's bits. Does not check
/// whether the slot was idle first: callers that care (the tick handler,
/// software activation) check with [`is_pending`] beforehand and count a
/// loss instead of calling this when the slot is busy.
pub fn request(task_id: TaskId) {
    let (reg, byte) = index_of(task_id);
    let word = (SLOT_REQUEST_BITS as u32) << (byte * 8 + 6);
    arch::write_slot_register(reg, word);
}

pub fn validate_task_id(task_id: TaskId) -> Result<(), KernelError> {
    if task_id.index() >= SLOT_COUNT {
        Err(KernelError::NotRegistered)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::sim;

    #[test]
    fn index_of_packs_four_slots_per_register() {
        assert_eq!(index_of(TaskId(0)), (0, 0));
        assert_eq!(index_of(TaskId(3)), (0, 3));
        assert_eq!(index_of(TaskId(4)), (1, 0));
        assert_eq!(index_of(TaskId(7)), (1, 3));
    }

    #[test]
    fn fresh_slot_is_idle() {
        sim::reset();
        assert!(!is_pending(TaskId(0)));
        assert_eq!(state_of(TaskId(0)), SlotState::Idle);
    }

    #[test]
    fn request_marks_slot_pending() {
        sim::reset();
        request(TaskId(2));
        assert!(is_pending(TaskId(2)));
        assert_eq!(state_of(TaskId(2)), SlotState::Pending);
    }

    #[test]
    fn request_does_not_disturb_sibling_slots_in_same_register() {
        sim::reset();
        request(TaskId(1));
        assert!(is_pending(TaskId(1)));
        request(TaskId(2)); // shares register 0 with slot 1
        assert!(is_pending(TaskId(1)), "requesting slot 2 must not clobber slot 1's pending state");
        assert!(is_pending(TaskId(2)));
        assert!(!is_pending(TaskId(0)));
        assert!(!is_pending(TaskId(3)));
    }

    #[test]
    fn request_into_a_register_with_an_in_service_sibling_preserves_it() {
        sim::reset();
        // Simulate the INTC having already dispatched slot 0 (in service)
        // by writing the raw in-service bit directly, as the hardware
        // would, then request slot 1 in the same register.
        let word = 0b10u32 << 6; // slot 0's in-service bit
        sim::write_slot_register(0, word);
        assert_eq!(state_of(TaskId(0)), SlotState::Running);

        request(TaskId(1));
        assert_eq!(state_of(TaskId(0)), SlotState::Running, "requesting a sibling slot must not clear an in-service slot's bit");
        assert_eq!(state_of(TaskId(1)), SlotState::Pending);
    }
}
