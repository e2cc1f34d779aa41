// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Kernel-internal inconsistency handling.
//!
//! Every invariant documented elsewhere in this crate (dense task ids,
//! whole-register slot writes, priority-gate nesting) is meant to be
//! proven by construction, not caught here. This module exists for the
//! case where one of them is violated anyway: a debug assertion fires, or
//! the panic handler runs. In debug builds we record a short message into
//! a fixed-size buffer a debugger can read out of the binary and halt; in
//! release builds, reaching this code at all is a static-layout proof
//! failure, so we only halt.

#[cfg(not(feature = "nano"))]
use core::fmt::Write;
use core::sync::atomic::{AtomicBool, Ordering};

#[cfg(not(feature = "nano"))]
const EPITAPH_LEN: usize = 128;

/// Set true exactly once, by the first task to call `die`. A debugger
/// polling this can tell at a glance whether the kernel is still alive.
#[used]
static KERNEL_HAS_FAILED: AtomicBool = AtomicBool::new(false);

#[cfg(not(feature = "nano"))]
#[used]
static mut KERNEL_EPITAPH: [u8; EPITAPH_LEN] = [0; EPITAPH_LEN];

#[cfg(not(feature = "nano"))]
struct Eulogist<'a> {
    dest: &'a mut [u8],
    used: usize,
}

#[cfg(not(feature = "nano"))]
impl<'a> Write for Eulogist<'a> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let bytes = s.as_bytes();
        let remaining = self.dest.len() - self.used;
        let n = bytes.len().min(remaining);
        self.dest[self.used..self.used + n].copy_from_slice(&bytes[..n]);
        self.used += n;
        Ok(())
    }
}

/// Halts forever after recording `msg` into the epitaph buffer. Never
/// returns. Safe to call more than once (a panic during panic handling is
/// possible); the second caller just spins immediately rather than racing
/// the first for the buffer.
///
/// Under the `nano` feature the epitaph buffer and its `core::fmt`
/// machinery are compiled out entirely and `die` is a bare halt-and-spin:
/// `msg` is still accepted (so call sites don't need a separate `nano`
/// path of their own) but is never formatted anywhere.
pub fn die(msg: impl core::fmt::Display) -> ! {
    #[cfg(not(feature = "nano"))]
    if !KERNEL_HAS_FAILED.swap(true, Ordering::SeqCst) {
        let dest = unsafe { &mut KERNEL_EPITAPH[..] };
        let mut w = Eulogist { dest, used: 0 };
        let _ = write!(w, "{msg}");
    }
    #[cfg(feature = "nano")]
    {
        KERNEL_HAS_FAILED.store(true, Ordering::SeqCst);
        let _ = msg;
    }
    loop {
        core::hint::spin_loop();
    }
}

#[cfg(not(test))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    die(info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(feature = "nano"))]
    fn eulogist_truncates_to_buffer_length() {
        let mut buf = [0u8; 8];
        let mut w = Eulogist { dest: &mut buf, used: 0 };
        write!(w, "this message is much longer than the buffer").unwrap();
        assert_eq!(w.used, 8);
    }
}
