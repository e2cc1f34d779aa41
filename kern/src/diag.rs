// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Ambient diagnostics: a debugger-readable ring buffer, in place of a
//! `log`/`tracing` backend that would need an allocator and a byte sink
//! this kernel doesn't otherwise have.
//!
//! Usage:
//!
//! ```ignore
//! ringbuf!(TICK, u32, 0);
//! ringbuf_entry!(TICK, self.now());
//! ```
//!
//! declares a static ring buffer named `TICK` holding the last `N` `u32`
//! payloads logged against it, each tagged with the source line it came
//! from. A debugger (or a host-side dump tool, out of scope here) can read
//! the static directly; there is no runtime consumer.

pub use kerncore::StaticCell;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RingbufEntry<T: Copy + PartialEq> {
    pub line: u16,
    pub generation: u16,
    pub count: u32,
    pub payload: T,
}

pub struct Ringbuf<T: Copy + PartialEq, const N: usize> {
    last: Option<usize>,
    buffer: [RingbufEntry<T>; N],
}

impl<T: Copy + PartialEq, const N: usize> Ringbuf<T, N> {
    pub const fn new(init: T) -> Self {
        Self {
            last: None,
            buffer: [RingbufEntry { line: 0, generation: 0, count: 0, payload: init }; N],
        }
    }

    /// Records `payload` at `line`. If it is equal to the payload most
    /// recently recorded at the same line, the existing slot's count is
    /// bumped instead of consuming a fresh one — a tight loop logging the
    /// same event doesn't evict older, more diagnostically interesting
    /// history.
    pub fn entry(&mut self, line: u16, payload: T) {
        if let Some(last) = self.last {
            let e = &mut self.buffer[last];
            if e.line == line && e.payload == payload {
                e.count = e.count.saturating_add(1);
                return;
            }
        }
        let next = match self.last {
            Some(last) => (last + 1) % N,
            None => 0,
        };
        let generation = self.buffer[next].generation.wrapping_add(1);
        self.buffer[next] = RingbufEntry { line, generation, count: 1, payload };
        self.last = Some(next);
    }
}

/// Declares a named static ring buffer of `$n` entries holding `$ty`
/// payloads, each initialized to `$init`. Under the `nano` feature this
/// declares nothing at all, so a board build stripped down to the bare
/// halt-and-spin path never pays for the backing storage.
#[cfg(not(feature = "nano"))]
#[macro_export]
macro_rules! ringbuf {
    ($name:ident, $ty:ty, $n:expr, $init:expr) => {
        #[used]
        static $name: $crate::diag::StaticCell<$crate::diag::Ringbuf<$ty, $n>> =
            $crate::diag::StaticCell::new($crate::diag::Ringbuf::new($init));
    };
}

#[cfg(feature = "nano")]
#[macro_export]
macro_rules! ringbuf {
    ($name:ident, $ty:ty, $n:expr, $init:expr) => {};
}

/// Records `$payload` into ring buffer `$name` at the call site's source
/// line. Under `nano` this still evaluates `$payload` (so a call site
/// with a side-effecting expression keeps behaving the same way) but
/// records nothing, matching `ringbuf!` declaring no backing storage.
#[cfg(not(feature = "nano"))]
#[macro_export]
macro_rules! ringbuf_entry {
    ($name:expr, $payload:expr) => {{
        let payload = $payload;
        $name.borrow_mut().entry(line!() as u16, payload);
    }};
}

#[cfg(feature = "nano")]
#[macro_export]
macro_rules! ringbuf_entry {
    ($name:expr, $payload:expr) => {
        let _ = $payload;
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_advances_through_the_buffer() {
        let mut rb: Ringbuf<u32, 3> = Ringbuf::new(0);
        rb.entry(10, 1);
        rb.entry(11, 2);
        rb.entry(12, 3);
        rb.entry(13, 4);
        assert_eq!(rb.buffer[0].payload, 4, "the 4th distinct entry must wrap back to slot 0");
        assert_eq!(rb.buffer[0].line, 13);
    }

    #[test]
    fn repeated_entry_coalesces_into_a_count_instead_of_advancing() {
        let mut rb: Ringbuf<u32, 3> = Ringbuf::new(0);
        rb.entry(20, 7);
        rb.entry(20, 7);
        rb.entry(20, 7);
        assert_eq!(rb.buffer[0].count, 3);
        assert_eq!(rb.last, Some(0), "repeated identical entries must not advance to a new slot");
    }

    #[test]
    fn different_payload_at_same_line_starts_a_fresh_entry() {
        let mut rb: Ringbuf<u32, 3> = Ringbuf::new(0);
        rb.entry(30, 1);
        rb.entry(30, 2);
        assert_eq!(rb.buffer[0].count, 1);
        assert_eq!(rb.buffer[1].payload, 2);
    }

    #[test]
    #[cfg(not(feature = "nano"))]
    fn ringbuf_macro_declares_a_usable_static() {
        ringbuf!(TEST_RB, u32, 4, 0);
        ringbuf_entry!(TEST_RB, 99);
        assert_eq!(TEST_RB.borrow_mut().buffer[0].payload, 99);
    }
}
