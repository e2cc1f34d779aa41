// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Architecture dispatch.
//!
//! Every other module in this crate talks to the hardware only through the
//! free functions re-exported here, never through raw register access of
//! its own. In a unit-test build (`cfg(test)`, which always has `std`
//! available through the test harness) that means the in-memory `sim`
//! backend; on the real target it means `hw`, which owns the actual INTC
//! MMIO registers and the External-Interrupt entry/exit assembly. The
//! `sim` feature forces the same backend outside of `cfg(test)`, which is
//! how `kern-safe` exercises it from its own unit tests without pulling
//! the powerpc target into a host build.

cfg_if::cfg_if! {
    if #[cfg(any(test, feature = "sim"))] {
        #[macro_use]
        pub mod sim;
        pub use sim::*;
    } else if #[cfg(target_arch = "powerpc")] {
        #[macro_use]
        pub mod hw;
        pub use hw::*;
    } else {
        compile_error!("kern requires either `cfg(test)` or a powerpc target");
    }
}
