// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Property-Based Tests
//!
//! Entry point that makes the modules in `proptests/` discoverable by cargo.

mod arbitration;
mod wire;
