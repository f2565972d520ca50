// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Test harness for abuse simulation against the admission gate.
//!
//! Drives request patterns (floods, solver loops, address rotation) through
//! the gate and tallies how each request was treated.

pub mod attacks;
pub mod generators;
pub mod metrics;
