// Test code uses unwrap/expect for clarity - panics provide good test failure messages
#![allow(clippy::unwrap_used, clippy::expect_used)]

//! End-to-end lowering properties.
//!
//! Each test lowers small functions through the public `CodegenCx` API,
//! verifies the IR, and runs it on the reference runtime to check the
//! observable behavior.
//!
//! # Organization
//!
//! - `common` - a compilation unit fixture and IR inspection helpers
//! - `roundtrip` - boxing and unboxing across every representation
//! - `types` - `isa` soundness and union discriminants
//! - `fields` - split/native equivalence, unknown indices, undefined references
//! - `gc` - write barriers and root extraction
//! - `atomics` - compare-and-swap field updates

#[path = "properties/common.rs"]
mod common;

#[path = "properties/roundtrip.rs"]
mod roundtrip;

#[path = "properties/types.rs"]
mod types;

#[path = "properties/fields.rs"]
mod fields;

#[path = "properties/gc.rs"]
mod gc;

#[path = "properties/atomics.rs"]
mod atomics;
