// crates/protocore/src/events/mod.rs

mod base;

pub use base::{EventStream, ExecutionEvent, ExecutionId};
