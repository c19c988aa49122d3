//! Tower layers for the client transport
//!
//! - [`DumpLayer`] - Writes redacted request/response exchanges to a writer

mod dump;

pub use dump::{DumpLayer, DumpService};
