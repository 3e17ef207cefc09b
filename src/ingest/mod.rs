pub mod pipeline;
pub mod validate;

pub use pipeline::{run_batch, IngestResponse, IngestRun};
pub use validate::{RejectedEvent, MAX_BATCH_BYTES, MAX_BATCH_EVENTS};
