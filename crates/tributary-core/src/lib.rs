pub mod envelope;
pub mod record;
pub mod varint;

pub use envelope::{partition_key, MessageEnvelope};
pub use record::Record;
