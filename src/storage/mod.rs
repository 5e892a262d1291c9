//! Persistence layer
//!
//! - [`JsonlLog`]: append-only primary log, failures are fatal
//! - [`SqliteMirror`]: optional relational mirror, failures are logged only
//! - [`RecordSink`]: the seam the coordinator writes through

mod jsonl;
mod schema;
mod sqlite;
mod traits;

pub use jsonl::{
    is_triage_output, latest_log, read_records, timestamped_path, JsonlLog, RUN_TIMESTAMP_FORMAT,
};
pub use schema::{initialize_schema, SCHEMA_SQL};
pub use sqlite::SqliteMirror;
pub use traits::{MemorySink, RecordSink, SinkChain};
