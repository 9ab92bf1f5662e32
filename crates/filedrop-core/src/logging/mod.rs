//! Upload journal: one JSON object per tracing event.
//!
//! Every run of the picker appends to its own file, so concurrent runs
//! never interleave lines:
//!
//! ```text
//! <log-dir>/
//! └── raw/
//!     ├── 2026-10-18_01JA3M4K8Y.jsonl
//!     └── 2026-10-18_01JA3M9QZT.jsonl
//! ```
//!
//! ```ignore
//! use filedrop_core::logging::JournalLayer;
//! use tracing_subscriber::prelude::*;
//!
//! let journal = JournalLayer::new("./logs", run_id)?;
//! tracing_subscriber::registry()
//!     .with(journal)
//!     .with(tracing_subscriber::fmt::layer())
//!     .init();
//! ```
//!
//! Find failed uploads with jq:
//!
//! ```bash
//! jq 'select(.level == "warn" and .msg == "Upload failed")' logs/raw/*.jsonl
//! ```

pub mod entry;
pub mod layer;
pub mod writer;

pub use entry::JournalEntry;
pub use layer::JournalLayer;
pub use writer::{read_journal, read_run, JournalWriter};
