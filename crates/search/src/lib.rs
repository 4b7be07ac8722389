//! Wildcard search over logcask archives: query tokenization, subquery
//! planning with logtype/variable/segment pruning, and the
//! decompress-and-verify execution loop.
//!
//! The guarantees are asymmetric by design: pruning is conservative
//! (it may admit messages that don't match, never the reverse) and the
//! final wildcard verification restores exactness.

pub mod exec;
pub mod plan;
pub mod query;
pub mod token;

pub use exec::{search_archive, OutputSink, RecordingSink, SearchError, SinkError, StdoutSink};
pub use plan::process_raw_query;
pub use query::{Query, QueryVar, SubQuery};
pub use token::{get_bounds_of_next_potential_var, QueryToken, TokenType};
