//! Quarry search: exact/fuzzy filtering and strict-weak ordering over cached objects.
//!
//! Each kind plugs in through [`Searcher`]; the shared predicate and comparator libraries
//! cover universal metadata so adapters only add their derived fields and order keys.
//!
//! ```ignore
//! let jobs = CronJobSearcher::new(backend);
//! let req = SearchRequest::new("ops")
//!     .with_conditions("status=paused,name~nightly".parse()?)
//!     .order_by(LAST_SCHEDULE_TIME)
//!     .reverse(true);
//! let hits = jobs.search(&req)?;
//! ```

#![forbid(unsafe_code)]

pub mod compare;
pub mod cronjob;
pub mod engine;
pub mod fields;
pub mod predicate;
pub mod query;
pub mod searcher;

pub use compare::less_by_metadata;
pub use cronjob::{CronJobSearcher, LAST_SCHEDULE_TIME, STATUS, STATUS_PAUSED, STATUS_RUNNING};
pub use engine::sort_by_less;
pub use predicate::{matches_exact, matches_fuzzy};
pub use query::{ConditionParseError, Conditions, SearchRequest};
pub use searcher::Searcher;

/// Query failures. An empty result is never an error.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// The object source failed; its error is passed through as-is.
    #[error(transparent)]
    Source(#[from] anyhow::Error),
    #[error("unknown field: {0}")]
    UnknownField(String),
    #[error("not_found: {namespace}/{name}")]
    NotFound { namespace: String, name: String },
    #[error(transparent)]
    InvalidConditions(#[from] ConditionParseError),
}

impl SearchError {
    /// True for caller mistakes (bad field names or condition strings).
    pub fn is_request_error(&self) -> bool {
        matches!(self, SearchError::UnknownField(_) | SearchError::InvalidConditions(_))
    }
}
