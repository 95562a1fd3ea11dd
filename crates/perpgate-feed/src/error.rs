//! Feed error types.

use perpgate_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Invalid trade {id}: {source}")]
    InvalidTrade {
        id: i64,
        #[source]
        source: CoreError,
    },
}

pub type FeedResult<T> = Result<T, FeedError>;
