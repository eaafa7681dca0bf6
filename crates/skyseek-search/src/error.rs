use skyseek_geo::GeoError;
use thiserror::Error;

use crate::guard::QueryRejection;

/// Reasons a search ends in the error state
#[derive(Debug, Clone, Error)]
pub enum SearchError {
    #[error("Invalid query: {0}")]
    InvalidQuery(#[from] QueryRejection),

    #[error("Lookup failed: {0}")]
    Lookup(#[from] GeoError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SearchError {
    /// Short message for the status bar; details go to the diagnostic log
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidQuery(_) => "That doesn't look like a place name.",
            Self::Lookup(e) => e.user_message(),
            Self::Internal(_) => "Something went wrong while searching.",
        }
    }
}
