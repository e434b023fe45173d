use thiserror::Error;

use crate::recommend::RecommendError;
use crate::selection::SelectionError;

/// Errors surfaced by [`crate::app::LunchApp`] operations
#[derive(Debug, Error)]
pub enum AppError {
    #[error("unknown menu item '{0}'")]
    UnknownItem(String),

    #[error("clearing all orders needs confirmation")]
    ConfirmationRequired,

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Recommend(#[from] RecommendError),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
