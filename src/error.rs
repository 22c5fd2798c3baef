use thiserror::Error;

/// Terminal outcomes of a stats request.
///
/// Everything else (malformed seasons, empty sub-trees, a failing branch
/// read, stale cache) degrades in place and never reaches the caller.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("club not found: {0}")]
    ClubNotFound(String),
    #[error("player {player_id} not found for owner {owner_scope}")]
    PlayerNotFound {
        owner_scope: String,
        player_id: String,
    },
    #[error("request cancelled")]
    Cancelled,
    #[error("document store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl EngineError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            EngineError::ClubNotFound(_) | EngineError::PlayerNotFound { .. }
        )
    }

    /// HTTP-style status for thin request adapters.
    pub fn status_code(&self) -> u16 {
        match self {
            EngineError::ClubNotFound(_) | EngineError::PlayerNotFound { .. } => 404,
            EngineError::Cancelled => 499,
            EngineError::Store(_) => 500,
        }
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
