use thiserror::Error;

/// Engine errors. Raised before a board is ever shown to the player.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GameError {
    #[error("invalid configuration: {mines} mines do not fit on a {rows}x{columns} board")]
    InvalidConfiguration {
        rows: usize,
        columns: usize,
        mines: usize,
    },
}

/// Record book errors
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("the name {0:?} is already on this board")]
    DuplicateName(String),

    #[error("a record needs a non-empty name")]
    EmptyName,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl RecordError {
    /// Whether the player can fix this by supplying another name.
    pub fn is_name_problem(&self) -> bool {
        matches!(self, RecordError::DuplicateName(_) | RecordError::EmptyName)
    }
}
