#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Missing field {field} in entry {entry_id}")]
    MissingField { field: u8, entry_id: u64 },

    #[error("Malformed response: {0}")]
    Malformed(String),
}
