use thiserror::Error;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("invalid field expression '{0}': expected %field% or %<field>%")]
    InvalidFieldExpression(String),

    #[error("unknown field '{field}' in expression '{expression}'")]
    UnknownField { expression: String, field: String },

    #[error("search for '{text}' timed out after {timeout_ms}ms")]
    SearchTimedOut { text: String, timeout_ms: u64 },

    #[error("search task for '{text}' failed: {source}")]
    SearchTaskFailed {
        text: String,
        #[source]
        source: tokio::task::JoinError,
    },
}

pub type Result<T> = std::result::Result<T, FilterError>;
