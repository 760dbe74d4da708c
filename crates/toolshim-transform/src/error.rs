#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("malformed request: {0}")]
    MalformedRequest(#[from] serde_json::Error),
    #[error("invalid pattern for {name}: {source}")]
    InvalidPattern {
        name: String,
        #[source]
        source: regex::Error,
    },
}

pub(crate) fn compile(name: &str, pattern: &str) -> Result<regex::Regex, TransformError> {
    regex::Regex::new(pattern).map_err(|source| TransformError::InvalidPattern {
        name: name.to_string(),
        source,
    })
}
