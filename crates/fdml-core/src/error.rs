//! Error types for the document model.

/// A data type literal that could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid type `{literal}`: {reason}")]
pub struct DataTypeError {
    pub literal: String,
    pub reason: String,
}

/// Errors from model-level operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid type: {0}")]
    DataType(#[from] DataTypeError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("unknown relation `{0}`")]
    UnknownRelation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = DataTypeError {
            literal: "strng".into(),
            reason: "unknown type `strng`".into(),
        };
        assert!(err.to_string().contains("strng"));
        let wrapped = CoreError::from(err);
        assert!(wrapped.to_string().starts_with("invalid type"));
    }
}
