/// Engine error taxonomy
///
/// Every fallible engine operation returns one of four error kinds. Ingestion
/// errors reject a whole batch; nothing is applied when one is returned.

/// Errors raised by tables, views and the manager.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    /// Unknown column or incompatible type at ingestion or table creation.
    #[error("Schema error: {0}")]
    Schema(String),

    /// A row value failed type coercion or a constraint (null index, non-nullable column).
    #[error("Validation error: {0}")]
    Validation(String),

    /// A view definition references a missing column or an invalid aggregate.
    #[error("Definition error: {0}")]
    Definition(String),

    /// Operation on a deleted table or view, or an unknown hosted name.
    #[error("State error: {0}")]
    State(String),
}

impl EngineError {
    /// Short machine-readable kind, used by the wire protocol.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Schema(_) => "schema",
            EngineError::Validation(_) => "validation",
            EngineError::Definition(_) => "definition",
            EngineError::State(_) => "state",
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_and_kind() {
        let err = EngineError::Definition("Column 'x' not found".to_string());
        assert_eq!(err.to_string(), "Definition error: Column 'x' not found");
        assert_eq!(err.kind(), "definition");
        assert_eq!(EngineError::State("gone".into()).kind(), "state");
    }
}
