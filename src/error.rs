//! Error types for the environment stack

use thiserror::Error;

use crate::syntax::SyntaxError;

/// Main error type for environment-stack operations
///
/// Every variant carries enough context to identify the failing layer
/// and key without walking the stack in a debugger.
#[derive(Error, Debug)]
pub enum EnvError {
    #[error("layer `{layer}` has no upstream environment")]
    NoUpstream { layer: &'static str },

    #[error("overlay update reached the `{layer}` layer; overlays are updated through their own chain")]
    InvalidOverlayUpdate { layer: &'static str },

    #[error("failed to parse module `{module}`")]
    Parse {
        module: String,
        #[source]
        source: SyntaxError,
    },

    #[error("no top-level definition named `{name}` in module `{module}`")]
    MissingDefinition { module: String, name: String },

    #[error("layer `{layer}` cannot produce key `{key}`")]
    KeyNotFound { layer: &'static str, key: String },
}

impl EnvError {
    /// Layer the error originated at
    pub fn layer(&self) -> &'static str {
        match self {
            Self::NoUpstream { layer }
            | Self::InvalidOverlayUpdate { layer }
            | Self::KeyNotFound { layer, .. } => layer,
            Self::Parse { .. } => "ast",
            Self::MissingDefinition { .. } => "class_body",
        }
    }
}

/// Result type alias for environment-stack operations
pub type Result<T> = std::result::Result<T, EnvError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_layer_and_key() {
        let err = EnvError::KeyNotFound {
            layer: "code",
            key: "zz".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("code"));
        assert!(message.contains("zz"));
        assert_eq!(err.layer(), "code");
    }

    #[test]
    fn test_parse_error_chains_syntax_error() {
        let err = EnvError::Parse {
            module: "a".to_string(),
            source: SyntaxError::new(3, "expected `:`"),
        };
        assert!(err.to_string().contains("a"));
        let source = std::error::Error::source(&err).expect("source");
        assert!(source.to_string().contains("line 3"));
    }
}
