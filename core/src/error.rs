use thiserror::Error;

/// bpfkit error types
///
/// Each pipeline stage has its own variant so a failure always names the
/// stage it came from. Variants backed by an external process carry the
/// process's captured combined output for diagnostics.
#[derive(Error, Debug)]
pub enum BpfkitError {
    /// External compiler process failed or could not be started
    #[error("compile failed: {message}")]
    Compile { message: String, output: String },

    /// Store unavailable, or artifact serialization/push failed
    #[error("package failed: {0}")]
    Package(String),

    /// Source reference unresolved, or a fetch during store-to-store copy failed
    #[error("copy failed: {0}")]
    Copy(String),

    /// External image-builder process failed or could not be started
    #[error("image synthesis failed: {message}")]
    Synthesis { message: String, output: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// The run was cancelled while waiting on an external process or store operation
    #[error("cancelled: {0}")]
    Cancelled(String),
}

impl BpfkitError {
    /// The captured combined output of the failing external process, if any.
    pub fn process_output(&self) -> Option<&str> {
        match self {
            BpfkitError::Compile { output, .. } | BpfkitError::Synthesis { output, .. } => {
                Some(output.as_str())
            }
            _ => None,
        }
    }
}

impl From<serde_json::Error> for BpfkitError {
    fn from(err: serde_json::Error) -> Self {
        BpfkitError::Serialization(err.to_string())
    }
}

/// Result type alias for bpfkit operations
pub type Result<T> = std::result::Result<T, BpfkitError>;
