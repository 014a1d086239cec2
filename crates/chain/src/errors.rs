use thiserror::Error;

/// Errors raised while querying the chain through the `arkeod` binary.
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("command `{command}` exited with code {exit_code}: {output}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        output: String,
    },

    #[error("{operation} did not finish within {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("failed to launch `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse {what}: {output}")]
    Parse { what: &'static str, output: String },

    #[error("{field} not found in output: {output}")]
    MissingField { field: &'static str, output: String },

    #[error("chain backend error: {0}")]
    Backend(String),
}

impl ChainError {
    pub(crate) fn parse(what: &'static str, output: impl Into<String>) -> Self {
        ChainError::Parse {
            what,
            output: output.into(),
        }
    }

    pub(crate) fn missing(field: &'static str, output: impl Into<String>) -> Self {
        ChainError::MissingField {
            field,
            output: output.into(),
        }
    }

    /// Raw output of the failing command, when there was one.
    pub fn output(&self) -> Option<&str> {
        match self {
            ChainError::CommandFailed { output, .. }
            | ChainError::Parse { output, .. }
            | ChainError::MissingField { output, .. } => Some(output),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ChainError>;
