use std::path::PathBuf;

use thiserror::Error;

use crate::types::Type;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to read source: {0}")]
    SourceIo(#[from] std::io::Error),
    #[error("unable to open file {0}")]
    SourceNotFound(PathBuf),
    #[error("out of memory while allocating {what} ({bytes} bytes)")]
    OutOfMemory { what: &'static str, bytes: usize },
    #[error("No \"main\" or \"StartingConditional\" found")]
    NoEntryPoint,
    #[error("The \"{function}\" function must return {}", .expected.with_article())]
    WrongReturnType {
        function: &'static str,
        expected: Type,
        found: Type,
    },
    #[error("unresolved jump to label {label} in function {function}")]
    UnresolvedJump { function: String, label: u32 },
    #[error("call to function {0} which has no body")]
    UnresolvedCall(String),
    #[error("failed to write output file {path}: {source}")]
    OutputIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no output file name was given")]
    NoOutputName,
    #[error("compiler instance was not finalized before serialization")]
    NotFinalized,
    #[error("main script was already finalized")]
    AlreadyFinalized,
    #[error("instruction buffer is sealed; no further instructions can be appended")]
    BufferSealed,
    #[error("compiler instance was already destroyed")]
    InstanceDestroyed,
    #[error("malformed NCS at byte {offset}: {message}")]
    Decode { offset: usize, message: String },
}

impl CoreError {
    pub(crate) fn out_of_memory(what: &'static str, bytes: usize) -> Self {
        CoreError::OutOfMemory { what, bytes }
    }

    pub(crate) fn decode(offset: usize, message: impl Into<String>) -> Self {
        CoreError::Decode {
            offset,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_point_messages_match_reference_wording() {
        assert_eq!(
            CoreError::NoEntryPoint.to_string(),
            "No \"main\" or \"StartingConditional\" found"
        );
        let err = CoreError::WrongReturnType {
            function: "main",
            expected: Type::Void,
            found: Type::Int,
        };
        assert_eq!(err.to_string(), "The \"main\" function must return a void");
    }

    #[test]
    fn io_errors_convert_into_source_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: CoreError = io.into();
        assert!(matches!(err, CoreError::SourceIo(_)));
    }
}
