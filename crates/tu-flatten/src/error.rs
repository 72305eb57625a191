//! Error types for tu-flatten

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while flattening a translation unit
#[derive(Error, Debug)]
pub enum FlattenError {
    /// Root file missing or not a regular file
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Build database exists but could not be read or is not a JSON array
    #[error("invalid build database {}: {reason}", path.display())]
    InvalidBuildDatabase { path: PathBuf, reason: String },

    /// Build database path given but nothing is there
    #[error("build database not found: {}", .0.display())]
    BuildDatabaseNotFound(PathBuf),

    /// File contains NUL bytes
    #[error("{} looks like a binary file (contains NUL bytes)", .0.display())]
    BinaryFile(PathBuf),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for flattening operations
pub type Result<T> = std::result::Result<T, FlattenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FlattenError::InvalidBuildDatabase {
            path: PathBuf::from("/p/compile_commands.json"),
            reason: "must be a JSON array".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid build database /p/compile_commands.json: must be a JSON array"
        );
        assert_eq!(
            FlattenError::FileNotFound(PathBuf::from("a.cpp")).to_string(),
            "file not found: a.cpp"
        );
    }
}
