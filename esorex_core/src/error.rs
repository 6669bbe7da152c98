//! Unified error handling for EsoRex
//!
//! Every fallible operation of the engine returns an [`EsorexResult`]. The
//! umbrella [`EsorexError`] wraps one enum per concern so that callers can
//! match on the family they care about (configuration, discovery, recipe
//! life-cycle, product handling, files).

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while reading configuration files, environment variables
/// or the command line, and while assigning values to parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// The text could not be converted to the parameter type
    #[error("Specified value '{value}' for the parameter '{name}' is not a valid '{expected}'")]
    TypeMismatch {
        name: String,
        value: String,
        expected: &'static str,
    },

    /// A range parameter received a value outside its bounds
    #[error(
        "Specified '{kind}' value ({value}) for the parameter '{name}' was outside the permitted range {min} to {max}"
    )]
    RangeError {
        name: String,
        kind: &'static str,
        value: String,
        min: String,
        max: String,
    },

    /// An enumeration parameter received a value that is not one of its choices
    #[error("Specified value '{value}' for the parameter '{name}' is not one of the permitted values <{allowed}>")]
    EnumMismatch {
        name: String,
        value: String,
        allowed: String,
    },

    /// A configuration file line that is neither a comment nor `key=value`
    #[error("Invalid line {line} in configuration file '{file}': {text}")]
    MalformedLine {
        file: String,
        line: usize,
        text: String,
    },

    /// A configuration file key that names no known parameter
    #[error("Unknown parameter '{key}' in line {line} of configuration file '{file}'")]
    UnknownKey {
        file: String,
        line: usize,
        key: String,
    },

    /// Unbalanced double quotes in a configuration file value
    #[error("Mismatched quotes for parameter '{key}' in line {line} of configuration file '{file}'")]
    QuoteMismatch {
        file: String,
        line: usize,
        key: String,
    },

    /// No value was supplied for a parameter that cannot be set without one
    #[error("No value given for the parameter '{name}' of type '{kind}'")]
    NullInput { name: String, kind: &'static str },

    /// A command line option that matches no parameter alias
    #[error("Option '{0}' is not recognized")]
    UnknownOption(String),

    /// `--option=` with an empty value
    #[error("Option '--{0}' requires a value")]
    MissingValue(String),
}

/// Errors raised while locating and loading recipe modules.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Unable to load module '{}': {reason}", .path.display())]
    ModuleLoadFailed { path: PathBuf, reason: String },

    #[error("Module '{}' does not provide the entry point '{symbol}'", .path.display())]
    MissingEntrySymbol { path: PathBuf, symbol: &'static str },

    #[error(
        "Multiple copies ({copies}) of the latest version of recipe '{recipe}' were found. Using path '{path}' ('{recipe}' version {version})"
    )]
    AmbiguousVersion {
        recipe: String,
        copies: usize,
        path: String,
        version: u64,
    },

    #[error(
        "Unable to find recipe '{recipe}'. Check that the recipe is in the path specified by the '--recipe-dir' option (currently '{search_path}')."
    )]
    NotFound { recipe: String, search_path: String },

    #[error("Script recipe bridge failed: {0}")]
    ScriptBridge(String),
}

/// Errors returned by recipe callbacks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("Init of recipe '{recipe}' failed, status = {code}")]
    InitFailed { recipe: String, code: i32 },

    #[error("Execution of recipe '{recipe}' failed, status = {code}")]
    ExecFailed { recipe: String, code: i32 },

    #[error("Deinit of recipe '{recipe}' failed, status = {code}")]
    DeinitFailed { recipe: String, code: i32 },
}

/// Errors raised while post-processing recipe products.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProductError {
    #[error("Unable to move product file to final output path ({target}): {reason}")]
    RelocationFailed { target: String, reason: String },

    #[error("Unable to create symbolic link for {file} in directory {dir}: {reason}")]
    LinkFailed {
        file: String,
        dir: String,
        reason: String,
    },

    #[error("Unable to compute the integrity metadata of product '{file}': {reason}")]
    ChecksumFailed { file: String, reason: String },

    #[error("Unable to write PAF file '{file}': {reason}")]
    PafWriteFailed { file: String, reason: String },
}

/// Errors about files and directories named by the user.
#[derive(Debug, Error)]
pub enum FileError {
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),

    #[error("Directory does not exist: {}", .0.display())]
    DirectoryMissing(PathBuf),

    #[error("I/O error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FileError {
    /// Classify an I/O error raised while accessing `path`
    pub fn from_io(path: impl AsRef<Path>, err: std::io::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        match err.kind() {
            std::io::ErrorKind::NotFound => FileError::FileNotFound(path),
            std::io::ErrorKind::PermissionDenied => FileError::PermissionDenied(path),
            _ => FileError::Io { path, source: err },
        }
    }
}

/// Main error type for EsoRex operations
#[derive(Debug, Error)]
pub enum EsorexError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Product(#[from] ProductError),

    #[error(transparent)]
    File(#[from] FileError),

    /// I/O errors without a more specific classification
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/Deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal errors with source location for debugging.
    /// Use the `esorex_internal!()` macro to create these.
    #[error("Internal error: {message} (at {file}:{line})")]
    Internal {
        message: String,
        file: &'static str,
        line: u32,
    },
}

/// Create an internal error with automatic file/line capture.
///
/// ```rust,ignore
/// return Err(esorex_internal!("child process has no stdin"));
/// ```
#[macro_export]
macro_rules! esorex_internal {
    ($($arg:tt)*) => {
        $crate::error::EsorexError::Internal {
            message: format!($($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// Convenience type alias for Results using EsorexError
pub type EsorexResult<T> = std::result::Result<T, EsorexError>;

impl From<serde_json::Error> for EsorexError {
    fn from(err: serde_json::Error) -> Self {
        EsorexError::Serialization(err.to_string())
    }
}

impl EsorexError {
    /// Shorthand for a file error built from an I/O error on `path`
    pub fn file(path: impl AsRef<Path>, err: std::io::Error) -> Self {
        EsorexError::File(FileError::from_io(path, err))
    }
}
