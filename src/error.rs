use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// # Error Categories
///
/// ## Invocation Errors
/// - [`Error::Configuration`] - The patch request cannot be executed (fatal for the whole run)
/// - [`Error::InstructionFile`] - An instruction file could not be deserialized
///
/// ## File Parsing Errors
/// - [`Error::Malformed`] - Corrupted or invalid file structure
/// - [`Error::OutOfBounds`] - Attempted to read beyond buffer boundaries
/// - [`Error::NotSupported`] - Valid input using a layout this crate does not handle
/// - [`Error::Empty`] - Empty input provided
///
/// ## I/O and External Errors
/// - [`Error::FileError`] - Filesystem I/O errors
/// - [`Error::GoblinErr`] - PE parsing errors from the goblin crate
///
/// # Examples
///
/// ```rust,no_run
/// use dotpatch::{backend::{CilBackend, ModuleBackend}, Error};
/// use std::path::Path;
///
/// match CilBackend::new().load(Path::new("Core.dll")) {
///     Ok(module) => println!("Loaded {}", module.name()),
///     Err(Error::NotSupported(reason)) => eprintln!("Unsupported image: {reason}"),
///     Err(Error::Malformed { message, file, line }) => {
///         eprintln!("Malformed file: {} ({}:{})", message, file, line);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The patch request is missing a required input or carries an invalid value.
    ///
    /// This is the only error that aborts a run before any module is touched. The message
    /// names the missing precondition.
    #[error("Invalid patch configuration - {0}")]
    Configuration(String),

    /// The instruction file could not be deserialized.
    #[error("Invalid instruction file - {0}")]
    InstructionFile(#[from] serde_json::Error),

    /// The file is damaged and could not be parsed.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing or writing a buffer.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// The input is valid, but uses a layout that cannot be patched.
    ///
    /// Examples are uncompressed (`#-`) table streams, modules without an assembly
    /// manifest, or images without room for an additional section header.
    #[error("Not supported - {0}")]
    NotSupported(String),

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Error from the goblin crate during PE parsing.
    #[error("{0}")]
    GoblinErr(#[from] goblin::error::Error),
}
