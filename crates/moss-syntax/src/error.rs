//! Error handling types and utilities for the Moss toolchain.
//!
//! Every stage of the pipeline — lexing, parsing, compilation, the
//! virtual machine — reports failures through the same lightweight
//! [`Error`] type: a human-readable message plus an optional source
//! position. Stages that know where something went wrong attach a
//! line/column pair; runtime stages usually do not.
//!
//! # Examples
//!
//! ```rust
//! use moss_syntax::error::{Error, Result, error};
//!
//! fn parse_number(s: &str) -> Result<i64> {
//!     s.parse().map_err(|_| Error::new(format!("invalid number: {}", s)))
//! }
//!
//! fn must_be_positive(s: &str) -> Result<i64> {
//!     let n = parse_number(s)?;
//!     if n < 0 {
//!         error("number must be positive")
//!     } else {
//!         Ok(n)
//!     }
//! }
//! ```

use std::fmt;

/// An error that occurred during Moss language processing.
///
/// Represents all failure modes in the toolchain, from lexical analysis
/// through bytecode execution. Each error carries a descriptive message
/// and, when the failing stage can locate it, a source position.
#[derive(Debug, Clone, PartialEq)]
pub struct Error {
    /// Human-readable error message
    pub msg: String,

    /// Optional line number in source file (1-based)
    pub line: Option<usize>,

    /// Optional column number in source file (1-based)
    pub col: Option<usize>,
}

impl Error {
    /// Creates a new error with the given message and no source
    /// location. Suitable for runtime errors.
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            msg: msg.into(),
            line: None,
            col: None,
        }
    }

    /// Creates a new error pinned to a source location.
    ///
    /// Used for lex and parse errors that can be pointed at precisely.
    ///
    /// ```rust
    /// use moss_syntax::Error;
    ///
    /// let err = Error::with_span("unexpected token '}'", 3, 14);
    /// assert_eq!(err.to_string(), "unexpected token '}' at 3:14");
    /// ```
    pub fn with_span(msg: impl Into<String>, line: usize, col: usize) -> Self {
        Self {
            msg: msg.into(),
            line: Some(line),
            col: Some(col),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let (Some(l), Some(c)) = (self.line, self.col) {
            write!(f, "{} at {}:{}", self.msg, l, c)
        } else {
            write!(f, "{}", self.msg)
        }
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::new(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::new(s)
    }
}

/// A specialized `Result` type for Moss operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Convenience function to create an error result.
///
/// Shorthand for `Err(Error::new(msg))`.
pub fn error<T>(msg: impl Into<String>) -> Result<T> {
    Err(Error::new(msg))
}

/// Convenience function to create an error result with a source
/// location. Shorthand for `Err(Error::with_span(msg, line, col))`.
pub fn error_at<T>(line: usize, col: usize, msg: impl Into<String>) -> Result<T> {
    Err(Error::with_span(msg, line, col))
}
