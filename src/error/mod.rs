//! The crate's layered error hierarchy, in the same shape the composition
//! engine this crate's plumbing is modeled on uses: one `thiserror` enum per
//! concern, plus `internal_error!`/`bail!`/`ensure!` for invariant violations
//! that should never happen given well-formed inputs.

use std::path::PathBuf;

/// Create an internal error.
///
/// # Example
/// ```rust
/// use pg_schema_discovery::internal_error;
/// use pg_schema_discovery::error::GraphSchemaError;
/// # fn may_be_none() -> Option<()> { None }
///
/// const NAME: &str = "the concept";
/// let result: Result<(), GraphSchemaError> = may_be_none()
///     .ok_or_else(|| internal_error!("Expected {NAME} to be Some"));
/// ```
#[macro_export]
macro_rules! internal_error {
    ( $( $arg:tt )+ ) => {
        $crate::error::GraphSchemaError::Internal(format!( $( $arg )+ ))
    }
}

/// Break out of the current function, returning an internal error.
#[macro_export]
macro_rules! bail {
    ( $( $arg:tt )+ ) => {
        return Err($crate::internal_error!( $( $arg )+ ))
    }
}

/// An assertion that should never fail given correct inputs: panics in debug
/// builds, returns an internal error otherwise.
#[macro_export]
macro_rules! ensure {
    ( $expr:expr, $( $arg:tt )+ ) => {
        #[cfg(debug_assertions)]
        {
            assert!($expr, $( $arg )+);
        }
        #[cfg(not(debug_assertions))]
        if !$expr {
            $crate::bail!( $( $arg )+ );
        }
    }
}

/// Top-level error type returned by every public entry point in this crate.
#[derive(Debug, thiserror::Error)]
pub enum GraphSchemaError {
    #[error("failed to parse PG-Schema: {0}")]
    Parse(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("type extraction failed: {0}")]
    Extraction(String),

    #[error("could not satisfy endpoint constraint: {0}")]
    Endpoint(String),

    #[error("graph does not conform to schema: {0} invalid element(s)")]
    Validation(usize),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl GraphSchemaError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, GraphSchemaError>;
