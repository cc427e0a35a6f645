// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types for cache operations.

/// Classifies the origin of a cache error.
///
/// Errors raised by user-supplied hooks (loaders, writers, processors,
/// listeners) are wrapped with the matching kind exactly once: an error that
/// already carries the expected kind is propagated as-is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ErrorKind {
    /// The backing store failed.
    #[default]
    Store,
    /// A cache loader failed during read-through or bulk loading.
    Loader,
    /// A cache writer failed during write-through.
    Writer,
    /// An entry processor failed.
    Processor,
    /// A cache entry listener failed.
    Listener,
    /// A key or value could not be converted to or from its stored form.
    Conversion,
    /// The cache has been closed.
    Closed,
}

/// An error from a cache operation.
///
/// Carries an [`ErrorKind`] identifying the failing component. Use
/// [`std::error::Error::source()`] to access the underlying cause if needed.
///
/// # Example
///
/// ```
/// use satchel::{Error, ErrorKind};
///
/// let error = Error::from_message(ErrorKind::Loader, "backend unreachable");
/// assert_eq!(error.kind, ErrorKind::Loader);
/// ```
#[ohno::error]
#[from(satchel_store::Error(kind: ErrorKind::Store))]
pub struct Error {
    /// The component the error originated in.
    pub kind: ErrorKind,
}

impl Error {
    /// Creates a new error of `kind` from any type that can be converted to
    /// an error.
    ///
    /// This is the public API for creating cache errors from external
    /// crates, typically inside [`CacheLoader`](crate::CacheLoader),
    /// [`CacheWriter`](crate::CacheWriter), and
    /// [`EntryProcessor`](crate::EntryProcessor) implementations.
    ///
    /// # Examples
    ///
    /// ```
    /// use satchel::{Error, ErrorKind};
    ///
    /// let error = Error::from_message(ErrorKind::Writer, "backend offline");
    /// ```
    pub fn from_message(
        kind: ErrorKind,
        cause: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::caused_by(kind, cause)
    }

    /// Wraps an error under `kind` unless it already carries that kind,
    /// so that hook errors are not double-wrapped as they cross the
    /// adapter boundary.
    pub(crate) fn ensure_kind(kind: ErrorKind, err: Self) -> Self {
        if err.kind == kind { err } else { Self::caused_by(kind, err) }
    }
}

/// A specialized [`Result`] type for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_carries_kind() {
        let error = Error::new(ErrorKind::Closed);
        assert_eq!(error.kind, ErrorKind::Closed);
    }

    #[test]
    fn from_message_carries_kind_and_cause() {
        let error = Error::from_message(ErrorKind::Writer, "write rejected");
        assert_eq!(error.kind, ErrorKind::Writer);
        assert!(format!("{error}").contains("write rejected"));
    }

    #[test]
    fn error_display_contains_cause_message() {
        let error = Error::caused_by(ErrorKind::Loader, "load blew up");
        let display_str = format!("{error}");
        assert!(
            display_str.contains("load blew up"),
            "display output should contain the cause message, got: {display_str}"
        );
    }

    #[test]
    fn store_errors_convert_with_store_kind() {
        fn store_op() -> Result<()> {
            Err(satchel_store::Error::from_message("disk on fire"))?;
            Ok(())
        }

        let err = store_op().expect_err("should propagate");
        assert_eq!(err.kind, ErrorKind::Store);
    }

    #[test]
    fn ensure_kind_avoids_double_wrapping() {
        let original = Error::caused_by(ErrorKind::Loader, "inner failure");
        let wrapped = Error::ensure_kind(ErrorKind::Loader, original);
        // Still the original error, not a Loader-wrapping-Loader chain.
        assert_eq!(wrapped.kind, ErrorKind::Loader);
        assert!(format!("{wrapped}").contains("inner failure"));
    }

    #[test]
    fn ensure_kind_wraps_foreign_kinds() {
        let original = Error::caused_by(ErrorKind::Store, "store failure");
        let wrapped = Error::ensure_kind(ErrorKind::Processor, original);
        assert_eq!(wrapped.kind, ErrorKind::Processor);
    }
}
