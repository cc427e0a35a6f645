// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error type shared by backing store implementations.

/// An error from a backing store operation.
///
/// Store implementations differ widely in what can fail (a full disk, a
/// lost connection, a corrupt entry), so the error is opaque and carries the
/// implementation's own failure as its cause. Use
/// [`std::error::Error::source()`] to reach the underlying cause if needed.
///
/// # Example
///
/// ```
/// use satchel_store::Error;
///
/// let error = Error::from_message("store unavailable");
/// ```
#[ohno::error]
pub struct Error {}

impl Error {
    /// Creates a new error from any type that can be converted to an error.
    ///
    /// This is how store implementations outside this crate surface their
    /// failures through the [`BackingStore`](crate::BackingStore) trait.
    ///
    /// # Examples
    ///
    /// ```
    /// use satchel_store::Error;
    ///
    /// let error = Error::from_message("store unavailable");
    /// ```
    pub fn from_message(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(cause)
    }
}

/// A specialized [`Result`] type for backing store operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_message_accepts_plain_text() {
        let error = Error::from_message("map poisoned");
        assert!(
            format!("{error}").contains("map poisoned"),
            "display output should carry the failure text"
        );
    }

    #[test]
    fn from_message_wraps_a_foreign_failure() {
        let io = std::io::Error::other("disk full");
        let error = Error::from_message(io);
        assert!(
            format!("{error:?}").contains("disk full"),
            "debug output should carry the wrapped cause"
        );
    }

    #[test]
    fn store_failures_propagate_through_the_result_alias() {
        fn flush() -> Result<()> {
            Err(Error::from_message("flush interrupted"))
        }

        let err = flush().expect_err("flush should fail");
        assert!(format!("{err}").contains("flush interrupted"));
    }
}
