// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Key and value conversion between external and stored forms.
//!
//! A cache is configured once, at construction, with a converter pair per
//! direction for keys and for values. Store-by-reference keeps clones of the
//! caller's objects; store-by-value serializes them so that later mutation of
//! the caller's object cannot leak into the cache.

use serde::{Serialize, de::DeserializeOwned};

use crate::{Error, ErrorKind};

/// The stored form of a key or value.
///
/// Which variant a cache produces is fixed at construction by its
/// [`ConverterPair`]s; the two variants never mix within one cache.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Internal<T> {
    /// A clone of the external object (store-by-reference).
    Reference(T),
    /// A serialized copy of the external object (store-by-value).
    Bytes(Vec<u8>),
}

/// A pair of conversion functions between an external type and its stored form.
///
/// Converters are plain function pointers chosen once at construction; the
/// hot path pays no dynamic dispatch for them.
pub struct ConverterPair<T> {
    to_internal: fn(&T) -> Result<Internal<T>, Error>,
    from_internal: fn(&Internal<T>) -> Result<T, Error>,
}

impl<T> Clone for ConverterPair<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ConverterPair<T> {}

impl<T> std::fmt::Debug for ConverterPair<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConverterPair").finish_non_exhaustive()
    }
}

impl<T> ConverterPair<T>
where
    T: Clone,
{
    /// Creates a store-by-reference converter pair.
    ///
    /// Values are cloned into and out of the cache; no serialization occurs.
    #[must_use]
    pub fn by_reference() -> Self {
        Self {
            to_internal: |value| Ok(Internal::Reference(value.clone())),
            from_internal: |internal| match internal {
                Internal::Reference(value) => Ok(value.clone()),
                Internal::Bytes(_) => Err(Error::caused_by(
                    ErrorKind::Conversion,
                    "store-by-reference cache encountered a serialized value",
                )),
            },
        }
    }
}

impl<T> ConverterPair<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Creates a store-by-value converter pair.
    ///
    /// Values are serialized on the way in and deserialized on the way out,
    /// so the cache holds no aliases of the caller's objects.
    #[must_use]
    pub fn by_value() -> Self {
        Self {
            to_internal: |value| {
                bincode::serialize(value)
                    .map(Internal::Bytes)
                    .map_err(|e| Error::caused_by(ErrorKind::Conversion, e))
            },
            from_internal: |internal| match internal {
                Internal::Bytes(bytes) => {
                    bincode::deserialize(bytes).map_err(|e| Error::caused_by(ErrorKind::Conversion, e))
                }
                Internal::Reference(_) => Err(Error::caused_by(
                    ErrorKind::Conversion,
                    "store-by-value cache encountered an unserialized value",
                )),
            },
        }
    }
}

impl<T> ConverterPair<T> {
    /// Converts an external object to its stored form.
    ///
    /// # Errors
    ///
    /// Returns a [`ErrorKind::Conversion`] error if serialization fails.
    pub fn to_internal(&self, value: &T) -> Result<Internal<T>, Error> {
        (self.to_internal)(value)
    }

    /// Converts a stored form back to an external object.
    ///
    /// # Errors
    ///
    /// Returns a [`ErrorKind::Conversion`] error if deserialization fails.
    pub fn from_internal(&self, internal: &Internal<T>) -> Result<T, Error> {
        (self.from_internal)(internal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn by_reference_roundtrip_clones() {
        let pair = ConverterPair::<String>::by_reference();
        let internal = pair.to_internal(&"hello".to_string()).expect("conversion should succeed");
        assert!(matches!(internal, Internal::Reference(_)));
        let back = pair.from_internal(&internal).expect("conversion should succeed");
        assert_eq!(back, "hello");
    }

    #[test]
    fn by_value_roundtrip_serializes() {
        let pair = ConverterPair::<String>::by_value();
        let internal = pair.to_internal(&"hello".to_string()).expect("conversion should succeed");
        assert!(matches!(internal, Internal::Bytes(_)));
        let back = pair.from_internal(&internal).expect("conversion should succeed");
        assert_eq!(back, "hello");
    }

    #[test]
    fn by_value_produces_equal_bytes_for_equal_inputs() {
        let pair = ConverterPair::<u64>::by_value();
        let a = pair.to_internal(&7).expect("conversion should succeed");
        let b = pair.to_internal(&7).expect("conversion should succeed");
        assert_eq!(a, b);
    }

    #[test]
    fn mode_mismatch_is_a_conversion_error() {
        let by_ref = ConverterPair::<String>::by_reference();
        let err = by_ref
            .from_internal(&Internal::Bytes(vec![1, 2, 3]))
            .expect_err("mode mismatch should fail");
        assert_eq!(err.kind, ErrorKind::Conversion);
    }
}
