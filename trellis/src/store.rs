//! Read interface for persistent key/value stores feeding source
//! processors.
//!
//! Persistence engines themselves are external collaborators; the engine
//! only fixes the read contract a source processor sees. A missing key is
//! reported as [`StoreError::KeyNotFound`], which converts to
//! [`Error::EndOfArray`](crate::error::Error::EndOfArray) so that reading
//! past the end of a stored array terminates iteration instead of failing
//! it.
use thiserror::Error;

use crate::error::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// No value is stored at this key.
    #[error("key not found")]
    KeyNotFound,
    /// The backing store failed.
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Read access to a key/value store with `u64` keys.
pub trait SourceStore<V>: Send + Sync {
    fn get(&self, key: u64) -> Result<V, StoreError>;
}

/// `KeyNotFound` is the canonical trigger for the end-of-array condition;
/// any other store failure is an application error.
impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::KeyNotFound => Error::EndOfArray,
            StoreError::Backend(e) => Error::Application(e),
        }
    }
}

/// An in-memory store over a dense array of values, for demos and tests.
pub struct MemStore<V> {
    values: Vec<V>,
}

impl<V> MemStore<V> {
    pub fn new(values: Vec<V>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<V: Clone + Send + Sync> SourceStore<V> for MemStore<V> {
    fn get(&self, key: u64) -> Result<V, StoreError> {
        self.values
            .get(key as usize)
            .cloned()
            .ok_or(StoreError::KeyNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_in_range() {
        let store = MemStore::new(vec![10, 20, 30]);
        assert_eq!(store.get(1).unwrap(), 20);
    }

    #[test]
    fn missing_key_is_end_of_array() {
        let store = MemStore::new(vec![10, 20, 30]);
        let err = Error::from(store.get(3).unwrap_err());
        assert!(err.is_end_of_array());
    }
}
