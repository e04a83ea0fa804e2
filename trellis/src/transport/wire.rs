//! Wire message types.
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::Error;

/// Arguments of a `Get` call: the key range `[start, end)` for processor
/// `proc_id`. The engine only issues block-aligned ranges of at most one
/// block.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceArgs {
    pub start: u64,
    pub end: u64,
    pub proc_id: u32,
}

/// A contiguous run of values starting at `offset`; the on-the-wire form
/// of a block.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Slice<V> {
    pub offset: u64,
    pub data: Vec<V>,
}

impl<V> Slice<V> {
    pub fn new(offset: u64, data: Vec<V>) -> Self {
        Self { offset, data }
    }

    /// The offset of the first value.
    pub fn start(&self) -> u64 {
        self.offset
    }

    /// Offset position after the last value.
    pub fn end(&self) -> u64 {
        self.offset + self.data.len() as u64
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl<V: Clone> Slice<V> {
    /// The value at absolute key `key`, if the slice covers it.
    pub fn value_at(&self, key: u64) -> Option<V> {
        key.checked_sub(self.offset)
            .and_then(|i| self.data.get(i as usize))
            .cloned()
    }
}

/// A request frame. One reply frame follows each request: `Get` answers
/// with `Result<Slice<V>, RemoteError>`, `Ready` and `Shutdown` with
/// `bool`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Get(SliceArgs),
    Ready,
    Shutdown,
}

/// Reply to a `Get` request. Any per-key failure on the serving node fails
/// the whole call; no partial slice is returned.
pub type GetReply<V> = Result<Slice<V>, RemoteError>;

/// A failure reported by the serving node.
///
/// End-of-array keeps its own variant so the condition survives the node
/// boundary and still terminates iteration on the calling side; every
/// other failure collapses to its message.
#[derive(Error, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("reached the end of the array")]
    EndOfArray,
    #[error("{0}")]
    Other(String),
}

impl RemoteError {
    pub(crate) fn from_error(err: &Error) -> Self {
        match err {
            Error::EndOfArray => Self::EndOfArray,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<RemoteError> for Error {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::EndOfArray => Error::EndOfArray,
            RemoteError::Other(message) => Error::Remote(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializer::Serializer;

    #[test]
    fn slice_bounds() {
        let slice = Slice::new(40, vec![1i64, 2, 3, 4]);
        assert_eq!(slice.start(), 40);
        assert_eq!(slice.end(), 44);
        assert_eq!(slice.len(), 4);
        assert_eq!(slice.value_at(41), Some(2));
        assert_eq!(slice.value_at(44), None);
        assert_eq!(slice.value_at(39), None);
    }

    #[test]
    fn slice_round_trip_all_formats() {
        let slice = Slice::new(200, vec![vec![1i64, 2], vec![], vec![-7]]);
        for serializer in [Serializer::Postcard, Serializer::Cbor] {
            let bytes = serializer.to_bytes(&slice).unwrap();
            let decoded: Slice<Vec<i64>> = serializer.from_bytes(&bytes).unwrap();
            assert_eq!(decoded, slice);
        }
    }

    #[test]
    fn get_reply_round_trip() {
        let serializer = Serializer::Postcard;
        let ok: GetReply<u64> = Ok(Slice::new(0, vec![9, 8]));
        let bytes = serializer.to_bytes(&ok).unwrap();
        let decoded: GetReply<u64> = serializer.from_bytes(&bytes).unwrap();
        assert_eq!(decoded, ok);

        let err: GetReply<u64> = Err(RemoteError::EndOfArray);
        let bytes = serializer.to_bytes(&err).unwrap();
        let decoded: GetReply<u64> = serializer.from_bytes(&bytes).unwrap();
        assert_eq!(decoded, err);
    }

    #[test]
    fn end_of_array_survives_the_wire() {
        let remote = RemoteError::from_error(&Error::EndOfArray);
        assert!(Error::from(remote).is_end_of_array());

        let remote = RemoteError::from_error(&Error::Remote("boom".into()));
        assert!(matches!(Error::from(remote), Error::Remote(m) if m.contains("boom")));
    }
}
