//! Serialization of values and wire messages.
//!
//! The engine never inspects the payloads flowing through a processor
//! graph; it only needs them to be encodable by the transport. The
//! [`Value`] trait captures that requirement, and [`Serializer`] provides a
//! unified interface over the supported binary formats so the wire encoding
//! can be chosen in configuration without touching call sites.
//!
//! ```rust
//! use trellis::serializer::Serializer;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct MyData {
//!     field: String,
//! }
//!
//! let data = MyData { field: "Hello, World!".to_string() };
//! let serialized = Serializer::Cbor.to_bytes(&data).unwrap();
//! let deserialized: MyData = Serializer::Cbor.from_bytes(&serialized).unwrap();
//! ```
use std::fmt::Debug;

use anyhow::Result;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Requirements on the opaque payloads produced by processors.
///
/// Values cross thread and node boundaries and are cloned out of caches,
/// hence the bounds beyond plain serializability. Owned types are
/// recommended. The trait is implemented automatically.
pub trait Value:
    Serialize + DeserializeOwned + Clone + Debug + Send + Sync + Unpin + 'static
{
}
impl<T> Value for T where
    T: Serialize + DeserializeOwned + Clone + Debug + Send + Sync + Unpin + 'static
{
}

/// Provides a unified interface for serializing and deserializing binary
/// data.
///
/// This enum abstracts away the underlying serialization libraries and can
/// be extended to support additional formats in the future.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Serializer {
    #[default]
    Postcard,
    Cbor,
}

impl std::fmt::Display for Serializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Postcard => write!(f, "postcard"),
            Self::Cbor => write!(f, "cbor"),
        }
    }
}

impl Serializer {
    /// Serializes the given value into binary data using the specified
    /// format.
    pub fn to_bytes<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        match self {
            Self::Postcard => Ok(postcard::to_allocvec(value)?),
            Self::Cbor => {
                let mut result = Vec::new();
                ciborium::into_writer(value, &mut result)?;
                Ok(result)
            }
        }
    }

    /// Deserializes the given binary data into a value of the specified
    /// type using the specified format.
    pub fn from_bytes<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        match self {
            Self::Postcard => Ok(postcard::from_bytes(bytes)?),
            Self::Cbor => Ok(ciborium::from_reader(bytes)?),
        }
    }
}
