// SPDX-License-Identifier: Apache-2.0

//! # Wire serializer
//!
//! Pluggable wire format for cross-node argument and result payloads. The
//! selection is a plain enum rather than a trait object so that marshalling
//! stays generic over the payload type; every registered function captures
//! the system's serializer at registration time.
//!

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::Error;

/// Selectable wire format for cluster payloads.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Serializer {
    /// Compact binary encoding, the default.
    #[default]
    Bincode,
    /// Self-describing JSON, useful for debugging and polyglot peers.
    Json,
}

impl Serializer {
    /// Wire-format name, as advertised to peers.
    pub fn name(&self) -> &'static str {
        match self {
            Serializer::Bincode => "bincode",
            Serializer::Json => "json",
        }
    }

    /// Encodes a value for the wire.
    pub fn marshal<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, Error> {
        match self {
            Serializer::Bincode => bincode::serialize(value)
                .map_err(|err| Error::Marshal(err.to_string())),
            Serializer::Json => serde_json::to_vec(value)
                .map_err(|err| Error::Marshal(err.to_string())),
        }
    }

    /// Decodes a value from the wire.
    pub fn unmarshal<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, Error> {
        match self {
            Serializer::Bincode => bincode::deserialize(data)
                .map_err(|err| Error::Unmarshal(err.to_string())),
            Serializer::Json => serde_json::from_slice(data)
                .map_err(|err| Error::Unmarshal(err.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sample {
        id: u64,
        name: String,
    }

    #[test]
    fn round_trip_both_formats() {
        let value = Sample {
            id: 7,
            name: "room".to_owned(),
        };
        for serializer in [Serializer::Bincode, Serializer::Json] {
            let bytes = serializer.marshal(&value).unwrap();
            let back: Sample = serializer.unmarshal(&bytes).unwrap();
            assert_eq!(back, value);
        }
    }

    #[test]
    fn unmarshal_garbage_fails() {
        let garbage = [0xffu8, 0x00, 0x13];
        let result: Result<Sample, _> = Serializer::Json.unmarshal(&garbage);
        assert!(result.is_err());
    }

    #[test]
    fn names() {
        assert_eq!(Serializer::Bincode.name(), "bincode");
        assert_eq!(Serializer::Json.name(), "json");
    }
}
