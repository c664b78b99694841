use crate::codec::SerializeError;
use serde::{Serialize, de::DeserializeOwned};

/// Serialize a value into legacy JSON bytes.
pub(super) fn serialize<T>(t: &T) -> Result<Vec<u8>, SerializeError>
where
    T: Serialize,
{
    serde_json::to_vec(t).map_err(|e| SerializeError::Serialize(e.to_string()))
}

pub(super) fn deserialize<T>(bytes: &[u8]) -> Result<T, SerializeError>
where
    T: DeserializeOwned,
{
    serde_json::from_slice(bytes).map_err(|e| SerializeError::Deserialize(e.to_string()))
}
