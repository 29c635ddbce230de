use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Wire envelope for every request and reply.
///
/// The envelope and its payload are both MessagePack. `op` names the request
/// kind for logging and routing; replies reuse the request's `correlation_id`
/// so a client can match them to the caller that is waiting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Operation name, e.g. `"compute"` or `"compute.reply"`.
    pub op: String,

    /// MessagePack-encoded typed request or reply.
    #[serde(with = "raw_bytes")]
    pub payload: Vec<u8>,

    pub correlation_id: Uuid,

    pub sent_at: DateTime<Utc>,

    /// Envelope schema version.
    pub version: u16,
}

const VERSION: u16 = 1;

/// Op of the liveness check a ZeroMQ server answers on its own.
pub(crate) const HEARTBEAT_OP: &str = "wire.heartbeat";

impl Message {
    /// Create a request, serializing the payload with MessagePack.
    pub fn new<T: Serialize>(
        op: impl Into<String>,
        payload: &T,
    ) -> Result<Self, rmp_serde::encode::Error> {
        Ok(Self {
            op: op.into(),
            payload: rmp_serde::to_vec(payload)?,
            correlation_id: Uuid::new_v4(),
            sent_at: Utc::now(),
            version: VERSION,
        })
    }

    pub(crate) fn heartbeat() -> Result<Self, rmp_serde::encode::Error> {
        Self::new(HEARTBEAT_OP, &())
    }

    /// Create the reply to this message. The op gets a `.reply` suffix and the
    /// correlation id is carried over.
    pub fn reply<T: Serialize>(&self, payload: &T) -> Result<Self, rmp_serde::encode::Error> {
        Ok(Self {
            op: format!("{}.reply", self.op),
            payload: rmp_serde::to_vec(payload)?,
            correlation_id: self.correlation_id,
            sent_at: Utc::now(),
            version: VERSION,
        })
    }

    /// Deserialize the payload into the expected type.
    pub fn decode<T: for<'de> Deserialize<'de>>(&self) -> Result<T, rmp_serde::decode::Error> {
        rmp_serde::from_slice(&self.payload)
    }

    /// Serialize the whole envelope.
    pub fn to_bytes(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec(self)
    }

    /// Deserialize a whole envelope.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }
}

/// Serde helper so `Vec<u8>` is written as a MessagePack bin, not an array.
mod raw_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let bytes: &[u8] = Deserialize::deserialize(d)?;
        Ok(bytes.to_vec())
    }
}
