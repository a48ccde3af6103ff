//! Identifiers: principals and content-addressed workflow/execution ids
//!
//! Workflow and execution ids are not random — they are derived from
//! the registration (or start) inputs plus a monotonic nonce, so two
//! engines fed the same inputs mint the same ids.

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

// ── Principal ────────────────────────────────────────────────────────

/// An opaque 20-byte identity used for authorization and deduplication.
///
/// Conductor never interprets the bytes; authentication of the caller
/// is the embedder's responsibility. Serializes as a `0x`-prefixed hex
/// string so principals can key serialized maps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Principal(pub [u8; 20]);

impl Principal {
    pub const LEN: usize = 20;

    pub fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Parse a principal from a byte slice. Returns `None` unless the
    /// slice is exactly 20 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; 20] = bytes.try_into().ok()?;
        Some(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Serialize for Principal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Principal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        let bytes =
            hex::decode(text.trim_start_matches("0x")).map_err(D::Error::custom)?;
        Self::from_slice(&bytes)
            .ok_or_else(|| D::Error::custom("principal must be exactly 20 bytes"))
    }
}

// ── Operator set ─────────────────────────────────────────────────────

/// Identifier of an externally managed operator pool.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct OperatorSetId(pub u32);

impl std::fmt::Display for OperatorSetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "opset-{}", self.0)
    }
}

// ── Content-addressed ids ────────────────────────────────────────────

macro_rules! content_addressed_id {
    ($(#[$doc:meta])* $name:ident, $tag:literal) => {
        $(#[$doc])*
        ///
        /// Serializes as a hex string.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub [u8; 32]);

        impl $name {
            /// First eight hex characters, for logs.
            pub fn short(&self) -> String {
                hex::encode(&self.0[..4])
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            fn digest(parts: &[&[u8]]) -> Self {
                let mut hasher = Sha256::new();
                hasher.update($tag);
                for part in parts {
                    hasher.update((part.len() as u64).to_be_bytes());
                    hasher.update(part);
                }
                Self(hasher.finalize().into())
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", hex::encode(self.0))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let text = String::deserialize(deserializer)?;
                let bytes = hex::decode(&text).map_err(D::Error::custom)?;
                let bytes: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| D::Error::custom("id must be exactly 32 bytes"))?;
                Ok(Self(bytes))
            }
        }
    };
}

content_addressed_id!(
    /// Identifier of a registered workflow definition.
    WorkflowId,
    b"conductor/workflow"
);

content_addressed_id!(
    /// Identifier of a live workflow execution.
    ExecutionId,
    b"conductor/execution"
);

impl WorkflowId {
    /// Derive the id of a definition from its registration inputs.
    pub fn derive(name: &str, creator: &Principal, created_at: DateTime<Utc>, nonce: u64) -> Self {
        Self::digest(&[
            name.as_bytes(),
            creator.as_bytes(),
            &created_at.timestamp_micros().to_be_bytes(),
            &nonce.to_be_bytes(),
        ])
    }
}

impl ExecutionId {
    /// Derive the id of an execution from its start inputs.
    pub fn derive(
        workflow_id: &WorkflowId,
        initiator: &Principal,
        started_at: DateTime<Utc>,
        nonce: u64,
    ) -> Self {
        Self::digest(&[
            workflow_id.as_bytes(),
            initiator.as_bytes(),
            &started_at.timestamp_micros().to_be_bytes(),
            &nonce.to_be_bytes(),
        ])
    }
}
