//! Trigger conditions for conditional phases
//!
//! A conditional phase arms a condition at dispatch and waits for an
//! authorized caller to present trigger data that satisfies it.
//! Evaluation is pure: the verdict depends only on the condition, the
//! presented data, and the supplied clock reading.

use crate::Principal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// The condition a conditional phase waits on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerCondition {
    /// Always satisfied — the phase completes on the first authorized trigger.
    None,

    /// Trigger data is a price; passes when it clears the threshold.
    PriceThreshold {
        /// The price to compare against
        threshold: u64,
        /// `true`: pass when price >= threshold; `false`: pass when price <= threshold
        greater: bool,
    },

    /// Passes once the clock reaches the target time. Trigger data is ignored.
    TimeThreshold {
        /// The earliest time at which the trigger may fire
        target: DateTime<Utc>,
    },

    /// Trigger data must hash (SHA-256) to the expected digest.
    DataHash {
        /// Expected digest of the trigger data
        expected: [u8; 32],
    },

    /// Trigger data is an observed value; passes when it is within
    /// tolerance of the expected value.
    OracleValue {
        /// The expected reading
        expected: u64,
        /// Maximum absolute deviation accepted
        tolerance: u64,
    },

    /// Trigger data is a concatenation of 20-byte principals; passes
    /// when at least `min_approvals` distinct listed signers appear.
    MultiSig {
        /// Minimum distinct approvals required
        min_approvals: u32,
        /// The eligible signers
        signers: Vec<Principal>,
    },
}

impl TriggerCondition {
    /// Evaluate the condition against presented trigger data.
    pub fn evaluate(&self, data: &[u8], now: DateTime<Utc>) -> ConditionVerdict {
        match self {
            Self::None => ConditionVerdict::Satisfied,

            Self::PriceThreshold { threshold, greater } => {
                let price = match decode_u64(data) {
                    Ok(v) => v,
                    Err(reason) => return ConditionVerdict::not_satisfied(reason),
                };
                let pass = if *greater {
                    price >= *threshold
                } else {
                    price <= *threshold
                };
                if pass {
                    ConditionVerdict::Satisfied
                } else {
                    ConditionVerdict::not_satisfied(format!(
                        "price {} does not clear threshold {} ({})",
                        price,
                        threshold,
                        if *greater { ">=" } else { "<=" }
                    ))
                }
            }

            Self::TimeThreshold { target } => {
                if now >= *target {
                    ConditionVerdict::Satisfied
                } else {
                    ConditionVerdict::not_satisfied(format!(
                        "target time {} not reached (now {})",
                        target, now
                    ))
                }
            }

            Self::DataHash { expected } => {
                let digest: [u8; 32] = Sha256::digest(data).into();
                if digest == *expected {
                    ConditionVerdict::Satisfied
                } else {
                    ConditionVerdict::not_satisfied("trigger data digest mismatch")
                }
            }

            Self::OracleValue {
                expected,
                tolerance,
            } => {
                let actual = match decode_u64(data) {
                    Ok(v) => v,
                    Err(reason) => return ConditionVerdict::not_satisfied(reason),
                };
                let deviation = actual.max(*expected) - actual.min(*expected);
                if deviation <= *tolerance {
                    ConditionVerdict::Satisfied
                } else {
                    ConditionVerdict::not_satisfied(format!(
                        "reading {} deviates from {} by {} (tolerance {})",
                        actual, expected, deviation, tolerance
                    ))
                }
            }

            Self::MultiSig {
                min_approvals,
                signers,
            } => {
                if data.len() % Principal::LEN != 0 {
                    return ConditionVerdict::not_satisfied(
                        "approval data is not a sequence of 20-byte principals",
                    );
                }
                let eligible: BTreeSet<&Principal> = signers.iter().collect();
                let approvals: BTreeSet<Principal> = data
                    .chunks_exact(Principal::LEN)
                    .filter_map(Principal::from_slice)
                    .filter(|p| eligible.contains(p))
                    .collect();
                if approvals.len() as u32 >= *min_approvals {
                    ConditionVerdict::Satisfied
                } else {
                    ConditionVerdict::not_satisfied(format!(
                        "{} of {} required approvals",
                        approvals.len(),
                        min_approvals
                    ))
                }
            }
        }
    }

    /// Encode to the JSON wire form used by embedders that carry
    /// conditions as opaque bytes.
    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("condition serialization is infallible")
    }

    /// Decode from the JSON wire form.
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Outcome of evaluating a trigger condition
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConditionVerdict {
    /// The condition is satisfied — the trigger may fire
    Satisfied,
    /// The condition is not satisfied
    NotSatisfied { reason: String },
}

impl ConditionVerdict {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Self::Satisfied)
    }

    /// The rejection reason, if any.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Satisfied => None,
            Self::NotSatisfied { reason } => Some(reason),
        }
    }

    fn not_satisfied(reason: impl Into<String>) -> Self {
        Self::NotSatisfied {
            reason: reason.into(),
        }
    }
}

/// Numeric trigger data is an 8-byte big-endian integer.
fn decode_u64(data: &[u8]) -> Result<u64, String> {
    let bytes: [u8; 8] = data
        .try_into()
        .map_err(|_| format!("expected 8-byte value, got {} bytes", data.len()))?;
    Ok(u64::from_be_bytes(bytes))
}

/// Encode a numeric value as trigger data.
pub fn encode_u64(value: u64) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}
