//! Versioned strategy memo codec
//!
//! The simulation loop only ever sees a [`MemoBlob`]. Adapters turn it into a
//! [`StrategyMemo`] with [`decode`] and back with [`encode`]; nothing else
//! (de)serialises strategy state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use crate::error::MemoError;
use crate::Symbol;

pub const MEMO_VERSION: u32 = 1;

/// Opaque state carried between steps
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoBlob(pub String);

impl MemoBlob {
    pub fn empty() -> Self {
        MemoBlob(String::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Every known shape of strategy state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyMemo {
    #[default]
    Empty,
    FairValue(FairValueMemo),
}

/// Consecutive ticks each instrument spent with no capacity left on one side
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FairValueMemo {
    #[serde(default)]
    pub pinned_long: BTreeMap<Symbol, u32>,
    #[serde(default)]
    pub pinned_short: BTreeMap<Symbol, u32>,
}

#[derive(Serialize)]
struct Envelope<'a> {
    version: u32,
    state: &'a StrategyMemo,
}

#[derive(Deserialize)]
struct RawEnvelope {
    version: u32,
    state: serde_json::Value,
}

pub fn encode(memo: &StrategyMemo) -> Result<MemoBlob, MemoError> {
    let envelope = Envelope {
        version: MEMO_VERSION,
        state: memo,
    };
    Ok(MemoBlob(serde_json::to_string(&envelope)?))
}

/// An empty blob is the initial state
pub fn decode(blob: &MemoBlob) -> Result<StrategyMemo, MemoError> {
    if blob.is_empty() {
        return Ok(StrategyMemo::Empty);
    }
    let raw: RawEnvelope = serde_json::from_str(blob.as_str())?;
    if raw.version != MEMO_VERSION {
        return Err(MemoError::UnsupportedVersion {
            found: raw.version,
            expected: MEMO_VERSION,
        });
    }
    Ok(serde_json::from_value(raw.state)?)
}

/// Decode, falling back to a fresh memo when the blob is unreadable
pub fn decode_or_reset(blob: &MemoBlob, strategy: &str) -> StrategyMemo {
    match decode(blob) {
        Ok(memo) => memo,
        Err(e) => {
            warn!(strategy, error = %e, "Discarding unreadable memo, starting fresh");
            StrategyMemo::Empty
        }
    }
}
