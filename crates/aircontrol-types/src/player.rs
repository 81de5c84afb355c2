//! Player slots.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::TypesError;

/// Highest player index a relay session hands out.
pub const MAX_PLAYERS: u8 = 64;

/// A 1-based player slot.
///
/// The relay uses the full `1..=64` range; a direct-connect host only uses
/// the first few slots.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "i64", into = "u8")]
pub struct PlayerIndex(u8);

impl PlayerIndex {
    /// Slot 1, the default for bridges that do not ask for one.
    pub const FIRST: Self = Self(1);

    pub fn new(index: i64) -> Result<Self, TypesError> {
        match u8::try_from(index) {
            Ok(i) if (1..=MAX_PLAYERS).contains(&i) => Ok(Self(i)),
            _ => Err(TypesError::PlayerIndexOutOfRange {
                index,
                max: MAX_PLAYERS,
            }),
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Iterate `1..=max` in ascending order, capped at [`MAX_PLAYERS`].
    pub fn range(max: u8) -> impl Iterator<Item = Self> {
        (1..=max.min(MAX_PLAYERS)).map(Self)
    }

    /// Lenient deserialiser for request fields: accepts numbers or numeric
    /// strings, and turns anything missing, malformed or out of range into
    /// `None` instead of failing the whole request.
    pub fn deserialize_lenient<'de, D>(deserializer: D) -> Result<Option<Self>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<serde_json::Value>::deserialize(deserializer)?;
        let raw = match value {
            Some(serde_json::Value::Number(n)) => n.as_i64(),
            Some(serde_json::Value::String(s)) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        Ok(raw.and_then(|i| Self::new(i).ok()))
    }
}

impl TryFrom<i64> for PlayerIndex {
    type Error = TypesError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PlayerIndex> for u8 {
    fn from(index: PlayerIndex) -> Self {
        index.0
    }
}

impl std::fmt::Display for PlayerIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "P{}", self.0)
    }
}
