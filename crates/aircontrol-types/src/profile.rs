//! Catalog entities: game profiles and controller layouts.
//!
//! These are the sanitised shapes. Validation of raw catalog files lives in
//! the relay crate; everything here is assumed to be well-formed already.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The phone-side inputs a profile can map, in display order.
pub const PROFILE_INPUTS: [&str; 16] = [
    "up", "down", "left", "right", "a", "b", "x", "y", "lb", "rb", "lt", "rt", "start",
    "select", "ls", "rs",
];

/// A game profile: how phone inputs map to keyboard tokens and to virtual
/// gamepad actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameProfile {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Phone input -> keyboard tokens (e.g. `"a" -> ["space"]`).
    #[serde(default)]
    pub keyboard_map: BTreeMap<String, TokenList>,
    /// Phone input -> virtual gamepad actions (e.g. `"a" -> ["south"]`).
    #[serde(default)]
    pub virtual_map: BTreeMap<String, Vec<String>>,
}

/// One or more tokens. On the wire a single token is a bare string and
/// several are an array; both forms are accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenList(pub Vec<String>);

impl TokenList {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for TokenList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0.as_slice() {
            [single] => serializer.serialize_str(single),
            many => many.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for TokenList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum OneOrMany {
            One(String),
            Many(Vec<String>),
        }

        Ok(match OneOrMany::deserialize(deserializer)? {
            OneOrMany::One(token) => Self(vec![token]),
            OneOrMany::Many(tokens) => Self(tokens),
        })
    }
}

/// Which half of the phone screen a panel occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Panel {
    Stick,
    Action,
}

/// A face button position in the action grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaceButton {
    A,
    B,
    X,
    Y,
}

impl FaceButton {
    pub const ALL: [Self; 4] = [Self::X, Self::Y, Self::A, Self::B];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceLabels {
    pub a: String,
    pub b: String,
    pub x: String,
    pub y: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DpadLabels {
    pub up: String,
    pub down: String,
    pub left: String,
    pub right: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtilityLabels {
    pub lb: String,
    pub rb: String,
    pub lt: String,
    pub rt: String,
    pub start: String,
    pub select: String,
    pub ls: String,
    pub rs: String,
}

/// A phone controller layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layout {
    pub id: String,
    pub name: String,
    pub description: String,
    pub panel_order: Vec<Panel>,
    pub button_grid: Vec<FaceButton>,
    pub button_labels: FaceLabels,
    pub dpad_labels: DpadLabels,
    pub utility_labels: UtilityLabels,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_list_accepts_both_forms() {
        let one: TokenList = serde_json::from_str("\"space\"").unwrap();
        let many: TokenList = serde_json::from_str(r#"["z", "x"]"#).unwrap();
        assert_eq!(one.0, vec!["space"]);
        assert_eq!(many.0, vec!["z", "x"]);
    }

    #[test]
    fn token_list_serialises_single_as_string() {
        let one = TokenList(vec!["space".into()]);
        let many = TokenList(vec!["z".into(), "x".into()]);
        assert_eq!(serde_json::to_string(&one).unwrap(), "\"space\"");
        assert_eq!(serde_json::to_string(&many).unwrap(), r#"["z","x"]"#);
    }
}
