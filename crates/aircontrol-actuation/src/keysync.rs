//! Keyboard press/release intents.
//!
//! Key injection itself happens outside this crate. [`KeySync`] only
//! remembers which tokens are held and works out what must change so the
//! keyboard matches the latest payload.

use std::collections::{BTreeMap, BTreeSet};

use aircontrol_types::{InputPayload, TokenList};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyIntent {
    Press(String),
    Release(String),
}

fn normalize_token(token: &str) -> Option<String> {
    let token = token.trim().to_ascii_lowercase();
    (!token.is_empty()).then_some(token)
}

/// Tokens a payload wants held under `keyboard_map`.
pub fn desired_tokens(
    payload: &InputPayload,
    keyboard_map: &BTreeMap<String, TokenList>,
) -> BTreeSet<String> {
    payload
        .pressed()
        .filter_map(|name| keyboard_map.get(name))
        .flat_map(TokenList::iter)
        .filter_map(normalize_token)
        .collect()
}

#[derive(Debug, Default)]
pub struct KeySync {
    held: BTreeSet<String>,
}

impl KeySync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn held(&self) -> impl Iterator<Item = &str> {
        self.held.iter().map(String::as_str)
    }

    /// Diff the held set against `payload`. Releases come before presses.
    pub fn sync(
        &mut self,
        payload: &InputPayload,
        keyboard_map: &BTreeMap<String, TokenList>,
    ) -> Vec<KeyIntent> {
        let desired = desired_tokens(payload, keyboard_map);
        let mut intents: Vec<KeyIntent> = self
            .held
            .difference(&desired)
            .cloned()
            .map(KeyIntent::Release)
            .collect();
        intents.extend(desired.difference(&self.held).cloned().map(KeyIntent::Press));
        self.held = desired;
        intents
    }

    /// Release everything currently held.
    pub fn release_all(&mut self) -> Vec<KeyIntent> {
        std::mem::take(&mut self.held)
            .into_iter()
            .map(KeyIntent::Release)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn keyboard_map() -> BTreeMap<String, TokenList> {
        serde_json::from_value(json!({
            "a": "space",
            "b": ["Shift", "x"],
            "up": "w"
        }))
        .unwrap()
    }

    fn payload(value: serde_json::Value) -> InputPayload {
        InputPayload::from(value)
    }

    #[test]
    fn press_then_release() {
        let mut sync = KeySync::new();
        let map = keyboard_map();

        let first = sync.sync(&payload(json!({ "buttons": { "a": true, "b": true } })), &map);
        assert_eq!(
            first,
            vec![
                KeyIntent::Press("shift".into()),
                KeyIntent::Press("space".into()),
                KeyIntent::Press("x".into()),
            ]
        );

        let second = sync.sync(&payload(json!({ "buttons": { "a": true, "b": false } })), &map);
        assert_eq!(
            second,
            vec![
                KeyIntent::Release("shift".into()),
                KeyIntent::Release("x".into()),
            ]
        );
        assert_eq!(sync.held().collect::<Vec<_>>(), vec!["space"]);
    }

    #[test]
    fn unchanged_payload_yields_nothing() {
        let mut sync = KeySync::new();
        let map = keyboard_map();
        let p = payload(json!({ "buttons": { "up": true } }));
        assert_eq!(sync.sync(&p, &map).len(), 1);
        assert!(sync.sync(&p, &map).is_empty());
    }

    #[test]
    fn release_all_empties_the_held_set() {
        let mut sync = KeySync::new();
        let map = keyboard_map();
        sync.sync(&payload(json!({ "buttons": { "a": true, "up": true } })), &map);
        let released = sync.release_all();
        assert_eq!(released.len(), 2);
        assert!(sync.release_all().is_empty());
    }
}
