//! Game profile / layout catalog and the config resolver.
//!
//! Raw catalogs are untrusted JSON. [`Catalog::sanitize`] turns anything
//! into a usable catalog with at least one profile and one layout, and
//! [`Catalog::resolve`] maps a requested config onto ids that exist.

use std::collections::BTreeMap;

use aircontrol_types::profile::{DpadLabels, FaceButton, FaceLabels, Panel, UtilityLabels};
use aircontrol_types::{
    ConfigPayload, ConfigRequest, GameConfig, GameProfile, Layout, SessionCode, TokenList,
    PROFILE_INPUTS,
};
use serde::Serialize;
use serde_json::{json, Map, Value};

const MAX_ID_LEN: usize = 42;

/// A sanitised catalog. Always holds at least one profile and one layout,
/// and `defaults` always names entries that exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    defaults: GameConfig,
    game_profiles: Vec<GameProfile>,
    layouts: Vec<Layout>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Lowercase, keep `[a-z0-9_-]`, at most 42 characters.
pub fn normalize_id(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == '-')
        .take(MAX_ID_LEN)
        .collect()
}

fn normalize_token(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_')
        .collect()
}

fn text(value: Option<&Value>, fallback: &str) -> String {
    let raw = match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };
    if raw.is_empty() {
        fallback.to_string()
    } else {
        raw
    }
}

fn id_of(value: &Value, fallback: &str) -> String {
    match value.get("id") {
        Some(Value::String(s)) if !s.trim().is_empty() => normalize_id(s),
        Some(Value::Number(n)) => normalize_id(&n.to_string()),
        _ => normalize_id(fallback),
    }
}

/// One-or-many list of normalised, de-duplicated tokens.
fn token_list(value: Option<&Value>) -> Vec<String> {
    let items: Vec<&Value> = match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(other) => vec![other],
        None => Vec::new(),
    };
    let mut tokens = Vec::new();
    for item in items {
        let token = match item {
            Value::String(s) => normalize_token(s),
            Value::Number(n) => normalize_token(&n.to_string()),
            _ => continue,
        };
        if !token.is_empty() && !tokens.contains(&token) {
            tokens.push(token);
        }
    }
    tokens
}

fn input_map(value: Option<&Value>) -> BTreeMap<&'static str, Vec<String>> {
    let source = value.and_then(Value::as_object);
    PROFILE_INPUTS
        .iter()
        .filter_map(|input| {
            let tokens = token_list(source.and_then(|m| m.get(*input)));
            (!tokens.is_empty()).then_some((*input, tokens))
        })
        .collect()
}

fn sanitize_profile(raw: &Value, fallback_id: &str) -> GameProfile {
    let id = id_of(raw, fallback_id);
    GameProfile {
        name: text(raw.get("name"), &id.to_uppercase()),
        description: text(raw.get("description"), "Custom profile"),
        keyboard_map: input_map(raw.get("keyboardMap"))
            .into_iter()
            .map(|(k, v)| (k.to_string(), TokenList(v)))
            .collect(),
        virtual_map: input_map(raw.get("virtualMap"))
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
        id,
    }
}

/// Keep recognised entries in order without repeats, then append any
/// missing ones in default order.
fn ordered<T: Copy + PartialEq>(value: Option<&Value>, parse: impl Fn(&str) -> Option<T>, all: &[T]) -> Vec<T> {
    let mut out = Vec::new();
    if let Some(items) = value.and_then(Value::as_array) {
        for item in items.iter().filter_map(Value::as_str) {
            if let Some(entry) = parse(&item.trim().to_lowercase()) {
                if !out.contains(&entry) {
                    out.push(entry);
                }
            }
        }
    }
    for entry in all {
        if !out.contains(entry) {
            out.push(*entry);
        }
    }
    out
}

fn parse_panel(s: &str) -> Option<Panel> {
    match s {
        "stick" => Some(Panel::Stick),
        "action" => Some(Panel::Action),
        _ => None,
    }
}

fn parse_face(s: &str) -> Option<FaceButton> {
    match s {
        "a" => Some(FaceButton::A),
        "b" => Some(FaceButton::B),
        "x" => Some(FaceButton::X),
        "y" => Some(FaceButton::Y),
        _ => None,
    }
}

fn sanitize_layout(raw: &Value, fallback_id: &str) -> Layout {
    let id = id_of(raw, fallback_id);
    let labels = raw.get("buttonLabels");
    let dpad = raw.get("dpadLabels");
    let utility = raw.get("utilityLabels");
    let label = |group: Option<&Value>, key: &str, fallback: &str| {
        text(group.and_then(|g| g.get(key)), fallback)
    };

    Layout {
        name: text(raw.get("name"), &id.to_uppercase()),
        description: text(raw.get("description"), "Custom layout"),
        panel_order: ordered(raw.get("panelOrder"), parse_panel, &[Panel::Stick, Panel::Action]),
        button_grid: ordered(raw.get("buttonGrid"), parse_face, &FaceButton::ALL),
        button_labels: FaceLabels {
            a: label(labels, "a", "A"),
            b: label(labels, "b", "B"),
            x: label(labels, "x", "X"),
            y: label(labels, "y", "Y"),
        },
        dpad_labels: DpadLabels {
            up: label(dpad, "up", "UP"),
            down: label(dpad, "down", "DN"),
            left: label(dpad, "left", "LT"),
            right: label(dpad, "right", "RT"),
        },
        utility_labels: UtilityLabels {
            lb: label(utility, "lb", "LB"),
            rb: label(utility, "rb", "RB"),
            lt: label(utility, "lt", "LT"),
            rt: label(utility, "rt", "RT"),
            start: label(utility, "start", "START"),
            select: label(utility, "select", "SELECT"),
            ls: label(utility, "ls", "L3"),
            rs: label(utility, "rs", "R3"),
        },
        id,
    }
}

fn builtin_profile() -> Value {
    json!({
        "id": "platformer",
        "name": "Platformer",
        "description": "Default profile",
        "keyboardMap": {
            "left": "left", "right": "right", "up": "up", "down": "down",
            "a": "space", "b": "left_shift", "x": "z", "y": "x"
        },
        "virtualMap": {
            "left": ["dpad_left"], "right": ["dpad_right"],
            "up": ["dpad_up"], "down": ["dpad_down"],
            "a": ["south"], "b": ["east"], "x": ["west"], "y": ["north"]
        }
    })
}

fn builtin_layout() -> Value {
    json!({
        "id": "balanced",
        "name": "Balanced",
        "description": "Default layout",
        "panelOrder": ["stick", "action"],
        "buttonGrid": ["x", "y", "a", "b"]
    })
}

fn sanitize_entries<T>(
    source: Option<&Value>,
    prefix: &str,
    sanitize: impl Fn(&Value, &str) -> T,
    id: impl Fn(&T) -> &str,
) -> Vec<T> {
    let mut out: Vec<T> = Vec::new();
    let items = source.and_then(Value::as_array).map(Vec::as_slice).unwrap_or_default();
    for (index, raw) in items.iter().enumerate() {
        let entry = sanitize(raw, &format!("{prefix}_{}", index + 1));
        let entry_id = id(&entry);
        if entry_id.is_empty() || out.iter().any(|e| id(e) == entry_id) {
            continue;
        }
        out.push(entry);
    }
    out
}

impl Catalog {
    /// The catalog used when no catalog file is configured.
    pub fn builtin() -> Self {
        Self::sanitize(&Value::Object(Map::new()))
    }

    /// Build a catalog from untrusted JSON of the form
    /// `{ defaults, gameProfiles, layouts }`.
    pub fn sanitize(raw: &Value) -> Self {
        let mut game_profiles = sanitize_entries(
            raw.get("gameProfiles"),
            "profile",
            sanitize_profile,
            |p: &GameProfile| p.id.as_str(),
        );
        if game_profiles.is_empty() {
            game_profiles.push(sanitize_profile(&builtin_profile(), "platformer"));
        }

        let mut layouts =
            sanitize_entries(raw.get("layouts"), "layout", sanitize_layout, |l: &Layout| {
                l.id.as_str()
            });
        if layouts.is_empty() {
            layouts.push(sanitize_layout(&builtin_layout(), "balanced"));
        }

        let defaults = raw.get("defaults");
        let wanted = |key: &str| {
            defaults
                .and_then(|d| d.get(key))
                .and_then(Value::as_str)
                .map(normalize_id)
                .unwrap_or_default()
        };
        let profile_id = wanted("gameProfileId");
        let layout_id = wanted("layoutId");

        let game_profile_id = if game_profiles.iter().any(|p| p.id == profile_id) {
            profile_id
        } else {
            game_profiles[0].id.clone()
        };
        let layout_id = if layouts.iter().any(|l| l.id == layout_id) {
            layout_id
        } else {
            layouts[0].id.clone()
        };

        Self {
            defaults: GameConfig {
                game_profile_id,
                layout_id,
            },
            game_profiles,
            layouts,
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(raw)?;
        Ok(Self::sanitize(&value))
    }

    pub fn defaults(&self) -> &GameConfig {
        &self.defaults
    }

    pub fn profiles(&self) -> &[GameProfile] {
        &self.game_profiles
    }

    pub fn layouts(&self) -> &[Layout] {
        &self.layouts
    }

    pub fn profile(&self, id: &str) -> Option<&GameProfile> {
        self.game_profiles.iter().find(|p| p.id == id)
    }

    pub fn layout(&self, id: &str) -> Option<&Layout> {
        self.layouts.iter().find(|l| l.id == id)
    }

    fn known_profile(&self, candidate: Option<&str>) -> Option<String> {
        let id = normalize_id(candidate?);
        self.profile(&id).map(|p| p.id.clone())
    }

    fn known_layout(&self, candidate: Option<&str>) -> Option<String> {
        let id = normalize_id(candidate?);
        self.layout(&id).map(|l| l.id.clone())
    }

    /// Resolve a requested config against this catalog.
    ///
    /// Each id that is missing or unknown falls back to the same field of
    /// `current` (when that is still valid), then to the catalog default.
    /// Resolving an already resolved config returns it unchanged.
    pub fn resolve(&self, request: &ConfigRequest, current: Option<&GameConfig>) -> GameConfig {
        let game_profile_id = self
            .known_profile(request.game_profile_id.as_deref())
            .or_else(|| self.known_profile(current.map(|c| c.game_profile_id.as_str())))
            .unwrap_or_else(|| self.defaults.game_profile_id.clone());
        let layout_id = self
            .known_layout(request.layout_id.as_deref())
            .or_else(|| self.known_layout(current.map(|c| c.layout_id.as_str())))
            .unwrap_or_else(|| self.defaults.layout_id.clone());
        GameConfig {
            game_profile_id,
            layout_id,
        }
    }

    fn profile_or_default(&self, id: &str) -> &GameProfile {
        self.profile(id)
            .or_else(|| self.profile(&self.defaults.game_profile_id))
            .unwrap_or(&self.game_profiles[0])
    }

    fn layout_or_default(&self, id: &str) -> &Layout {
        self.layout(id)
            .or_else(|| self.layout(&self.defaults.layout_id))
            .unwrap_or(&self.layouts[0])
    }

    /// Inline the profile and layout a config names.
    pub fn payload(&self, code: &SessionCode, config: &GameConfig) -> ConfigPayload {
        ConfigPayload {
            code: code.clone(),
            config: config.clone(),
            profile: self.profile_or_default(&config.game_profile_id).clone(),
            layout: self.layout_or_default(&config.layout_id).clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Catalog {
        Catalog::sanitize(&json!({
            "defaults": { "gameProfileId": "racing", "layoutId": "nope" },
            "gameProfiles": [
                { "id": "Platformer!", "keyboardMap": { "a": ["Space", "space", ""], "jump": "w" } },
                { "id": "racing", "name": "Racing", "virtualMap": { "rt": "rt", "a": ["south", "SOUTH"] } },
                { "id": "racing", "name": "Duplicate" },
                { "name": "No id" }
            ],
            "layouts": [
                { "id": "balanced", "panelOrder": ["action", "action", "bogus"], "buttonGrid": ["a"] },
                { "id": "southpaw", "buttonLabels": { "a": "Jump" } }
            ]
        }))
    }

    #[test]
    fn sanitize_normalises_and_dedups() {
        let c = catalog();
        let ids: Vec<_> = c.profiles().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["platformer", "racing", "profile_4"]);
        assert_eq!(c.profile("racing").unwrap().name, "Racing");
        assert_eq!(c.profile("platformer").unwrap().name, "PLATFORMER");

        let platformer = c.profile("platformer").unwrap();
        assert_eq!(platformer.keyboard_map.len(), 1);
        assert_eq!(platformer.keyboard_map["a"].0, vec!["space"]);

        let racing = c.profile("racing").unwrap();
        assert_eq!(racing.virtual_map["a"], vec!["south"]);
        assert_eq!(racing.virtual_map["rt"], vec!["rt"]);
    }

    #[test]
    fn sanitize_fills_layout_defaults() {
        let c = catalog();
        let balanced = c.layout("balanced").unwrap();
        assert_eq!(balanced.panel_order, vec![Panel::Action, Panel::Stick]);
        assert_eq!(
            balanced.button_grid,
            vec![FaceButton::A, FaceButton::X, FaceButton::Y, FaceButton::B]
        );
        assert_eq!(balanced.utility_labels.select, "SELECT");
        assert_eq!(c.layout("southpaw").unwrap().button_labels.a, "Jump");
    }

    #[test]
    fn defaults_fall_back_to_first_entry() {
        let c = catalog();
        assert_eq!(c.defaults().game_profile_id, "racing");
        assert_eq!(c.defaults().layout_id, "balanced");
    }

    #[test]
    fn empty_catalog_gets_builtin_entries() {
        let c = Catalog::sanitize(&json!({ "gameProfiles": "garbage" }));
        assert_eq!(c.defaults().game_profile_id, "platformer");
        assert_eq!(c.defaults().layout_id, "balanced");
        assert_eq!(c.profile("platformer").unwrap().virtual_map["a"], vec!["south"]);
    }

    #[test]
    fn resolve_falls_back_to_current_then_default() {
        let c = catalog();
        let current = GameConfig {
            game_profile_id: "platformer".into(),
            layout_id: "southpaw".into(),
        };

        let resolved = c.resolve(&ConfigRequest::new("unknown", "BALANCED"), Some(&current));
        assert_eq!(resolved.game_profile_id, "platformer");
        assert_eq!(resolved.layout_id, "balanced");

        let fresh = c.resolve(&ConfigRequest::default(), None);
        assert_eq!(fresh, c.defaults().clone());
    }

    #[test]
    fn resolve_is_idempotent() {
        let c = catalog();
        let once = c.resolve(&ConfigRequest::new("racing", "southpaw"), None);
        let twice = c.resolve(&ConfigRequest::from(&once), Some(&once));
        assert_eq!(once, twice);
    }

    #[test]
    fn payload_inlines_entries() {
        let c = catalog();
        let code = SessionCode::parse("K7F3XQ").unwrap();
        let config = c.resolve(&ConfigRequest::new("racing", "southpaw"), None);
        let payload = c.payload(&code, &config);
        assert_eq!(payload.profile.id, "racing");
        assert_eq!(payload.layout.id, "southpaw");
    }
}
