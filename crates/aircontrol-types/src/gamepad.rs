//! Gamepad vocabulary shared by the wire protocols and the actuation layer.

use serde::{Deserialize, Serialize};

/// A digital button on the virtual Xbox-style pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PadButton {
    A,
    B,
    X,
    Y,
    LeftShoulder,
    RightShoulder,
    Start,
    Back,
    Guide,
    LeftThumb,
    RightThumb,
}

impl PadButton {
    pub const ALL: [Self; 11] = [
        Self::A,
        Self::B,
        Self::X,
        Self::Y,
        Self::LeftShoulder,
        Self::RightShoulder,
        Self::Start,
        Self::Back,
        Self::Guide,
        Self::LeftThumb,
        Self::RightThumb,
    ];

    /// Map a symbolic name sent by a phone. Case-insensitive; returns `None`
    /// for names the pad does not have.
    pub fn from_name(name: &str) -> Option<Self> {
        let lowered = name.trim().to_ascii_lowercase();
        Some(match lowered.as_str() {
            "a" => Self::A,
            "b" => Self::B,
            "x" => Self::X,
            "y" => Self::Y,
            "lb" => Self::LeftShoulder,
            "rb" => Self::RightShoulder,
            "start" => Self::Start,
            "select" | "back" => Self::Back,
            "guide" | "home" => Self::Guide,
            "ls" | "l3" => Self::LeftThumb,
            "rs" | "r3" => Self::RightThumb,
            _ => return None,
        })
    }

    /// Position in the button bitset.
    pub fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

/// Left or right stick / trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

/// A d-pad direction. Anything unrecognised decodes as `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DpadDirection {
    Up,
    Down,
    Left,
    Right,
    #[default]
    #[serde(other)]
    None,
}

impl DpadDirection {
    /// `(horizontal, vertical)` unit vector, up and right positive.
    pub fn vector(self) -> (i8, i8) {
        match self {
            Self::Up => (0, 1),
            Self::Down => (0, -1),
            Self::Left => (-1, 0),
            Self::Right => (1, 0),
            Self::None => (0, 0),
        }
    }
}

/// Button edge reported by the direct-connect protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ButtonAction {
    Pressed,
    Released,
}

impl ButtonAction {
    pub fn is_pressed(self) -> bool {
        self == Self::Pressed
    }
}

/// A virtual gamepad action named in a profile's `virtualMap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PadAction {
    South,
    East,
    West,
    North,
    Lb,
    Rb,
    Lt,
    Rt,
    Start,
    Back,
    Ls,
    Rs,
    DpadUp,
    DpadDown,
    DpadLeft,
    DpadRight,
}

impl PadAction {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "south" => Self::South,
            "east" => Self::East,
            "west" => Self::West,
            "north" => Self::North,
            "lb" => Self::Lb,
            "rb" => Self::Rb,
            "lt" => Self::Lt,
            "rt" => Self::Rt,
            "start" => Self::Start,
            "back" => Self::Back,
            "ls" => Self::Ls,
            "rs" => Self::Rs,
            "dpad_up" => Self::DpadUp,
            "dpad_down" => Self::DpadDown,
            "dpad_left" => Self::DpadLeft,
            "dpad_right" => Self::DpadRight,
            _ => return None,
        })
    }

    /// The digital button this action presses, if it is one.
    pub fn button(self) -> Option<PadButton> {
        match self {
            Self::South => Some(PadButton::A),
            Self::East => Some(PadButton::B),
            Self::West => Some(PadButton::X),
            Self::North => Some(PadButton::Y),
            Self::Lb => Some(PadButton::LeftShoulder),
            Self::Rb => Some(PadButton::RightShoulder),
            Self::Start => Some(PadButton::Start),
            Self::Back => Some(PadButton::Back),
            Self::Ls => Some(PadButton::LeftThumb),
            Self::Rs => Some(PadButton::RightThumb),
            Self::Lt | Self::Rt | Self::DpadUp | Self::DpadDown | Self::DpadLeft
            | Self::DpadRight => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn button_names_are_case_insensitive_with_aliases() {
        assert_eq!(PadButton::from_name("A"), Some(PadButton::A));
        assert_eq!(PadButton::from_name("select"), Some(PadButton::Back));
        assert_eq!(PadButton::from_name("SELECT"), Some(PadButton::Back));
        assert_eq!(PadButton::from_name("home"), Some(PadButton::Guide));
        assert_eq!(PadButton::from_name("L3"), Some(PadButton::LeftThumb));
        assert_eq!(PadButton::from_name("turbo"), None);
    }

    #[test]
    fn button_bits_are_distinct() {
        let mut seen = 0u16;
        for button in PadButton::ALL {
            assert_eq!(seen & button.bit(), 0);
            seen |= button.bit();
        }
    }

    #[test]
    fn unknown_dpad_direction_decodes_as_none() {
        let d: DpadDirection = serde_json::from_str("\"northwest\"").unwrap();
        assert_eq!(d, DpadDirection::None);
        assert_eq!(d.vector(), (0, 0));
        let up: DpadDirection = serde_json::from_str("\"up\"").unwrap();
        assert_eq!(up.vector(), (0, 1));
    }

    #[test]
    fn pad_actions_map_to_buttons() {
        assert_eq!(PadAction::from_name("south").unwrap().button(), Some(PadButton::A));
        assert_eq!(PadAction::from_name("lt").unwrap().button(), None);
        assert_eq!(PadAction::from_name("jump"), None);
    }
}
