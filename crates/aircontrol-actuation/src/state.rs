//! Per-slot gamepad state.

use aircontrol_types::{ClientMessage, DpadDirection, PadButton, Side, StickPosition};

/// The full state of one virtual gamepad.
///
/// Sticks are in `[-1, 1]` with up and right positive, triggers in
/// `[0, 1]`, and the d-pad is a `(horizontal, vertical)` vector with
/// components in `{-1, 0, 1}`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GamepadState {
    pub left_stick: StickPosition,
    pub right_stick: StickPosition,
    pub left_trigger: f64,
    pub right_trigger: f64,
    pub dpad: (i8, i8),
    buttons: u16,
}

fn clamp(value: f64, lo: f64, hi: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(lo, hi)
    }
}

impl GamepadState {
    /// All buttons released, all axes centred.
    pub fn neutral() -> Self {
        Self::default()
    }

    pub fn is_neutral(&self) -> bool {
        *self == Self::neutral()
    }

    /// Press or release a button by symbolic name. Unknown names are
    /// ignored; the return value says whether the name was recognised.
    pub fn apply_button(&mut self, name: &str, pressed: bool) -> bool {
        match PadButton::from_name(name) {
            Some(button) => {
                self.set_button(button, pressed);
                true
            }
            None => false,
        }
    }

    pub fn set_button(&mut self, button: PadButton, pressed: bool) {
        if pressed {
            self.buttons |= button.bit();
        } else {
            self.buttons &= !button.bit();
        }
    }

    pub fn is_pressed(&self, button: PadButton) -> bool {
        self.buttons & button.bit() != 0
    }

    /// Raw button bitset, indexed by [`PadButton::bit`].
    pub fn buttons(&self) -> u16 {
        self.buttons
    }

    pub fn apply_stick(&mut self, side: Side, x: f64, y: f64) {
        let position = StickPosition {
            x: clamp(x, -1.0, 1.0),
            y: clamp(y, -1.0, 1.0),
        };
        match side {
            Side::Left => self.left_stick = position,
            Side::Right => self.right_stick = position,
        }
    }

    pub fn apply_trigger(&mut self, side: Side, value: f64) {
        let value = clamp(value, 0.0, 1.0);
        match side {
            Side::Left => self.left_trigger = value,
            Side::Right => self.right_trigger = value,
        }
    }

    pub fn apply_dpad(&mut self, direction: DpadDirection) {
        self.dpad = direction.vector();
    }

    pub fn apply(&mut self, command: &PadCommand) {
        match command {
            PadCommand::Button { name, pressed } => {
                self.apply_button(name, *pressed);
            }
            PadCommand::Stick { side, x, y } => self.apply_stick(*side, *x, *y),
            PadCommand::Trigger { side, value } => self.apply_trigger(*side, *value),
            PadCommand::Dpad(direction) => self.apply_dpad(*direction),
        }
    }
}

/// One abstract change to a pad.
#[derive(Debug, Clone, PartialEq)]
pub enum PadCommand {
    Button { name: String, pressed: bool },
    Stick { side: Side, x: f64, y: f64 },
    Trigger { side: Side, value: f64 },
    Dpad(DpadDirection),
}

impl PadCommand {
    /// The pad change carried by a direct-connect input message, if any.
    pub fn from_message(message: &ClientMessage) -> Option<Self> {
        Some(match message {
            ClientMessage::Button { button, state } => Self::Button {
                name: button.clone(),
                pressed: state.is_pressed(),
            },
            ClientMessage::Stick { stick, x, y } => Self::Stick {
                side: *stick,
                x: *x,
                y: *y,
            },
            ClientMessage::Trigger { trigger, value } => Self::Trigger {
                side: *trigger,
                value: *value,
            },
            ClientMessage::Dpad { direction } => Self::Dpad(*direction),
            ClientMessage::Pair { .. } | ClientMessage::Ping | ClientMessage::Pong => return None,
        })
    }
}
