//! uinput-based virtual Xbox-style gamepads.

use std::collections::HashMap;

use aircontrol_types::{PadButton, PlayerIndex};
use async_trait::async_trait;
use evdev::uinput::VirtualDevice;
use evdev::{
    AbsInfo, AbsoluteAxisCode, AttributeSet, BusType, EventType, InputId, KeyCode,
    UinputAbsSetup,
};
use tracing::{debug, info};

use crate::error::ActuationError;
use crate::state::GamepadState;
use crate::{GamepadBackend, VirtualPadId};

const STICK_MAX: i32 = 32767;
const STICK_MIN: i32 = -32768;
const TRIGGER_MAX: i32 = 255;

// Microsoft X-Box 360 pad ids, so games pick the standard mapping.
const VENDOR: u16 = 0x045e;
const PRODUCT: u16 = 0x028e;

fn button_key(button: PadButton) -> KeyCode {
    match button {
        PadButton::A => KeyCode::BTN_SOUTH,
        PadButton::B => KeyCode::BTN_EAST,
        PadButton::X => KeyCode::BTN_WEST,
        PadButton::Y => KeyCode::BTN_NORTH,
        PadButton::LeftShoulder => KeyCode::BTN_TL,
        PadButton::RightShoulder => KeyCode::BTN_TR,
        PadButton::Start => KeyCode::BTN_START,
        PadButton::Back => KeyCode::BTN_SELECT,
        PadButton::Guide => KeyCode::BTN_MODE,
        PadButton::LeftThumb => KeyCode::BTN_THUMBL,
        PadButton::RightThumb => KeyCode::BTN_THUMBR,
    }
}

/// Linux gamepad backend: one uinput device per plugged pad.
pub struct UinputGamepad {
    devices: HashMap<VirtualPadId, VirtualDevice>,
    next_id: u32,
}

impl Default for UinputGamepad {
    fn default() -> Self {
        Self::new()
    }
}

impl UinputGamepad {
    pub fn new() -> Self {
        Self {
            devices: HashMap::new(),
            next_id: 1,
        }
    }

    fn build_virtual_device(slot: PlayerIndex) -> Result<VirtualDevice, ActuationError> {
        let create = |e: std::io::Error| ActuationError::DeviceCreate(e.to_string());

        let mut keys = AttributeSet::<KeyCode>::new();
        for button in PadButton::ALL {
            keys.insert(button_key(button));
        }

        let stick = AbsInfo::new(0, STICK_MIN, STICK_MAX, 16, 128, 0);
        let trigger = AbsInfo::new(0, 0, TRIGGER_MAX, 0, 0, 0);
        let hat = AbsInfo::new(0, -1, 1, 0, 0, 0);
        let name = format!("aircontrol virtual pad {slot}");

        let mut builder = VirtualDevice::builder()
            .map_err(create)?
            .name(&name)
            .input_id(InputId::new(BusType::BUS_USB, VENDOR, PRODUCT, 0x0110))
            .with_keys(&keys)
            .map_err(create)?;

        for (axis, info) in [
            (AbsoluteAxisCode::ABS_X, stick),
            (AbsoluteAxisCode::ABS_Y, stick),
            (AbsoluteAxisCode::ABS_RX, stick),
            (AbsoluteAxisCode::ABS_RY, stick),
            (AbsoluteAxisCode::ABS_Z, trigger),
            (AbsoluteAxisCode::ABS_RZ, trigger),
            (AbsoluteAxisCode::ABS_HAT0X, hat),
            (AbsoluteAxisCode::ABS_HAT0Y, hat),
        ] {
            builder = builder
                .with_absolute_axis(&UinputAbsSetup::new(axis, info))
                .map_err(create)?;
        }

        builder.build().map_err(create)
    }
}

#[allow(clippy::cast_possible_truncation)]
fn stick_value(v: f64) -> i32 {
    (v * f64::from(STICK_MAX)).round() as i32
}

#[allow(clippy::cast_possible_truncation)]
fn trigger_value(v: f64) -> i32 {
    (v * f64::from(TRIGGER_MAX)).round() as i32
}

/// Convert a full pad state into one evdev report. Evdev's Y axes grow
/// downwards, so stick Y and the vertical hat are negated.
fn state_to_evdev(state: &GamepadState) -> Vec<evdev::InputEvent> {
    let abs = |axis: AbsoluteAxisCode, value: i32| {
        evdev::InputEvent::new(EventType::ABSOLUTE.0, axis.0, value)
    };

    let mut events: Vec<_> = PadButton::ALL
        .iter()
        .map(|&button| {
            evdev::InputEvent::new(
                EventType::KEY.0,
                button_key(button).0,
                i32::from(state.is_pressed(button)),
            )
        })
        .collect();

    events.extend([
        abs(AbsoluteAxisCode::ABS_X, stick_value(state.left_stick.x)),
        abs(AbsoluteAxisCode::ABS_Y, stick_value(-state.left_stick.y)),
        abs(AbsoluteAxisCode::ABS_RX, stick_value(state.right_stick.x)),
        abs(AbsoluteAxisCode::ABS_RY, stick_value(-state.right_stick.y)),
        abs(AbsoluteAxisCode::ABS_Z, trigger_value(state.left_trigger)),
        abs(AbsoluteAxisCode::ABS_RZ, trigger_value(state.right_trigger)),
        abs(AbsoluteAxisCode::ABS_HAT0X, i32::from(state.dpad.0)),
        abs(AbsoluteAxisCode::ABS_HAT0Y, -i32::from(state.dpad.1)),
    ]);
    events
}

#[async_trait]
impl GamepadBackend for UinputGamepad {
    async fn plug(&mut self, slot: PlayerIndex) -> Result<VirtualPadId, ActuationError> {
        let device = Self::build_virtual_device(slot)?;
        let id = VirtualPadId(self.next_id);
        self.next_id += 1;
        info!(%id, %slot, "created virtual gamepad");
        self.devices.insert(id, device);
        Ok(id)
    }

    async fn push(
        &mut self,
        pad: VirtualPadId,
        state: &GamepadState,
    ) -> Result<(), ActuationError> {
        let device = self
            .devices
            .get_mut(&pad)
            .ok_or(ActuationError::UnknownPad(pad))?;
        device
            .emit(&state_to_evdev(state))
            .map_err(|e| ActuationError::Push(e.to_string()))?;
        debug!(%pad, "pushed gamepad state");
        Ok(())
    }

    async fn unplug(&mut self, pad: VirtualPadId) -> Result<(), ActuationError> {
        if self.devices.remove(&pad).is_some() {
            info!(%pad, "destroyed virtual gamepad");
            Ok(())
        } else {
            Err(ActuationError::UnknownPad(pad))
        }
    }

    async fn shutdown(&mut self) -> Result<(), ActuationError> {
        let count = self.devices.len();
        self.devices.clear();
        info!(count, "shut down gamepad backend");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use aircontrol_types::Side;

    use super::*;

    fn value_of(events: &[evdev::InputEvent], kind: EventType, code: u16) -> Option<i32> {
        events
            .iter()
            .find(|e| e.event_type() == kind && e.code() == code)
            .map(evdev::InputEvent::value)
    }

    #[test]
    fn neutral_report_is_all_zero() {
        let events = state_to_evdev(&GamepadState::neutral());
        assert_eq!(events.len(), PadButton::ALL.len() + 8);
        assert!(events.iter().all(|e| e.value() == 0));
    }

    #[test]
    fn full_deflection_maps_to_axis_limits() {
        let mut state = GamepadState::neutral();
        state.apply_stick(Side::Left, 1.0, 1.0);
        state.apply_trigger(Side::Right, 1.0);
        state.apply_button("a", true);
        state.dpad = (0, 1);
        let events = state_to_evdev(&state);

        let abs = |code: AbsoluteAxisCode| value_of(&events, EventType::ABSOLUTE, code.0);
        assert_eq!(abs(AbsoluteAxisCode::ABS_X), Some(STICK_MAX));
        assert_eq!(abs(AbsoluteAxisCode::ABS_Y), Some(-STICK_MAX));
        assert_eq!(abs(AbsoluteAxisCode::ABS_RZ), Some(TRIGGER_MAX));
        assert_eq!(abs(AbsoluteAxisCode::ABS_HAT0Y), Some(-1));
        assert_eq!(
            value_of(&events, EventType::KEY, KeyCode::BTN_SOUTH.0),
            Some(1)
        );
    }
}
