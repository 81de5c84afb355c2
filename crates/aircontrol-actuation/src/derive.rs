//! Derive a full pad state from a relayed input payload.
//!
//! Relay payloads describe the phone's whole control surface at once, so
//! each one maps to a complete [`GamepadState`] through the active game
//! profile's `virtualMap`.

use std::collections::{BTreeMap, BTreeSet};

use aircontrol_types::{DpadDirection, InputPayload, PadAction, Side};

use crate::state::GamepadState;

const DPAD_BUTTONS: [(&str, PadAction); 4] = [
    ("up", PadAction::DpadUp),
    ("down", PadAction::DpadDown),
    ("left", PadAction::DpadLeft),
    ("right", PadAction::DpadRight),
];

fn dpad_action(direction: DpadDirection) -> Option<PadAction> {
    match direction {
        DpadDirection::Up => Some(PadAction::DpadUp),
        DpadDirection::Down => Some(PadAction::DpadDown),
        DpadDirection::Left => Some(PadAction::DpadLeft),
        DpadDirection::Right => Some(PadAction::DpadRight),
        DpadDirection::None => None,
    }
}

/// Collect the virtual actions a payload asks for.
///
/// Opposing d-pad directions held together cancel out.
pub fn derive_actions(
    payload: &InputPayload,
    virtual_map: &BTreeMap<String, Vec<String>>,
) -> BTreeSet<PadAction> {
    let mut actions = BTreeSet::new();

    for (name, action) in DPAD_BUTTONS {
        if payload.is_pressed(name) {
            actions.insert(action);
        }
    }
    if let Some(action) = payload.dpad().and_then(dpad_action) {
        actions.insert(action);
    }

    for name in payload.pressed() {
        let Some(mapped) = virtual_map.get(name) else {
            continue;
        };
        actions.extend(mapped.iter().filter_map(|a| PadAction::from_name(a)));
    }

    for (a, b) in [
        (PadAction::DpadUp, PadAction::DpadDown),
        (PadAction::DpadLeft, PadAction::DpadRight),
    ] {
        if actions.contains(&a) && actions.contains(&b) {
            actions.remove(&a);
            actions.remove(&b);
        }
    }
    actions
}

/// Build the pad state for one payload.
///
/// Payload sticks are in screen coordinates (down is positive), so Y is
/// flipped. An `lt`/`rt` action pulls its trigger all the way.
pub fn derive_state(
    payload: &InputPayload,
    virtual_map: &BTreeMap<String, Vec<String>>,
) -> GamepadState {
    let actions = derive_actions(payload, virtual_map);
    let mut state = GamepadState::neutral();

    for action in &actions {
        if let Some(button) = action.button() {
            state.set_button(button, true);
        }
    }

    let horizontal = i8::from(actions.contains(&PadAction::DpadRight))
        - i8::from(actions.contains(&PadAction::DpadLeft));
    let vertical = i8::from(actions.contains(&PadAction::DpadUp))
        - i8::from(actions.contains(&PadAction::DpadDown));
    state.dpad = (horizontal, vertical);

    if let Some(stick) = payload.left_stick() {
        state.apply_stick(Side::Left, stick.x, -stick.y);
    }
    if let Some(stick) = payload.right_stick() {
        state.apply_stick(Side::Right, stick.x, -stick.y);
    }

    let triggers = payload.triggers();
    state.apply_trigger(Side::Left, triggers.lt);
    state.apply_trigger(Side::Right, triggers.rt);
    if actions.contains(&PadAction::Lt) {
        state.apply_trigger(Side::Left, 1.0);
    }
    if actions.contains(&PadAction::Rt) {
        state.apply_trigger(Side::Right, 1.0);
    }

    state
}
