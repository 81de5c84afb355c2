//! Linux gamepad backend (uinput via evdev).

pub mod uinput;

pub use uinput::UinputGamepad;
