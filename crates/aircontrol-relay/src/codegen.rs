//! Session and pairing code generation.

use aircontrol_types::{PairingCode, SessionCode};

/// Generate a session code that `is_taken` does not reject.
///
/// The alphabet has 32^6 codes, so the loop only repeats on an actual
/// collision with a live session.
pub fn session_code(rng: &mut fastrand::Rng, is_taken: impl Fn(&SessionCode) -> bool) -> SessionCode {
    loop {
        let code = SessionCode::generate(|n| rng.usize(..n));
        if !is_taken(&code) {
            return code;
        }
    }
}

/// Generate a 6-digit pairing code. No uniqueness check: one host process
/// has exactly one live code.
pub fn pairing_code(rng: &mut fastrand::Rng) -> PairingCode {
    PairingCode::generate(|n| rng.u32(..n))
}
