//! Password input for CLI commands

use std::io::IsTerminal;

use crate::crypto::SecureString;
use crate::error::{NoteguardError, NoteguardResult};

/// Minimum length enforced for passwords chosen interactively
const MIN_NEW_PASSWORD_LEN: usize = 8;

/// Prompt for a password (hidden input)
pub fn prompt_password(prompt: &str) -> NoteguardResult<SecureString> {
    rpassword::prompt_password(prompt)
        .map(SecureString::from)
        .map_err(|e| NoteguardError::Io(format!("Failed to read password: {}", e)))
}

/// Prompt twice for a new password until both entries match
pub fn prompt_new_password() -> NoteguardResult<SecureString> {
    loop {
        let first = prompt_password("Enter new backup password: ")?;

        if first.len() < MIN_NEW_PASSWORD_LEN {
            println!(
                "Password must be at least {} characters. Please try again.",
                MIN_NEW_PASSWORD_LEN
            );
            continue;
        }

        let second = prompt_password("Confirm password: ")?;

        if first != second {
            println!("Passwords do not match. Please try again.");
            continue;
        }

        return Ok(first);
    }
}

/// Pick the password for an operation
///
/// A password passed on the command line (or through the environment) wins.
/// Otherwise the user is prompted, but only when one is needed and stdin is
/// a terminal; scripts get `None` and the operation reports the missing
/// password itself.
pub fn resolve_password(
    given: Option<String>,
    needed: bool,
    new_password: bool,
) -> NoteguardResult<Option<SecureString>> {
    if let Some(password) = given {
        return Ok(Some(SecureString::from(password)));
    }
    if !needed || !std::io::stdin().is_terminal() {
        return Ok(None);
    }

    if new_password {
        prompt_new_password().map(Some)
    } else {
        prompt_password("Backup password: ").map(Some)
    }
}
