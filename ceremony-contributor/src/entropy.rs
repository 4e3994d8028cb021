use crate::errors::ContributeError;

use dialoguer::{theme::ColorfulTheme, Password};
use rand::{rngs::OsRng, RngCore};
use secrecy::SecretString;

const GENERATED_ENTROPY_BYTES: usize = 64;

/// Returns hex-encoded random bytes from the operating system.
pub fn generate_entropy() -> SecretString {
    let mut entropy = vec![0u8; GENERATED_ENTROPY_BYTES];
    OsRng.fill_bytes(&mut entropy[..]);
    SecretString::new(hex::encode(&entropy))
}

///
/// Returns the entropy given on the command line. Otherwise asks for it
/// when `interactive`, falling back to generated entropy on an empty answer.
///
pub fn read_or_generate_entropy(cli_entropy: Option<SecretString>, interactive: bool) -> Result<SecretString, ContributeError> {
    if let Some(entropy) = cli_entropy {
        return Ok(entropy);
    }
    if !interactive {
        return Ok(generate_entropy());
    }

    let typed = Password::with_theme(&ColorfulTheme::default())
        .with_prompt("Enter some entropy for your contribution (leave empty to generate it)")
        .allow_empty_password(true)
        .interact()?;

    if typed.is_empty() {
        Ok(generate_entropy())
    } else {
        Ok(SecretString::new(typed))
    }
}
