//! Token storage: `login` and `logout`.

use std::io::{self, BufRead, IsTerminal};

use secrecy::{ExposeSecret, SecretString};

use crate::cli::{GlobalOpts, LoginArgs};
use crate::config;
use crate::error::CliError;

/// Store a token for the active profile in the system keyring.
///
/// Token source, in order: `--token`, stdin (`--token-stdin`), prompt.
pub fn login(args: &LoginArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = config::load(global)?;
    let profile_name = config::active_profile_name(global, &cfg);

    let token = match global.token {
        Some(ref token) => SecretString::from(token.clone()),
        None if args.token_stdin => read_stdin_token()?,
        None => prompt_token()?,
    };
    if token.expose_secret().trim().is_empty() {
        return Err(CliError::Validation {
            field: "token".into(),
            reason: "empty token".into(),
        });
    }

    sensorhub_config::store_token(&profile_name, &token)?;
    if !global.quiet {
        eprintln!("Token stored for profile '{profile_name}'");
    }
    Ok(())
}

/// Remove the active profile's token from the system keyring.
pub fn logout(global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = config::load(global)?;
    let profile_name = config::active_profile_name(global, &cfg);

    sensorhub_config::clear_token(&profile_name)?;
    if !global.quiet {
        eprintln!("Signed out of profile '{profile_name}'");
    }
    Ok(())
}

fn read_stdin_token() -> Result<SecretString, CliError> {
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(SecretString::from(line.trim().to_owned()))
}

fn prompt_token() -> Result<SecretString, CliError> {
    if !io::stdin().is_terminal() {
        return Err(CliError::Validation {
            field: "token".into(),
            reason: "no terminal to prompt on; use --token-stdin".into(),
        });
    }
    let token = rpassword::prompt_password("Session token: ")?;
    Ok(SecretString::from(token.trim().to_owned()))
}
