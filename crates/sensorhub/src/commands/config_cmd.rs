//! Config subcommand handlers.

use dialoguer::{Input, Select};
use secrecy::SecretString;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config, Profile};
use crate::error::CliError;
use crate::output;

// ── Helpers ─────────────────────────────────────────────────────────

const REDACTED: &str = "****";

/// Mask every secret a profile may carry in plaintext.
fn redact(cfg: &mut Config) {
    for profile in cfg.profiles.values_mut() {
        if profile.token.is_some() {
            profile.token = Some(REDACTED.into());
        }
    }
}

/// Format config for display. Expects `redact` to have run.
fn format_config(cfg: &Config) -> String {
    use std::fmt::Write;
    let mut out = String::new();

    if let Some(ref default) = cfg.default_profile {
        let _ = writeln!(out, "default_profile = \"{default}\"");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "[defaults]");
    let _ = writeln!(out, "output = \"{}\"", cfg.defaults.output);
    let _ = writeln!(out, "color = \"{}\"", cfg.defaults.color);
    let _ = writeln!(out, "insecure = {}", cfg.defaults.insecure);
    let _ = writeln!(out, "timeout = {}", cfg.defaults.timeout);
    let _ = writeln!(out, "poll_interval = {}", cfg.defaults.poll_interval);

    for (name, p) in &cfg.profiles {
        let _ = writeln!(out);
        let _ = writeln!(out, "[profiles.{name}]");
        let _ = writeln!(out, "api_url = \"{}\"", p.api_url);
        if let Some(ref ws) = p.ws_url {
            let _ = writeln!(out, "ws_url = \"{ws}\"");
        }
        let _ = writeln!(out, "client_id = \"{}\"", p.client_id);
        if let Some(ref token) = p.token {
            let _ = writeln!(out, "token = \"{token}\"");
        }
        if let Some(ref env) = p.token_env {
            let _ = writeln!(out, "token_env = \"{env}\"");
        }
        if let Some(ref scheme) = p.auth_scheme {
            let _ = writeln!(out, "auth_scheme = \"{scheme}\"");
        }
        if let Some(ref ca) = p.ca_cert {
            let _ = writeln!(out, "ca_cert = \"{}\"", ca.display());
        }
        if let Some(insecure) = p.insecure {
            let _ = writeln!(out, "insecure = {insecure}");
        }
        if let Some(timeout) = p.timeout {
            let _ = writeln!(out, "timeout = {timeout}");
        }
        if let Some(poll) = p.poll_interval {
            let _ = writeln!(out, "poll_interval = {poll}");
        }
        if let Some(ref policy) = p.merge_policy {
            let _ = writeln!(out, "merge_policy = \"{policy}\"");
        }
        if let Some(ref dir) = p.data_dir {
            let _ = writeln!(out, "data_dir = \"{}\"", dir.display());
        }
        for (node, entry) in &p.devices {
            let _ = writeln!(
                out,
                "devices.{node} = {{ name = \"{}\", type = \"{}\" }}",
                entry.name, entry.sensor_type
            );
        }
    }

    out
}

/// Map a dialoguer / interactive I/O failure into CliError.
fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

/// Offer to store the token in the system keyring or return it for
/// plaintext config.
///
/// Returns `Some(token)` if the user chose plaintext, `None` if stored
/// in the keyring.
fn prompt_token_storage(token: String, profile_name: &str) -> Result<Option<String>, CliError> {
    let choices = &[
        "Store in system keyring (recommended)",
        "Save to config file (plaintext)",
    ];
    let selection = Select::new()
        .with_prompt("Where to store the token?")
        .items(choices)
        .default(0)
        .interact()
        .map_err(prompt_err)?;

    if selection == 0 {
        sensorhub_config::store_token(profile_name, &SecretString::from(token))?;
        eprintln!("   ✓ Token stored in system keyring");
        Ok(None)
    } else {
        Ok(Some(token))
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let path = config::config_file(global);

    match args.command {
        // ── Init: interactive wizard ────────────────────────────────
        ConfigCommand::Init => {
            eprintln!("sensorhub configuration wizard");
            eprintln!("   Config path: {}\n", path.display());

            let mut cfg = config::load(global)?;

            let profile_name: String = Input::new()
                .with_prompt("Profile name")
                .default("default".into())
                .interact_text()
                .map_err(prompt_err)?;

            let api_url: String = Input::new()
                .with_prompt("Hub API URL")
                .default("http://192.168.100.30:8000/api/".into())
                .interact_text()
                .map_err(prompt_err)?;

            let ws_url: String = Input::new()
                .with_prompt("Push channel URL (empty to disable)")
                .allow_empty(true)
                .interact_text()
                .map_err(prompt_err)?;

            let client_id: String = Input::new()
                .with_prompt("Client id")
                .default("1".into())
                .interact_text()
                .map_err(prompt_err)?;

            let token = rpassword::prompt_password("Session token: ").map_err(prompt_err)?;
            let token = token.trim().to_owned();
            if token.is_empty() {
                return Err(CliError::Validation {
                    field: "token".into(),
                    reason: "token cannot be empty".into(),
                });
            }
            let token = prompt_token_storage(token, &profile_name)?;

            let profile = Profile {
                api_url,
                ws_url: Some(ws_url).filter(|u| !u.trim().is_empty()),
                client_id,
                token,
                ..Profile::default()
            };

            // Validate before writing anything
            sensorhub_config::profile_to_monitor_config(
                &profile,
                SecretString::from(String::new()),
                &cfg.defaults,
            )?;

            cfg.profiles.insert(profile_name.clone(), profile);
            if cfg.profiles.len() == 1 {
                cfg.default_profile = Some(profile_name.clone());
            }
            config::save_config_to(&cfg, &path)?;

            eprintln!("\n✓ Configuration written to {}", path.display());
            eprintln!("  Profile: {profile_name}");
            eprintln!("\n  Test it: sensorhub devices list --profile {profile_name}");
            Ok(())
        }

        // ── Show ────────────────────────────────────────────────────
        ConfigCommand::Show => {
            let mut cfg = config::load(global)?;
            redact(&mut cfg);
            let out = output::render_single(&global.output, &cfg, format_config, |_| {
                "config".into()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        // ── Path ────────────────────────────────────────────────────
        ConfigCommand::Path => {
            println!("{}", path.display());
            Ok(())
        }

        // ── Profiles ────────────────────────────────────────────────
        ConfigCommand::Profiles => {
            let cfg = config::load(global)?;
            let default = cfg.default_profile.as_deref().unwrap_or("default");
            if cfg.profiles.is_empty() {
                eprintln!("No profiles configured. Run: sensorhub config init");
            } else {
                for name in cfg.profiles.keys() {
                    let marker = if name == default { " *" } else { "" };
                    println!("{name}{marker}");
                }
            }
            Ok(())
        }

        // ── Use <name> ──────────────────────────────────────────────
        ConfigCommand::Use { name } => {
            let mut cfg = config::load(global)?;

            if !cfg.profiles.contains_key(&name) {
                return Err(CliError::ProfileNotFound {
                    available: config::available_profiles(&cfg),
                    name,
                });
            }

            cfg.default_profile = Some(name.clone());
            config::save_config_to(&cfg, &path)?;
            eprintln!("✓ Default profile set to '{name}'");
            Ok(())
        }
    }
}
