//! CLI configuration: thin wrapper around `sensorhub_config` shared types.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides
//! (--api-url, --token, --data-dir, etc.).

use std::path::PathBuf;

use secrecy::SecretString;

use sensorhub_core::MonitorConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use sensorhub_config::{Config, Profile, config_path, load_config_from, save_config_to};

/// Everything a command needs to build a `Monitor`.
#[derive(Debug)]
pub struct Resolved {
    pub profile_name: String,
    pub monitor: MonitorConfig,
    pub overrides_path: PathBuf,
    /// The token came from `--token` (or its env var), not from storage.
    pub token_from_flag: bool,
}

/// Config file in effect: `--config` or the platform default.
pub fn config_file(global: &GlobalOpts) -> PathBuf {
    global.config_file.clone().unwrap_or_else(config_path)
}

pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(load_config_from(&config_file(global))?)
}

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    config.active_profile_name(global.profile.as_deref())
}

/// Build the monitor configuration from the config file, the active
/// profile and CLI overrides. Without a matching profile, `--api-url`
/// alone is enough.
pub fn resolve(global: &GlobalOpts) -> Result<Resolved, CliError> {
    let cfg = load(global)?;
    let profile_name = active_profile_name(global, &cfg);

    let mut profile = match cfg.profiles.get(&profile_name) {
        Some(profile) => profile.clone(),
        None if global.api_url.is_some() => Profile::default(),
        None if global.profile.is_some() => {
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: available_profiles(&cfg),
            });
        }
        None => {
            return Err(CliError::NoConfig {
                path: config_file(global).display().to_string(),
            });
        }
    };
    apply_flags(&mut profile, global);

    let (token, token_from_flag) = match global.token {
        Some(ref token) => (SecretString::from(token.clone()), true),
        None => (
            sensorhub_config::resolve_token(&profile, &profile_name)?,
            false,
        ),
    };

    let monitor = sensorhub_config::profile_to_monitor_config(&profile, token, &cfg.defaults)?;
    let overrides_path = sensorhub_config::overrides_path(&profile, &profile_name);

    Ok(Resolved {
        profile_name,
        monitor,
        overrides_path,
        token_from_flag,
    })
}

/// CLI flags take priority over profile values.
fn apply_flags(profile: &mut Profile, global: &GlobalOpts) {
    if let Some(ref url) = global.api_url {
        profile.api_url.clone_from(url);
    }
    if let Some(ref url) = global.ws_url {
        profile.ws_url = Some(url.clone());
    }
    if let Some(ref id) = global.client_id {
        profile.client_id.clone_from(id);
    }
    if let Some(ref dir) = global.data_dir {
        profile.data_dir = Some(dir.clone());
    }
    if global.insecure {
        profile.insecure = Some(true);
    }
    if let Some(secs) = global.timeout {
        profile.timeout = Some(secs);
    }
}

pub fn available_profiles(cfg: &Config) -> String {
    if cfg.profiles.is_empty() {
        return "(none)".into();
    }
    cfg.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::cli::Cli;

    fn global(args: &[&str]) -> GlobalOpts {
        let mut argv = vec!["sensorhub"];
        argv.extend_from_slice(args);
        argv.push("sensor-types");
        Cli::try_parse_from(argv).unwrap().global
    }

    fn write_config(dir: &tempfile::TempDir) -> String {
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
default_profile = "home"

[profiles.home]
api_url = "http://192.168.100.30:8000/api/"
token = "abc123"
poll_interval = 60
"#,
        )
        .unwrap();
        path.display().to_string()
    }

    #[test]
    fn flags_override_profile() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_config(&dir);
        let data = dir.path().join("data");
        let g = global(&[
            "--config",
            &config,
            "--api-url",
            "http://10.0.0.2:8000/api/",
            "--token",
            "flagged",
            "--data-dir",
            data.to_str().unwrap(),
            "--timeout",
            "3",
        ]);

        let resolved = resolve(&g).unwrap();
        assert_eq!(resolved.profile_name, "home");
        assert_eq!(resolved.monitor.api_url.as_str(), "http://10.0.0.2:8000/api/");
        assert_eq!(resolved.monitor.poll_interval_secs, 60);
        assert_eq!(resolved.monitor.timeout.as_secs(), 3);
        assert!(resolved.token_from_flag);
        assert_eq!(resolved.overrides_path, data.join("home").join("overrides.json"));
    }

    #[test]
    fn flags_alone_without_profile() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("none.toml");
        let g = global(&[
            "--config",
            missing.to_str().unwrap(),
            "--api-url",
            "http://hub.local/api/",
            "--token",
            "t",
        ]);

        let resolved = resolve(&g).unwrap();
        assert_eq!(resolved.profile_name, "default");
        assert_eq!(resolved.monitor.client_id, "1");
    }

    #[test]
    fn unknown_profile_lists_available() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_config(&dir);
        let g = global(&["--config", &config, "--profile", "lab"]);

        let err = resolve(&g).unwrap_err();
        assert!(
            matches!(err, CliError::ProfileNotFound { ref available, .. } if available == "home")
        );
    }

    #[test]
    fn nothing_configured_is_no_config() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("none.toml");
        let g = global(&["--config", missing.to_str().unwrap()]);

        assert!(matches!(resolve(&g).unwrap_err(), CliError::NoConfig { .. }));
    }
}
