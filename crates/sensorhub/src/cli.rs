//! Clap derive structures for the `sensorhub` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use std::path::PathBuf;
use std::str::FromStr;

use clap::{Args, Parser, Subcommand, ValueEnum};

use sensorhub_core::{ArmMode, DataType, EmergencyMode, UsageType};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// sensorhub -- watch and manage sensor hub devices
#[derive(Debug, Parser)]
#[command(
    name = "sensorhub",
    version,
    about = "Watch and manage sensor hub devices from the command line",
    long_about = "Reconciles the hub's status snapshot, its live push channel and\n\
        your local per-device settings into one device list.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Hub profile to use
    #[arg(long, short = 'p', env = "SENSORHUB_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Config file (defaults to the platform config dir)
    #[arg(long = "config", env = "SENSORHUB_CONFIG", global = true)]
    pub config_file: Option<PathBuf>,

    /// REST API root (overrides profile)
    #[arg(long, env = "SENSORHUB_API_URL", global = true)]
    pub api_url: Option<String>,

    /// Push channel URL (overrides profile)
    #[arg(long, env = "SENSORHUB_WS_URL", global = true)]
    pub ws_url: Option<String>,

    /// Session token (overrides keyring and profile)
    #[arg(long, env = "SENSORHUB_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Tenant id sent with list queries
    #[arg(long, env = "SENSORHUB_CLIENT_ID", global = true)]
    pub client_id: Option<String>,

    /// Directory for local device settings (overrides profile)
    #[arg(long, env = "SENSORHUB_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "SENSORHUB_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "SENSORHUB_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds
    #[arg(long, env = "SENSORHUB_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List, inspect, register and configure devices
    #[command(alias = "dev", alias = "d")]
    Devices(DevicesArgs),

    /// Follow live device changes until interrupted
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// List sensor types the hub accepts
    #[command(alias = "types")]
    SensorTypes,

    /// List hub notifications
    Notifications(NotificationsArgs),

    /// Show or change the system arm mode
    Mode(ModeArgs),

    /// Store a session token in the system keyring
    Login(LoginArgs),

    /// Remove the stored session token
    Logout,

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Devices ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DevicesArgs {
    #[command(subcommand)]
    pub command: DevicesCommand,
}

#[derive(Debug, Subcommand)]
pub enum DevicesCommand {
    /// List devices
    #[command(alias = "ls")]
    List(DeviceListArgs),

    /// Show one device
    Get {
        /// Node id (e.g. sensor_01)
        node_id: String,
    },

    /// Register a new node with the hub
    Add(AddDeviceArgs),

    /// Remove a device from the hub, with its local settings and saved entry
    #[command(alias = "rm")]
    Remove {
        /// Node id
        node_id: String,
    },

    /// Change local settings for a device
    #[command(alias = "set")]
    Configure(ConfigureArgs),

    /// Show stored local settings
    Overrides {
        /// Only this node id
        node_id: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum DeviceFilterArg {
    #[default]
    All,
    Connected,
    Disconnected,
    Removable,
}

#[derive(Debug, Args)]
pub struct DeviceListArgs {
    /// Narrow the list by state
    #[arg(long, short = 'f', default_value = "all")]
    pub filter: DeviceFilterArg,

    /// Only devices of this sensor type (e.g. motion)
    #[arg(long = "type")]
    pub sensor_type: Option<String>,
}

#[derive(Debug, Args)]
pub struct AddDeviceArgs {
    /// Node id printed on the device
    pub node_id: String,

    /// Where the device is installed
    #[arg(long, short = 'l')]
    pub location: String,

    /// Sensor type (see `sensorhub sensor-types`)
    #[arg(long = "type", short = 't')]
    pub sensor_type: String,
}

#[derive(Debug, Args)]
pub struct ConfigureArgs {
    /// Node id
    pub node_id: String,

    /// Alarm timing: time-delay or instant
    #[arg(long, value_parser = DataType::from_str)]
    pub data_type: Option<DataType>,

    /// Emergency mode: emergency or normal
    #[arg(long = "mode", value_parser = EmergencyMode::from_str)]
    pub emergency_mode: Option<EmergencyMode>,

    /// Usage: active or bypass
    #[arg(long = "usage", value_parser = UsageType::from_str)]
    pub usage_type: Option<UsageType>,

    /// Force the connection state (also sent to the hub)
    #[arg(long)]
    pub connected: Option<bool>,
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Narrow the output by state
    #[arg(long, short = 'f', default_value = "all")]
    pub filter: DeviceFilterArg,

    /// Snapshot poll interval in seconds (0 disables polling)
    #[arg(long)]
    pub interval: Option<u64>,

    /// Do not open the push channel
    #[arg(long)]
    pub no_push: bool,
}

// ── Notifications ────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct NotificationsArgs {
    /// Show at most this many
    #[arg(long, short = 'l')]
    pub limit: Option<usize>,
}

// ── Mode ─────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ModeArgs {
    /// New mode: disarm, stay or away. Omit to show the current mode.
    #[arg(value_parser = ArmMode::from_str)]
    pub mode: Option<ArmMode>,
}

// ── Login ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct LoginArgs {
    /// Read the token from stdin instead of prompting
    #[arg(long)]
    pub token_stdin: bool,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Interactive setup of a profile
    Init,

    /// Show the current configuration (secrets redacted)
    Show,

    /// Print the config file path
    Path,

    /// List profiles
    Profiles,

    /// Make a profile the default
    Use {
        /// Profile name
        name: String,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
