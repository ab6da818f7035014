//! Job configuration.
//!
//! Every setting comes from the environment of the deployment (flags exist
//! for local runs). The variable names are the ones the existing job
//! definitions already set, so they are not uniformly cased.

use std::path::PathBuf;

use clap::Parser;

use lawex_scheduler::{FIRST_BACKFILL_DURATION_DAYS, MAX_BACKFILL_DAYS};

/// Token replaced by the environment letter in catalog entries.
pub const DTAP_TOKEN: &str = "#dtap_letter#";

/// Parse boolean from environment variable, accepting common truthy values.
/// Accepts "1", "true", "yes", "on" (case-insensitive) as true.
/// Accepts "0", "false", "no", "off", "" (case-insensitive) as false.
pub fn parse_bool_env(s: &str) -> Result<bool, String> {
    match s.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(format!(
            "invalid boolean value '{}', expected 1/true/yes/on or 0/false/no/off",
            s
        )),
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "lawex")]
#[command(about = "Incremental Log Analytics to Blob Storage export", long_about = None)]
pub struct Config {
    /// Environment letter (d, t, a or p)
    #[arg(long, env = "dtap_letter")]
    pub dtap_letter: String,

    /// Default destination storage account
    #[arg(long, env = "sa_name")]
    pub storage_account: String,

    /// Key vault holding the workspace id
    #[arg(long, env = "kv_name")]
    pub keyvault_name: String,

    /// Name of the secret holding the Log Analytics workspace id
    #[arg(long, env = "lw_name")]
    pub workspace_secret_name: String,

    /// Client id of the user-assigned managed identity
    #[arg(long, env = "CLIENT_ID")]
    pub client_id: String,

    /// Subscription of the Log Analytics workspace (used in blob paths)
    #[arg(long, env = "subscription_id")]
    pub subscription_id: String,

    /// Resource group of the Log Analytics workspace (used in blob paths)
    #[arg(long, env = "resource_group")]
    pub resource_group: String,

    /// Export the whole backfill window for every query, ignoring checkpoints
    #[arg(
        long,
        env = "first_backfill",
        action = clap::ArgAction::Set,
        value_parser = parse_bool_env,
        default_value = "false"
    )]
    pub first_backfill: bool,

    /// Length of the backfill window in days
    #[arg(long, env = "FIRST_BACKFILL_DAYS", default_value_t = FIRST_BACKFILL_DURATION_DAYS)]
    pub first_backfill_days: u32,

    /// Query catalog (JSON)
    #[arg(long, env = "LAWEX_CATALOG", default_value = "queries.json")]
    pub catalog: PathBuf,

    /// Directory for staged result files; a temporary directory when unset
    #[arg(long, env = "LAWEX_STAGING_DIR")]
    pub staging_dir: Option<PathBuf>,

    /// Blob endpoint override, e.g. a local storage emulator
    #[arg(long, env = "LAWEX_BLOB_ENDPOINT")]
    pub blob_endpoint: Option<String>,

    /// Log Analytics endpoint override
    #[arg(long, env = "LAWEX_LOG_ANALYTICS_ENDPOINT")]
    pub log_analytics_endpoint: Option<String>,

    /// Set to force managed identity on a workstation
    #[arg(long, env = "NO_WORKSTATION")]
    pub no_workstation: Option<String>,

    /// Hostname prefix of developer workstations
    #[arg(long, env = "LAWEX_WORKSTATION_PREFIX", default_value = "abcd")]
    pub workstation_prefix: String,
}

impl Config {
    /// Substitute the environment letter into `template`.
    pub fn env_specific(&self, template: &str) -> String {
        template.replace(DTAP_TOKEN, &self.dtap_letter)
    }

    /// Reject values clap accepts but the job cannot use.
    pub fn validate(&self) -> Result<(), String> {
        let required = [
            ("dtap_letter", &self.dtap_letter),
            ("sa_name", &self.storage_account),
            ("kv_name", &self.keyvault_name),
            ("lw_name", &self.workspace_secret_name),
            ("subscription_id", &self.subscription_id),
            ("resource_group", &self.resource_group),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(format!("{} must not be empty", name));
            }
        }
        if self.first_backfill && self.first_backfill_days == 0 {
            return Err("FIRST_BACKFILL_DAYS must be at least 1".to_string());
        }
        if self.first_backfill_days > MAX_BACKFILL_DAYS {
            return Err(format!(
                "FIRST_BACKFILL_DAYS must be at most {}",
                MAX_BACKFILL_DAYS
            ));
        }
        Ok(())
    }
}
