use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Usernames with admin access
    #[serde(default = "default_admins")]
    pub admins: Vec<String>,

    /// Link included in notification mails
    #[serde(default = "default_portal_url")]
    pub portal_url: String,

    #[serde(default = "default_mail_from")]
    pub mail_from: String,

    /// Directory the mail relay writes outgoing messages to
    #[serde(default = "default_mail_spool")]
    pub mail_spool: PathBuf,

    #[serde(default = "default_mail_interval")]
    pub mail_interval_secs: u64,

    /// Fixed seed for allocation runs; random when unset
    #[serde(default = "default_allocation_seed")]
    pub allocation_seed: Option<u64>,
}

fn gslas_home() -> PathBuf {
    if cfg!(windows) {
        let appdata = std::env::var("APPDATA").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(appdata).join("gslas")
    } else {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(".gslas")
    }
}

fn default_bind_addr() -> String {
    std::env::var("GSLAS_BIND").unwrap_or_else(|_| "0.0.0.0:8000".to_string())
}

fn default_db_path() -> PathBuf {
    std::env::var("GSLAS_DB_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| gslas_home().join("gslas.db"))
}

fn default_admins() -> Vec<String> {
    std::env::var("GSLAS_ADMINS")
        .map(|value| parse_list(&value))
        .unwrap_or_default()
}

fn default_portal_url() -> String {
    std::env::var("GSLAS_PORTAL_URL").unwrap_or_else(|_| "http://127.0.0.1:8000/".to_string())
}

fn default_mail_from() -> String {
    std::env::var("GSLAS_MAIL_FROM").unwrap_or_else(|_| "gslas@localhost".to_string())
}

fn default_mail_spool() -> PathBuf {
    std::env::var("GSLAS_MAIL_SPOOL")
        .map(PathBuf::from)
        .unwrap_or_else(|_| gslas_home().join("mail"))
}

fn default_mail_interval() -> u64 {
    parse_interval(std::env::var("GSLAS_MAIL_INTERVAL").ok().as_deref())
}

/// Relay interval in seconds; never zero.
fn parse_interval(value: Option<&str>) -> u64 {
    value
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(30)
        .max(1)
}

fn default_allocation_seed() -> Option<u64> {
    std::env::var("GSLAS_ALLOCATION_SEED")
        .ok()
        .and_then(|s| s.parse().ok())
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            db_path: default_db_path(),
            admins: default_admins(),
            portal_url: default_portal_url(),
            mail_from: default_mail_from(),
            mail_spool: default_mail_spool(),
            mail_interval_secs: default_mail_interval(),
            allocation_seed: default_allocation_seed(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn is_admin(&self, username: &str) -> bool {
        self.admins.iter().any(|admin| admin == username)
    }
}
