//! Challenge settings and the `challenge-bot` command line.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;
use zeroize::Zeroizing;

/// A secret string. Wiped on drop, never printed.
#[derive(Clone, Default)]
pub struct Secret(Zeroizing<String>);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("\"\"")
        } else {
            f.write_str("\"<redacted>\"")
        }
    }
}

impl FromStr for Secret {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Secret::new(s))
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Secret::new)
    }
}

/// Settings for one CHALLENGE attempt. Snapshotted when an attempt starts.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChallengeConfig {
    /// Name of the oper block to authenticate as.
    pub opername: String,
    /// Path to the private key file. `~` expands to the home directory.
    pub keyfile: String,
    /// Password unlocking the private key.
    pub password: Secret,
}

impl ChallengeConfig {
    /// The key file path with a leading `~` expanded, or `None` if unset.
    pub fn keyfile_path(&self) -> Option<PathBuf> {
        if self.keyfile.is_empty() {
            return None;
        }
        Some(expand_home(&self.keyfile))
    }
}

/// Expand a leading `~` or `~/` to the current user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    let rest = if path == "~" {
        Some("")
    } else {
        path.strip_prefix("~/")
    };
    match (rest, dirs::home_dir()) {
        (Some(rest), Some(home)) if rest.is_empty() => home,
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// On-disk configuration file (TOML).
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    challenge: ChallengeConfig,
}

/// IRC bot that opers up via RSA CHALLENGE.
#[derive(Parser, Debug, Clone)]
#[command(name = "challenge-bot", version, about)]
pub struct BotConfig {
    /// Server address (host:port).
    #[arg(long, default_value = "127.0.0.1:6667")]
    pub server: String,

    /// Bot nick.
    #[arg(long, default_value = "challengebot")]
    pub nick: String,

    /// Use TLS. Implied for port 6697.
    #[arg(long)]
    pub tls: bool,

    /// Skip TLS certificate verification (for self-signed certs).
    #[arg(long)]
    pub tls_insecure: bool,

    /// Command prefix.
    #[arg(long, default_value = "!")]
    pub prefix: String,

    /// Account names allowed to run owner commands. Repeatable.
    #[arg(long = "owner")]
    pub owners: Vec<String>,

    /// Channels to join after registration. Repeatable.
    #[arg(long = "channel")]
    pub channels: Vec<String>,

    /// Oper name to authenticate as.
    #[arg(long)]
    pub opername: Option<String>,

    /// Path to the RSA private key.
    #[arg(long)]
    pub keyfile: Option<String>,

    /// Password for the private key.
    #[arg(long, env = "CHALLENGE_PASSWORD", hide_env_values = true)]
    pub password: Option<Secret>,

    /// TOML file with a [challenge] table. Command-line flags take precedence.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Do not start a challenge automatically after registration.
    #[arg(long)]
    pub no_auto_challenge: bool,
}

impl BotConfig {
    /// Merge the config file (if any) with command-line overrides.
    pub fn challenge_config(&self) -> anyhow::Result<ChallengeConfig> {
        let mut challenge = match self.config {
            Some(ref path) => load_file(path)?.challenge,
            None => ChallengeConfig::default(),
        };
        if let Some(ref opername) = self.opername {
            challenge.opername = opername.clone();
        }
        if let Some(ref keyfile) = self.keyfile {
            challenge.keyfile = keyfile.clone();
        }
        if let Some(ref password) = self.password {
            challenge.password = password.clone();
        }
        Ok(challenge)
    }
}

fn load_file(path: &Path) -> anyhow::Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("parsing config file {}", path.display()))
}
