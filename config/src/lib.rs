//! Shade Configuration
//!
//! Shared configuration crate for the Shade privacy layer.
//!
//! Handles loading configuration from:
//! 1. SHADE_CONFIG env var (explicit path)
//! 2. ./shade.toml (current directory)
//! 3. ~/.shade/shade.toml (user home)
//!
//! Environment variables take precedence over TOML config.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::{env, fs};

/// Global config instance for convenience access
pub static GLOBAL_CONFIG: OnceLock<ShadeConfig> = OnceLock::new();

const CONFIG_FILE_NAME: &str = "shade.toml";
const CONFIG_DIR_NAME: &str = ".shade";

// ============================================================================
// Default Constants
// ============================================================================

/// Hard protocol ceiling on transactions per bundle.
pub use shade_privacy::MAX_BUNDLE_TRANSACTIONS;

const DEFAULT_MIN_SPENDING_KEY_LEN: usize = 32;
const DEFAULT_SETTLEMENT_DELAY_MS: u64 = 3_000;
const DEFAULT_SETTLEMENT_POLL_MS: u64 = 250;
const DEFAULT_PER_TX_GAS: u64 = 21_000;
const DEFAULT_VERIFICATION_OVERHEAD_GAS: u64 = 50_000;
const DEFAULT_MARGINAL_GAS: u64 = 2_500;
const DEFAULT_ROOT_HISTORY: usize = 100;

// ============================================================================
// Config Structs
// ============================================================================

/// Root configuration structure (matches TOML layout)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShadeConfig {
    #[serde(default)]
    pub privacy: PrivacyConfig,
    #[serde(default)]
    pub bundle: BundleConfig,
}

/// Key material and payment settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivacyConfig {
    /// Hex-encoded 32-byte master key for sealing metadata, amounts and
    /// private key material. Absent means every sealing operation fails closed.
    #[serde(default)]
    pub encryption_key: Option<String>,
    #[serde(default = "default_min_spending_key_len")]
    pub min_spending_key_len: usize,
    #[serde(default = "default_root_history")]
    pub root_history: usize,
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            encryption_key: None,
            min_spending_key_len: DEFAULT_MIN_SPENDING_KEY_LEN,
            root_history: DEFAULT_ROOT_HISTORY,
        }
    }
}

fn default_min_spending_key_len() -> usize {
    DEFAULT_MIN_SPENDING_KEY_LEN
}
fn default_root_history() -> usize {
    DEFAULT_ROOT_HISTORY
}

/// How sibling nodes are combined when building bundle trees
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CombineModeToml {
    /// hash(left || right), binds leaves to their position
    #[default]
    Positional,
    /// Sort the pair before hashing (legacy bundle data)
    Sorted,
}

/// Bundle engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleConfig {
    #[serde(default = "default_max_transactions")]
    pub max_transactions: usize,
    #[serde(default = "default_settlement_delay")]
    pub settlement_delay_ms: u64,
    #[serde(default = "default_settlement_poll")]
    pub settlement_poll_ms: u64,
    #[serde(default)]
    pub combine_mode: CombineModeToml,
    #[serde(default = "default_per_tx_gas")]
    pub per_tx_gas: u64,
    #[serde(default = "default_verification_overhead_gas")]
    pub verification_overhead_gas: u64,
    #[serde(default = "default_marginal_gas")]
    pub marginal_gas: u64,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            max_transactions: MAX_BUNDLE_TRANSACTIONS,
            settlement_delay_ms: DEFAULT_SETTLEMENT_DELAY_MS,
            settlement_poll_ms: DEFAULT_SETTLEMENT_POLL_MS,
            combine_mode: CombineModeToml::Positional,
            per_tx_gas: DEFAULT_PER_TX_GAS,
            verification_overhead_gas: DEFAULT_VERIFICATION_OVERHEAD_GAS,
            marginal_gas: DEFAULT_MARGINAL_GAS,
        }
    }
}

impl BundleConfig {
    /// Configured bundle limit, never above the protocol ceiling.
    pub fn effective_max_transactions(&self) -> usize {
        self.max_transactions.clamp(1, MAX_BUNDLE_TRANSACTIONS)
    }
}

fn default_max_transactions() -> usize {
    MAX_BUNDLE_TRANSACTIONS
}
fn default_settlement_delay() -> u64 {
    DEFAULT_SETTLEMENT_DELAY_MS
}
fn default_settlement_poll() -> u64 {
    DEFAULT_SETTLEMENT_POLL_MS
}
fn default_per_tx_gas() -> u64 {
    DEFAULT_PER_TX_GAS
}
fn default_verification_overhead_gas() -> u64 {
    DEFAULT_VERIFICATION_OVERHEAD_GAS
}
fn default_marginal_gas() -> u64 {
    DEFAULT_MARGINAL_GAS
}

// ============================================================================
// Environment Variable Helpers
// ============================================================================

/// Set Option<String> from a lookup if present
fn lookup_option_string(
    lookup: &dyn Fn(&str) -> Option<String>,
    key: &str,
    field: &mut Option<String>,
) {
    if let Some(v) = lookup(key) {
        *field = Some(v);
    }
}

/// Set field from a lookup if present and parseable
fn lookup_parse<T: std::str::FromStr>(
    lookup: &dyn Fn(&str) -> Option<String>,
    key: &str,
    field: &mut T,
) {
    if let Some(v) = lookup(key) {
        match v.parse() {
            Ok(parsed) => *field = parsed,
            Err(_) => log::warn!("Ignoring unparseable value for {}", key),
        }
    }
}

// ============================================================================
// Implementation
// ============================================================================

impl ShadeConfig {
    /// Load configuration from config file with env var overrides
    pub fn load() -> Result<Self> {
        let mut config = match Self::find_config_file() {
            Some(path) => {
                log::info!("Loading config from: {}", path.display());
                Self::parse_file(&path)?
            }
            None => {
                log::info!("No config file found, using defaults and environment variables");
                Self::default()
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::parse_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn parse_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Find the config file path
    fn find_config_file() -> Option<PathBuf> {
        // 1. Check SHADE_CONFIG env var
        if let Ok(path) = env::var("SHADE_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        // 2. Check ./shade.toml (current directory)
        let local_path = PathBuf::from(CONFIG_FILE_NAME);
        if local_path.exists() {
            return Some(local_path);
        }

        // 3. Check ~/.shade/shade.toml
        Self::default_config_path().filter(|p| p.exists())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(&|key| env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup (the process environment
    /// in production).
    pub fn apply_overrides(&mut self, lookup: &dyn Fn(&str) -> Option<String>) {
        // Privacy
        lookup_option_string(lookup, "SHADE_ENCRYPTION_KEY", &mut self.privacy.encryption_key);
        lookup_parse(
            lookup,
            "SHADE_MIN_SPENDING_KEY_LEN",
            &mut self.privacy.min_spending_key_len,
        );

        // Bundle
        lookup_parse(lookup, "SHADE_BUNDLE_MAX_TXS", &mut self.bundle.max_transactions);
        lookup_parse(
            lookup,
            "SHADE_SETTLEMENT_DELAY_MS",
            &mut self.bundle.settlement_delay_ms,
        );
        lookup_parse(
            lookup,
            "SHADE_SETTLEMENT_POLL_MS",
            &mut self.bundle.settlement_poll_ms,
        );
        if let Some(v) = lookup("SHADE_MERKLE_COMBINE") {
            match v.to_ascii_lowercase().as_str() {
                "sorted" => self.bundle.combine_mode = CombineModeToml::Sorted,
                "positional" => self.bundle.combine_mode = CombineModeToml::Positional,
                _ => log::warn!("Ignoring unknown value for SHADE_MERKLE_COMBINE: {}", v),
            }
        }
    }

    /// Get the default config file path
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Generate a sample config file
    pub fn generate_sample() -> String {
        let mut sample = Self::default();
        sample.privacy.encryption_key = Some("00".repeat(32));
        toml::to_string_pretty(&sample).unwrap_or_default()
    }

    /// Get the global config instance, initializing it if necessary.
    ///
    /// Falls back to defaults if loading fails.
    pub fn global() -> &'static ShadeConfig {
        GLOBAL_CONFIG.get_or_init(|| {
            Self::load().unwrap_or_else(|e| {
                log::warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            })
        })
    }

    /// Initialize the global config with a specific instance.
    ///
    /// Returns `Err(config)` if already initialized.
    pub fn set_global(config: ShadeConfig) -> Result<(), ShadeConfig> {
        GLOBAL_CONFIG.set(config)
    }
}

/// Shorthand for `ShadeConfig::global()`.
#[inline]
pub fn global_config() -> &'static ShadeConfig {
    ShadeConfig::global()
}

// ============================================================================
// Tests
// ============================================================================
