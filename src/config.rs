//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Active chain names for discovery
    #[serde(default = "default_networks")]
    pub networks: Vec<String>,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub confluence: ConfluenceConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub position: PositionConfig,
    #[serde(default)]
    pub monte_carlo: MonteCarloConfig,
    #[serde(default)]
    pub feeds: FeedConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub cron: CronConfig,
}

fn default_networks() -> Vec<String> {
    vec![
        "ethereum".to_string(),
        "base".to_string(),
        "solana".to_string(),
    ]
}

/// Cycle scheduling and per-user bootstrap
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Minutes between cycles when running as a daemon
    #[serde(default = "default_cycle_minutes")]
    pub cycle_interval_minutes: u64,
    /// Bounded number of users processed concurrently
    #[serde(default = "default_user_concurrency")]
    pub user_concurrency: usize,
    /// Paper capital assigned when a user has no risk state yet
    #[serde(default = "default_bootstrap_capital")]
    pub bootstrap_capital_usd: f64,
    /// Users to process; a single default user when empty
    #[serde(default = "default_users")]
    pub users: Vec<String>,
}

fn default_cycle_minutes() -> u64 {
    15
}
fn default_user_concurrency() -> usize {
    4
}
fn default_bootstrap_capital() -> f64 {
    10_000.0
}
fn default_users() -> Vec<String> {
    vec!["default".to_string()]
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cycle_interval_minutes: default_cycle_minutes(),
            user_concurrency: default_user_concurrency(),
            bootstrap_capital_usd: default_bootstrap_capital(),
            users: default_users(),
        }
    }
}

/// Risk gate tuning
#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    /// Per-trade risk fraction of capital for the core layer
    #[serde(default = "default_core_risk_pct")]
    pub core_max_risk_per_trade_pct: f64,
    #[serde(default = "default_satellite_risk_pct")]
    pub satellite_max_risk_per_trade_pct: f64,
    /// Kill-switch thresholds as fractions of capital
    #[serde(default = "default_max_daily_loss_pct")]
    pub max_daily_loss_pct: f64,
    #[serde(default = "default_max_weekly_loss_pct")]
    pub max_weekly_loss_pct: f64,
    /// Daily trade caps per layer
    #[serde(default = "default_core_daily_cap")]
    pub core_daily_trade_cap: u32,
    #[serde(default = "default_satellite_daily_cap")]
    pub satellite_daily_trade_cap: u32,
    /// Satellite cooldown rule
    #[serde(default = "default_satellite_streak_limit")]
    pub satellite_consec_loss_limit: u32,
    #[serde(default = "default_satellite_cooldown_ms")]
    pub satellite_cooldown_ms: u64,
}

fn default_core_risk_pct() -> f64 {
    0.005
}
fn default_satellite_risk_pct() -> f64 {
    0.0025
}
fn default_max_daily_loss_pct() -> f64 {
    0.02
}
fn default_max_weekly_loss_pct() -> f64 {
    0.06
}
fn default_core_daily_cap() -> u32 {
    5
}
fn default_satellite_daily_cap() -> u32 {
    2
}
fn default_satellite_streak_limit() -> u32 {
    3
}
fn default_satellite_cooldown_ms() -> u64 {
    24 * 60 * 60 * 1000
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            core_max_risk_per_trade_pct: default_core_risk_pct(),
            satellite_max_risk_per_trade_pct: default_satellite_risk_pct(),
            max_daily_loss_pct: default_max_daily_loss_pct(),
            max_weekly_loss_pct: default_max_weekly_loss_pct(),
            core_daily_trade_cap: default_core_daily_cap(),
            satellite_daily_trade_cap: default_satellite_daily_cap(),
            satellite_consec_loss_limit: default_satellite_streak_limit(),
            satellite_cooldown_ms: default_satellite_cooldown_ms(),
        }
    }
}

/// Confluence layer-routing thresholds (overridable by the calibrator)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfluenceConfig {
    #[serde(default = "default_core_min_confidence")]
    pub core_min_confidence: f64,
    #[serde(default = "default_satellite_min_confidence")]
    pub satellite_min_confidence: f64,
    /// Early signals promote to core only at this confidence, and only with
    /// wallet confluence present
    #[serde(default = "default_early_core_promotion")]
    pub early_core_promotion_confidence: f64,
    /// Minimum distinct smart-money wallets for confluence
    #[serde(default = "default_min_confluence_wallets")]
    pub min_wallets: usize,
    /// Minimum wallet score to count towards confluence
    #[serde(default = "default_min_wallet_score")]
    pub min_wallet_score: f64,
    /// Lookback for wallet buys, hours
    #[serde(default = "default_confluence_window_hours")]
    pub window_hours: i64,
}

fn default_core_min_confidence() -> f64 {
    75.0
}
fn default_satellite_min_confidence() -> f64 {
    50.0
}
fn default_early_core_promotion() -> f64 {
    85.0
}
fn default_min_confluence_wallets() -> usize {
    3
}
fn default_min_wallet_score() -> f64 {
    70.0
}
fn default_confluence_window_hours() -> i64 {
    6
}

impl Default for ConfluenceConfig {
    fn default() -> Self {
        Self {
            core_min_confidence: default_core_min_confidence(),
            satellite_min_confidence: default_satellite_min_confidence(),
            early_core_promotion_confidence: default_early_core_promotion(),
            min_wallets: default_min_confluence_wallets(),
            min_wallet_score: default_min_wallet_score(),
            window_hours: default_confluence_window_hours(),
        }
    }
}

/// Detector entry thresholds (overridable by the calibrator)
#[derive(Debug, Clone, Deserialize)]
pub struct DetectorConfig {
    #[serde(default = "default_min_momentum_score")]
    pub min_momentum_score: f64,
    #[serde(default = "default_min_early_score")]
    pub min_early_score: f64,
}

fn default_min_momentum_score() -> f64 {
    55.0
}
fn default_min_early_score() -> f64 {
    50.0
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_momentum_score: default_min_momentum_score(),
            min_early_score: default_min_early_score(),
        }
    }
}

/// Exit rules per layer
#[derive(Debug, Clone, Deserialize)]
pub struct PositionConfig {
    #[serde(default = "default_core_trailing_pct")]
    pub core_trailing_pct: f64,
    #[serde(default = "default_satellite_trailing_pct")]
    pub satellite_trailing_pct: f64,
    #[serde(default = "default_core_max_hold_hours")]
    pub core_max_hold_hours: i64,
    #[serde(default = "default_satellite_max_hold_hours")]
    pub satellite_max_hold_hours: i64,
    #[serde(default = "default_core_take_profit_pct")]
    pub core_take_profit_pct: f64,
    #[serde(default = "default_satellite_take_profit_pct")]
    pub satellite_take_profit_pct: f64,
    /// Exit when 24h volume falls below this fraction of entry volume
    #[serde(default = "default_volume_fade_ratio")]
    pub volume_fade_ratio: f64,
    /// Exit when pool liquidity drops below this floor, USD
    #[serde(default = "default_liquidity_floor_usd")]
    pub liquidity_floor_usd: f64,
}

fn default_core_trailing_pct() -> f64 {
    0.05
}
fn default_satellite_trailing_pct() -> f64 {
    0.10
}
fn default_core_max_hold_hours() -> i64 {
    48
}
fn default_satellite_max_hold_hours() -> i64 {
    168
}
fn default_core_take_profit_pct() -> f64 {
    15.0
}
fn default_satellite_take_profit_pct() -> f64 {
    80.0
}
fn default_volume_fade_ratio() -> f64 {
    0.3
}
fn default_liquidity_floor_usd() -> f64 {
    30_000.0
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            core_trailing_pct: default_core_trailing_pct(),
            satellite_trailing_pct: default_satellite_trailing_pct(),
            core_max_hold_hours: default_core_max_hold_hours(),
            satellite_max_hold_hours: default_satellite_max_hold_hours(),
            core_take_profit_pct: default_core_take_profit_pct(),
            satellite_take_profit_pct: default_satellite_take_profit_pct(),
            volume_fade_ratio: default_volume_fade_ratio(),
            liquidity_floor_usd: default_liquidity_floor_usd(),
        }
    }
}

/// Forward predictor inputs
#[derive(Debug, Clone, Deserialize)]
pub struct MonteCarloConfig {
    #[serde(default = "default_simulations")]
    pub simulations: usize,
    #[serde(default = "default_trades_per_day")]
    pub trades_per_day: usize,
    /// Daily profit target as a fraction of capital
    #[serde(default = "default_daily_target_pct")]
    pub daily_target_pct: f64,
}

fn default_simulations() -> usize {
    5000
}
fn default_trades_per_day() -> usize {
    3
}
fn default_daily_target_pct() -> f64 {
    0.005
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            simulations: default_simulations(),
            trades_per_day: default_trades_per_day(),
            daily_target_pct: default_daily_target_pct(),
        }
    }
}

/// Market feed endpoints and timeouts
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_gecko_base")]
    pub geckoterminal_base: String,
    #[serde(default = "default_dexscreener_base")]
    pub dexscreener_base: String,
    #[serde(default = "default_sentiment_base")]
    pub sentiment_base: String,
    #[serde(default = "default_global_base")]
    pub global_market_base: String,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

fn default_gecko_base() -> String {
    "https://api.geckoterminal.com/api/v2".to_string()
}
fn default_dexscreener_base() -> String {
    "https://api.dexscreener.com".to_string()
}
fn default_sentiment_base() -> String {
    "https://api.alternative.me".to_string()
}
fn default_global_base() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}
fn default_http_timeout_secs() -> u64 {
    10
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            geckoterminal_base: default_gecko_base(),
            dexscreener_base: default_dexscreener_base(),
            sentiment_base: default_sentiment_base(),
            global_market_base: default_global_base(),
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

/// Store snapshot persistence
#[derive(Debug, Clone, Deserialize, Default)]
pub struct StorageConfig {
    /// JSON snapshot path; in-memory only when unset
    #[serde(default)]
    pub snapshot_path: Option<String>,
}

/// Scheduler trigger authorisation
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CronConfig {
    /// Shared secret the scheduler collaborator must present
    #[serde(default)]
    pub secret: Option<String>,
}

impl Config {
    /// Load configuration from a TOML file with `PAPERBOT_*` env overrides.
    pub fn load(path: &str) -> Result<Self> {
        let mut builder = config::Config::builder();

        if Path::new(path).exists() {
            builder = builder.add_source(config::File::with_name(path));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("PAPERBOT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("failed to build configuration")?;

        let cfg: Config = settings
            .try_deserialize()
            .context("failed to deserialize configuration")?;

        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.networks.is_empty() {
            anyhow::bail!("networks must not be empty");
        }
        if self.engine.bootstrap_capital_usd <= 0.0 {
            anyhow::bail!("engine.bootstrap_capital_usd must be positive");
        }
        if self.risk.max_daily_loss_pct <= 0.0 || self.risk.max_weekly_loss_pct <= 0.0 {
            anyhow::bail!("risk kill-switch thresholds must be positive");
        }
        if self.confluence.satellite_min_confidence > self.confluence.core_min_confidence {
            anyhow::bail!("satellite_min_confidence must not exceed core_min_confidence");
        }
        if self.monte_carlo.simulations == 0 {
            anyhow::bail!("monte_carlo.simulations must be at least 1");
        }
        Ok(())
    }

    /// Render the config for the `config` CLI subcommand, secrets masked.
    pub fn display_masked(&self) -> String {
        let mut out = format!(
            "networks: {:?}\ncycle interval: {}m\nusers: {:?}\ncapital bootstrap: ${:.0}\n",
            self.networks,
            self.engine.cycle_interval_minutes,
            self.engine.users,
            self.engine.bootstrap_capital_usd,
        );
        out.push_str(&format!(
            "risk: core {:.2}%/trade, satellite {:.2}%/trade, daily kill {:.1}%, weekly kill {:.1}%\n",
            self.risk.core_max_risk_per_trade_pct * 100.0,
            self.risk.satellite_max_risk_per_trade_pct * 100.0,
            self.risk.max_daily_loss_pct * 100.0,
            self.risk.max_weekly_loss_pct * 100.0,
        ));
        out.push_str(&format!(
            "confluence: core >= {:.0}, satellite >= {:.0}\ndetector: momentum >= {:.0}, early >= {:.0}\n",
            self.confluence.core_min_confidence,
            self.confluence.satellite_min_confidence,
            self.detector.min_momentum_score,
            self.detector.min_early_score,
        ));
        out.push_str(&format!(
            "cron secret: {}\n",
            if self.cron.secret.is_some() {
                "***set***"
            } else {
                "(unset)"
            }
        ));
        out
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            networks: default_networks(),
            engine: EngineConfig::default(),
            risk: RiskConfig::default(),
            confluence: ConfluenceConfig::default(),
            detector: DetectorConfig::default(),
            position: PositionConfig::default(),
            monte_carlo: MonteCarloConfig::default(),
            feeds: FeedConfig::default(),
            storage: StorageConfig::default(),
            cron: CronConfig::default(),
        }
    }
}
