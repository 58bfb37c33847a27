//! Daemon configuration.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::error::{DaemonError, DaemonResult};
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;

// =============================================================================
// Configuration
// =============================================================================

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Exit rule configuration (stops, targets, trailing)
    pub exits: ExitConfig,

    /// Portfolio capital configuration
    pub portfolio: PortfolioSettings,

    /// Safety protocol configuration
    pub safety: SafetySettings,

    /// Environment (test, development, production)
    pub environment: Environment,
}

/// Exit rule configuration applied to new positions.
#[derive(Debug, Clone)]
pub struct ExitConfig {
    /// Monitor wake interval in seconds
    pub check_interval_secs: u64,
    /// Initial stop-loss distance from entry (2.0 = 2%)
    pub stop_loss_pct: Decimal,
    /// Take-profit distance from entry (4.0 = 4%)
    pub take_profit_pct: Decimal,
    /// Trailing stop distance from the watermark (1.5 = 1.5%)
    pub trailing_stop_pct: Decimal,
    /// Minimum favorable move before the trail recomputes (1.0 = 1%)
    pub min_trailing_move_pct: Decimal,
    /// Unrealized pnl at which trailing activates (3.0 = 3%)
    pub trailing_activation_pnl_pct: Decimal,
}

/// Portfolio capital configuration.
#[derive(Debug, Clone)]
pub struct PortfolioSettings {
    /// Total capital under management, in quote currency
    pub total_capital: Decimal,
    /// Trading pairs the portfolio allocates across
    pub symbols: Vec<String>,
    /// Maximum aggregate exposure as a fraction of total capital
    pub max_portfolio_risk_pct: Decimal,
    /// Maximum number of symbols with open exposure
    pub max_symbols_active: usize,
    /// Maximum absolute pairwise correlation with active symbols
    pub correlation_threshold: f64,
}

/// Safety protocol configuration.
#[derive(Debug, Clone)]
pub struct SafetySettings {
    /// Whether automatic detectors may fire transitions
    pub auto_trigger_enabled: bool,
    /// Whether manual emergency stop/resume need confirmation
    pub require_confirmation: bool,
    /// Seconds of continuous disconnect before the emergency stop fires
    pub network_timeout_secs: i64,
    /// Drawdown percent at which the excessive-loss stop fires
    pub excessive_loss_drawdown_pct: Decimal,
}

/// Environment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Test environment (uses stubs)
    Test,
    /// Development environment
    Development,
    /// Production environment
    Production,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> DaemonResult<Self> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        let environment = Self::load_environment()?;
        let exits = Self::load_exit_config()?;
        let portfolio = Self::load_portfolio_settings()?;
        let safety = Self::load_safety_settings()?;

        Ok(Self {
            exits,
            portfolio,
            safety,
            environment,
        })
    }

    /// Create test configuration.
    pub fn test() -> Self {
        Self {
            exits: ExitConfig {
                check_interval_secs: 5,
                stop_loss_pct: Decimal::new(20, 1),              // 2%
                take_profit_pct: Decimal::new(40, 1),            // 4%
                trailing_stop_pct: Decimal::new(15, 1),          // 1.5%
                min_trailing_move_pct: Decimal::ONE,             // 1%
                trailing_activation_pnl_pct: Decimal::from(3),   // 3%
            },
            portfolio: PortfolioSettings {
                total_capital: Decimal::from(100_000),
                symbols: vec![
                    "BTCUSDT".to_string(),
                    "ETHUSDT".to_string(),
                    "BNBUSDT".to_string(),
                ],
                max_portfolio_risk_pct: Decimal::new(12, 2),     // 0.12
                max_symbols_active: 5,
                correlation_threshold: 0.7,
            },
            safety: SafetySettings {
                auto_trigger_enabled: true,
                require_confirmation: true,
                network_timeout_secs: 300,
                excessive_loss_drawdown_pct: Decimal::new(70, 1), // 7%
            },
            environment: Environment::Test,
        }
    }

    fn load_environment() -> DaemonResult<Environment> {
        let env_str = env::var("VIGIL_ENV").unwrap_or_else(|_| "development".to_string());

        match env_str.to_lowercase().as_str() {
            "test" => Ok(Environment::Test),
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(DaemonError::Config(format!(
                "Invalid VIGIL_ENV: {}. Expected: test, development, production",
                other
            ))),
        }
    }

    fn load_exit_config() -> DaemonResult<ExitConfig> {
        let check_interval_secs = Self::load_u64_env("VIGIL_CHECK_INTERVAL_SECONDS", 5)?;
        let stop_loss_pct = Self::load_decimal_env("VIGIL_STOP_LOSS_PCT", Decimal::new(20, 1))?;
        let take_profit_pct = Self::load_decimal_env("VIGIL_TAKE_PROFIT_PCT", Decimal::new(40, 1))?;
        let trailing_stop_pct =
            Self::load_decimal_env("VIGIL_TRAILING_STOP_PCT", Decimal::new(15, 1))?;
        let min_trailing_move_pct =
            Self::load_decimal_env("VIGIL_MIN_TRAILING_MOVE_PCT", Decimal::ONE)?;
        let trailing_activation_pnl_pct =
            Self::load_decimal_env("VIGIL_TRAILING_ACTIVATION_PNL_PCT", Decimal::from(3))?;

        Ok(ExitConfig {
            check_interval_secs,
            stop_loss_pct,
            take_profit_pct,
            trailing_stop_pct,
            min_trailing_move_pct,
            trailing_activation_pnl_pct,
        })
    }

    fn load_portfolio_settings() -> DaemonResult<PortfolioSettings> {
        let total_capital =
            Self::load_decimal_env("VIGIL_TOTAL_CAPITAL", Decimal::from(100_000))?;
        let symbols = env::var("VIGIL_SYMBOLS")
            .unwrap_or_else(|_| "BTCUSDT,ETHUSDT,BNBUSDT".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let max_portfolio_risk_pct =
            Self::load_decimal_env("VIGIL_MAX_PORTFOLIO_RISK_PCT", Decimal::new(12, 2))?;
        let max_symbols_active =
            Self::load_u64_env("VIGIL_MAX_SYMBOLS_ACTIVE", 5)? as usize;
        let correlation_threshold =
            Self::load_f64_env("VIGIL_CORRELATION_THRESHOLD", 0.7)?;

        Ok(PortfolioSettings {
            total_capital,
            symbols,
            max_portfolio_risk_pct,
            max_symbols_active,
            correlation_threshold,
        })
    }

    fn load_safety_settings() -> DaemonResult<SafetySettings> {
        let auto_trigger_enabled = Self::load_bool_env("VIGIL_AUTO_TRIGGER_ENABLED", true)?;
        let require_confirmation = Self::load_bool_env("VIGIL_REQUIRE_CONFIRMATION", true)?;
        let network_timeout_secs =
            Self::load_u64_env("VIGIL_NETWORK_TIMEOUT_SECONDS", 300)? as i64;
        let excessive_loss_drawdown_pct =
            Self::load_decimal_env("VIGIL_EXCESSIVE_LOSS_DRAWDOWN_PCT", Decimal::new(70, 1))?;

        Ok(SafetySettings {
            auto_trigger_enabled,
            require_confirmation,
            network_timeout_secs,
            excessive_loss_drawdown_pct,
        })
    }

    fn load_decimal_env(key: &str, default: Decimal) -> DaemonResult<Decimal> {
        match env::var(key) {
            Ok(val) => Decimal::from_str(&val)
                .map_err(|_| DaemonError::Config(format!("Invalid {} value: {}", key, val))),
            Err(_) => Ok(default),
        }
    }

    fn load_u64_env(key: &str, default: u64) -> DaemonResult<u64> {
        match env::var(key) {
            Ok(val) => val
                .parse::<u64>()
                .map_err(|_| DaemonError::Config(format!("Invalid {} value: {}", key, val))),
            Err(_) => Ok(default),
        }
    }

    fn load_f64_env(key: &str, default: f64) -> DaemonResult<f64> {
        match env::var(key) {
            Ok(val) => val
                .parse::<f64>()
                .map_err(|_| DaemonError::Config(format!("Invalid {} value: {}", key, val))),
            Err(_) => Ok(default),
        }
    }

    fn load_bool_env(key: &str, default: bool) -> DaemonResult<bool> {
        match env::var(key) {
            Ok(val) => match val.to_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(true),
                "false" | "0" | "no" => Ok(false),
                other => Err(DaemonError::Config(format!(
                    "Invalid {} value: {}",
                    key, other
                ))),
            },
            Err(_) => Ok(default),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut config = Self::test();
        config.environment = Environment::Development;
        config
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Test => write!(f, "test"),
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
