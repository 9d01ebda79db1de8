//! Ledger configuration

use serde::Deserialize;
use std::time::Duration;

/// Ledger configuration
///
/// Account codes name the control accounts used by period close and the
/// subledger adapters; they are looked up in the chart at use time.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Equity account receiving each period's net income at close
    pub retained_earnings_code: String,
    /// Liability account credited when a payable is approved
    pub accounts_payable_code: String,
    /// Tax control account for expense and payable tax portions
    pub tax_control_code: String,
    /// How long a unit of work may wait on locks before aborting
    pub lock_timeout_ms: u64,
    /// Bounded retries for `ContentionAborted`
    pub max_contention_retries: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            retained_earnings_code: "3000".to_string(),
            accounts_payable_code: "2000".to_string(),
            tax_control_code: "2060".to_string(),
            lock_timeout_ms: 5000,
            max_contention_retries: 3,
        }
    }
}

impl LedgerConfig {
    /// Loads configuration from `LEDGER_*` environment variables, falling back to defaults
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let defaults = Self::default();
        config::Config::builder()
            .set_default("retained_earnings_code", defaults.retained_earnings_code)?
            .set_default("accounts_payable_code", defaults.accounts_payable_code)?
            .set_default("tax_control_code", defaults.tax_control_code)?
            .set_default("lock_timeout_ms", defaults.lock_timeout_ms)?
            .set_default("max_contention_retries", defaults.max_contention_retries)?
            .add_source(config::Environment::with_prefix("LEDGER").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    /// Returns the lock timeout as a duration
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_name_standard_chart_codes() {
        let config = LedgerConfig::default();
        assert_eq!(config.retained_earnings_code, "3000");
        assert_eq!(config.accounts_payable_code, "2000");
        assert_eq!(config.lock_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_from_env_without_overrides_uses_defaults() {
        let config = LedgerConfig::from_env().unwrap();
        assert_eq!(config.max_contention_retries, 3);
    }
}
