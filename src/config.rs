// 7.0 config.rs: all settings in one place. engine limits plus per-market risk, adl and funding.
// 7.1 has the env presets. everything is serde so a deployment can ship it as json.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::adl::{AdlConfig, AdlError};
use crate::engine::EngineConfig;
use crate::funding::{FundingConfig, FundingError};
use crate::risk_config::{MarketRiskConfig, RiskConfigError};
use crate::types::{Bps, Leverage, MarketId};

// One market's full parameter set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketSetup {
    pub market_id: MarketId,
    // Market symbol (e.g. "ETH-PERP")
    pub name: String,
    pub risk: MarketRiskConfig,
    pub adl: AdlConfig,
    pub funding: FundingConfig,
}

impl MarketSetup {
    pub fn new(market_id: MarketId, name: &str) -> Self {
        Self {
            market_id,
            name: name.to_string(),
            risk: MarketRiskConfig::standard(),
            adl: AdlConfig::default(),
            funding: FundingConfig::default(),
        }
    }
}

// The complete core configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreConfig {
    pub engine: EngineConfig,
    pub markets: Vec<MarketSetup>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        let mut btc = MarketSetup::new(MarketId(2), "BTC-PERP");
        btc.risk = MarketRiskConfig::new(Bps::new(400), Bps::new(800), leverage(25));

        Self {
            engine: EngineConfig::default(),
            markets: vec![MarketSetup::new(MarketId(1), "ETH-PERP"), btc],
        }
    }
}

fn leverage(x: u32) -> Leverage {
    Leverage::new(x).unwrap_or(Leverage::ONE)
}

impl CoreConfig {
    // Create a configuration preset for testnet: loose margins, hourly funding, no adl cooldown
    pub fn testnet() -> Self {
        let mut config = Self::default();
        for market in &mut config.markets {
            market.name = format!("{} Testnet", market.name);
            market.risk = MarketRiskConfig::new(Bps::new(100), Bps::new(200), leverage(50));
            market.adl.grace_period_secs = 0;
            market.funding.period_secs = 3600;
        }
        config
    }

    // Create a configuration preset for mainnet with conservative settings
    pub fn mainnet_conservative() -> Self {
        let mut config = Self::default();
        config.engine.max_events = 1_000_000;
        for market in &mut config.markets {
            market.risk = MarketRiskConfig::new(Bps::new(600), Bps::new(1000), leverage(10));
            market.adl.max_positions_per_event = 20;
            market.adl.grace_period_secs = 300; // 5 minute cooldown
            market.funding.max_rate_bps = Bps::new(100);
        }
        config
    }

    // Validate the configuration for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.max_events == 0 {
            return Err(ConfigError::InvalidEngine {
                reason: "event log must hold at least 1 event".to_string(),
            });
        }
        if self.engine.max_adl_history == 0 {
            return Err(ConfigError::InvalidEngine {
                reason: "adl history must hold at least 1 record".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for market in &self.markets {
            if !seen.insert(market.market_id) {
                return Err(ConfigError::DuplicateMarket(market.market_id));
            }
            if market.name.trim().is_empty() {
                return Err(ConfigError::InvalidMarket {
                    market_id: market.market_id,
                    reason: "name must not be empty".to_string(),
                });
            }
            market.risk.validate()?;
            market.adl.validate()?;
            market.funding.validate()?;
        }
        Ok(())
    }

    pub fn market(&self, market_id: MarketId) -> Option<&MarketSetup> {
        self.markets.iter().find(|m| m.market_id == market_id)
    }

    /// Parse and validate.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid engine settings: {reason}")]
    InvalidEngine { reason: String },

    #[error("Invalid market {market_id:?}: {reason}")]
    InvalidMarket { market_id: MarketId, reason: String },

    #[error("Market {0:?} configured twice")]
    DuplicateMarket(MarketId),

    #[error(transparent)]
    Risk(#[from] RiskConfigError),

    #[error(transparent)]
    Adl(#[from] AdlError),

    #[error(transparent)]
    Funding(#[from] FundingError),

    #[error("Malformed config json: {0}")]
    Json(#[from] serde_json::Error),
}

// Environment presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Testnet,
    Mainnet,
}

impl Environment {
    pub fn config(&self) -> CoreConfig {
        match self {
            Environment::Development => CoreConfig::default(),
            Environment::Testnet => CoreConfig::testnet(),
            Environment::Mainnet => CoreConfig::mainnet_conservative(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_presets() {
        assert!(Environment::Development.config().validate().is_ok());
        assert!(Environment::Testnet.config().validate().is_ok());
        assert!(Environment::Mainnet.config().validate().is_ok());
    }

    #[test]
    fn test_mainnet_is_stricter() {
        let config = CoreConfig::mainnet_conservative();
        let eth = config.market(MarketId(1)).unwrap();
        assert_eq!(eth.risk.max_leverage, leverage(10));
        assert_eq!(eth.adl.grace_period_secs, 300);
    }

    #[test]
    fn test_duplicate_market() {
        let mut config = CoreConfig::default();
        config.markets.push(MarketSetup::new(MarketId(1), "ETH-PERP again"));
        assert!(matches!(config.validate(), Err(ConfigError::DuplicateMarket(MarketId(1)))));
    }

    #[test]
    fn test_invalid_margin() {
        let mut config = CoreConfig::default();
        // im below mm
        config.markets[0].risk = MarketRiskConfig::new(Bps::new(500), Bps::new(400), leverage(10));
        assert!(matches!(config.validate(), Err(ConfigError::Risk(_))));
    }

    #[test]
    fn test_invalid_adl() {
        let mut config = CoreConfig::default();
        config.markets[1].adl.max_positions_per_event = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Adl(_))));
    }

    #[test]
    fn test_config_json_round_trip() {
        let config = CoreConfig::testnet();
        let json = config.to_json_string().unwrap();
        let back = CoreConfig::from_json_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(CoreConfig::from_json_str("{ not json"), Err(ConfigError::Json(_))));
    }
}
