//! Per-market margin tiers.
//!
//! Each market carries a maintenance margin rate, a stricter initial margin
//! rate and a leverage cap. The registry is pure lookup and validation; it is
//! written only by the risk manager through the engine and read by reference
//! everywhere else.

use crate::types::{checked_div, checked_mul, Bps, Leverage, MarketId, Quote, BPS_DENOMINATOR};
use crate::types::MathError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketRiskConfig {
    pub maintenance_margin_bps: Bps,
    pub initial_margin_bps: Bps,
    pub max_leverage: Leverage,
    pub active: bool,
}

impl MarketRiskConfig {
    pub fn new(maintenance_margin_bps: Bps, initial_margin_bps: Bps, max_leverage: Leverage) -> Self {
        Self {
            maintenance_margin_bps,
            initial_margin_bps,
            max_leverage,
            active: true,
        }
    }

    /// 5% maintenance, 10% initial, 20x cap.
    pub fn standard() -> Self {
        Self::new(Bps::new(500), Bps::new(1000), Leverage::new(20).unwrap_or(Leverage::ONE))
    }

    pub fn validate(&self) -> Result<(), RiskConfigError> {
        let mm = self.maintenance_margin_bps.value();
        let im = self.initial_margin_bps.value();

        if mm < 0 || mm >= 10_000 {
            return Err(RiskConfigError::InvalidParams {
                reason: format!("maintenance margin {mm}bps must be in [0, 10000)"),
            });
        }
        if im <= mm {
            return Err(RiskConfigError::InvalidParams {
                reason: format!("initial margin {im}bps must exceed maintenance margin {mm}bps"),
            });
        }
        if im > 10_000 {
            return Err(RiskConfigError::InvalidParams {
                reason: format!("initial margin {im}bps above 100%"),
            });
        }
        Ok(())
    }

    pub fn maintenance_margin(&self, notional: Decimal) -> Result<Decimal, MathError> {
        margin_for(notional, self.maintenance_margin_bps)
    }

    pub fn initial_margin(&self, notional: Decimal) -> Result<Quote, MathError> {
        margin_for(notional, self.initial_margin_bps).map(Quote::new)
    }
}

fn margin_for(notional: Decimal, rate: Bps) -> Result<Decimal, MathError> {
    let scaled = checked_mul(notional, rate.as_decimal(), "margin requirement")?;
    checked_div(scaled, BPS_DENOMINATOR, "margin requirement")
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RiskConfigError {
    #[error("Invalid risk parameters: {reason}")]
    InvalidParams { reason: String },

    #[error("Market {0:?} is not configured or inactive")]
    MarketNotConfigured(MarketId),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskConfigRegistry {
    markets: HashMap<MarketId, MarketRiskConfig>,
}

impl RiskConfigRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // replaces any previous tier, returns it
    pub fn set(
        &mut self,
        market_id: MarketId,
        config: MarketRiskConfig,
    ) -> Result<Option<MarketRiskConfig>, RiskConfigError> {
        config.validate()?;
        Ok(self.markets.insert(market_id, config))
    }

    pub fn get(&self, market_id: MarketId) -> Option<&MarketRiskConfig> {
        self.markets.get(&market_id)
    }

    /// Config for a market that is configured and active.
    pub fn active(&self, market_id: MarketId) -> Result<&MarketRiskConfig, RiskConfigError> {
        self.markets
            .get(&market_id)
            .filter(|c| c.active)
            .ok_or(RiskConfigError::MarketNotConfigured(market_id))
    }

    pub fn set_active(&mut self, market_id: MarketId, active: bool) -> Result<(), RiskConfigError> {
        let config = self
            .markets
            .get_mut(&market_id)
            .ok_or(RiskConfigError::MarketNotConfigured(market_id))?;
        config.active = active;
        Ok(())
    }

    pub fn markets(&self) -> impl Iterator<Item = (&MarketId, &MarketRiskConfig)> {
        self.markets.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn standard_config_valid() {
        assert!(MarketRiskConfig::standard().validate().is_ok());
    }

    #[test]
    fn initial_must_exceed_maintenance() {
        let config = MarketRiskConfig::new(Bps::new(500), Bps::new(500), Leverage::new(10).unwrap());
        assert!(matches!(
            config.validate(),
            Err(RiskConfigError::InvalidParams { .. })
        ));
    }

    #[test]
    fn maintenance_rate_bounds() {
        let negative = MarketRiskConfig::new(Bps::new(-1), Bps::new(100), Leverage::new(10).unwrap());
        assert!(negative.validate().is_err());

        let too_high = MarketRiskConfig::new(Bps::new(10_000), Bps::new(10_001), Leverage::new(1).unwrap());
        assert!(too_high.validate().is_err());
    }

    #[test]
    fn margin_amounts() {
        let config = MarketRiskConfig::standard();
        // 20k notional at 5% / 10%
        assert_eq!(config.maintenance_margin(dec!(20000)).unwrap(), dec!(1000));
        assert_eq!(config.initial_margin(dec!(20000)).unwrap().value(), dec!(2000));
    }

    #[test]
    fn registry_rejects_invalid_and_tracks_active() {
        let mut registry = RiskConfigRegistry::new();
        let bad = MarketRiskConfig::new(Bps::new(900), Bps::new(100), Leverage::new(10).unwrap());
        assert!(registry.set(MarketId(1), bad).is_err());
        assert!(registry.get(MarketId(1)).is_none());

        registry.set(MarketId(1), MarketRiskConfig::standard()).unwrap();
        assert!(registry.active(MarketId(1)).is_ok());

        registry.set_active(MarketId(1), false).unwrap();
        assert_eq!(
            registry.active(MarketId(1)),
            Err(RiskConfigError::MarketNotConfigured(MarketId(1)))
        );
        assert!(registry.get(MarketId(1)).is_some());
    }

    #[test]
    fn unknown_market_not_configured() {
        let mut registry = RiskConfigRegistry::new();
        assert!(registry.active(MarketId(7)).is_err());
        assert!(registry.set_active(MarketId(7), true).is_err());
    }
}
