//! Risk-manager configuration.
//!
//! Config calls are not tied to a pausable module, so they stay available
//! while trading is halted.

use super::core::Engine;
use super::results::EngineError;
use crate::access::{Authorizer, Role};
use crate::adl::AdlConfig;
use crate::events::{AdlConfigUpdatedEvent, EventPayload, RiskConfigUpdatedEvent};
use crate::funding::FundingConfig;
use crate::price_feed::PriceSource;
use crate::risk::PauseStatus;
use crate::risk_config::MarketRiskConfig;
use crate::types::{AccountId, Bps, MarketId};
use tracing::info;

impl<A: Authorizer, P: PriceSource, G: PauseStatus> Engine<A, P, G> {
    /// Installs or replaces a market's margin tier. Existing positions keep
    /// their cached liquidation price until their next update.
    pub fn configure_market(
        &mut self,
        caller: AccountId,
        market_id: MarketId,
        config: MarketRiskConfig,
    ) -> Result<(), EngineError> {
        self.require_role(Role::RiskManager, caller)?;
        let previous = self.risk.set(market_id, config.clone())?;
        info!(market = market_id.0, mm = %config.maintenance_margin_bps, im = %config.initial_margin_bps, "risk config updated");
        self.emit_event(EventPayload::RiskConfigUpdated(RiskConfigUpdatedEvent {
            market_id,
            previous,
            config,
        }));
        Ok(())
    }

    /// Inactive markets refuse new positions and size increases.
    pub fn set_market_active(&mut self, caller: AccountId, market_id: MarketId, active: bool) -> Result<(), EngineError> {
        self.require_role(Role::RiskManager, caller)?;
        let previous = self.risk.get(market_id).cloned();
        self.risk.set_active(market_id, active)?;
        if let Some(config) = self.risk.get(market_id).cloned() {
            info!(market = market_id.0, active, "market activity changed");
            self.emit_event(EventPayload::RiskConfigUpdated(RiskConfigUpdatedEvent {
                market_id,
                previous,
                config,
            }));
        }
        Ok(())
    }

    /// Configures ADL for a market and marks it active.
    pub fn configure_adl(
        &mut self,
        caller: AccountId,
        market_id: MarketId,
        insurance_fund_threshold_bps: Bps,
        max_positions_per_event: u32,
        grace_period_secs: u64,
    ) -> Result<(), EngineError> {
        self.require_role(Role::RiskManager, caller)?;
        let config = AdlConfig::new(insurance_fund_threshold_bps, max_positions_per_event, grace_period_secs);
        self.adl.configure(market_id, config.clone())?;
        info!(market = market_id.0, max_positions_per_event, grace_period_secs, "adl configured");
        self.emit_event(EventPayload::AdlConfigUpdated(AdlConfigUpdatedEvent { market_id, config }));
        Ok(())
    }

    /// Flips ADL on or off. Returns the new state.
    pub fn toggle_adl(&mut self, caller: AccountId, market_id: MarketId) -> Result<bool, EngineError> {
        self.require_role(Role::RiskManager, caller)?;
        let active = self.adl.toggle(market_id)?;
        if let Some(config) = self.adl.config(market_id).cloned() {
            self.emit_event(EventPayload::AdlConfigUpdated(AdlConfigUpdatedEvent { market_id, config }));
        }
        info!(market = market_id.0, active, "adl toggled");
        Ok(active)
    }

    pub fn configure_funding(
        &mut self,
        caller: AccountId,
        market_id: MarketId,
        config: FundingConfig,
    ) -> Result<(), EngineError> {
        self.require_role(Role::RiskManager, caller)?;
        self.funding.configure(market_id, config, self.current_time)?;
        info!(market = market_id.0, "funding configured");
        Ok(())
    }
}
