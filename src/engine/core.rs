// 8.0 engine/core.rs: main engine. owns the risk registry, position store, adl queue and funding book.
// collaborators (roles, prices, pause/circuit status) come in as traits and are only ever read.

use super::config::EngineConfig;
use super::results::EngineError;
use crate::access::{Authorizer, Role, RoleTable};
use crate::adl::{AdlCandidate, AdlConfig, AdlExecution, AdlQueue};
use crate::config::{ConfigError, CoreConfig};
use crate::events::{AdlQueueLengthChangedEvent, Event, EventEmitter, EventLog, EventPayload};
use crate::funding::{FundingBook, FundingConfig, FundingRateState};
use crate::position::Position;
use crate::position_store::{OpenInterest, Portfolio, PositionStore};
use crate::price_feed::{OracleBook, PriceSource};
use crate::risk::{CircuitBoard, Module, PauseStatus};
use crate::risk_config::{MarketRiskConfig, RiskConfigRegistry};
use crate::types::{AccountId, Bps, MarketId, PositionId, Price, Side, Timestamp};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/** 8.1: main engine struct. all state lives here */
#[derive(Debug)]
pub struct Engine<A = RoleTable, P = OracleBook, G = CircuitBoard> {
    pub(super) config: EngineConfig,
    pub(super) risk: RiskConfigRegistry,
    pub(super) positions: PositionStore,
    pub(super) adl: AdlQueue,
    pub(super) funding: FundingBook,
    pub(super) events: EventLog,
    pub(super) market_names: HashMap<MarketId, String>,
    pub(super) authorizer: A,
    pub(super) prices: P,
    pub(super) gate: G,
    pub(super) current_time: Timestamp,
}

impl Engine {
    /// Engine with the in-memory collaborators and no markets.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_collaborators(config, RoleTable::new(), OracleBook::new(), CircuitBoard::default())
    }
}

impl<A: Authorizer, P: PriceSource, G: PauseStatus> Engine<A, P, G> {
    pub fn with_collaborators(config: EngineConfig, authorizer: A, prices: P, gate: G) -> Self {
        Self {
            risk: RiskConfigRegistry::new(),
            positions: PositionStore::new(),
            adl: AdlQueue::new(config.max_adl_history),
            funding: FundingBook::new(),
            events: EventLog::new(config.max_events),
            market_names: HashMap::new(),
            config,
            authorizer,
            prices,
            gate,
            current_time: Timestamp::from_millis(0),
        }
    }

    /// Validates the config and installs every market it lists.
    pub fn from_config(core: &CoreConfig, authorizer: A, prices: P, gate: G) -> Result<Self, ConfigError> {
        core.validate()?;
        let mut engine = Self::with_collaborators(core.engine.clone(), authorizer, prices, gate);
        for market in &core.markets {
            engine.risk.set(market.market_id, market.risk.clone())?;
            engine.adl.configure(market.market_id, market.adl.clone())?;
            engine
                .funding
                .configure(market.market_id, market.funding.clone(), engine.current_time)?;
            engine.market_names.insert(market.market_id, market.name.clone());
            info!(market = market.market_id.0, name = %market.name, "market installed");
        }
        Ok(engine)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn set_time(&mut self, timestamp: Timestamp) {
        self.current_time = timestamp;
    }

    pub fn time(&self) -> Timestamp {
        self.current_time
    }

    pub fn advance_time(&mut self, millis: i64) {
        self.current_time = Timestamp::from_millis(self.current_time.as_millis() + millis);
    }

    pub fn authorizer(&self) -> &A {
        &self.authorizer
    }

    pub fn authorizer_mut(&mut self) -> &mut A {
        &mut self.authorizer
    }

    pub fn prices(&self) -> &P {
        &self.prices
    }

    pub fn prices_mut(&mut self) -> &mut P {
        &mut self.prices
    }

    pub fn gate(&self) -> &G {
        &self.gate
    }

    pub fn gate_mut(&mut self) -> &mut G {
        &mut self.gate
    }

    // queries. read-only, always see committed state.

    pub fn market_name(&self, market_id: MarketId) -> Option<&str> {
        self.market_names.get(&market_id).map(String::as_str)
    }

    pub fn risk_config(&self, market_id: MarketId) -> Option<&MarketRiskConfig> {
        self.risk.get(market_id)
    }

    pub fn position(&self, position_id: PositionId) -> Option<&Position> {
        self.positions.get(position_id)
    }

    pub fn is_liquidatable(&self, position_id: PositionId) -> Option<bool> {
        self.positions.is_liquidatable(position_id)
    }

    pub fn positions_of(&self, owner: AccountId) -> Vec<&Position> {
        self.positions.positions_of(owner)
    }

    pub fn portfolio(&self, owner: AccountId) -> Option<&Portfolio> {
        self.positions.portfolio(owner)
    }

    pub fn open_interest(&self, market_id: MarketId) -> OpenInterest {
        self.positions.open_interest(market_id)
    }

    pub fn adl_config(&self, market_id: MarketId) -> Option<&AdlConfig> {
        self.adl.config(market_id)
    }

    pub fn adl_queue(&self, market_id: MarketId, side: Side) -> Vec<&AdlCandidate> {
        self.adl.queue(market_id, side)
    }

    /// 1-based rank in the (market, side) ADL queue.
    pub fn candidate_rank(&self, market_id: MarketId, position_id: PositionId, side: Side) -> Option<usize> {
        self.adl.rank(market_id, position_id, side)
    }

    pub fn adl_history(&self, market_id: MarketId) -> Vec<&AdlExecution> {
        self.adl.history(market_id)
    }

    pub fn adl_event_count(&self, market_id: MarketId) -> u64 {
        self.adl.event_count(market_id)
    }

    pub fn funding_config(&self, market_id: MarketId) -> Option<&FundingConfig> {
        self.funding.config(market_id)
    }

    pub fn funding_state(&self, market_id: MarketId) -> Option<&FundingRateState> {
        self.funding.state(market_id)
    }

    pub fn preview_funding_rate(&self, market_id: MarketId) -> Result<Bps, EngineError> {
        Ok(self.funding.preview_rate(market_id, &self.positions)?)
    }

    /// Seconds until the next settlement is allowed.
    pub fn time_until_next_funding(&self, market_id: MarketId) -> Result<u64, EngineError> {
        Ok(self.funding.time_until_next(market_id, self.current_time)?)
    }

    pub fn events(&self) -> &[Event] {
        self.events.events()
    }

    pub fn recent_events(&self, count: usize) -> &[Event] {
        self.events.recent(count)
    }

    // gates

    pub(super) fn require_role(&self, role: Role, caller: AccountId) -> Result<(), EngineError> {
        if self.authorizer.has_role(role, caller) {
            return Ok(());
        }
        warn!(%role, caller = caller.0, "unauthorized call refused");
        Err(EngineError::Unauthorized { role, caller })
    }

    pub(super) fn require_running(&self, module: Module, market_id: MarketId) -> Result<(), EngineError> {
        if self.gate.is_paused(module) {
            warn!(%module, market = market_id.0, "call refused, module paused");
            return Err(EngineError::ModulePaused(module));
        }
        if self.gate.is_circuit_tripped(market_id) {
            warn!(market = market_id.0, "call refused, circuit breaker tripped");
            return Err(EngineError::CircuitTripped(market_id));
        }
        Ok(())
    }

    pub(super) fn current_price(&self, market_id: MarketId) -> Result<Price, EngineError> {
        self.prices
            .get_price(market_id)
            .map(|update| update.price)
            .ok_or(EngineError::NoPrice(market_id))
    }

    // events

    pub(super) fn queue_lengths(&self, market_id: MarketId) -> [usize; 2] {
        [
            self.adl.queue_len(market_id, Side::Long),
            self.adl.queue_len(market_id, Side::Short),
        ]
    }

    pub(super) fn emit_queue_changes(&mut self, market_id: MarketId, before: [usize; 2]) {
        let after = self.queue_lengths(market_id);
        for (i, side) in [Side::Long, Side::Short].into_iter().enumerate() {
            if before[i] != after[i] {
                self.emit_event(EventPayload::AdlQueueLengthChanged(AdlQueueLengthChangedEvent {
                    market_id,
                    side,
                    old_length: before[i],
                    new_length: after[i],
                }));
            }
        }
    }

    pub(super) fn emit_event(&mut self, payload: EventPayload) {
        let event = Event::new(self.events.next_id(), self.current_time, payload);
        debug!(event = event.id.0, payload = ?event.payload, "event");
        self.events.emit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventId;
    use crate::position_store::OpenRequest;
    use crate::types::{Leverage, Quote};
    use rust_decimal_macros::dec;

    fn engine() -> Engine {
        let mut roles = RoleTable::new();
        roles.grant(Role::TradingEntry, AccountId(1));
        Engine::from_config(&CoreConfig::default(), roles, OracleBook::new(), CircuitBoard::default()).unwrap()
    }

    fn request() -> OpenRequest {
        OpenRequest {
            owner: AccountId(7),
            market_id: MarketId(1),
            side: Side::Long,
            size: dec!(1),
            collateral: Quote::new(dec!(500)),
            entry_price: Price::new_unchecked(dec!(2000)),
            leverage: Leverage::new(4).unwrap(),
        }
    }

    #[test]
    #[tracing_test::traced_test]
    fn refused_call_is_logged() {
        let mut engine = engine();
        assert!(engine.open_position(AccountId(2), request()).is_err());
        assert!(logs_contain("unauthorized call refused"));
        assert!(engine.events().is_empty());
    }

    #[test]
    #[tracing_test::traced_test]
    fn open_is_logged_and_recorded() {
        let mut engine = engine();
        let id = engine.open_position(AccountId(1), request()).unwrap();
        assert!(logs_contain("position opened"));
        assert_eq!(engine.positions_of(AccountId(7)).len(), 1);
        assert_eq!(engine.portfolio(AccountId(7)).unwrap().open_positions, 1);
        assert_eq!(engine.recent_events(1)[0].id, EventId(1));
        assert_eq!(engine.position(id).unwrap().liquidation_price, dec!(1600));
    }

    #[test]
    fn clock_is_caller_driven() {
        let mut engine = engine();
        assert_eq!(engine.time(), Timestamp::from_millis(0));
        engine.advance_time(1_500);
        engine.advance_time(500);
        assert_eq!(engine.time(), Timestamp::from_millis(2_000));
        engine.set_time(Timestamp::from_secs(10));
        assert_eq!(engine.time().as_millis(), 10_000);
    }
}
