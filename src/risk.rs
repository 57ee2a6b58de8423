//! Module pauses and per-market circuit breakers.
//!
//! Every state mutation consults a [`PauseStatus`] first and is refused while
//! its module is paused or its market's breaker is tripped. [`CircuitBoard`]
//! is the in-memory implementation: breakers record why and when they
//! tripped and can only be reset once a cooldown has passed.

use crate::types::{MarketId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::{info, warn};

/// Independently pausable parts of the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Module {
    Positions,
    Adl,
    Funding,
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Module::Positions => "positions",
            Module::Adl => "adl",
            Module::Funding => "funding",
        };
        f.write_str(name)
    }
}

pub trait PauseStatus {
    fn is_paused(&self, module: Module) -> bool;
    fn is_circuit_tripped(&self, market_id: MarketId) -> bool;
}

/// Why a breaker was tripped. Breakers are only tripped by an operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitBreakerReason {
    ManualHalt { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrippedBreaker {
    pub reason: CircuitBreakerReason,
    pub triggered_at: Timestamp,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CircuitBoard {
    paused: HashSet<Module>,
    tripped: HashMap<MarketId, TrippedBreaker>,
    /// Minimum time a breaker stays tripped, in milliseconds.
    pub cooldown_ms: i64,
}

impl CircuitBoard {
    pub fn new(cooldown_ms: i64) -> Self {
        Self {
            cooldown_ms,
            ..Self::default()
        }
    }

    pub fn pause(&mut self, module: Module) {
        if self.paused.insert(module) {
            warn!(%module, "module paused");
        }
    }

    pub fn unpause(&mut self, module: Module) {
        if self.paused.remove(&module) {
            info!(%module, "module unpaused");
        }
    }

    /// Trip a market's breaker. A breaker that is already tripped keeps its
    /// original reason and trigger time.
    pub fn trip(&mut self, market_id: MarketId, reason: CircuitBreakerReason, timestamp: Timestamp) {
        self.tripped.entry(market_id).or_insert_with(|| {
            warn!(market = market_id.0, ?reason, "circuit breaker tripped");
            TrippedBreaker {
                reason,
                triggered_at: timestamp,
            }
        });
    }

    pub fn breaker(&self, market_id: MarketId) -> Option<&TrippedBreaker> {
        self.tripped.get(&market_id)
    }

    pub fn can_reset(&self, market_id: MarketId, current: Timestamp) -> bool {
        match self.tripped.get(&market_id) {
            Some(breaker) => {
                current.as_millis().saturating_sub(breaker.triggered_at.as_millis()) >= self.cooldown_ms
            }
            None => true,
        }
    }

    /// Reset after cooldown. Returns false if the cooldown hasn't passed.
    pub fn reset(&mut self, market_id: MarketId, current: Timestamp) -> bool {
        if !self.can_reset(market_id, current) {
            return false;
        }
        if self.tripped.remove(&market_id).is_some() {
            info!(market = market_id.0, "circuit breaker reset");
        }
        true
    }
}

impl PauseStatus for CircuitBoard {
    fn is_paused(&self, module: Module) -> bool {
        self.paused.contains(&module)
    }

    fn is_circuit_tripped(&self, market_id: MarketId) -> bool {
        self.tripped.contains_key(&market_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pause_is_per_module() {
        let mut board = CircuitBoard::new(0);
        board.pause(Module::Funding);
        assert!(board.is_paused(Module::Funding));
        assert!(!board.is_paused(Module::Positions));
        board.unpause(Module::Funding);
        assert!(!board.is_paused(Module::Funding));
    }

    #[test]
    fn breaker_cooldown() {
        let mut board = CircuitBoard::new(300_000);
        let market = MarketId(1);
        board.trip(
            market,
            CircuitBreakerReason::ManualHalt {
                reason: "price spike".to_string(),
            },
            Timestamp::from_millis(1_000),
        );
        assert!(board.is_circuit_tripped(market));
        assert!(!board.is_circuit_tripped(MarketId(2)));

        assert!(!board.reset(market, Timestamp::from_millis(200_000)));
        assert!(board.is_circuit_tripped(market));
        assert!(board.reset(market, Timestamp::from_millis(301_000)));
        assert!(!board.is_circuit_tripped(market));
    }

    #[test]
    fn second_trip_keeps_first_reason() {
        let mut board = CircuitBoard::new(10);
        let market = MarketId(3);
        board.trip(
            market,
            CircuitBreakerReason::ManualHalt {
                reason: "maintenance".to_string(),
            },
            Timestamp::from_millis(5),
        );
        board.trip(
            market,
            CircuitBreakerReason::ManualHalt {
                reason: "second".to_string(),
            },
            Timestamp::from_millis(9),
        );
        let breaker = board.breaker(market).unwrap();
        assert_eq!(breaker.triggered_at, Timestamp::from_millis(5));
        assert_eq!(
            breaker.reason,
            CircuitBreakerReason::ManualHalt {
                reason: "maintenance".to_string()
            }
        );
    }
}
