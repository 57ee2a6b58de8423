// 11.0: every state change produces an event. used for audit trails and for off-chain indexers.
// the EventPayload enum lists all event types. the engine stamps id + time and keeps a bounded log.

use crate::adl::AdlConfig;
use crate::risk_config::MarketRiskConfig;
use crate::types::{AccountId, Bps, Leverage, MarketId, PositionId, Price, Quote, Side, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventPayload {
    // Position events
    PositionOpened(PositionOpenedEvent),
    PositionModified(PositionModifiedEvent),
    PositionClosed(PositionClosedEvent),
    PositionLiquidated(PositionLiquidatedEvent),

    // ADL events
    AdlTriggered(AdlTriggeredEvent),
    PositionDeleveraged(PositionDeleveragedEvent),
    AdlQueueLengthChanged(AdlQueueLengthChangedEvent),

    // Funding events
    FundingApplied(FundingAppliedEvent),
    FundingPaid(FundingPaidEvent),

    // Config events
    RiskConfigUpdated(RiskConfigUpdatedEvent),
    AdlConfigUpdated(AdlConfigUpdatedEvent),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionOpenedEvent {
    pub position_id: PositionId,
    pub market_id: MarketId,
    pub owner: AccountId,
    pub side: Side,
    pub size: Decimal,
    pub collateral: Quote,
    pub entry_price: Price,
    pub leverage: Leverage,
    pub liquidation_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionModifiedEvent {
    pub position_id: PositionId,
    pub market_id: MarketId,
    pub owner: AccountId,
    pub old_size: Decimal,
    pub new_size: Decimal,
    pub old_collateral: Quote,
    pub new_collateral: Quote,
    pub realized_pnl: Quote,
    pub liquidation_price: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    UserClose,
    Liquidation,
    AutoDeleverage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionClosedEvent {
    pub position_id: PositionId,
    pub market_id: MarketId,
    pub owner: AccountId,
    pub side: Side,
    pub size: Decimal,
    pub exit_price: Price,
    pub realized_pnl: Quote,
    pub reason: CloseReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionLiquidatedEvent {
    pub position_id: PositionId,
    pub market_id: MarketId,
    pub owner: AccountId,
    pub size: Decimal,
    pub price: Price,
    pub realized_pnl: Quote,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdlTriggeredEvent {
    pub execution_id: u64,
    pub market_id: MarketId,
    pub liquidated_position: PositionId,
    pub liquidated_side: Side,
    pub size_to_close: Decimal,
    pub total_closed: Decimal,
    pub execution_price: Price,
    pub fully_covered: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionDeleveragedEvent {
    pub execution_id: u64,
    pub position_id: PositionId,
    pub owner: AccountId,
    pub rank: usize,
    pub size_closed: Decimal,
    pub realized_pnl: Quote,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdlQueueLengthChangedEvent {
    pub market_id: MarketId,
    pub side: Side,
    pub old_length: usize,
    pub new_length: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingAppliedEvent {
    pub market_id: MarketId,
    pub rate_bps: Bps,
    pub periods: u64,
    pub total_paid: Quote,
    pub positions: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingPaidEvent {
    pub market_id: MarketId,
    pub position_id: PositionId,
    pub owner: AccountId,
    // negative = paid
    pub amount: Quote,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskConfigUpdatedEvent {
    pub market_id: MarketId,
    pub previous: Option<MarketRiskConfig>,
    pub config: MarketRiskConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdlConfigUpdatedEvent {
    pub market_id: MarketId,
    pub config: AdlConfig,
}

pub trait EventEmitter {
    fn emit(&mut self, event: Event);
}

/// Bounded in-memory event log. Oldest events drop first.
#[derive(Debug, Clone)]
pub struct EventLog {
    events: Vec<Event>,
    next_id: u64,
    capacity: usize,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(100_000)
    }
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Vec::new(),
            next_id: 1,
            capacity,
        }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn recent(&self, count: usize) -> &[Event] {
        let start = self.events.len().saturating_sub(count);
        &self.events[start..]
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn next_id(&mut self) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        id
    }
}

impl EventEmitter for EventLog {
    fn emit(&mut self, event: Event) {
        self.events.push(event);
        if self.events.len() > self.capacity {
            let drain_count = self.events.len() - self.capacity;
            self.events.drain(0..drain_count);
        }
    }
}
