//! ADL execution entry point for the liquidation subsystem.

use super::core::Engine;
use super::results::EngineError;
use crate::access::{Authorizer, Role};
use crate::adl::{AdlOutcome, AdlRequest};
use crate::events::{
    AdlTriggeredEvent, CloseReason, EventPayload, PositionClosedEvent, PositionDeleveragedEvent,
};
use crate::price_feed::PriceSource;
use crate::risk::{Module, PauseStatus};
use crate::types::{AccountId, MarketId, PositionId, Price, Side};
use rust_decimal::Decimal;

impl<A: Authorizer, P: PriceSource, G: PauseStatus> Engine<A, P, G> {
    /// Force-closes ranked winners on the side opposite `side` until
    /// `size_to_close` is covered. Partial coverage is a successful outcome
    /// with `fully_covered == false`.
    pub fn execute_adl(
        &mut self,
        caller: AccountId,
        market_id: MarketId,
        liquidated_position: PositionId,
        side: Side,
        size_to_close: Decimal,
        execution_price: Price,
    ) -> Result<AdlOutcome, EngineError> {
        self.require_role(Role::Liquidator, caller)?;
        self.require_running(Module::Adl, market_id)?;

        let request = AdlRequest {
            market_id,
            liquidated_position,
            side,
            size_to_close,
            execution_price,
        };
        // snapshot owners + sizes, closed positions are gone from the store afterwards
        let snapshot: Vec<_> = self
            .adl
            .queue(market_id, side.opposite())
            .iter()
            .filter_map(|c| self.positions.get(c.position_id).cloned())
            .collect();

        let queues_before = self.queue_lengths(market_id);
        let outcome = self
            .adl
            .execute_adl(&mut self.positions, &self.risk, &request, self.current_time)?;

        self.emit_event(EventPayload::AdlTriggered(AdlTriggeredEvent {
            execution_id: outcome.execution_id,
            market_id,
            liquidated_position,
            liquidated_side: side,
            size_to_close,
            total_closed: outcome.total_closed,
            execution_price,
            fully_covered: outcome.fully_covered,
        }));
        for deleveraged in &outcome.deleveraged {
            self.emit_event(EventPayload::PositionDeleveraged(PositionDeleveragedEvent {
                execution_id: outcome.execution_id,
                position_id: deleveraged.position_id,
                owner: deleveraged.owner,
                rank: deleveraged.rank,
                size_closed: deleveraged.size_closed,
                realized_pnl: deleveraged.realized_pnl,
            }));
            if !deleveraged.fully_closed {
                continue;
            }
            if let Some(position) = snapshot.iter().find(|p| p.id == deleveraged.position_id) {
                self.emit_event(EventPayload::PositionClosed(PositionClosedEvent {
                    position_id: position.id,
                    market_id,
                    owner: position.owner,
                    side: position.side,
                    size: position.size,
                    exit_price: execution_price,
                    realized_pnl: deleveraged.realized_pnl,
                    reason: CloseReason::AutoDeleverage,
                }));
            }
        }
        self.emit_queue_changes(market_id, queues_before);
        Ok(outcome)
    }
}
