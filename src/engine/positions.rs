//! Trading entry point and forced closes.
//!
//! Every call checks the caller's role, then the pause/circuit gates, then
//! hands the mutation to the position store with the ADL queue as its update
//! hook. Events are collected after the store has committed.

use super::core::Engine;
use super::results::EngineError;
use crate::access::{Authorizer, Role};
use crate::events::{
    CloseReason, EventPayload, PositionClosedEvent, PositionLiquidatedEvent, PositionModifiedEvent,
    PositionOpenedEvent,
};
use crate::position_store::{ClosedPosition, OpenRequest, PositionError};
use crate::price_feed::PriceSource;
use crate::risk::{Module, PauseStatus};
use crate::types::{AccountId, PositionId, Price, Quote};
use rust_decimal::Decimal;
use tracing::info;

impl<A: Authorizer, P: PriceSource, G: PauseStatus> Engine<A, P, G> {
    /// Opens a position at the request's entry price.
    pub fn open_position(&mut self, caller: AccountId, request: OpenRequest) -> Result<PositionId, EngineError> {
        self.require_role(Role::TradingEntry, caller)?;
        self.require_running(Module::Positions, request.market_id)?;

        let market_id = request.market_id;
        let queues_before = self.queue_lengths(market_id);
        let position_id = self
            .positions
            .open(request, &self.risk, self.current_time, &mut self.adl)?;

        let position = self
            .positions
            .get(position_id)
            .ok_or(PositionError::PositionNotFound(position_id))?;
        let event = PositionOpenedEvent {
            position_id,
            market_id,
            owner: position.owner,
            side: position.side,
            size: position.size,
            collateral: position.collateral,
            entry_price: position.entry_price,
            leverage: position.leverage,
            liquidation_price: position.liquidation_price,
        };
        info!(
            position = position_id.0,
            market = market_id.0,
            owner = event.owner.0,
            side = %event.side,
            size = %event.size,
            liquidation_price = %event.liquidation_price,
            "position opened"
        );
        self.emit_event(EventPayload::PositionOpened(event));
        self.emit_queue_changes(market_id, queues_before);
        Ok(position_id)
    }

    /// Applies size and collateral deltas at the oracle price. Returns the
    /// pnl realized by a size reduction, zero otherwise.
    pub fn modify_position(
        &mut self,
        caller: AccountId,
        position_id: PositionId,
        size_delta: Decimal,
        collateral_delta: Decimal,
    ) -> Result<Quote, EngineError> {
        self.require_role(Role::TradingEntry, caller)?;
        let before = self
            .positions
            .get(position_id)
            .cloned()
            .ok_or(PositionError::PositionNotFound(position_id))?;
        self.require_running(Module::Positions, before.market_id)?;
        let price = self.current_price(before.market_id)?;

        let queues_before = self.queue_lengths(before.market_id);
        let realized = self.positions.modify(
            position_id,
            size_delta,
            collateral_delta,
            price,
            &self.risk,
            self.current_time,
            &mut self.adl,
        )?;

        if let Some(after) = self.positions.get(position_id) {
            let event = PositionModifiedEvent {
                position_id,
                market_id: before.market_id,
                owner: before.owner,
                old_size: before.size,
                new_size: after.size,
                old_collateral: before.collateral,
                new_collateral: after.collateral,
                realized_pnl: realized,
                liquidation_price: after.liquidation_price,
            };
            info!(
                position = position_id.0,
                size = %event.new_size,
                collateral = %event.new_collateral,
                realized = %realized,
                "position modified"
            );
            self.emit_event(EventPayload::PositionModified(event));
        }
        self.emit_queue_changes(before.market_id, queues_before);
        Ok(realized)
    }

    /// Full close at the oracle price. Returns unrealized pnl plus
    /// accumulated funding.
    pub fn close_position(&mut self, caller: AccountId, position_id: PositionId) -> Result<Quote, EngineError> {
        self.require_role(Role::TradingEntry, caller)?;
        let market_id = self
            .positions
            .get(position_id)
            .map(|p| p.market_id)
            .ok_or(PositionError::PositionNotFound(position_id))?;
        self.require_running(Module::Positions, market_id)?;
        let price = self.current_price(market_id)?;

        let queues_before = self.queue_lengths(market_id);
        let closed = self
            .positions
            .close(position_id, price, self.current_time, &mut self.adl)?;
        self.record_close(&closed, CloseReason::UserClose);
        self.emit_queue_changes(market_id, queues_before);
        Ok(closed.realized_pnl)
    }

    /// Close from the liquidation subsystem at a caller-supplied price.
    /// `is_liquidation` only changes how the close is reported.
    pub fn force_close(
        &mut self,
        caller: AccountId,
        position_id: PositionId,
        price: Price,
        is_liquidation: bool,
    ) -> Result<Quote, EngineError> {
        self.require_role(Role::Liquidator, caller)?;
        let market_id = self
            .positions
            .get(position_id)
            .map(|p| p.market_id)
            .ok_or(PositionError::PositionNotFound(position_id))?;
        self.require_running(Module::Positions, market_id)?;

        let queues_before = self.queue_lengths(market_id);
        let closed = self
            .positions
            .force_close(position_id, price, self.current_time, &mut self.adl)?;

        let reason = if is_liquidation {
            CloseReason::Liquidation
        } else {
            CloseReason::AutoDeleverage
        };
        self.record_close(&closed, reason);
        if is_liquidation {
            self.emit_event(EventPayload::PositionLiquidated(PositionLiquidatedEvent {
                position_id,
                market_id,
                owner: closed.position.owner,
                size: closed.position.size,
                price,
                realized_pnl: closed.realized_pnl,
            }));
        }
        self.emit_queue_changes(market_id, queues_before);
        Ok(closed.realized_pnl)
    }

    fn record_close(&mut self, closed: &ClosedPosition, reason: CloseReason) {
        let position = &closed.position;
        info!(
            position = position.id.0,
            market = position.market_id.0,
            realized = %closed.realized_pnl,
            ?reason,
            "position closed"
        );
        self.emit_event(EventPayload::PositionClosed(PositionClosedEvent {
            position_id: position.id,
            market_id: position.market_id,
            owner: position.owner,
            side: position.side,
            size: position.size,
            exit_price: closed.exit_price,
            realized_pnl: closed.realized_pnl,
            reason,
        }));
    }
}
