//! Funding rate settlement.

use super::core::Engine;
use super::results::EngineError;
use crate::access::{Authorizer, Role};
use crate::events::{EventPayload, FundingAppliedEvent, FundingPaidEvent};
use crate::funding::FundingSettlement;
use crate::price_feed::PriceSource;
use crate::risk::{Module, PauseStatus};
use crate::types::{AccountId, MarketId};

impl<A: Authorizer, P: PriceSource, G: PauseStatus> Engine<A, P, G> {
    /// Settle funding for a market. Keeper only.
    pub fn settle_funding(&mut self, caller: AccountId, market_id: MarketId) -> Result<FundingSettlement, EngineError> {
        self.require_role(Role::Keeper, caller)?;
        self.require_running(Module::Funding, market_id)?;

        let settlement = self
            .funding
            .settle(market_id, &mut self.positions, self.current_time)?;

        if settlement.periods > 0 {
            self.emit_event(EventPayload::FundingApplied(FundingAppliedEvent {
                market_id,
                rate_bps: settlement.rate_bps,
                periods: settlement.periods,
                total_paid: settlement.total_paid,
                positions: settlement.payments.len(),
            }));
        }
        for payment in &settlement.payments {
            self.emit_event(EventPayload::FundingPaid(FundingPaidEvent {
                market_id,
                position_id: payment.position_id,
                owner: payment.owner,
                amount: payment.amount,
            }));
        }
        Ok(settlement)
    }
}
