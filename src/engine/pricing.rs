//! Price-driven refresh.

use super::core::Engine;
use super::results::{EngineError, RefreshResult};
use crate::access::{Authorizer, Role};
use crate::price_feed::PriceSource;
use crate::risk::{Module, PauseStatus};
use crate::types::{AccountId, MarketId};
use tracing::{debug, info};

impl<A: Authorizer, P: PriceSource, G: PauseStatus> Engine<A, P, G> {
    /// Re-marks every open position in the market at the oracle price,
    /// pushing profitability into the ADL queue. Returns the positions that
    /// are now liquidatable. Either the whole market is re-marked or nothing
    /// changes.
    pub fn refresh_market(&mut self, caller: AccountId, market_id: MarketId) -> Result<RefreshResult, EngineError> {
        self.require_role(Role::Keeper, caller)?;
        self.require_running(Module::Positions, market_id)?;
        let price = self.current_price(market_id)?;

        let refreshed = self.positions.len_in(market_id);
        let queues_before = self.queue_lengths(market_id);
        let liquidatable = self
            .positions
            .refresh_market(market_id, price, self.current_time, &mut self.adl)?;
        debug!(market = market_id.0, %price, positions = refreshed, "market refreshed");
        if !liquidatable.is_empty() {
            info!(market = market_id.0, count = liquidatable.len(), "liquidatable positions found");
        }
        self.emit_queue_changes(market_id, queues_before);

        Ok(RefreshResult {
            market_id,
            positions_refreshed: refreshed,
            liquidatable,
        })
    }
}
