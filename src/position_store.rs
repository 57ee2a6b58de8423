//! Position lifecycle: open, modify, close, force-close.
//!
//! The store exclusively owns positions, per-trader portfolios and per-market
//! open interest. Every call validates and computes the full after-state with
//! checked arithmetic first and only then writes, so a failed call leaves the
//! store untouched. After each write the store reports the position's
//! profitability to a [`PositionObserver`]; that hook is the only way the ADL
//! queue learns about position state.

use crate::adl::calculate_adl_score;
use crate::position::{
    averaged_entry_price, calculate_liquidation_price, margin_ratio, proportional_pnl, Position,
};
use crate::risk_config::{MarketRiskConfig, RiskConfigRegistry};
use crate::types::{
    checked_add, checked_mul, checked_sub, AccountId, Leverage, MarketId, MathError, PositionId, Price, Quote,
    Side, Timestamp,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// What the update hook forwards for a profitable position. The ADL score
/// is computed when the update is built, so the store can reject an
/// unscorable position before it writes anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfitUpdate {
    pub market_id: MarketId,
    pub position_id: PositionId,
    pub owner: AccountId,
    pub side: Side,
    pub unrealized_pnl: Quote,
    pub leverage: Leverage,
    pub score: Decimal,
    pub timestamp: Timestamp,
}

impl ProfitUpdate {
    pub fn new(
        market_id: MarketId,
        position_id: PositionId,
        owner: AccountId,
        side: Side,
        unrealized_pnl: Quote,
        leverage: Leverage,
        timestamp: Timestamp,
    ) -> Result<Self, MathError> {
        Ok(Self {
            market_id,
            position_id,
            owner,
            side,
            unrealized_pnl,
            leverage,
            score: calculate_adl_score(unrealized_pnl, leverage)?,
            timestamp,
        })
    }

    fn from_position(position: &Position, timestamp: Timestamp) -> Result<Self, MathError> {
        Self::new(
            position.market_id,
            position.id,
            position.owner,
            position.side,
            position.unrealized_pnl,
            position.leverage,
            timestamp,
        )
    }
}

/// Receives the store's state-update hook.
pub trait PositionObserver {
    /// Position is open and its unrealized pnl is positive.
    fn position_updated(&mut self, update: &ProfitUpdate);

    /// Position closed or its pnl is no longer positive.
    fn position_removed(&mut self, market_id: MarketId, position_id: PositionId, side: Side);
}

/// Buffers hook notifications so they can be replayed once the caller
/// releases its borrow of the real observer.
#[derive(Debug, Default, Clone)]
pub struct DeferredNotifications {
    pending: Vec<Notification>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Updated(ProfitUpdate),
    Removed {
        market_id: MarketId,
        position_id: PositionId,
        side: Side,
    },
}

impl DeferredNotifications {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn replay_into<O: PositionObserver + ?Sized>(self, observer: &mut O) {
        for notification in self.pending {
            match notification {
                Notification::Updated(update) => observer.position_updated(&update),
                Notification::Removed {
                    market_id,
                    position_id,
                    side,
                } => observer.position_removed(market_id, position_id, side),
            }
        }
    }
}

impl PositionObserver for DeferredNotifications {
    fn position_updated(&mut self, update: &ProfitUpdate) {
        self.pending.push(Notification::Updated(update.clone()));
    }

    fn position_removed(&mut self, market_id: MarketId, position_id: PositionId, side: Side) {
        self.pending.push(Notification::Removed {
            market_id,
            position_id,
            side,
        });
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenInterest {
    pub long: Decimal,
    pub short: Decimal,
}

impl OpenInterest {
    pub fn side(&self, side: Side) -> Decimal {
        match side {
            Side::Long => self.long,
            Side::Short => self.short,
        }
    }

    pub fn total(&self) -> Decimal {
        self.long + self.short
    }

    fn with_delta(&self, side: Side, delta: Decimal) -> Result<Self, MathError> {
        let mut next = *self;
        let slot = match side {
            Side::Long => &mut next.long,
            Side::Short => &mut next.short,
        };
        *slot = checked_add(*slot, delta, "open interest")?;
        if slot.is_sign_negative() && !slot.is_zero() {
            return Err(MathError::Overflow("open interest underflow"));
        }
        Ok(next)
    }
}

/// Per-trader rollup across open positions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Portfolio {
    pub owner: AccountId,
    pub total_collateral: Quote,
    pub net_unrealized_pnl: Quote,
    // (collateral + pnl) / entry notional
    pub margin_ratio: Decimal,
    pub open_positions: usize,
    pub updated_at: Timestamp,
}

fn build_portfolio<'a>(
    owner: AccountId,
    positions: impl Iterator<Item = &'a Position>,
    now: Timestamp,
) -> Result<Portfolio, MathError> {
    let mut collateral = Decimal::ZERO;
    let mut pnl = Decimal::ZERO;
    let mut notional = Decimal::ZERO;
    let mut count = 0usize;

    for position in positions {
        collateral = checked_add(collateral, position.collateral.value(), "portfolio collateral")?;
        pnl = checked_add(pnl, position.unrealized_pnl.value(), "portfolio pnl")?;
        notional = checked_add(notional, position.notional()?, "portfolio notional")?;
        count += 1;
    }

    let equity = Quote::new(checked_add(collateral, pnl, "portfolio equity")?);
    Ok(Portfolio {
        owner,
        total_collateral: Quote::new(collateral),
        net_unrealized_pnl: Quote::new(pnl),
        margin_ratio: margin_ratio(equity, notional),
        open_positions: count,
        updated_at: now,
    })
}

/// Parameters of a new position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    pub owner: AccountId,
    pub market_id: MarketId,
    pub side: Side,
    pub size: Decimal,
    pub collateral: Quote,
    pub entry_price: Price,
    pub leverage: Leverage,
}

/// A full close, voluntary or forced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedPosition {
    pub position: Position,
    pub exit_price: Price,
    // unrealized pnl at exit plus accumulated funding
    pub realized_pnl: Quote,
}

/// Result of a forced reduction, partial or full.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reduction {
    pub position_id: PositionId,
    pub owner: AccountId,
    pub market_id: MarketId,
    pub side: Side,
    pub size_closed: Decimal,
    pub realized_pnl: Quote,
    pub fully_closed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PositionError {
    #[error("Position {0:?} not found")]
    PositionNotFound(PositionId),

    #[error("Invalid size {0}")]
    InvalidSize(Decimal),

    #[error("Insufficient collateral: {collateral}")]
    InsufficientCollateral { collateral: Decimal },

    #[error("Market {0:?} is not configured or inactive")]
    MarketNotConfigured(MarketId),

    #[error("Leverage {requested} exceeds market max {max}")]
    LeverageExceedsMax { requested: Leverage, max: Leverage },

    #[error("Insufficient initial margin: required {required}, provided {provided}")]
    InsufficientInitialMargin { required: Quote, provided: Quote },

    #[error(transparent)]
    Math(#[from] MathError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PositionRecord {
    position: Position,
    liquidatable: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PositionStore {
    positions: HashMap<PositionId, PositionRecord>,
    by_owner: HashMap<AccountId, Vec<PositionId>>,
    by_market: HashMap<MarketId, BTreeSet<PositionId>>,
    open_interest: HashMap<MarketId, OpenInterest>,
    portfolios: HashMap<AccountId, Portfolio>,
    next_id: u64,
}

impl PositionStore {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Self::default()
        }
    }

    // 4.1: open. validation order: size, collateral, market, leverage, initial margin.
    pub fn open<O: PositionObserver + ?Sized>(
        &mut self,
        request: OpenRequest,
        registry: &RiskConfigRegistry,
        now: Timestamp,
        observer: &mut O,
    ) -> Result<PositionId, PositionError> {
        if request.size <= Decimal::ZERO {
            return Err(PositionError::InvalidSize(request.size));
        }
        if !request.collateral.is_positive() {
            return Err(PositionError::InsufficientCollateral {
                collateral: request.collateral.value(),
            });
        }
        let risk = registry
            .active(request.market_id)
            .map_err(|_| PositionError::MarketNotConfigured(request.market_id))?;
        if request.leverage > risk.max_leverage {
            return Err(PositionError::LeverageExceedsMax {
                requested: request.leverage,
                max: risk.max_leverage,
            });
        }

        let notional = checked_mul(
            request.size,
            request.entry_price.value(),
            "position notional",
        )?;
        check_initial_margin(risk, notional, request.collateral)?;

        let liquidation_price = calculate_liquidation_price(
            request.side,
            request.size,
            request.entry_price,
            request.collateral,
            risk,
        )?;

        let id = PositionId(self.next_id.max(1));
        let position = Position {
            id,
            market_id: request.market_id,
            owner: request.owner,
            side: request.side,
            size: request.size,
            collateral: request.collateral,
            entry_price: request.entry_price,
            leverage: request.leverage,
            funding_index: Decimal::ZERO,
            accumulated_funding: Quote::zero(),
            realized_pnl: Quote::zero(),
            unrealized_pnl: Quote::zero(),
            liquidation_price,
            opened_at: now,
            updated_at: now,
        };

        let oi = self
            .open_interest(request.market_id)
            .with_delta(request.side, request.size)?;
        let portfolio = build_portfolio(
            request.owner,
            self.owner_positions(request.owner).chain(std::iter::once(&position)),
            now,
        )?;
        let notice = stage_notice(&position, now)?;

        // commit
        self.next_id = id.0 + 1;
        self.open_interest.insert(request.market_id, oi);
        self.by_owner.entry(request.owner).or_default().push(id);
        self.by_market.entry(request.market_id).or_default().insert(id);
        self.portfolios.insert(request.owner, portfolio);
        notify(observer, &position, notice);
        let liquidatable = position.is_liquidatable_at(request.entry_price);
        self.positions.insert(
            id,
            PositionRecord {
                position,
                liquidatable,
            },
        );

        debug!(position = id.0, market = request.market_id.0, side = %request.side, "position stored");
        Ok(id)
    }

    // 4.2: size/collateral deltas. reductions realize a proportional pnl share.
    pub fn modify<O: PositionObserver + ?Sized>(
        &mut self,
        position_id: PositionId,
        size_delta: Decimal,
        collateral_delta: Decimal,
        current_price: Price,
        registry: &RiskConfigRegistry,
        now: Timestamp,
        observer: &mut O,
    ) -> Result<Quote, PositionError> {
        let current = self.record(position_id)?.position.clone();
        // increases need an active market, reductions and top-ups only a configured one
        let risk = if size_delta > Decimal::ZERO {
            registry.active(current.market_id).ok()
        } else {
            registry.get(current.market_id)
        }
        .ok_or(PositionError::MarketNotConfigured(current.market_id))?;

        let pnl_before = current.unrealized_pnl_at(current_price)?;
        let mut updated = current.clone();
        let mut realized = Quote::zero();

        if size_delta < Decimal::ZERO {
            let reduction = -size_delta;
            if reduction >= current.size {
                return Err(PositionError::InvalidSize(size_delta));
            }
            realized = proportional_pnl(pnl_before, reduction, current.size)?;
            updated.size = checked_sub(current.size, reduction, "position size")?;
        } else if size_delta > Decimal::ZERO {
            updated.entry_price =
                averaged_entry_price(current.size, current.entry_price, size_delta, current_price)?;
            updated.size = checked_add(current.size, size_delta, "position size")?;
        }

        let new_collateral = checked_add(current.collateral.value(), collateral_delta, "collateral")?;
        if new_collateral <= Decimal::ZERO {
            return Err(PositionError::InsufficientCollateral {
                collateral: current.collateral.value(),
            });
        }
        updated.collateral = Quote::new(new_collateral);

        if size_delta > Decimal::ZERO || collateral_delta < Decimal::ZERO {
            check_initial_margin(risk, updated.notional()?, updated.collateral)?;
        }

        updated.realized_pnl = updated.realized_pnl.checked_add(realized, "realized pnl")?;
        self.commit_update(current, updated, current_price, risk, now, observer)?;
        Ok(realized)
    }

    // 4.3: full close. realizes pnl plus accumulated funding.
    pub fn close<O: PositionObserver + ?Sized>(
        &mut self,
        position_id: PositionId,
        close_price: Price,
        now: Timestamp,
        observer: &mut O,
    ) -> Result<ClosedPosition, PositionError> {
        let position = self.record(position_id)?.position.clone();
        let pnl = position.unrealized_pnl_at(close_price)?;
        let realized = pnl.checked_add(position.accumulated_funding, "close pnl")?;

        let oi = self
            .open_interest(position.market_id)
            .with_delta(position.side, -position.size)?;
        let portfolio = build_portfolio(
            position.owner,
            self.owner_positions(position.owner).filter(|p| p.id != position_id),
            now,
        )?;

        // commit
        self.open_interest.insert(position.market_id, oi);
        self.positions.remove(&position_id);
        if let Some(ids) = self.by_owner.get_mut(&position.owner) {
            ids.retain(|id| *id != position_id);
            if ids.is_empty() {
                self.by_owner.remove(&position.owner);
            }
        }
        if let Some(ids) = self.by_market.get_mut(&position.market_id) {
            ids.remove(&position_id);
        }
        self.portfolios.insert(position.owner, portfolio);
        observer.position_removed(position.market_id, position_id, position.side);

        debug!(position = position_id.0, realized = %realized, "position removed");
        Ok(ClosedPosition {
            position,
            exit_price: close_price,
            realized_pnl: realized,
        })
    }

    /// Close reached through the liquidation or ADL path. Same arithmetic as
    /// [`PositionStore::close`]; the caller tags the outcome.
    pub fn force_close<O: PositionObserver + ?Sized>(
        &mut self,
        position_id: PositionId,
        price: Price,
        now: Timestamp,
        observer: &mut O,
    ) -> Result<ClosedPosition, PositionError> {
        self.close(position_id, price, now, observer)
    }

    /// Forced close of up to `amount`. Anything at or above the position's
    /// size closes it fully.
    pub fn force_reduce<O: PositionObserver + ?Sized>(
        &mut self,
        position_id: PositionId,
        amount: Decimal,
        price: Price,
        registry: &RiskConfigRegistry,
        now: Timestamp,
        observer: &mut O,
    ) -> Result<Reduction, PositionError> {
        if amount <= Decimal::ZERO {
            return Err(PositionError::InvalidSize(amount));
        }
        let current = self.record(position_id)?.position.clone();

        if amount >= current.size {
            let closed = self.force_close(position_id, price, now, observer)?;
            return Ok(Reduction {
                position_id,
                owner: current.owner,
                market_id: current.market_id,
                side: current.side,
                size_closed: current.size,
                realized_pnl: closed.realized_pnl,
                fully_closed: true,
            });
        }

        let risk = registry
            .get(current.market_id)
            .ok_or(PositionError::MarketNotConfigured(current.market_id))?;
        let pnl_before = current.unrealized_pnl_at(price)?;
        let realized = proportional_pnl(pnl_before, amount, current.size)?;

        let mut updated = current.clone();
        updated.size = checked_sub(current.size, amount, "position size")?;
        updated.realized_pnl = updated.realized_pnl.checked_add(realized, "realized pnl")?;
        let reduction = Reduction {
            position_id,
            owner: current.owner,
            market_id: current.market_id,
            side: current.side,
            size_closed: amount,
            realized_pnl: realized,
            fully_closed: false,
        };
        self.commit_update(current, updated, price, risk, now, observer)?;
        Ok(reduction)
    }

    // 4.4: price-driven refresh. recomputes pnl + liquidatable flag, runs the hook.
    pub fn refresh<O: PositionObserver + ?Sized>(
        &mut self,
        position_id: PositionId,
        mark_price: Price,
        now: Timestamp,
        observer: &mut O,
    ) -> Result<bool, PositionError> {
        let record = self.record(position_id)?;
        let mut updated = record.position.clone();
        updated.unrealized_pnl = updated.unrealized_pnl_at(mark_price)?;
        let liquidatable = updated.is_liquidatable_at(mark_price);
        let portfolio = build_portfolio(
            updated.owner,
            self.owner_positions(updated.owner)
                .map(|p| if p.id == position_id { &updated } else { p }),
            now,
        )?;
        let notice = stage_notice(&updated, now)?;

        notify(observer, &updated, notice);
        self.portfolios.insert(updated.owner, portfolio);
        self.positions.insert(
            position_id,
            PositionRecord {
                position: updated,
                liquidatable,
            },
        );
        Ok(liquidatable)
    }

    /// Re-marks every position in the market at one price. Pnl, flags,
    /// hook updates and the owners' portfolios are all staged first, so a
    /// failure part way through leaves the whole market as it was. Returns
    /// the ids that are now liquidatable, ascending.
    pub fn refresh_market<O: PositionObserver + ?Sized>(
        &mut self,
        market_id: MarketId,
        mark_price: Price,
        now: Timestamp,
        observer: &mut O,
    ) -> Result<Vec<PositionId>, PositionError> {
        let ids = self.position_ids_in(market_id);
        let mut updated = HashMap::with_capacity(ids.len());
        let mut staged = Vec::with_capacity(ids.len());
        for id in &ids {
            let mut position = self.record(*id)?.position.clone();
            position.unrealized_pnl = position.unrealized_pnl_at(mark_price)?;
            let liquidatable = position.is_liquidatable_at(mark_price);
            let notice = stage_notice(&position, now)?;
            staged.push((*id, liquidatable, notice));
            updated.insert(*id, position);
        }

        let owners: BTreeSet<AccountId> = updated.values().map(|p: &Position| p.owner).collect();
        let mut portfolios = Vec::with_capacity(owners.len());
        for owner in owners {
            let positions = self
                .owner_positions(owner)
                .map(|p| updated.get(&p.id).unwrap_or(p));
            portfolios.push((owner, build_portfolio(owner, positions, now)?));
        }

        // commit
        for (owner, portfolio) in portfolios {
            self.portfolios.insert(owner, portfolio);
        }
        let mut liquidatable_ids = Vec::new();
        for (id, liquidatable, notice) in staged {
            let Some(position) = updated.remove(&id) else {
                continue;
            };
            notify(observer, &position, notice);
            if liquidatable {
                liquidatable_ids.push(id);
            }
            self.positions.insert(id, PositionRecord { position, liquidatable });
        }
        debug!(market = market_id.0, %mark_price, positions = ids.len(), "market re-marked");
        Ok(liquidatable_ids)
    }

    /// Adds signed funding to each listed position. All amounts are checked
    /// before any ledger is written.
    pub fn apply_funding(
        &mut self,
        payments: &[(PositionId, Quote)],
        funding_index: Decimal,
        now: Timestamp,
    ) -> Result<(), PositionError> {
        let mut staged = Vec::with_capacity(payments.len());
        for (position_id, amount) in payments {
            let record = self.record(*position_id)?;
            let total = record
                .position
                .accumulated_funding
                .checked_add(*amount, "accumulated funding")?;
            staged.push((*position_id, total));
        }

        for (position_id, total) in staged {
            if let Some(record) = self.positions.get_mut(&position_id) {
                record.position.accumulated_funding = total;
                record.position.funding_index = funding_index;
                record.position.updated_at = now;
            }
        }
        Ok(())
    }

    pub fn get(&self, position_id: PositionId) -> Option<&Position> {
        self.positions.get(&position_id).map(|r| &r.position)
    }

    pub fn is_liquidatable(&self, position_id: PositionId) -> Option<bool> {
        self.positions.get(&position_id).map(|r| r.liquidatable)
    }

    pub fn contains(&self, position_id: PositionId) -> bool {
        self.positions.contains_key(&position_id)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn positions_of(&self, owner: AccountId) -> Vec<&Position> {
        self.owner_positions(owner).collect()
    }

    /// Ids of every open position in a market, ascending.
    pub fn position_ids_in(&self, market_id: MarketId) -> Vec<PositionId> {
        self.by_market
            .get(&market_id)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn len_in(&self, market_id: MarketId) -> usize {
        self.by_market.get(&market_id).map_or(0, BTreeSet::len)
    }

    pub fn positions_in(&self, market_id: MarketId) -> impl Iterator<Item = &Position> {
        self.by_market
            .get(&market_id)
            .into_iter()
            .flat_map(|ids| ids.iter())
            .filter_map(|id| self.get(*id))
    }

    pub fn open_interest(&self, market_id: MarketId) -> OpenInterest {
        self.open_interest.get(&market_id).copied().unwrap_or_default()
    }

    pub fn portfolio(&self, owner: AccountId) -> Option<&Portfolio> {
        self.portfolios.get(&owner)
    }

    fn owner_positions(&self, owner: AccountId) -> impl Iterator<Item = &Position> {
        self.by_owner
            .get(&owner)
            .into_iter()
            .flat_map(|ids| ids.iter())
            .filter_map(|id| self.get(*id))
    }

    fn record(&self, position_id: PositionId) -> Result<&PositionRecord, PositionError> {
        self.positions
            .get(&position_id)
            .ok_or(PositionError::PositionNotFound(position_id))
    }

    // recompute caches for an in-place update, stage oi + portfolio, then write
    fn commit_update<O: PositionObserver + ?Sized>(
        &mut self,
        current: Position,
        mut updated: Position,
        mark_price: Price,
        risk: &MarketRiskConfig,
        now: Timestamp,
        observer: &mut O,
    ) -> Result<(), PositionError> {
        updated.liquidation_price = calculate_liquidation_price(
            updated.side,
            updated.size,
            updated.entry_price,
            updated.collateral,
            risk,
        )?;
        updated.unrealized_pnl = updated.unrealized_pnl_at(mark_price)?;
        updated.updated_at = now;
        let liquidatable = updated.is_liquidatable_at(mark_price);

        let size_change = checked_sub(updated.size, current.size, "open interest delta")?;
        let oi = self
            .open_interest(updated.market_id)
            .with_delta(updated.side, size_change)?;
        let portfolio = build_portfolio(
            updated.owner,
            self.owner_positions(updated.owner)
                .map(|p| if p.id == updated.id { &updated } else { p }),
            now,
        )?;
        let notice = stage_notice(&updated, now)?;

        self.open_interest.insert(updated.market_id, oi);
        self.portfolios.insert(updated.owner, portfolio);
        notify(observer, &updated, notice);
        debug!(
            position = updated.id.0,
            size = %updated.size,
            collateral = %updated.collateral,
            liquidation_price = %updated.liquidation_price,
            "position updated"
        );
        self.positions.insert(
            updated.id,
            PositionRecord {
                position: updated,
                liquidatable,
            },
        );
        Ok(())
    }
}

fn check_initial_margin(
    risk: &MarketRiskConfig,
    notional: Decimal,
    collateral: Quote,
) -> Result<(), PositionError> {
    let required = risk.initial_margin(notional)?;
    if collateral < required {
        return Err(PositionError::InsufficientInitialMargin {
            required,
            provided: collateral,
        });
    }
    Ok(())
}

// None means the position leaves the queue
fn stage_notice(position: &Position, now: Timestamp) -> Result<Option<ProfitUpdate>, MathError> {
    if !position.is_profitable() {
        return Ok(None);
    }
    ProfitUpdate::from_position(position, now).map(Some)
}

fn notify<O: PositionObserver + ?Sized>(observer: &mut O, position: &Position, notice: Option<ProfitUpdate>) {
    match notice {
        Some(update) => observer.position_updated(&update),
        None => observer.position_removed(position.market_id, position.id, position.side),
    }
}
