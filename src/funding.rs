// 5.0: funding settlement. every period the heavier side of open interest pays the lighter side.
// 5.1 has the rate calculation, 5.2 the per-position payment plan, 5.3 the book that keeps per-market state.
// payers pay size * rate * periods / 10000. receivers split exactly what was paid, pro-rata by size.

use crate::position_store::{OpenInterest, PositionError, PositionStore};
use crate::types::{
    checked_add, checked_div, checked_mul, checked_sub, AccountId, Bps, MarketId, MathError, PositionId, Quote,
    Side, Timestamp, BPS_DENOMINATOR,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingConfig {
    pub enabled: bool,
    pub period_secs: u64,
    pub max_rate_bps: Bps,
}

impl Default for FundingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            period_secs: 8 * 3600,
            max_rate_bps: Bps::new(300),
        }
    }
}

impl FundingConfig {
    pub fn validate(&self) -> Result<(), FundingError> {
        let max = self.max_rate_bps.value();
        if !(0..=10_000).contains(&max) {
            return Err(FundingError::InvalidConfig {
                reason: format!("max funding rate {max}bps must be in [0, 10000]"),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingRateState {
    pub last_settlement: Timestamp,
    pub last_rate_bps: Bps,
    // running sum of rate_bps * periods
    pub cumulative_index: Decimal,
    pub settlements: u64,
    // open interest seen by the last settlement
    pub long_open_interest: Decimal,
    pub short_open_interest: Decimal,
}

impl FundingRateState {
    pub fn new(timestamp: Timestamp) -> Self {
        Self {
            last_settlement: timestamp,
            last_rate_bps: Bps::ZERO,
            cumulative_index: Decimal::ZERO,
            settlements: 0,
            long_open_interest: Decimal::ZERO,
            short_open_interest: Decimal::ZERO,
        }
    }
}

// 5.1: imbalance * max rate, clamped to +-max, truncated to whole bps.
// positive = longs pay shorts.
pub fn calculate_funding_rate(open_interest: &OpenInterest, max_rate: Bps) -> Result<Bps, MathError> {
    let total = checked_add(open_interest.long, open_interest.short, "funding total oi")?;
    if total.is_zero() {
        return Ok(Bps::ZERO);
    }

    let skew = open_interest.long - open_interest.short;
    let imbalance = checked_div(skew, total, "funding imbalance")?;
    let max = max_rate.as_decimal();
    let raw = checked_mul(imbalance, max, "funding rate")?;
    let clamped = raw.max(-max).min(max).trunc();

    clamped
        .to_i32()
        .map(Bps::new)
        .ok_or(MathError::Overflow("funding rate"))
}

// 5.1.1: size * |rate| * periods / 10000
pub fn calculate_funding_payment(size: Decimal, rate: Bps, periods: u64) -> Result<Quote, MathError> {
    let per_period = checked_mul(size, rate.as_decimal().abs(), "funding payment")?;
    let total = checked_mul(per_period, Decimal::from(periods), "funding payment")?;
    checked_div(total, BPS_DENOMINATOR, "funding payment").map(Quote::new)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingPayment {
    pub position_id: PositionId,
    pub owner: AccountId,
    pub side: Side,
    // signed: negative = paid, positive = received
    pub amount: Quote,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingSettlement {
    pub market_id: MarketId,
    pub rate_bps: Bps,
    pub periods: u64,
    pub payments: Vec<FundingPayment>,
    pub total_paid: Quote,
    pub timestamp: Timestamp,
}

impl FundingSettlement {
    fn noop(market_id: MarketId, timestamp: Timestamp) -> Self {
        Self {
            market_id,
            rate_bps: Bps::ZERO,
            periods: 0,
            payments: Vec::new(),
            total_paid: Quote::zero(),
            timestamp,
        }
    }

    pub fn net_transfer(&self) -> Decimal {
        self.payments.iter().map(|p| p.amount.value()).sum()
    }
}

// 5.2: payers first, then receivers split the pot by size.
// no receivers means nothing to transfer to, so nobody pays.
pub fn plan_payments(
    store: &PositionStore,
    market_id: MarketId,
    rate: Bps,
    periods: u64,
) -> Result<(Vec<FundingPayment>, Quote), MathError> {
    if rate == Bps::ZERO || periods == 0 {
        return Ok((Vec::new(), Quote::zero()));
    }
    let payer_side = if rate.value() > 0 { Side::Long } else { Side::Short };
    let receiver_side = payer_side.opposite();
    let receiver_oi = store.open_interest(market_id).side(receiver_side);
    if receiver_oi.is_zero() {
        return Ok((Vec::new(), Quote::zero()));
    }

    let mut payments = Vec::new();
    let mut total_paid = Decimal::ZERO;
    for position in store.positions_in(market_id).filter(|p| p.side == payer_side) {
        let owed = calculate_funding_payment(position.size, rate, periods)?;
        total_paid = checked_add(total_paid, owed.value(), "funding pot")?;
        payments.push(FundingPayment {
            position_id: position.id,
            owner: position.owner,
            side: payer_side,
            amount: owed.negate(),
        });
    }

    // the last receiver takes the rounding remainder so the batch nets to zero
    let receivers: Vec<_> = store
        .positions_in(market_id)
        .filter(|p| p.side == receiver_side)
        .collect();
    let mut distributed = Decimal::ZERO;
    for (i, position) in receivers.iter().enumerate() {
        let share = if i + 1 == receivers.len() {
            checked_sub(total_paid, distributed, "funding share")?
        } else {
            let weighted = checked_mul(total_paid, position.size, "funding share")?;
            checked_div(weighted, receiver_oi, "funding share")?
        };
        distributed = checked_add(distributed, share, "funding share")?;
        payments.push(FundingPayment {
            position_id: position.id,
            owner: position.owner,
            side: receiver_side,
            amount: Quote::new(share),
        });
    }

    Ok((payments, Quote::new(total_paid)))
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FundingError {
    #[error("Funding not configured for market {0:?}")]
    NotConfigured(MarketId),

    #[error("Funding too soon for market {market_id:?}: {remaining_secs}s until next period")]
    FundingTooSoon { market_id: MarketId, remaining_secs: u64 },

    #[error("Invalid funding config: {reason}")]
    InvalidConfig { reason: String },

    #[error("Funding ledger update failed: {0}")]
    Position(#[from] PositionError),

    #[error(transparent)]
    Math(#[from] MathError),
}

// 5.3: per-market config + state. the store owns the ledgers, the book only decides amounts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FundingBook {
    configs: HashMap<MarketId, FundingConfig>,
    states: HashMap<MarketId, FundingRateState>,
}

impl FundingBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a config. The settlement clock starts at `now` for a new market.
    pub fn configure(
        &mut self,
        market_id: MarketId,
        config: FundingConfig,
        now: Timestamp,
    ) -> Result<Option<FundingConfig>, FundingError> {
        config.validate()?;
        self.states
            .entry(market_id)
            .or_insert_with(|| FundingRateState::new(now));
        Ok(self.configs.insert(market_id, config))
    }

    pub fn config(&self, market_id: MarketId) -> Option<&FundingConfig> {
        self.configs.get(&market_id)
    }

    pub fn state(&self, market_id: MarketId) -> Option<&FundingRateState> {
        self.states.get(&market_id)
    }

    pub fn settle(
        &mut self,
        market_id: MarketId,
        store: &mut PositionStore,
        now: Timestamp,
    ) -> Result<FundingSettlement, FundingError> {
        let config = self
            .configs
            .get(&market_id)
            .ok_or(FundingError::NotConfigured(market_id))?;
        let state = self
            .states
            .get(&market_id)
            .cloned()
            .unwrap_or_else(|| FundingRateState::new(now));

        let open_interest = store.open_interest(market_id);
        if !config.enabled || config.period_secs == 0 {
            self.advance(market_id, state, open_interest, now);
            debug!(market = market_id.0, "funding disabled, clock advanced");
            return Ok(FundingSettlement::noop(market_id, now));
        }

        let elapsed = state.last_settlement.secs_until(now);
        let periods = elapsed / config.period_secs;
        if periods == 0 {
            return Err(FundingError::FundingTooSoon {
                market_id,
                remaining_secs: config.period_secs - elapsed,
            });
        }

        let rate = calculate_funding_rate(&open_interest, config.max_rate_bps)?;
        let (payments, total_paid) = plan_payments(store, market_id, rate, periods)?;

        let index_step = checked_mul(rate.as_decimal(), Decimal::from(periods), "funding index")?;
        let mut next = state;
        next.cumulative_index = checked_add(next.cumulative_index, index_step, "funding index")?;
        next.last_rate_bps = rate;

        let ledger: Vec<(PositionId, Quote)> =
            payments.iter().map(|p| (p.position_id, p.amount)).collect();
        store.apply_funding(&ledger, next.cumulative_index, now)?;

        next.settlements += 1;
        self.advance(market_id, next, open_interest, now);

        info!(
            market = market_id.0,
            rate_bps = rate.value(),
            periods,
            positions = payments.len(),
            total_paid = %total_paid,
            "funding settled"
        );
        Ok(FundingSettlement {
            market_id,
            rate_bps: rate,
            periods,
            payments,
            total_paid,
            timestamp: now,
        })
    }

    /// Rate a settlement would apply right now.
    pub fn preview_rate(&self, market_id: MarketId, store: &PositionStore) -> Result<Bps, FundingError> {
        let config = self
            .configs
            .get(&market_id)
            .ok_or(FundingError::NotConfigured(market_id))?;
        if !config.enabled {
            return Ok(Bps::ZERO);
        }
        Ok(calculate_funding_rate(&store.open_interest(market_id), config.max_rate_bps)?)
    }

    pub fn time_until_next(&self, market_id: MarketId, now: Timestamp) -> Result<u64, FundingError> {
        let config = self
            .configs
            .get(&market_id)
            .ok_or(FundingError::NotConfigured(market_id))?;
        let last = self
            .states
            .get(&market_id)
            .map_or(now, |s| s.last_settlement);
        if config.period_secs == 0 {
            return Ok(0);
        }
        Ok(config.period_secs.saturating_sub(last.secs_until(now)))
    }

    fn advance(&mut self, market_id: MarketId, mut state: FundingRateState, open_interest: OpenInterest, now: Timestamp) {
        state.last_settlement = now;
        state.long_open_interest = open_interest.long;
        state.short_open_interest = open_interest.short;
        self.states.insert(market_id, state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position_store::{DeferredNotifications, OpenRequest};
    use crate::risk_config::{MarketRiskConfig, RiskConfigRegistry};
    use crate::types::{Leverage, Price};
    use rust_decimal_macros::dec;

    const MARKET: MarketId = MarketId(1);

    fn oi(long: Decimal, short: Decimal) -> OpenInterest {
        OpenInterest { long, short }
    }

    #[test]
    fn rate_from_imbalance() {
        // (600 - 400) / 1000 * 300 = 60
        assert_eq!(calculate_funding_rate(&oi(dec!(600), dec!(400)), Bps::new(300)).unwrap(), Bps::new(60));
        assert_eq!(calculate_funding_rate(&oi(dec!(400), dec!(600)), Bps::new(300)).unwrap(), Bps::new(-60));
    }

    #[test]
    fn rate_clamped_and_truncated() {
        // one-sided book hits the cap exactly
        assert_eq!(calculate_funding_rate(&oi(dec!(10), dec!(0)), Bps::new(300)).unwrap(), Bps::new(300));
        // 1/3 * 100 = 33.33 -> 33
        assert_eq!(calculate_funding_rate(&oi(dec!(2), dec!(1)), Bps::new(100)).unwrap(), Bps::new(33));
        assert_eq!(calculate_funding_rate(&oi(dec!(1), dec!(2)), Bps::new(100)).unwrap(), Bps::new(-33));
    }

    #[test]
    fn zero_open_interest_zero_rate() {
        assert_eq!(calculate_funding_rate(&oi(dec!(0), dec!(0)), Bps::new(300)).unwrap(), Bps::ZERO);
    }

    #[test]
    fn payment_amount() {
        // 1000 * 60bps * 1 period = 6
        assert_eq!(calculate_funding_payment(dec!(1000), Bps::new(60), 1).unwrap().value(), dec!(6));
        assert_eq!(calculate_funding_payment(dec!(1000), Bps::new(-60), 2).unwrap().value(), dec!(12));
    }

    fn store_with(positions: &[(Side, Decimal)]) -> PositionStore {
        let mut registry = RiskConfigRegistry::new();
        registry.set(MARKET, MarketRiskConfig::standard()).unwrap();
        let mut store = PositionStore::new();
        for (i, (side, size)) in positions.iter().enumerate() {
            store
                .open(
                    OpenRequest {
                        owner: AccountId(i as u64),
                        market_id: MARKET,
                        side: *side,
                        size: *size,
                        collateral: Quote::new(*size * dec!(10)),
                        entry_price: Price::new_unchecked(dec!(100)),
                        leverage: Leverage::new(10).unwrap(),
                    },
                    &registry,
                    Timestamp::from_secs(0),
                    &mut DeferredNotifications::new(),
                )
                .unwrap();
        }
        store
    }

    fn book(config: FundingConfig) -> FundingBook {
        let mut book = FundingBook::new();
        book.configure(MARKET, config, Timestamp::from_secs(0)).unwrap();
        book
    }

    #[test]
    fn settle_is_zero_sum() {
        let mut store = store_with(&[(Side::Long, dec!(600)), (Side::Short, dec!(100)), (Side::Short, dec!(300))]);
        let mut book = book(FundingConfig {
            enabled: true,
            period_secs: 3600,
            max_rate_bps: Bps::new(300),
        });

        let settlement = book.settle(MARKET, &mut store, Timestamp::from_secs(3600)).unwrap();
        assert_eq!(settlement.rate_bps, Bps::new(60));
        assert_eq!(settlement.periods, 1);
        // 600 * 60 / 10000
        assert_eq!(settlement.total_paid.value(), dec!(3.6));
        assert_eq!(settlement.net_transfer(), Decimal::ZERO);

        let shares: Vec<Decimal> = settlement
            .payments
            .iter()
            .map(|p| p.amount.value())
            .collect();
        assert_eq!(shares, vec![dec!(-3.6), dec!(0.9), dec!(2.7)]);
        assert_eq!(store.get(PositionId(1)).unwrap().accumulated_funding.value(), dec!(-3.6));
        let state = book.state(MARKET).unwrap();
        assert_eq!(state.last_settlement, Timestamp::from_secs(3600));
        assert_eq!(state.long_open_interest, dec!(600));
        assert_eq!(state.short_open_interest, dec!(400));
    }

    #[test]
    fn settle_too_soon_changes_nothing() {
        let mut store = store_with(&[(Side::Long, dec!(10)), (Side::Short, dec!(5))]);
        let mut book = book(FundingConfig {
            enabled: true,
            period_secs: 3600,
            max_rate_bps: Bps::new(300),
        });

        let err = book.settle(MARKET, &mut store, Timestamp::from_secs(3599)).unwrap_err();
        assert_eq!(
            err,
            FundingError::FundingTooSoon {
                market_id: MARKET,
                remaining_secs: 1
            }
        );
        // same error again, no partial effect
        assert_eq!(book.settle(MARKET, &mut store, Timestamp::from_secs(3599)).unwrap_err(), err);
        assert_eq!(book.state(MARKET).unwrap().last_settlement, Timestamp::from_secs(0));
        assert_eq!(store.get(PositionId(1)).unwrap().accumulated_funding, Quote::zero());
    }

    #[test]
    fn settle_multiple_periods() {
        let mut store = store_with(&[(Side::Short, dec!(300)), (Side::Long, dec!(100))]);
        let mut book = book(FundingConfig {
            enabled: true,
            period_secs: 3600,
            max_rate_bps: Bps::new(300),
        });

        // rate -150bps, shorts pay. 2.5 periods floors to 2
        let settlement = book.settle(MARKET, &mut store, Timestamp::from_secs(9000)).unwrap();
        assert_eq!(settlement.rate_bps, Bps::new(-150));
        assert_eq!(settlement.periods, 2);
        assert_eq!(store.get(PositionId(1)).unwrap().accumulated_funding.value(), dec!(-9));
        assert_eq!(store.get(PositionId(2)).unwrap().accumulated_funding.value(), dec!(9));
        assert_eq!(book.state(MARKET).unwrap().cumulative_index, dec!(-300));
    }

    #[test]
    fn disabled_funding_advances_clock() {
        let mut store = store_with(&[(Side::Long, dec!(10))]);
        let mut book = book(FundingConfig {
            enabled: false,
            ..FundingConfig::default()
        });

        let settlement = book.settle(MARKET, &mut store, Timestamp::from_secs(5)).unwrap();
        assert_eq!(settlement.rate_bps, Bps::ZERO);
        let state = book.state(MARKET).unwrap();
        assert_eq!(state.last_settlement, Timestamp::from_secs(5));
        assert_eq!(state.long_open_interest, dec!(10));
        assert_eq!(state.short_open_interest, Decimal::ZERO);
        assert_eq!(book.preview_rate(MARKET, &store).unwrap(), Bps::ZERO);
    }

    #[test]
    fn one_sided_book_pays_nothing() {
        let mut store = store_with(&[(Side::Long, dec!(10))]);
        let mut book = book(FundingConfig {
            enabled: true,
            period_secs: 60,
            max_rate_bps: Bps::new(100),
        });

        let settlement = book.settle(MARKET, &mut store, Timestamp::from_secs(60)).unwrap();
        assert_eq!(settlement.rate_bps, Bps::new(100));
        assert!(settlement.payments.is_empty());
        let state = book.state(MARKET).unwrap();
        assert_eq!(state.last_settlement, Timestamp::from_secs(60));
        assert_eq!((state.long_open_interest, state.short_open_interest), (dec!(10), Decimal::ZERO));
    }

    #[test]
    fn time_until_next_period() {
        let book = book(FundingConfig {
            enabled: true,
            period_secs: 3600,
            max_rate_bps: Bps::new(300),
        });
        assert_eq!(book.time_until_next(MARKET, Timestamp::from_secs(600)).unwrap(), 3000);
        assert_eq!(book.time_until_next(MARKET, Timestamp::from_secs(7200)).unwrap(), 0);
        assert_eq!(book.time_until_next(MarketId(2), Timestamp::from_secs(0)), Err(FundingError::NotConfigured(MarketId(2))));
    }

    #[test]
    fn invalid_config_rejected() {
        let mut book = FundingBook::new();
        let config = FundingConfig {
            max_rate_bps: Bps::new(-1),
            ..FundingConfig::default()
        };
        assert!(matches!(
            book.configure(MARKET, config, Timestamp::from_secs(0)),
            Err(FundingError::InvalidConfig { .. })
        ));
        assert!(book.config(MARKET).is_none());
    }
}
