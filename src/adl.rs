// 6.2: auto-deleveraging. when a liquidation can't fill, profitable traders on the other side get force-closed.
// ranked by pnl * leverage / 100: highest score gets deleveraged first, ties go to whoever queued first.
// the queue only learns about positions through the PositionObserver hook in position_store.rs.

use crate::position_store::{DeferredNotifications, PositionError, PositionObserver, PositionStore, ProfitUpdate};
use crate::risk_config::RiskConfigRegistry;
use crate::types::{
    checked_div, checked_mul, AccountId, Bps, Leverage, MarketId, MathError, PositionId, Price,
    Quote, Side, Timestamp, BPS_DENOMINATOR,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdlConfig {
    // adl kicks in once the insurance fund drops under this share of oi notional
    pub insurance_fund_threshold_bps: Bps,
    pub max_positions_per_event: u32,
    pub grace_period_secs: u64,
    pub active: bool,
}

impl Default for AdlConfig {
    fn default() -> Self {
        Self {
            insurance_fund_threshold_bps: Bps::new(100),
            max_positions_per_event: 50,
            grace_period_secs: 0,
            active: true,
        }
    }
}

impl AdlConfig {
    pub fn new(insurance_fund_threshold_bps: Bps, max_positions_per_event: u32, grace_period_secs: u64) -> Self {
        Self {
            insurance_fund_threshold_bps,
            max_positions_per_event,
            grace_period_secs,
            active: true,
        }
    }

    pub fn validate(&self) -> Result<(), AdlError> {
        let threshold = self.insurance_fund_threshold_bps.value();
        if !(0..=10_000).contains(&threshold) {
            return Err(AdlError::InvalidConfig {
                reason: format!("insurance fund threshold {threshold}bps must be in [0, 10000]"),
            });
        }
        if self.max_positions_per_event == 0 {
            return Err(AdlError::InvalidConfig {
                reason: "max positions per event must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// True when the insurance fund no longer covers the configured share of
    /// open-interest notional.
    pub fn insurance_below_threshold(
        &self,
        insurance_fund: Quote,
        open_interest_notional: Decimal,
    ) -> Result<bool, MathError> {
        let scaled = checked_mul(
            open_interest_notional,
            self.insurance_fund_threshold_bps.as_decimal(),
            "insurance threshold",
        )?;
        let required = checked_div(scaled, BPS_DENOMINATOR, "insurance threshold")?;
        Ok(insurance_fund.value() < required)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdlCandidate {
    pub market_id: MarketId,
    pub position_id: PositionId,
    pub owner: AccountId,
    pub side: Side,
    pub unrealized_pnl: Quote,
    pub leverage: Leverage,
    pub score: Decimal, // higher = deleveraged first
    pub updated_at: Timestamp,
}

// score = pnl * leverage / 100
pub fn calculate_adl_score(unrealized_pnl: Quote, leverage: Leverage) -> Result<Decimal, MathError> {
    let weighted = checked_mul(unrealized_pnl.value(), leverage.as_decimal(), "adl score")?;
    checked_div(weighted, dec!(100), "adl score")
}

// descending score, then ascending insertion sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct RankKey {
    score: Reverse<Decimal>,
    seq: u64,
}

#[derive(Debug, Clone, Default)]
struct RankedSide {
    ranked: BTreeMap<RankKey, AdlCandidate>,
    index: HashMap<PositionId, RankKey>,
    next_seq: u64,
}

impl RankedSide {
    fn upsert(&mut self, candidate: AdlCandidate) {
        // a re-scored candidate keeps its original place in the tie-break order
        let seq = match self.index.get(&candidate.position_id) {
            Some(old) => {
                let seq = old.seq;
                self.ranked.remove(old);
                seq
            }
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                seq
            }
        };
        let key = RankKey {
            score: Reverse(candidate.score),
            seq,
        };
        self.index.insert(candidate.position_id, key);
        self.ranked.insert(key, candidate);
    }

    fn remove(&mut self, position_id: PositionId) -> Option<AdlCandidate> {
        let key = self.index.remove(&position_id)?;
        self.ranked.remove(&key)
    }

    fn len(&self) -> usize {
        self.ranked.len()
    }
}

/// Audit record of one deleverage event. Never mutated once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdlExecution {
    pub id: u64,
    pub market_id: MarketId,
    pub liquidated_position: PositionId,
    pub liquidated_side: Side,
    pub closed_positions: Vec<PositionId>,
    pub total_size_closed: Decimal,
    pub execution_price: Price,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdlRequest {
    pub market_id: MarketId,
    pub liquidated_position: PositionId,
    // side of the liquidated position. candidates come from the other side.
    pub side: Side,
    pub size_to_close: Decimal,
    pub execution_price: Price,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleveragedPosition {
    pub position_id: PositionId,
    pub owner: AccountId,
    pub rank: usize,
    pub size_closed: Decimal,
    pub realized_pnl: Quote,
    pub fully_closed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdlOutcome {
    pub execution_id: u64,
    pub fully_covered: bool,
    pub total_closed: Decimal,
    pub deleveraged: Vec<DeleveragedPosition>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdlError {
    #[error("ADL not enabled for market {0:?}")]
    AdlNotEnabled(MarketId),

    #[error("No ADL candidates on the {side} side of market {market_id:?}")]
    InsufficientCandidates { market_id: MarketId, side: Side },

    #[error("ADL grace period active for market {market_id:?}: {remaining_secs}s remaining")]
    GracePeriod { market_id: MarketId, remaining_secs: u64 },

    #[error("Invalid ADL size {0}")]
    InvalidSize(Decimal),

    #[error("Invalid ADL config: {reason}")]
    InvalidConfig { reason: String },

    #[error("ADL not configured for market {0:?}")]
    NotConfigured(MarketId),

    #[error("Force close failed: {0}")]
    Position(#[from] PositionError),
}

#[derive(Debug, Clone)]
pub struct AdlQueue {
    configs: HashMap<MarketId, AdlConfig>,
    sides: HashMap<(MarketId, Side), RankedSide>,
    history: VecDeque<AdlExecution>,
    max_history: usize,
    event_counts: HashMap<MarketId, u64>,
    last_execution: HashMap<MarketId, Timestamp>,
    next_execution_id: u64,
}

impl Default for AdlQueue {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl AdlQueue {
    pub fn new(max_history: usize) -> Self {
        Self {
            configs: HashMap::new(),
            sides: HashMap::new(),
            history: VecDeque::new(),
            max_history,
            event_counts: HashMap::new(),
            last_execution: HashMap::new(),
            next_execution_id: 1,
        }
    }

    // 6.2.1: admin config. (re)configuring always leaves the market active.
    pub fn configure(&mut self, market_id: MarketId, mut config: AdlConfig) -> Result<Option<AdlConfig>, AdlError> {
        config.validate()?;
        config.active = true;
        Ok(self.configs.insert(market_id, config))
    }

    /// Flips the active flag, returns the new value.
    pub fn toggle(&mut self, market_id: MarketId) -> Result<bool, AdlError> {
        let config = self
            .configs
            .get_mut(&market_id)
            .ok_or(AdlError::NotConfigured(market_id))?;
        config.active = !config.active;
        Ok(config.active)
    }

    pub fn config(&self, market_id: MarketId) -> Option<&AdlConfig> {
        self.configs.get(&market_id)
    }

    // 6.2.2: upsert. pnl <= 0 drops the candidate instead.
    // the score arrives precomputed, see ProfitUpdate::new
    pub fn update_candidate(&mut self, update: &ProfitUpdate) {
        if !update.unrealized_pnl.is_positive() {
            self.remove_candidate(update.market_id, update.position_id, update.side);
            return;
        }

        let candidate = AdlCandidate {
            market_id: update.market_id,
            position_id: update.position_id,
            owner: update.owner,
            side: update.side,
            unrealized_pnl: update.unrealized_pnl,
            leverage: update.leverage,
            score: update.score,
            updated_at: update.timestamp,
        };
        self.sides
            .entry((update.market_id, update.side))
            .or_default()
            .upsert(candidate);
    }

    // idempotent
    pub fn remove_candidate(&mut self, market_id: MarketId, position_id: PositionId, side: Side) -> bool {
        self.sides
            .get_mut(&(market_id, side))
            .and_then(|ranked| ranked.remove(position_id))
            .is_some()
    }

    /// Candidates in rank order, rank 1 first.
    pub fn queue(&self, market_id: MarketId, side: Side) -> Vec<&AdlCandidate> {
        self.sides
            .get(&(market_id, side))
            .map(|ranked| ranked.ranked.values().collect())
            .unwrap_or_default()
    }

    pub fn queue_len(&self, market_id: MarketId, side: Side) -> usize {
        self.sides.get(&(market_id, side)).map_or(0, RankedSide::len)
    }

    pub fn contains(&self, market_id: MarketId, position_id: PositionId, side: Side) -> bool {
        self.sides
            .get(&(market_id, side))
            .is_some_and(|ranked| ranked.index.contains_key(&position_id))
    }

    /// 1-based rank, `None` if the position isn't queued.
    pub fn rank(&self, market_id: MarketId, position_id: PositionId, side: Side) -> Option<usize> {
        let ranked = self.sides.get(&(market_id, side))?;
        let key = ranked.index.get(&position_id)?;
        Some(ranked.ranked.range(..key).count() + 1)
    }

    pub fn event_count(&self, market_id: MarketId) -> u64 {
        self.event_counts.get(&market_id).copied().unwrap_or(0)
    }

    pub fn last_execution(&self, market_id: MarketId) -> Option<Timestamp> {
        self.last_execution.get(&market_id).copied()
    }

    pub fn history(&self, market_id: MarketId) -> Vec<&AdlExecution> {
        self.history.iter().filter(|e| e.market_id == market_id).collect()
    }

    pub fn execution(&self, id: u64) -> Option<&AdlExecution> {
        self.history.iter().find(|e| e.id == id)
    }

    // 6.2.3: walk the opposite side from rank 1, closing min(remaining, size) per candidate.
    // stops once covered or max_positions_per_event is hit. partial coverage is Ok(false).
    // a failed force-close restores the store and leaves the queue untouched.
    pub fn execute_adl(
        &mut self,
        store: &mut PositionStore,
        registry: &RiskConfigRegistry,
        request: &AdlRequest,
        now: Timestamp,
    ) -> Result<AdlOutcome, AdlError> {
        let market_id = request.market_id;
        let config = self
            .configs
            .get(&market_id)
            .filter(|c| c.active)
            .ok_or(AdlError::AdlNotEnabled(market_id))?;

        if request.size_to_close <= Decimal::ZERO {
            return Err(AdlError::InvalidSize(request.size_to_close));
        }

        if let Some(last) = self.last_execution.get(&market_id) {
            let ready_at = last.plus_secs(config.grace_period_secs);
            if config.grace_period_secs > 0 && now < ready_at {
                return Err(AdlError::GracePeriod {
                    market_id,
                    remaining_secs: now.secs_until(ready_at).max(1),
                });
            }
        }

        let target = request.side.opposite();
        let max_positions = config.max_positions_per_event as usize;
        // closed positions can linger in the queue; they don't take a slot
        let (live, stale): (Vec<&AdlCandidate>, Vec<&AdlCandidate>) = self
            .sides
            .get(&(market_id, target))
            .map(|ranked| ranked.ranked.values().partition(|c| store.contains(c.position_id)))
            .unwrap_or_default();
        let stale: Vec<PositionId> = stale.into_iter().map(|c| c.position_id).collect();
        let picks: Vec<AdlCandidate> = live.into_iter().take(max_positions).cloned().collect();
        if picks.is_empty() {
            return Err(AdlError::InsufficientCandidates {
                market_id,
                side: target,
            });
        }

        let checkpoint = store.clone();
        let mut deferred = DeferredNotifications::new();
        let mut remaining = request.size_to_close;
        let mut total_closed = Decimal::ZERO;
        let mut deleveraged = Vec::new();

        for (i, candidate) in picks.iter().enumerate() {
            if remaining <= Decimal::ZERO {
                break;
            }
            let Some(close_size) = store.get(candidate.position_id).map(|p| remaining.min(p.size)) else {
                continue;
            };

            let reduction = match store.force_reduce(
                candidate.position_id,
                close_size,
                request.execution_price,
                registry,
                now,
                &mut deferred,
            ) {
                Ok(reduction) => reduction,
                Err(e) => {
                    *store = checkpoint;
                    warn!(market = market_id.0, position = candidate.position_id.0, error = %e, "adl force close failed, rolled back");
                    return Err(e.into());
                }
            };

            remaining -= reduction.size_closed;
            total_closed += reduction.size_closed;
            debug!(
                position = candidate.position_id.0,
                rank = i + 1,
                size_closed = %reduction.size_closed,
                "candidate deleveraged"
            );
            deleveraged.push(DeleveragedPosition {
                position_id: candidate.position_id,
                owner: candidate.owner,
                rank: i + 1,
                size_closed: reduction.size_closed,
                realized_pnl: reduction.realized_pnl,
                fully_closed: reduction.fully_closed,
            });
        }

        // commit queue side. every touched candidate leaves the queue, partial
        // fills included, so the buffered hook calls are dropped
        for position_id in deleveraged.iter().map(|d| d.position_id).chain(stale) {
            self.remove_candidate(market_id, position_id, target);
        }

        let execution_id = self.next_execution_id;
        self.next_execution_id += 1;
        self.record(AdlExecution {
            id: execution_id,
            market_id,
            liquidated_position: request.liquidated_position,
            liquidated_side: request.side,
            closed_positions: deleveraged.iter().map(|d| d.position_id).collect(),
            total_size_closed: total_closed,
            execution_price: request.execution_price,
            timestamp: now,
        });
        *self.event_counts.entry(market_id).or_insert(0) += 1;
        self.last_execution.insert(market_id, now);

        let fully_covered = total_closed >= request.size_to_close;
        if fully_covered {
            info!(market = market_id.0, execution = execution_id, closed = %total_closed, positions = deleveraged.len(), "adl executed");
        } else {
            warn!(market = market_id.0, execution = execution_id, closed = %total_closed, wanted = %request.size_to_close, "adl partial coverage");
        }

        Ok(AdlOutcome {
            execution_id,
            fully_covered,
            total_closed,
            deleveraged,
        })
    }

    fn record(&mut self, execution: AdlExecution) {
        self.history.push_back(execution);
        while self.history.len() > self.max_history {
            self.history.pop_front();
        }
    }
}

impl PositionObserver for AdlQueue {
    fn position_updated(&mut self, update: &ProfitUpdate) {
        self.update_candidate(update);
    }

    fn position_removed(&mut self, market_id: MarketId, position_id: PositionId, side: Side) {
        self.remove_candidate(market_id, position_id, side);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position_store::OpenRequest;
    use crate::risk_config::MarketRiskConfig;

    const MARKET: MarketId = MarketId(1);

    fn update(position: u64, side: Side, pnl: Decimal, leverage: u32) -> ProfitUpdate {
        ProfitUpdate::new(
            MARKET,
            PositionId(position),
            AccountId(position),
            side,
            Quote::new(pnl),
            Leverage::new(leverage).unwrap(),
            Timestamp::from_millis(0),
        )
        .unwrap()
    }

    fn ids(queue: &AdlQueue, side: Side) -> Vec<u64> {
        queue.queue(MARKET, side).iter().map(|c| c.position_id.0).collect()
    }

    #[test]
    fn score_formula() {
        let score = calculate_adl_score(Quote::new(dec!(50000)), Leverage::new(20).unwrap()).unwrap();
        assert_eq!(score, dec!(10000));
    }

    #[test]
    fn queue_sorted_by_descending_score() {
        let mut queue = AdlQueue::default();
        queue.update_candidate(&update(1, Side::Short, dec!(10000), 25)); // 2500
        queue.update_candidate(&update(2, Side::Short, dec!(50000), 20)); // 10000
        queue.update_candidate(&update(3, Side::Short, dec!(30000), 15)); // 4500

        assert_eq!(ids(&queue, Side::Short), vec![2, 3, 1]);
        assert_eq!(queue.rank(MARKET, PositionId(2), Side::Short), Some(1));
        assert_eq!(queue.rank(MARKET, PositionId(1), Side::Short), Some(3));
        assert_eq!(queue.queue_len(MARKET, Side::Long), 0);
    }

    #[test]
    fn ties_keep_insertion_order_across_rescoring() {
        let mut queue = AdlQueue::default();
        queue.update_candidate(&update(1, Side::Long, dec!(100), 10));
        queue.update_candidate(&update(2, Side::Long, dec!(100), 10));
        queue.update_candidate(&update(3, Side::Long, dec!(50), 10));
        assert_eq!(ids(&queue, Side::Long), vec![1, 2, 3]);

        // 3 climbs to the same score and stays behind the earlier arrivals
        queue.update_candidate(&update(3, Side::Long, dec!(100), 10));
        assert_eq!(ids(&queue, Side::Long), vec![1, 2, 3]);

        // 1 re-scored to the same value keeps rank 1
        queue.update_candidate(&update(1, Side::Long, dec!(100), 10));
        assert_eq!(ids(&queue, Side::Long), vec![1, 2, 3]);
    }

    #[test]
    fn non_positive_pnl_removes() {
        let mut queue = AdlQueue::default();
        queue.update_candidate(&update(1, Side::Long, dec!(100), 10));
        queue.update_candidate(&update(1, Side::Long, dec!(0), 10));
        assert!(!queue.contains(MARKET, PositionId(1), Side::Long));

        queue.update_candidate(&update(2, Side::Long, dec!(-5), 10));
        assert_eq!(queue.queue_len(MARKET, Side::Long), 0);
    }

    #[test]
    fn remove_is_idempotent() {
        let mut queue = AdlQueue::default();
        queue.update_candidate(&update(1, Side::Short, dec!(100), 10));
        assert!(queue.remove_candidate(MARKET, PositionId(1), Side::Short));
        assert!(!queue.remove_candidate(MARKET, PositionId(1), Side::Short));
        assert!(!queue.remove_candidate(MarketId(9), PositionId(1), Side::Short));
    }

    #[test]
    fn config_validation_and_toggle() {
        let mut queue = AdlQueue::default();
        assert!(matches!(
            queue.configure(MARKET, AdlConfig::new(Bps::new(100), 0, 0)),
            Err(AdlError::InvalidConfig { .. })
        ));
        assert_eq!(queue.toggle(MARKET), Err(AdlError::NotConfigured(MARKET)));

        let mut inactive = AdlConfig::default();
        inactive.active = false;
        queue.configure(MARKET, inactive).unwrap();
        assert!(queue.config(MARKET).unwrap().active);
        assert_eq!(queue.toggle(MARKET), Ok(false));
        assert_eq!(queue.toggle(MARKET), Ok(true));
    }

    #[test]
    fn insurance_threshold() {
        // 1% of 1m notional = 10k
        let config = AdlConfig::default();
        assert!(config.insurance_below_threshold(Quote::new(dec!(9999)), dec!(1000000)).unwrap());
        assert!(!config.insurance_below_threshold(Quote::new(dec!(10000)), dec!(1000000)).unwrap());
    }

    fn setup() -> (AdlQueue, PositionStore, RiskConfigRegistry) {
        let mut registry = RiskConfigRegistry::new();
        registry.set(MARKET, MarketRiskConfig::standard()).unwrap();
        let mut queue = AdlQueue::default();
        queue.configure(MARKET, AdlConfig::new(Bps::new(100), 2, 60)).unwrap();
        (queue, PositionStore::new(), registry)
    }

    fn open_short(store: &mut PositionStore, queue: &mut AdlQueue, registry: &RiskConfigRegistry, owner: u64, size: Decimal) -> PositionId {
        let id = store
            .open(
                OpenRequest {
                    owner: AccountId(owner),
                    market_id: MARKET,
                    side: Side::Short,
                    size,
                    collateral: Quote::new(size * dec!(400)),
                    entry_price: Price::new_unchecked(dec!(2000)),
                    leverage: Leverage::new(5).unwrap(),
                },
                registry,
                Timestamp::from_millis(0),
                queue,
            )
            .unwrap();
        store
            .refresh(id, Price::new_unchecked(dec!(1500)), Timestamp::from_millis(0), queue)
            .unwrap();
        id
    }

    fn request(size: Decimal) -> AdlRequest {
        AdlRequest {
            market_id: MARKET,
            liquidated_position: PositionId(999),
            side: Side::Long,
            size_to_close: size,
            execution_price: Price::new_unchecked(dec!(1500)),
        }
    }

    #[test]
    fn execute_respects_position_cap_and_reports_partial() {
        let (mut queue, mut store, registry) = setup();
        let a = open_short(&mut store, &mut queue, &registry, 1, dec!(3));
        let b = open_short(&mut store, &mut queue, &registry, 2, dec!(2));
        let c = open_short(&mut store, &mut queue, &registry, 3, dec!(1));

        let outcome = queue
            .execute_adl(&mut store, &registry, &request(dec!(10)), Timestamp::from_secs(1))
            .unwrap();
        // cap of 2: a and b only
        assert!(!outcome.fully_covered);
        assert_eq!(outcome.total_closed, dec!(5));
        assert_eq!(outcome.deleveraged.len(), 2);
        assert!(store.get(a).is_none() && store.get(b).is_none());
        assert!(store.get(c).is_some());
        assert_eq!(ids(&queue, Side::Short), vec![c.0]);
        assert_eq!(queue.event_count(MARKET), 1);
        assert_eq!(queue.history(MARKET)[0].closed_positions, vec![a, b]);
    }

    #[test]
    fn closed_positions_in_queue_do_not_use_up_the_cap() {
        let (mut queue, mut store, registry) = setup();
        let a = open_short(&mut store, &mut queue, &registry, 1, dec!(3));
        let b = open_short(&mut store, &mut queue, &registry, 2, dec!(2));
        // outranks both live shorts but has no position behind it
        queue.update_candidate(&update(77, Side::Short, dec!(1000000), 20));
        assert_eq!(queue.rank(MARKET, PositionId(77), Side::Short), Some(1));

        let outcome = queue
            .execute_adl(&mut store, &registry, &request(dec!(5)), Timestamp::from_secs(1))
            .unwrap();
        assert!(outcome.fully_covered);
        let closed: Vec<_> = outcome.deleveraged.iter().map(|d| (d.position_id, d.rank)).collect();
        assert_eq!(closed, vec![(a, 1), (b, 2)]);
        assert!(queue.queue(MARKET, Side::Short).is_empty());
    }

    #[test]
    fn execute_partial_close_removes_touched_candidate() {
        let (mut queue, mut store, registry) = setup();
        let a = open_short(&mut store, &mut queue, &registry, 1, dec!(3));

        let outcome = queue
            .execute_adl(&mut store, &registry, &request(dec!(1)), Timestamp::from_secs(1))
            .unwrap();
        assert!(outcome.fully_covered);
        assert_eq!(store.get(a).unwrap().size, dec!(2));
        assert!(!queue.contains(MARKET, a, Side::Short));
    }

    #[test]
    fn execute_gates() {
        let (mut queue, mut store, registry) = setup();
        assert!(matches!(
            queue.execute_adl(&mut store, &registry, &request(dec!(1)), Timestamp::from_secs(1)),
            Err(AdlError::InsufficientCandidates { side: Side::Short, .. })
        ));

        open_short(&mut store, &mut queue, &registry, 1, dec!(3));
        open_short(&mut store, &mut queue, &registry, 2, dec!(3));
        queue
            .execute_adl(&mut store, &registry, &request(dec!(1)), Timestamp::from_secs(1))
            .unwrap();
        assert!(matches!(
            queue.execute_adl(&mut store, &registry, &request(dec!(1)), Timestamp::from_secs(30)),
            Err(AdlError::GracePeriod { remaining_secs: 31, .. })
        ));
        assert!(queue
            .execute_adl(&mut store, &registry, &request(dec!(1)), Timestamp::from_secs(61))
            .is_ok());

        queue.toggle(MARKET).unwrap();
        assert_eq!(
            queue.execute_adl(&mut store, &registry, &request(dec!(1)), Timestamp::from_secs(500)),
            Err(AdlError::AdlNotEnabled(MARKET))
        );
    }
}
