// 3.0: open position tracking. pnl = (mark - entry) * size, sign flipped for shorts.
// 3.1 has the liquidation price derivation. 3.2 has increase/reduce math at the bottom.
// everything here is pure: the store in position_store.rs decides when to write.

use crate::risk_config::MarketRiskConfig;
use crate::types::{
    checked_add, checked_div, checked_mul, checked_sub, AccountId, Leverage, MarketId, MathError,
    PositionId, Price, Quote, Side, Timestamp, PRICE_EPSILON,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub market_id: MarketId,
    pub owner: AccountId,
    pub side: Side,
    // base units, always > 0 while the position exists
    pub size: Decimal,
    pub collateral: Quote,
    pub entry_price: Price,
    pub leverage: Leverage,
    // market funding index at the last settlement applied to this position
    pub funding_index: Decimal,
    pub accumulated_funding: Quote,
    pub realized_pnl: Quote,
    // cached, refreshed on every update
    pub unrealized_pnl: Quote,
    pub liquidation_price: Decimal,
    pub opened_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Position {
    pub fn notional(&self) -> Result<Decimal, MathError> {
        checked_mul(self.size, self.entry_price.value(), "position notional")
    }

    pub fn unrealized_pnl_at(&self, mark_price: Price) -> Result<Quote, MathError> {
        calculate_unrealized_pnl(self.side, self.size, self.entry_price, mark_price)
    }

    // crossed the liquidation price in the adverse direction.
    // the worst-case bounds (0 / MAX) mean collateral is already at or under mm.
    pub fn is_liquidatable_at(&self, mark_price: Price) -> bool {
        match self.side {
            Side::Long => {
                self.liquidation_price.is_zero() || mark_price.value() <= self.liquidation_price
            }
            Side::Short => {
                self.liquidation_price == Decimal::MAX
                    || mark_price.value() >= self.liquidation_price
            }
        }
    }

    pub fn is_profitable(&self) -> bool {
        self.unrealized_pnl.is_positive()
    }
}

// 3.0.1: long: (mark - entry) * size. short: (entry - mark) * size.
pub fn calculate_unrealized_pnl(
    side: Side,
    size: Decimal,
    entry_price: Price,
    mark_price: Price,
) -> Result<Quote, MathError> {
    let move_per_unit = match side {
        Side::Long => checked_sub(mark_price.value(), entry_price.value(), "unrealized pnl")?,
        Side::Short => checked_sub(entry_price.value(), mark_price.value(), "unrealized pnl")?,
    };
    checked_mul(move_per_unit, size, "unrealized pnl").map(Quote::new)
}

// 3.1: where the position's collateral is exhausted down to maintenance margin.
// collateral <= mm means liquidatable right now: 0 for longs, the max bound for shorts.
pub fn calculate_liquidation_price(
    side: Side,
    size: Decimal,
    entry_price: Price,
    collateral: Quote,
    risk: &MarketRiskConfig,
) -> Result<Decimal, MathError> {
    let notional = checked_mul(size, entry_price.value(), "liquidation notional")?;
    let maintenance = risk.maintenance_margin(notional)?;

    if collateral.value() <= maintenance {
        return Ok(match side {
            Side::Long => Decimal::ZERO,
            Side::Short => Decimal::MAX,
        });
    }

    let buffer = checked_sub(collateral.value(), maintenance, "liquidation buffer")?;
    // an unrepresentable move clamps to the bounds below
    let price_move = buffer.checked_div(size).unwrap_or(Decimal::MAX);

    Ok(match side {
        Side::Long => (entry_price.value() - price_move).max(PRICE_EPSILON),
        // saturates rather than failing, the bound is still "never"
        Side::Short => entry_price
            .value()
            .checked_add(price_move)
            .unwrap_or(Decimal::MAX),
    })
}

// 3.1.1: equity over notional. no exposure means infinitely safe.
pub fn margin_ratio(equity: Quote, notional: Decimal) -> Decimal {
    if notional.is_zero() {
        return Decimal::MAX;
    }
    equity.value().checked_div(notional).unwrap_or(Decimal::MAX)
}

// 3.2: realized share of pnl when closing part of a position.
// realized = pnl_before * reduction / previous_size
pub fn proportional_pnl(
    pnl_before: Quote,
    reduction: Decimal,
    previous_size: Decimal,
) -> Result<Quote, MathError> {
    let scaled = checked_mul(pnl_before.value(), reduction, "proportional pnl")?;
    checked_div(scaled, previous_size, "proportional pnl").map(Quote::new)
}

// 3.2.1: adds to a position at fill_price. size weighted entry.
pub fn averaged_entry_price(
    size: Decimal,
    entry_price: Price,
    added: Decimal,
    fill_price: Price,
) -> Result<Price, MathError> {
    let old_value = checked_mul(size, entry_price.value(), "entry averaging")?;
    let added_value = checked_mul(added, fill_price.value(), "entry averaging")?;
    let total_value = checked_add(old_value, added_value, "entry averaging")?;
    let total_size = checked_add(size, added, "entry averaging")?;
    let averaged = checked_div(total_value, total_size, "entry averaging")?;
    Ok(Price::new(averaged).unwrap_or(entry_price))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Bps;
    use rust_decimal_macros::dec;

    fn risk(mm_bps: i32) -> MarketRiskConfig {
        MarketRiskConfig::new(Bps::new(mm_bps), Bps::new(mm_bps + 100), Leverage::new(50).unwrap())
    }

    fn price(v: Decimal) -> Price {
        Price::new_unchecked(v)
    }

    #[test]
    fn unrealized_pnl_long_profit() {
        let pnl = calculate_unrealized_pnl(Side::Long, dec!(1), price(dec!(50000)), price(dec!(52000)))
            .unwrap();
        assert_eq!(pnl.value(), dec!(2000));
    }

    #[test]
    fn unrealized_pnl_long_loss() {
        let pnl = calculate_unrealized_pnl(Side::Long, dec!(1), price(dec!(50000)), price(dec!(48000)))
            .unwrap();
        assert_eq!(pnl.value(), dec!(-2000));
    }

    #[test]
    fn unrealized_pnl_short_profit() {
        // short profits when price drops
        let pnl = calculate_unrealized_pnl(Side::Short, dec!(2), price(dec!(50000)), price(dec!(48000)))
            .unwrap();
        assert_eq!(pnl.value(), dec!(4000));
    }

    #[test]
    fn liquidation_price_at_maintenance_boundary() {
        // 10 @ 2000 = 20k notional, 5% mm = 1000 == collateral
        let liq = calculate_liquidation_price(
            Side::Long,
            dec!(10),
            price(dec!(2000)),
            Quote::new(dec!(1000)),
            &risk(500),
        )
        .unwrap();
        assert_eq!(liq, Decimal::ZERO);

        let liq_short = calculate_liquidation_price(
            Side::Short,
            dec!(10),
            price(dec!(2000)),
            Quote::new(dec!(1000)),
            &risk(500),
        )
        .unwrap();
        assert_eq!(liq_short, Decimal::MAX);
    }

    #[test]
    fn liquidation_price_long_below_entry() {
        // buffer = 3000 - 1000 = 2000, move = 200
        let liq = calculate_liquidation_price(
            Side::Long,
            dec!(10),
            price(dec!(2000)),
            Quote::new(dec!(3000)),
            &risk(500),
        )
        .unwrap();
        assert_eq!(liq, dec!(1800));
    }

    #[test]
    fn liquidation_price_short_above_entry() {
        let liq = calculate_liquidation_price(
            Side::Short,
            dec!(10),
            price(dec!(2000)),
            Quote::new(dec!(3000)),
            &risk(500),
        )
        .unwrap();
        assert_eq!(liq, dec!(2200));
    }

    #[test]
    fn liquidation_price_long_floors_at_epsilon() {
        // collateral far above notional pushes the price move past entry
        let liq = calculate_liquidation_price(
            Side::Long,
            dec!(1),
            price(dec!(100)),
            Quote::new(dec!(1000)),
            &risk(500),
        )
        .unwrap();
        assert_eq!(liq, PRICE_EPSILON);
    }

    #[test]
    fn liquidation_price_short_saturates() {
        let liq = calculate_liquidation_price(
            Side::Short,
            dec!(0.0000000001),
            price(Decimal::MAX / dec!(2)),
            Quote::new(Decimal::MAX / dec!(2)),
            &risk(0),
        )
        .unwrap();
        assert_eq!(liq, Decimal::MAX);
    }

    #[test]
    fn proportional_realization() {
        // half of 200 pnl
        let realized = proportional_pnl(Quote::new(dec!(200)), dec!(5), dec!(10)).unwrap();
        assert_eq!(realized.value(), dec!(100));
    }

    #[test]
    fn entry_price_averaging() {
        let avg = averaged_entry_price(dec!(1), price(dec!(50000)), dec!(1), price(dec!(52000))).unwrap();
        assert_eq!(avg.value(), dec!(51000));
    }

    #[test]
    fn margin_ratio_without_exposure() {
        assert_eq!(margin_ratio(Quote::new(dec!(5000)), Decimal::ZERO), Decimal::MAX);
        assert_eq!(margin_ratio(Quote::new(dec!(5000)), dec!(50000)), dec!(0.1));
    }
}
