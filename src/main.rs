//! Perpetual risk core simulation.
//!
//! Walks the engine through the boundary liquidation case, a ranked ADL
//! event, a funding settlement and a partial close.

use perps_risk_core::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing_subscriber::EnvFilter;

const ETH: MarketId = MarketId(1);
const BTC: MarketId = MarketId(2);

const RISK_MANAGER: AccountId = AccountId(900);
const ENTRY: AccountId = AccountId(901);
const LIQUIDATOR: AccountId = AccountId(902);
const KEEPER: AccountId = AccountId(903);

type SimResult = Result<(), Box<dyn std::error::Error>>;

fn main() -> SimResult {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    println!("Perpetual Risk Core Simulation");
    println!("Isolated Margin, Ranked ADL, Imbalance Funding");
    println!("Started at {} (engine clocks start at 0)\n", Timestamp::now());

    scenario_a_boundary_liquidation()?;
    scenario_b_ranked_adl()?;
    scenario_c_funding_settlement()?;
    scenario_d_partial_close()?;

    println!("\nAll simulations completed successfully.");
    Ok(())
}

fn engine() -> Result<Engine, ConfigError> {
    let mut roles = RoleTable::new();
    roles
        .grant(Role::RiskManager, RISK_MANAGER)
        .grant(Role::TradingEntry, ENTRY)
        .grant(Role::Liquidator, LIQUIDATOR)
        .grant(Role::Keeper, KEEPER);
    Engine::from_config(&CoreConfig::default(), roles, OracleBook::new(), CircuitBoard::default())
}

fn price(value: Decimal) -> Price {
    Price::new_unchecked(value)
}

fn leverage(value: u32) -> Leverage {
    Leverage::new(value).unwrap_or(Leverage::ONE)
}

fn request(owner: u64, market_id: MarketId, side: Side, size: Decimal, collateral: Decimal, entry: Decimal, lev: u32) -> OpenRequest {
    OpenRequest {
        owner: AccountId(owner),
        market_id,
        side,
        size,
        collateral: Quote::new(collateral),
        entry_price: price(entry),
        leverage: leverage(lev),
    }
}

/// Collateral exactly at maintenance margin pins the liquidation price to zero.
fn scenario_a_boundary_liquidation() -> SimResult {
    println!("Scenario A: Collateral At Maintenance Margin\n");

    let mut engine = engine()?;
    let now = engine.time();
    engine.prices_mut().set_price(ETH, price(dec!(2000)), now);

    // 4% maintenance lets the 5% collateral through, then the tier tightens
    engine.configure_market(RISK_MANAGER, ETH, MarketRiskConfig::new(Bps::new(400), Bps::new(500), leverage(20)))?;
    let id = engine.open_position(ENTRY, request(1, ETH, Side::Long, dec!(10), dec!(1000), dec!(2000), 20))?;
    println!("  LONG 10 @ $2000 with $1000 collateral, 20x");
    println!("  Liquidation price at 4% maintenance: ${}", engine.position(id).map(|p| p.liquidation_price).unwrap_or_default());

    engine.configure_market(RISK_MANAGER, ETH, MarketRiskConfig::new(Bps::new(500), Bps::new(501), leverage(20)))?;
    engine.modify_position(ENTRY, id, Decimal::ZERO, Decimal::ZERO)?;
    println!("  Maintenance raised to 5%, notional $20000, maintenance margin $1000");
    println!(
        "  Liquidation price: ${}, liquidatable: {}\n",
        engine.position(id).map(|p| p.liquidation_price).unwrap_or_default(),
        engine.is_liquidatable(id).unwrap_or(false)
    );
    Ok(())
}

/// A liquidated long is covered by the most profitable, most levered shorts.
fn scenario_b_ranked_adl() -> SimResult {
    println!("Scenario B: Ranked Auto-Deleveraging\n");

    let mut engine = engine()?;
    let now = engine.time();
    engine.prices_mut().set_price(BTC, price(dec!(2000)), now);

    let liquidated = engine.open_position(ENTRY, request(10, BTC, Side::Long, dec!(70), dec!(11200), dec!(2000), 10))?;
    let shorts = [
        (11, dec!(50), dec!(8000), 20),
        (12, dec!(30), dec!(4800), 15),
        (13, dec!(10), dec!(1600), 25),
    ];
    for (owner, size, collateral, lev) in shorts {
        engine.open_position(ENTRY, request(owner, BTC, Side::Short, size, collateral, dec!(2000), lev))?;
    }

    let now = engine.time();
    engine.prices_mut().set_price(BTC, price(dec!(1000)), now);
    let refresh = engine.refresh_market(KEEPER, BTC)?;
    println!("  Price drops to $1000, {} liquidatable", refresh.liquidatable.len());
    for (rank, candidate) in engine.adl_queue(BTC, Side::Short).iter().enumerate() {
        println!(
            "  #{} position {}: pnl ${}, {}x, score {}",
            rank + 1,
            candidate.position_id.0,
            candidate.unrealized_pnl,
            candidate.leverage,
            candidate.score
        );
    }

    let outcome = engine.execute_adl(LIQUIDATOR, BTC, liquidated, Side::Long, dec!(70), price(dec!(1000)))?;
    for d in &outcome.deleveraged {
        println!(
            "  Deleveraged position {} (rank {}): closed {}, realized ${}",
            d.position_id.0, d.rank, d.size_closed, d.realized_pnl
        );
    }
    println!("  Covered {} of 70, fully covered: {}\n", outcome.total_closed, outcome.fully_covered);
    Ok(())
}

/// Longs outweigh shorts 600 to 400, so longs pay the capped imbalance rate.
fn scenario_c_funding_settlement() -> SimResult {
    println!("Scenario C: Funding Settlement\n");

    let mut engine = engine()?;
    let now = engine.time();
    engine.prices_mut().set_price(ETH, price(dec!(100)), now);

    engine.open_position(ENTRY, request(20, ETH, Side::Long, dec!(600), dec!(6000), dec!(100), 10))?;
    engine.open_position(ENTRY, request(21, ETH, Side::Short, dec!(300), dec!(3000), dec!(100), 10))?;
    engine.open_position(ENTRY, request(22, ETH, Side::Short, dec!(100), dec!(1000), dec!(100), 10))?;
    println!("  Preview rate: {}", engine.preview_funding_rate(ETH)?);

    engine.advance_time(8 * 3600 * 1000);
    let settlement = engine.settle_funding(KEEPER, ETH)?;
    println!("  Settled {} period(s) at {}", settlement.periods, settlement.rate_bps);
    for payment in &settlement.payments {
        println!("  Position {} ({}): ${}", payment.position_id.0, payment.side, payment.amount);
    }
    println!("  Net transfer: ${}\n", settlement.net_transfer());
    Ok(())
}

/// Halving a position realizes half its unrealized pnl.
fn scenario_d_partial_close() -> SimResult {
    println!("Scenario D: Partial Close\n");

    let mut engine = engine()?;
    let now = engine.time();
    engine.prices_mut().set_price(ETH, price(dec!(2000)), now);

    let id = engine.open_position(ENTRY, request(30, ETH, Side::Long, dec!(10), dec!(2000), dec!(2000), 10))?;
    let now = engine.time();
    engine.prices_mut().set_price(ETH, price(dec!(2020)), now);
    engine.refresh_market(KEEPER, ETH)?;
    println!("  LONG 10 @ $2000, mark $2020, unrealized ${}", engine.position(id).map(|p| p.unrealized_pnl).unwrap_or(Quote::zero()));

    let realized = engine.modify_position(ENTRY, id, dec!(-5), Decimal::ZERO)?;
    let remaining = engine.position(id).map(|p| p.unrealized_pnl).unwrap_or(Quote::zero());
    println!("  Reduced by 5: realized ${realized}, still unrealized ${remaining}");

    let closed = engine.close_position(ENTRY, id)?;
    println!("  Closed remainder for ${closed}, {} events logged\n", engine.events().len());
    Ok(())
}
