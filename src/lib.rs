// perps-risk-core: risk core for a perpetual futures exchange.
// isolated-margin positions, liquidation prices, funding settlement and auto-deleveraging.
// all computation is deterministic with no external I/O, the caller owns the clock.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: MarketId, Side, Price, Quote, Leverage, Bps
//   2.x  risk_config.rs: per-market margin tiers
//   3.x  position.rs: position struct, PnL, liquidation price
//   4.x  position_store.rs: position lifecycle, open interest, portfolios
//   5.x  funding.rs: imbalance funding rate + zero-sum settlement
//   6.x  adl.rs: ranked auto-deleveraging queues
//   6.3  risk.rs: pause flags + circuit breakers
//   6.4  access.rs: role checks
//   7.x  config.rs: market presets, json config
//   8.x  engine/: entry points wired behind roles and gates
//   9.x  price_feed.rs: oracle prices (in-memory)
//   11.x events.rs: state transition events for audit

// core risk modules
pub mod adl;
pub mod engine;
pub mod events;
pub mod funding;
pub mod position;
pub mod position_store;
pub mod risk_config;
pub mod types;

// safety and collaborator modules
pub mod access;
pub mod risk;

// integration modules
pub mod config;
pub mod price_feed;

// re exports for convenience
pub use access::*;
pub use adl::*;
pub use engine::*;
pub use events::*;
pub use funding::*;
pub use position::*;
pub use position_store::*;
pub use risk::*;
pub use risk_config::*;
pub use types::*;
pub use config::{ConfigError, CoreConfig, Environment, MarketSetup};
pub use price_feed::{OracleBook, PriceSource, PriceUpdate};
