// Price Feed Integration
//
// This module abstracts how the core receives prices. The core is agnostic to
// whether prices come from Pyth, Chainlink or a custom oracle, and it does not
// judge freshness itself: whatever the source returns is the current price.

use crate::types::{MarketId, Price, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single price observation for one market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceUpdate {
    pub price: Price,
    /// Confidence interval (if provided by source like Pyth), zero otherwise.
    pub confidence: Decimal,
    pub timestamp: Timestamp,
}

impl PriceUpdate {
    pub fn new(price: Price, timestamp: Timestamp) -> Self {
        Self {
            price,
            confidence: Decimal::ZERO,
            timestamp,
        }
    }

    pub fn with_confidence(mut self, confidence: Decimal) -> Self {
        self.confidence = confidence;
        self
    }
}

/// Anything that can quote a market.
pub trait PriceSource {
    fn get_price(&self, market_id: MarketId) -> Option<PriceUpdate>;
}

/// In-memory price book. Latest write wins.
#[derive(Debug, Clone, Default)]
pub struct OracleBook {
    prices: HashMap<MarketId, PriceUpdate>,
}

impl OracleBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(&mut self, market_id: MarketId, price: Price, timestamp: Timestamp) {
        self.prices.insert(market_id, PriceUpdate::new(price, timestamp));
    }

    pub fn submit(&mut self, market_id: MarketId, update: PriceUpdate) {
        self.prices.insert(market_id, update);
    }

    pub fn clear(&mut self, market_id: MarketId) -> Option<PriceUpdate> {
        self.prices.remove(&market_id)
    }
}

impl PriceSource for OracleBook {
    fn get_price(&self, market_id: MarketId) -> Option<PriceUpdate> {
        self.prices.get(&market_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn latest_price_wins() {
        let mut book = OracleBook::new();
        let market = MarketId(1);
        assert!(book.get_price(market).is_none());

        book.set_price(market, Price::new_unchecked(dec!(2000)), Timestamp::from_millis(1));
        book.submit(
            market,
            PriceUpdate::new(Price::new_unchecked(dec!(2010)), Timestamp::from_millis(2))
                .with_confidence(dec!(0.5)),
        );

        let update = book.get_price(market).unwrap();
        assert_eq!(update.price.value(), dec!(2010));
        assert_eq!(update.confidence, dec!(0.5));

        assert!(book.clear(market).is_some());
        assert!(book.get_price(market).is_none());
    }
}
