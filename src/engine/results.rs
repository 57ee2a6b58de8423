// 8.0.2: errors for engine operations and the taxonomy callers branch on.

use crate::access::Role;
use crate::adl::AdlError;
use crate::funding::FundingError;
use crate::position_store::PositionError;
use crate::risk::Module;
use crate::risk_config::RiskConfigError;
use crate::types::{AccountId, MarketId, MathError, PositionId};
use serde::{Deserialize, Serialize};

/// What kind of failure, independent of which component raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Authorization,
    NotFound,
    Validation,
    Timing,
    StateGate,
    Capacity,
    Arithmetic,
}

impl ErrorKind {
    // timing and capacity clear up on their own. everything else needs a different call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Timing | ErrorKind::Capacity)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("Caller {caller:?} lacks role {role}")]
    Unauthorized { role: Role, caller: AccountId },

    #[error("Module {0} is paused")]
    ModulePaused(Module),

    #[error("Circuit breaker tripped for market {0:?}")]
    CircuitTripped(MarketId),

    #[error("No price available for market {0:?}")]
    NoPrice(MarketId),

    #[error("Position error: {0}")]
    Position(#[from] PositionError),

    #[error("ADL error: {0}")]
    Adl(#[from] AdlError),

    #[error("Funding error: {0}")]
    Funding(#[from] FundingError),

    #[error("Risk config error: {0}")]
    RiskConfig(#[from] RiskConfigError),

    #[error(transparent)]
    Math(#[from] MathError),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Unauthorized { .. } => ErrorKind::Authorization,
            EngineError::ModulePaused(_) | EngineError::CircuitTripped(_) | EngineError::NoPrice(_) => {
                ErrorKind::StateGate
            }
            EngineError::Position(e) => position_kind(e),
            EngineError::Adl(e) => match e {
                AdlError::AdlNotEnabled(_) | AdlError::NotConfigured(_) => ErrorKind::StateGate,
                AdlError::InsufficientCandidates { .. } => ErrorKind::Capacity,
                AdlError::GracePeriod { .. } => ErrorKind::Timing,
                AdlError::InvalidSize(_) | AdlError::InvalidConfig { .. } => ErrorKind::Validation,
                AdlError::Position(e) => position_kind(e),
            },
            EngineError::Funding(e) => match e {
                FundingError::NotConfigured(_) => ErrorKind::StateGate,
                FundingError::FundingTooSoon { .. } => ErrorKind::Timing,
                FundingError::InvalidConfig { .. } => ErrorKind::Validation,
                FundingError::Position(e) => position_kind(e),
                FundingError::Math(_) => ErrorKind::Arithmetic,
            },
            EngineError::RiskConfig(e) => match e {
                RiskConfigError::InvalidParams { .. } => ErrorKind::Validation,
                RiskConfigError::MarketNotConfigured(_) => ErrorKind::StateGate,
            },
            EngineError::Math(_) => ErrorKind::Arithmetic,
        }
    }
}

fn position_kind(error: &PositionError) -> ErrorKind {
    match error {
        PositionError::PositionNotFound(_) => ErrorKind::NotFound,
        PositionError::InvalidSize(_)
        | PositionError::InsufficientCollateral { .. }
        | PositionError::LeverageExceedsMax { .. }
        | PositionError::InsufficientInitialMargin { .. } => ErrorKind::Validation,
        PositionError::MarketNotConfigured(_) => ErrorKind::StateGate,
        PositionError::Math(_) => ErrorKind::Arithmetic,
    }
}

/// Outcome of a price-driven refresh of one market.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshResult {
    pub market_id: MarketId,
    pub positions_refreshed: usize,
    pub liquidatable: Vec<PositionId>,
}
