//! Caller authorization.
//!
//! The core never decides how roles are organized. Every mutating entry point
//! asks an [`Authorizer`] whether the caller holds one specific role;
//! [`RoleTable`] is the in-memory implementation used by the simulator and
//! tests.

use crate::types::AccountId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Trading entry point: open / modify / close.
    TradingEntry,
    /// Liquidation subsystem: force-close and ADL.
    Liquidator,
    /// Risk-manager admin: market, ADL and funding configuration.
    RiskManager,
    /// Scheduler that settles funding.
    Keeper,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::TradingEntry => "trading-entry",
            Role::Liquidator => "liquidator",
            Role::RiskManager => "risk-manager",
            Role::Keeper => "keeper",
        };
        f.write_str(name)
    }
}

pub trait Authorizer {
    fn has_role(&self, role: Role, caller: AccountId) -> bool;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleTable {
    grants: HashMap<Role, HashSet<AccountId>>,
}

impl RoleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&mut self, role: Role, account: AccountId) -> &mut Self {
        self.grants.entry(role).or_default().insert(account);
        self
    }

    pub fn revoke(&mut self, role: Role, account: AccountId) -> bool {
        self.grants
            .get_mut(&role)
            .is_some_and(|holders| holders.remove(&account))
    }

    pub fn holders(&self, role: Role) -> impl Iterator<Item = &AccountId> {
        self.grants.get(&role).into_iter().flatten()
    }
}

impl Authorizer for RoleTable {
    fn has_role(&self, role: Role, caller: AccountId) -> bool {
        self.grants
            .get(&role)
            .is_some_and(|holders| holders.contains(&caller))
    }
}
