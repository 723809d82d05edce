use async_trait::async_trait;
use dashmap::DashSet;
use folio_model::PatronId;

use crate::{error::Result, policy::LendingPolicy};

/// Membership lookup consumed by request intake, due-date computation,
/// and waitlist scoring.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubscriptionOracle: Send + Sync {
    /// Whether the patron currently holds an active premium membership.
    async fn is_premium(&self, patron_id: PatronId) -> Result<bool>;

    /// Loan length in days granted to this patron.
    async fn loan_duration_days(&self, patron_id: PatronId) -> Result<i64>;
}

/// In-process membership roster.
///
/// Suitable for tests and single-node deployments where the membership
/// system has not been split out yet.
#[derive(Debug, Default)]
pub struct StaticSubscriptionOracle {
    premium: DashSet<PatronId>,
    policy: LendingPolicy,
}

impl StaticSubscriptionOracle {
    pub fn new(policy: LendingPolicy) -> Self {
        Self {
            premium: DashSet::new(),
            policy,
        }
    }

    pub fn grant_premium(&self, patron_id: PatronId) {
        self.premium.insert(patron_id);
    }

    pub fn revoke_premium(&self, patron_id: PatronId) {
        self.premium.remove(&patron_id);
    }
}

#[async_trait]
impl SubscriptionOracle for StaticSubscriptionOracle {
    async fn is_premium(&self, patron_id: PatronId) -> Result<bool> {
        Ok(self.premium.contains(&patron_id))
    }

    async fn loan_duration_days(&self, patron_id: PatronId) -> Result<i64> {
        Ok(self
            .policy
            .loan_duration_days(self.premium.contains(&patron_id)))
    }
}
