use rust_decimal::Decimal;
use serde::Deserialize;

/// Lending rules applied across request intake and circulation.
///
/// Every field can be overridden from the `[policy]` section of the
/// configuration file; the defaults are the library's house rules.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LendingPolicy {
    /// Requests of any status counted per patron per calendar month.
    /// Premium members are exempt from the cap.
    pub monthly_request_quota: u32,
    /// Loan length in days for standard members.
    pub standard_loan_days: i64,
    /// Loan length in days for premium members.
    pub premium_loan_days: i64,
    /// Fraction of a title's MRP charged per day late.
    pub late_fee_rate: Decimal,
}

impl Default for LendingPolicy {
    fn default() -> Self {
        Self {
            monthly_request_quota: 3,
            standard_loan_days: 14,
            premium_loan_days: 30,
            // 0.10
            late_fee_rate: Decimal::new(10, 2),
        }
    }
}

impl LendingPolicy {
    pub fn loan_duration_days(&self, premium: bool) -> i64 {
        if premium {
            self.premium_loan_days
        } else {
            self.standard_loan_days
        }
    }
}
