//! Amortization schedule generation.

use chrono::{DateTime, Months, Utc};
use common::round_currency;
use rust_decimal::Decimal;

/// Pricing terms applied to every new loan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoanPolicy {
    /// Flat interest applied once to the principal, e.g. `0.1` for 10%.
    pub interest_rate: Decimal,
    /// Number of monthly installments.
    pub installments: u32,
}

impl LoanPolicy {
    pub fn new(interest_rate: Decimal, installments: u32) -> Self {
        Self {
            interest_rate,
            installments,
        }
    }
}

impl Default for LoanPolicy {
    fn default() -> Self {
        Self {
            interest_rate: Decimal::new(1, 1),
            installments: 50,
        }
    }
}

/// A generated installment, before it is given an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Installment {
    pub payment_no: u32,
    pub due_date: DateTime<Utc>,
    pub amount: Decimal,
}

/// Builds the repayment plan for `principal` starting at `start`.
///
/// `total = round(principal * (1 + rate))` and every installment is
/// `round(total / n)`. The per-installment rounding is not redistributed, so
/// the installments may differ from `total` by up to `n * 0.5`.
/// Installment `i` is due `i` months after `start`.
///
/// Inputs are not validated; callers reject non-positive principals.
pub fn generate_schedule(
    principal: Decimal,
    policy: &LoanPolicy,
    start: DateTime<Utc>,
) -> (Decimal, Vec<Installment>) {
    let total = round_currency(principal + principal * policy.interest_rate);

    if policy.installments == 0 {
        return (total, Vec::new());
    }

    let per_period = round_currency(total / Decimal::from(policy.installments));

    let installments = (1..=policy.installments)
        .map(|payment_no| Installment {
            payment_no,
            due_date: due_date(start, payment_no),
            amount: per_period,
        })
        .collect();

    (total, installments)
}

/// `start` plus `months` calendar months, clamped at the largest representable date.
fn due_date(start: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    start
        .checked_add_months(Months::new(months))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
