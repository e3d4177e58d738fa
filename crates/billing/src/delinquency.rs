//! Delinquency evaluation.

use crate::loan::Schedule;

/// Whether the unpaid installments contain two back-to-back periods.
///
/// `overdue` must hold only the entries that are unpaid or flagged as missed
/// and due before the cut-off, ordered by `payment_no`. Paid periods are not
/// in the input, so two unpaid periods with a paid one between them do not
/// count as consecutive.
pub fn is_delinquent(overdue: &[Schedule]) -> bool {
    overdue
        .windows(2)
        .any(|pair| pair[1].payment_no == pair[0].payment_no + 1)
}
