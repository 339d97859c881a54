use chrono::NaiveDate;
use rust_decimal::Decimal;

/// Outcome of a completed user-to-user transfer.
#[derive(Debug, Clone)]
pub struct Transfer {
    pub from_user_id: i64,
    pub to_user_id: i64,
    pub amount: Decimal,
    pub date: NaiveDate,
    /// Row id of the sender's expense leg.
    pub debit_id: i64,
    /// Row id of the recipient's income leg.
    pub credit_id: i64,
}
