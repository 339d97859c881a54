use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::category::UNCATEGORIZED;

/// Largest absolute amount accepted for a transaction, budget or limit.
pub const MAX_AMOUNT_UNITS: i64 = 1_000_000_000_000;

pub fn amount_in_range(amount: Decimal) -> bool {
    amount.abs() <= Decimal::from(MAX_AMOUNT_UNITS)
}

#[derive(Debug, Clone)]
pub struct Transaction {
    pub id: Option<i64>,
    pub user_id: i64,
    pub name: String,
    /// Negative for expenses, zero or positive for income.
    pub amount: Decimal,
    pub category_id: Option<i64>,
    /// Display name of the category. Filled in by the store on reads.
    pub category: String,
    pub date: NaiveDate,
    pub created_at: String,
}

impl Transaction {
    pub fn new(
        user_id: i64,
        name: String,
        amount: Decimal,
        category_id: Option<i64>,
        date: NaiveDate,
    ) -> Self {
        Self {
            id: None,
            user_id,
            name,
            amount,
            category_id,
            category: String::new(),
            date,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn is_income(&self) -> bool {
        self.amount >= Decimal::ZERO
    }

    pub fn is_expense(&self) -> bool {
        self.amount < Decimal::ZERO
    }

    pub fn abs_amount(&self) -> Decimal {
        self.amount.abs()
    }

    pub fn category_name(&self) -> &str {
        if self.category.is_empty() {
            UNCATEGORIZED
        } else {
            &self.category
        }
    }
}
