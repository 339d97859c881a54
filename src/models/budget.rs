use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct Budget {
    pub id: Option<i64>,
    pub user_id: i64,
    pub category_id: i64,
    /// Display name of the budgeted category.
    pub name: String,
    /// Format: "YYYY-MM"
    pub month: String,
    pub amount: Decimal,
}

impl Budget {
    pub fn new(user_id: i64, category_id: i64, name: String, month: String, amount: Decimal) -> Self {
        Self {
            id: None,
            user_id,
            category_id,
            name,
            month,
            amount,
        }
    }
}

/// A budget together with the activity recorded against it in its month.
///
/// The remaining balance is never stored; it is derived from the
/// transaction log every time a status is read.
#[derive(Debug, Clone)]
pub struct BudgetStatus {
    pub budget: Budget,
    /// Sum of absolute expense amounts in the budget's category and month.
    pub spent: Decimal,
    /// Sum of income amounts in the budget's category and month.
    pub income: Decimal,
}

impl BudgetStatus {
    /// `amount - expenses + incomes` for the budget's month.
    pub fn current(&self) -> Decimal {
        self.budget
            .amount
            .saturating_sub(self.spent)
            .saturating_add(self.income)
    }

    /// Share of the limit consumed by expenses, `None` for a zero limit.
    pub fn used_ratio(&self) -> Option<Decimal> {
        if self.budget.amount > Decimal::ZERO {
            Some(
                self.spent
                    .checked_div(self.budget.amount)
                    .unwrap_or(Decimal::MAX),
            )
        } else {
            None
        }
    }
}
