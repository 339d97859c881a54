//! Monthly spending advice.
//!
//! Builds a plain-text report for one user from the current month's
//! transactions and budgets:
//!
//! 1. per-category alerts and warnings against budget limits
//! 2. unusual spending (largest expense, most frequent category)
//! 3. overall totals and how much of the total budget is used
//! 4. a targeted tip for the most strained category
//! 5. optionally, tips written by a chat-completion model
//!
//! Everything except step 5 is deterministic. A failing completion service
//! never fails the report; its section is replaced by a fixed note.

mod tips;

pub(crate) use tips::TipTable;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::completion::CompletionService;
use crate::config::{AdviceSettings, AdviceThresholds};
use crate::models::{Budget, Transaction};
use crate::period;

pub(crate) const NO_TRANSACTIONS_MESSAGE: &str = "No transactions found for this month. Start recording your expenses to receive personalized advice.";

pub(crate) const AI_UNAVAILABLE_MESSAGE: &str =
    "AI advice is temporarily unavailable. Use the automatic advice above.";

/// Where the generator reads a user's data from.
pub(crate) trait LedgerSource {
    /// Transactions dated between `start` and `end`, both inclusive.
    fn transactions_between(
        &self,
        user_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<Transaction>>;

    /// Every budget of the user, all months. The generator keeps only the
    /// report month's budgets; a budget does not roll over.
    fn budgets(&self, user_id: i64) -> anyhow::Result<Vec<Budget>>;
}

#[derive(Debug, Error)]
pub(crate) enum AdviceError {
    #[error("Failed to load {0}: {1:#}")]
    DataAccess(&'static str, anyhow::Error),
}

pub(crate) struct AdviceGenerator<'a> {
    ledger: &'a dyn LedgerSource,
    completion: Option<&'a dyn CompletionService>,
    thresholds: AdviceThresholds,
    tips: TipTable,
    currency: String,
}

impl<'a> AdviceGenerator<'a> {
    pub(crate) fn new(ledger: &'a dyn LedgerSource, settings: &AdviceSettings) -> Self {
        Self {
            ledger,
            completion: None,
            thresholds: settings.thresholds.clone(),
            tips: TipTable::default(),
            currency: settings.currency.clone(),
        }
    }

    pub(crate) fn with_completion(mut self, service: &'a dyn CompletionService) -> Self {
        self.completion = Some(service);
        self
    }

    pub(crate) fn with_tips(mut self, tips: TipTable) -> Self {
        self.tips = tips;
        self
    }

    pub(crate) fn generate_monthly_advice(&self, user_id: i64) -> Result<String, AdviceError> {
        self.generate_for_date(user_id, period::today())
    }

    /// Report for the calendar month containing `today`.
    pub(crate) fn generate_for_date(
        &self,
        user_id: i64,
        today: NaiveDate,
    ) -> Result<String, AdviceError> {
        let (first_day, last_day) = period::month_bounds(today);
        let txns = self
            .ledger
            .transactions_between(user_id, first_day, last_day)
            .map_err(|e| AdviceError::DataAccess("transactions", e))?;

        if txns.is_empty() {
            debug!(user_id, %first_day, "No transactions this month");
            return Ok(NO_TRANSACTIONS_MESSAGE.to_string());
        }

        let month = period::month_key(today);
        let budgets: Vec<Budget> = self
            .ledger
            .budgets(user_id)
            .map_err(|e| AdviceError::DataAccess("budgets", e))?
            .into_iter()
            .filter(|b| b.month == month)
            .collect();

        let figures = MonthlyFigures::new(&txns, &budgets);
        let header = format!("Advice for {}:", today.format("%B %Y"));

        let sections = [
            vec![header],
            self.category_analysis(&figures),
            self.unusual_spending(&txns),
            self.general_advice(&figures),
            self.targeted_recommendation(&figures),
            self.model_addendum(&figures),
        ];

        info!(
            user_id,
            %month,
            transactions = txns.len(),
            budgets = budgets.len(),
            "Generated monthly advice"
        );

        Ok(sections
            .into_iter()
            .filter(|lines| !lines.is_empty())
            .map(|lines| lines.join("\n"))
            .collect::<Vec<_>>()
            .join("\n\n"))
    }

    fn money(&self, amount: Decimal) -> String {
        format!("{:.2} {}", amount, self.currency)
    }

    fn category_analysis(&self, figures: &MonthlyFigures) -> Vec<String> {
        let mut lines = Vec::new();
        for (category, &spent) in &figures.spending {
            let limit = figures.limit(category);
            if limit > Decimal::ZERO {
                let ratio = used_ratio(spent, limit);
                if ratio > self.thresholds.high {
                    lines.push(format!(
                        "ALERT - You have spent {} of your \"{category}\" budget ({} of {}). Budget exceeded!",
                        percent(ratio),
                        self.money(spent),
                        self.money(limit),
                    ));
                } else if ratio > self.thresholds.moderate {
                    lines.push(format!(
                        "WARNING - You have spent {} of your \"{category}\" budget. Watch your spending!",
                        percent(ratio),
                    ));
                }
            } else if spent > Decimal::ZERO {
                lines.push(format!(
                    "SUGGESTION - \"{category}\": {} spent with no budget defined. Consider creating one!",
                    self.money(spent),
                ));
            }
        }
        lines
    }

    fn unusual_spending(&self, txns: &[Transaction]) -> Vec<String> {
        let mut lines = Vec::new();

        let mut largest: Option<&Transaction> = None;
        for txn in txns.iter().filter(|t| t.is_expense()) {
            if largest.map_or(true, |l| txn.amount < l.amount) {
                largest = Some(txn);
            }
        }
        if let Some(expense) = largest {
            lines.push(format!(
                "Largest expense: {} ({}) in category \"{}\"",
                expense.name,
                self.money(expense.abs_amount()),
                expense.category_name(),
            ));
        }

        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for txn in txns.iter().filter(|t| t.is_expense()) {
            *counts.entry(txn.category_name()).or_default() += 1;
        }
        if let Some((category, count)) = first_max_by_key(counts.iter(), |(_, c)| **c) {
            if *count > self.thresholds.frequency_min {
                lines.push(format!(
                    "Most frequent category: \"{category}\" ({count} transactions)"
                ));
            }
        }

        lines
    }

    fn general_advice(&self, figures: &MonthlyFigures) -> Vec<String> {
        let total_spent = saturating_sum(figures.spending.values());
        let total_budget = saturating_sum(figures.limits.values());

        let mut lines = vec![
            "General analysis:".to_string(),
            format!("Total spent: {}", self.money(total_spent)),
            format!("Total budget: {}", self.money(total_budget)),
        ];

        if total_budget > Decimal::ZERO {
            let ratio = used_ratio(total_spent, total_budget);
            lines.push(format!("Budget used: {}", percent(ratio)));
            lines.push(if ratio > Decimal::ONE {
                "You have exceeded your total budget! Review your spending urgently.".to_string()
            } else if ratio > self.thresholds.moderate {
                "You are approaching your budget limit. Be careful with your next expenses."
                    .to_string()
            } else {
                "Your budget management is on track. Keep it up!".to_string()
            });
        } else {
            lines.push(
                "You have no budgets defined yet. Budgets are essential for keeping your finances under control!"
                    .to_string(),
            );
        }
        lines
    }

    fn targeted_recommendation(&self, figures: &MonthlyFigures) -> Vec<String> {
        let mut lines = Vec::new();

        let strained = first_max_by_key(
            figures.spending.iter().filter_map(|(category, &spent)| {
                let limit = figures.limit(category);
                (limit > Decimal::ZERO).then(|| (category, used_ratio(spent, limit)))
            }),
            |(_, ratio)| *ratio,
        );
        if let Some((category, ratio)) = strained {
            if ratio > self.thresholds.targeted {
                lines.push(format!(
                    "Targeted advice: the \"{category}\" category needs your attention ({} of budget used). {}",
                    percent(ratio),
                    self.tips.tip_for(category),
                ));
            }
        }

        let unbudgeted = first_max_by_key(
            figures
                .spending
                .iter()
                .filter(|(category, _)| figures.limit(category) <= Decimal::ZERO),
            |(_, spent)| **spent,
        );
        if let Some((category, &spent)) = unbudgeted {
            if spent > self.thresholds.unbudgeted_min {
                lines.push(format!(
                    "Category to budget: \"{category}\" ({}) deserves a dedicated budget.",
                    self.money(spent),
                ));
            }
        }

        lines
    }

    fn model_addendum(&self, figures: &MonthlyFigures) -> Vec<String> {
        let Some(service) = self.completion else {
            return Vec::new();
        };
        if figures.spending.is_empty() {
            return Vec::new();
        }

        let prompt = self.build_prompt(figures);
        match service.complete(&prompt) {
            Ok(text) if !text.trim().is_empty() => {
                vec!["AI advice:".to_string(), text.trim().to_string()]
            }
            Ok(_) => {
                warn!("Completion service returned an empty answer");
                vec![AI_UNAVAILABLE_MESSAGE.to_string()]
            }
            Err(err) => {
                warn!(error = %err, "AI advice unavailable");
                vec![AI_UNAVAILABLE_MESSAGE.to_string()]
            }
        }
    }

    fn build_prompt(&self, figures: &MonthlyFigures) -> String {
        let mut prompt = String::from(
            "You are a smart budgeting assistant. Analyse the following monthly spending \
             and give 3 practical, personalized tips:\n\n",
        );
        for (category, &spent) in &figures.spending {
            let limit = figures.limit(category);
            let detail = if limit > Decimal::ZERO {
                format!(
                    "{} of a {} budget",
                    percent(used_ratio(spent, limit)),
                    self.money(limit)
                )
            } else {
                "no budget defined".to_string()
            };
            prompt.push_str(&format!(
                "- {category}: {} spent ({detail})\n",
                self.money(spent)
            ));
        }
        prompt.push_str(
            "\nGive concrete, specific and achievable advice in French. \
             Be encouraging but realistic. Maximum 200 words.",
        );
        prompt
    }
}

/// Spending and limits per category for one month.
pub(crate) struct MonthlyFigures {
    /// Absolute expense totals.
    pub(crate) spending: BTreeMap<String, Decimal>,
    /// Budget amounts; budgets sharing a name are summed.
    pub(crate) limits: BTreeMap<String, Decimal>,
}

impl MonthlyFigures {
    pub(crate) fn new(txns: &[Transaction], budgets: &[Budget]) -> Self {
        let mut spending = BTreeMap::new();
        for txn in txns.iter().filter(|t| t.is_expense()) {
            let total = spending
                .entry(txn.category_name().to_string())
                .or_insert(Decimal::ZERO);
            *total = total.saturating_add(txn.abs_amount());
        }

        let mut limits = BTreeMap::new();
        for budget in budgets {
            let total = limits
                .entry(budget.name.clone())
                .or_insert(Decimal::ZERO);
            *total = total.saturating_add(budget.amount);
        }

        Self { spending, limits }
    }

    pub(crate) fn limit(&self, category: &str) -> Decimal {
        self.limits.get(category).copied().unwrap_or(Decimal::ZERO)
    }
}

// Amounts come from the ledger unchecked, so arithmetic saturates instead of
// overflowing.

/// `spent / limit` for a positive `limit`.
fn used_ratio(spent: Decimal, limit: Decimal) -> Decimal {
    spent.checked_div(limit).unwrap_or(Decimal::MAX)
}

fn saturating_sum<'a>(amounts: impl Iterator<Item = &'a Decimal>) -> Decimal {
    amounts.fold(Decimal::ZERO, |acc, amount| acc.saturating_add(*amount))
}

fn percent(ratio: Decimal) -> String {
    format!("{:.1}%", ratio.saturating_mul(Decimal::ONE_HUNDRED))
}

/// Like `Iterator::max_by_key`, but the first of several equal maxima wins.
fn first_max_by_key<I, K, F>(iter: I, key: F) -> Option<I::Item>
where
    I: Iterator,
    K: PartialOrd,
    F: Fn(&I::Item) -> K,
{
    let mut best: Option<(I::Item, K)> = None;
    for item in iter {
        let k = key(&item);
        if best.as_ref().map_or(true, |(_, best_k)| k > *best_k) {
            best = Some((item, k));
        }
    }
    best.map(|(item, _)| item)
}
