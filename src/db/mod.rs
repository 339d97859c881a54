mod export;
mod schema;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

use crate::advice::LedgerSource;
use crate::models::*;

#[cfg(not(test))]
const HASH_COST: u32 = bcrypt::DEFAULT_COST;
#[cfg(test)]
const HASH_COST: u32 = 4;

const TRANSACTION_SELECT: &str =
    "SELECT t.id, t.user_id, t.name, t.amount, t.category_id, COALESCE(c.name, ''), t.date, t.created_at
     FROM transactions t LEFT JOIN categories c ON t.category_id = c.id";

const BUDGET_SELECT: &str = "SELECT b.id, b.user_id, b.category_id, c.name, b.month, b.amount
     FROM budgets b JOIN categories c ON b.category_id = c.id";

const USER_SELECT: &str = "SELECT id, username, password_hash, total_limit, created_at FROM users";

pub(crate) struct Database {
    conn: Connection,
}

impl Database {
    pub(crate) fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .context("Failed to set database pragmas")?;
        let mut db = Self { conn };
        db.migrate().context("Database migration failed")?;
        db.seed_default_categories()?;
        debug!(path = %path.display(), "Opened database");
        Ok(db)
    }

    #[cfg(test)]
    pub(crate) fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let mut db = Self { conn };
        db.migrate()?;
        db.seed_default_categories()?;
        Ok(db)
    }

    fn migrate(&mut self) -> Result<()> {
        let has_version_table: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            [],
            |row| row.get(0),
        )?;

        if !has_version_table {
            self.conn.execute_batch(schema::SCHEMA_V1)?;
            self.conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                params![schema::CURRENT_VERSION],
            )?;
            info!(version = schema::CURRENT_VERSION, "Created database schema");
            return Ok(());
        }

        let current: i32 = self
            .conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .optional()?
            .unwrap_or(0);

        for &(from_version, sql) in schema::MIGRATIONS {
            if current <= from_version {
                self.conn.execute_batch(sql)?;
            }
        }

        if current < schema::CURRENT_VERSION {
            self.conn.execute(
                "UPDATE schema_version SET version = ?1",
                params![schema::CURRENT_VERSION],
            )?;
            info!(from = current, to = schema::CURRENT_VERSION, "Migrated database schema");
        }

        Ok(())
    }

    fn seed_default_categories(&mut self) -> Result<()> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM categories", [], |row| row.get(0))?;
        if count > 0 {
            return Ok(());
        }

        let tx = self.conn.transaction()?;
        for name in DEFAULT_CATEGORIES {
            tx.execute(
                "INSERT OR IGNORE INTO categories (name) VALUES (?1)",
                params![name],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    // ── Users ─────────────────────────────────────────────────

    pub(crate) fn register_user(&self, username: &str, password: &str) -> Result<i64> {
        let username = username.trim();
        if username.is_empty() {
            anyhow::bail!("Username cannot be empty");
        }
        if password.is_empty() {
            anyhow::bail!("Password cannot be empty");
        }
        if self.get_user_by_name(username)?.is_some() {
            anyhow::bail!("Username '{username}' is already taken");
        }

        let hash = bcrypt::hash(password, HASH_COST).context("Failed to hash password")?;
        let user = User::new(username.to_string(), hash);
        self.conn.execute(
            "INSERT INTO users (username, password_hash, total_limit, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                user.username,
                user.password_hash,
                user.total_limit.to_string(),
                user.created_at,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        info!(user_id = id, username, "Registered user");
        Ok(id)
    }

    /// Returns the user when `password` matches the stored hash.
    pub(crate) fn authenticate(&self, username: &str, password: &str) -> Result<Option<User>> {
        Ok(self
            .get_user_by_name(username)?
            .filter(|user| user.verify_password(password)))
    }

    pub(crate) fn get_user_by_name(&self, username: &str) -> Result<Option<User>> {
        Ok(self
            .conn
            .query_row(
                &format!("{USER_SELECT} WHERE username = ?1"),
                params![username.trim()],
                user_from_row,
            )
            .optional()?)
    }

    pub(crate) fn get_user_by_id(&self, id: i64) -> Result<Option<User>> {
        Ok(self
            .conn
            .query_row(&format!("{USER_SELECT} WHERE id = ?1"), params![id], user_from_row)
            .optional()?)
    }

    pub(crate) fn get_users(&self) -> Result<Vec<User>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{USER_SELECT} ORDER BY username"))?;
        let rows = stmt.query_map([], user_from_row)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub(crate) fn set_total_limit(&self, user_id: i64, amount: Decimal) -> Result<()> {
        ensure_amount_in_range(amount)?;
        let updated = self.conn.execute(
            "UPDATE users SET total_limit = ?1 WHERE id = ?2",
            params![amount.to_string(), user_id],
        )?;
        if updated == 0 {
            anyhow::bail!("User {user_id} not found");
        }
        Ok(())
    }

    // ── Categories ────────────────────────────────────────────

    pub(crate) fn get_categories(&self) -> Result<Vec<Category>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM categories ORDER BY name")?;
        let rows = stmt.query_map([], category_from_row)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub(crate) fn get_category_by_id(&self, id: i64) -> Result<Option<Category>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, name FROM categories WHERE id = ?1",
                params![id],
                category_from_row,
            )
            .optional()?)
    }

    /// Case-insensitive lookup.
    pub(crate) fn get_category_by_name(&self, name: &str) -> Result<Option<Category>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, name FROM categories WHERE name = ?1",
                params![name.trim()],
                category_from_row,
            )
            .optional()?)
    }

    pub(crate) fn insert_category(&self, cat: &Category) -> Result<i64> {
        let name = cat.name.trim();
        if name.is_empty() {
            anyhow::bail!("Category name cannot be empty");
        }
        self.conn
            .execute("INSERT INTO categories (name) VALUES (?1)", params![name])
            .with_context(|| format!("Failed to create category '{name}'"))?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Budgets and transactions reference the id, so only the display name changes.
    pub(crate) fn rename_category(&self, id: i64, new_name: &str) -> Result<()> {
        let new_name = new_name.trim();
        if new_name.is_empty() {
            anyhow::bail!("Category name cannot be empty");
        }
        let updated = self
            .conn
            .execute(
                "UPDATE categories SET name = ?1 WHERE id = ?2",
                params![new_name, id],
            )
            .with_context(|| format!("Failed to rename category to '{new_name}'"))?;
        if updated == 0 {
            anyhow::bail!("Category {id} not found");
        }
        info!(category_id = id, new_name, "Renamed category");
        Ok(())
    }

    // ── Transactions ──────────────────────────────────────────

    pub(crate) fn insert_transaction(&self, txn: &Transaction) -> Result<i64> {
        ensure_amount_in_range(txn.amount)?;
        self.conn.execute(
            "INSERT INTO transactions (user_id, name, amount, category_id, date, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                txn.user_id,
                txn.name,
                txn.amount.to_string(),
                txn.category_id,
                txn.date,
                txn.created_at,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Newest first, optionally restricted to one "YYYY-MM" month.
    pub(crate) fn get_user_transactions(
        &self,
        user_id: i64,
        month: Option<&str>,
    ) -> Result<Vec<Transaction>> {
        let (sql, month_pat) = match month {
            Some(m) => (
                format!(
                    "{TRANSACTION_SELECT} WHERE t.user_id = ?1 AND t.date LIKE ?2
                     ORDER BY t.date DESC, t.id DESC"
                ),
                Some(format!("{m}%")),
            ),
            None => (
                format!("{TRANSACTION_SELECT} WHERE t.user_id = ?1 ORDER BY t.date DESC, t.id DESC"),
                None,
            ),
        };

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = match month_pat {
            Some(pat) => stmt
                .query_map(params![user_id, pat], transaction_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?,
            None => stmt
                .query_map(params![user_id], transaction_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?,
        };
        Ok(rows)
    }

    /// Oldest first; both bounds inclusive.
    pub(crate) fn get_transactions_between(
        &self,
        user_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Transaction>> {
        let mut stmt = self.conn.prepare(&format!(
            "{TRANSACTION_SELECT} WHERE t.user_id = ?1 AND t.date BETWEEN ?2 AND ?3
             ORDER BY t.date, t.id"
        ))?;
        let rows = stmt.query_map(params![user_id, start, end], transaction_from_row)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Removes every transaction of `user_id` named `name`; returns how many went.
    pub(crate) fn delete_transactions_by_name(&self, user_id: i64, name: &str) -> Result<usize> {
        let removed = self.conn.execute(
            "DELETE FROM transactions WHERE user_id = ?1 AND name = ?2",
            params![user_id, name],
        )?;
        debug!(user_id, name, removed, "Deleted transactions");
        Ok(removed)
    }

    // ── Budgets ───────────────────────────────────────────────

    pub(crate) fn upsert_budget(&self, budget: &Budget) -> Result<()> {
        ensure_amount_in_range(budget.amount)?;
        self.conn.execute(
            "INSERT INTO budgets (user_id, category_id, month, amount)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, category_id, month) DO UPDATE SET amount = ?4",
            params![
                budget.user_id,
                budget.category_id,
                budget.month,
                budget.amount.to_string(),
            ],
        )?;
        Ok(())
    }

    /// Every budget of the user, across all months.
    pub(crate) fn get_budgets(&self, user_id: i64) -> Result<Vec<Budget>> {
        let mut stmt = self.conn.prepare(&format!(
            "{BUDGET_SELECT} WHERE b.user_id = ?1 ORDER BY b.month, c.name"
        ))?;
        let rows = stmt.query_map(params![user_id], budget_from_row)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub(crate) fn get_budgets_for_month(&self, user_id: i64, month: &str) -> Result<Vec<Budget>> {
        let mut stmt = self.conn.prepare(&format!(
            "{BUDGET_SELECT} WHERE b.user_id = ?1 AND b.month = ?2 ORDER BY c.name"
        ))?;
        let rows = stmt.query_map(params![user_id, month], budget_from_row)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub(crate) fn delete_budget(&self, user_id: i64, category_id: i64, month: &str) -> Result<bool> {
        let removed = self.conn.execute(
            "DELETE FROM budgets WHERE user_id = ?1 AND category_id = ?2 AND month = ?3",
            params![user_id, category_id, month],
        )?;
        Ok(removed > 0)
    }

    /// Budgets of one month with their balance recomputed from the transactions.
    pub(crate) fn get_budget_statuses(
        &self,
        user_id: i64,
        month: &str,
    ) -> Result<Vec<BudgetStatus>> {
        let budgets = self.get_budgets_for_month(user_id, month)?;
        let txns = self.get_user_transactions(user_id, Some(month))?;

        Ok(budgets
            .into_iter()
            .map(|budget| {
                let (spent, income) = txns
                    .iter()
                    .filter(|t| t.category_id == Some(budget.category_id))
                    .fold((Decimal::ZERO, Decimal::ZERO), |(spent, income), t| {
                        if t.is_expense() {
                            (spent.saturating_add(t.abs_amount()), income)
                        } else {
                            (spent, income.saturating_add(t.amount))
                        }
                    });
                BudgetStatus {
                    budget,
                    spent,
                    income,
                }
            })
            .collect())
    }

    // ── Transfers ─────────────────────────────────────────────

    /// Moves `amount` from one user to another as a pair of transactions
    /// written in a single database transaction.
    pub(crate) fn transfer(
        &mut self,
        from_username: &str,
        to_username: &str,
        amount: Decimal,
        date: NaiveDate,
    ) -> Result<Transfer> {
        if amount <= Decimal::ZERO {
            anyhow::bail!("Amount must be positive");
        }
        ensure_amount_in_range(amount)?;
        let from = self
            .get_user_by_name(from_username)?
            .ok_or_else(|| anyhow::anyhow!("User '{from_username}' not found"))?;
        let to = self
            .get_user_by_name(to_username)?
            .ok_or_else(|| anyhow::anyhow!("User '{to_username}' not found"))?;
        let (from_id, to_id) = match (from.id, to.id) {
            (Some(f), Some(t)) => (f, t),
            _ => anyhow::bail!("User has no ID"),
        };
        if from_id == to_id {
            anyhow::bail!("Cannot transfer to yourself");
        }

        let category_id = match self.get_category_by_name(TRANSFER)? {
            Some(cat) => cat.id,
            None => Some(self.insert_category(&Category::new(TRANSFER.into()))?),
        };

        let debit = Transaction::new(
            from_id,
            format!("Transfer to {}", to.username),
            -amount,
            category_id,
            date,
        );
        let credit = Transaction::new(
            to_id,
            format!("Transfer from {}", from.username),
            amount,
            category_id,
            date,
        );

        let tx = self.conn.transaction()?;
        let mut ids = [0i64; 2];
        for (slot, txn) in ids.iter_mut().zip([&debit, &credit]) {
            tx.execute(
                "INSERT INTO transactions (user_id, name, amount, category_id, date, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    txn.user_id,
                    txn.name,
                    txn.amount.to_string(),
                    txn.category_id,
                    txn.date,
                    txn.created_at,
                ],
            )?;
            *slot = tx.last_insert_rowid();
        }
        tx.commit().context("Transfer failed")?;

        info!(from = %from.username, to = %to.username, %amount, "Transferred money");
        Ok(Transfer {
            from_user_id: from_id,
            to_user_id: to_id,
            amount,
            date,
            debit_id: ids[0],
            credit_id: ids[1],
        })
    }

    // ── Analytics ─────────────────────────────────────────────

    /// All-time balance: the sum of every recorded amount.
    pub(crate) fn get_balance(&self, user_id: i64) -> Result<Decimal> {
        Ok(self
            .get_user_transactions(user_id, None)?
            .iter()
            .fold(Decimal::ZERO, |acc, t| acc.saturating_add(t.amount)))
    }

    /// (income, expenses) for one month; expenses are returned negative.
    pub(crate) fn get_monthly_totals(&self, user_id: i64, month: &str) -> Result<(Decimal, Decimal)> {
        let txns = self.get_user_transactions(user_id, Some(month))?;
        let (income, expenses) = txns.iter().fold(
            (Decimal::ZERO, Decimal::ZERO),
            |(income, expenses), t| {
                if t.is_income() {
                    (income.saturating_add(t.amount), expenses)
                } else {
                    (income, expenses.saturating_add(t.amount))
                }
            },
        );
        Ok((income, expenses))
    }

    /// Absolute expense totals per category, largest first.
    pub(crate) fn get_spending_by_category(
        &self,
        user_id: i64,
        month: &str,
    ) -> Result<Vec<(String, Decimal)>> {
        let mut totals: std::collections::BTreeMap<String, Decimal> = Default::default();
        for txn in self
            .get_user_transactions(user_id, Some(month))?
            .iter()
            .filter(|t| t.is_expense())
        {
            let total = totals.entry(txn.category_name().to_string()).or_default();
            *total = total.saturating_add(txn.abs_amount());
        }
        let mut result: Vec<_> = totals.into_iter().collect();
        result.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(result)
    }
}

impl LedgerSource for Database {
    fn transactions_between(
        &self,
        user_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Transaction>> {
        self.get_transactions_between(user_id, start, end)
    }

    fn budgets(&self, user_id: i64) -> Result<Vec<Budget>> {
        self.get_budgets(user_id)
    }
}

fn ensure_amount_in_range(amount: Decimal) -> Result<()> {
    if !amount_in_range(amount) {
        anyhow::bail!("Amount {amount} is out of range (at most {MAX_AMOUNT_UNITS} either way)");
    }
    Ok(())
}

fn parse_amount(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap_or_default()
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let limit: String = row.get(3)?;
    Ok(User {
        id: Some(row.get(0)?),
        username: row.get(1)?,
        password_hash: row.get(2)?,
        total_limit: parse_amount(&limit),
        created_at: row.get(4)?,
    })
}

fn category_from_row(row: &Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: Some(row.get(0)?),
        name: row.get(1)?,
    })
}

fn transaction_from_row(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    let amount: String = row.get(3)?;
    Ok(Transaction {
        id: Some(row.get(0)?),
        user_id: row.get(1)?,
        name: row.get(2)?,
        amount: parse_amount(&amount),
        category_id: row.get(4)?,
        category: row.get(5)?,
        date: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn budget_from_row(row: &Row<'_>) -> rusqlite::Result<Budget> {
    let amount: String = row.get(5)?;
    Ok(Budget {
        id: Some(row.get(0)?),
        user_id: row.get(1)?,
        category_id: row.get(2)?,
        name: row.get(3)?,
        month: row.get(4)?,
        amount: parse_amount(&amount),
    })
}
