use anyhow::{Context, Result};

use super::Database;

impl Database {
    /// Write the user's transactions (optionally one "YYYY-MM" month) to a CSV
    /// file and return how many rows were written.
    pub(crate) fn export_to_csv(
        &self,
        user_id: i64,
        path: &str,
        month: Option<&str>,
    ) -> Result<usize> {
        let txns = self.get_user_transactions(user_id, month)?;
        if txns.is_empty() {
            return Ok(0);
        }

        let mut wtr = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create export file: {path}"))?;
        wtr.write_record(["date", "name", "category", "amount"])?;
        for txn in &txns {
            wtr.write_record([
                txn.date.format("%Y-%m-%d").to_string(),
                txn.name.clone(),
                txn.category_name().to_string(),
                txn.amount.to_string(),
            ])?;
        }
        wtr.flush().context("Failed to write export file")?;
        Ok(txns.len())
    }
}
