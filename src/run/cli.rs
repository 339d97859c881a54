use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::warn;

use crate::advice::AdviceGenerator;
use crate::completion::OpenAiClient;
use crate::config::Config;
use crate::db::Database;
use crate::models::{amount_in_range, Budget, Category, Transaction, User, MAX_AMOUNT_UNITS};
use crate::period;

/// Flags that take a value; everything else is positional.
const VALUE_FLAGS: &[&str] = &["--user", "--month", "--date"];

pub(crate) fn as_cli(args: &[String], db: &mut Database, config: &Config) -> Result<()> {
    let Some(command) = args.get(1) else {
        print_usage();
        return Ok(());
    };
    let rest = &args[2..];
    let currency = config.advice.currency.as_str();

    match command.as_str() {
        "register" => cli_register(rest, db),
        "login" => cli_login(rest, db),
        "users" => cli_users(db, currency),
        "categories" => cli_categories(db),
        "category" => cli_add_category(rest, db),
        "rename" => cli_rename_category(rest, db),
        "add" => cli_add(rest, db, currency),
        "remove" | "rm" => cli_remove(rest, db),
        "list" | "ls" => cli_list(rest, db, currency),
        "budget" => cli_budget(rest, db, currency),
        "unbudget" => cli_unbudget(rest, db),
        "budgets" => cli_budgets(rest, db, currency),
        "limit" => cli_limit(rest, db, currency),
        "transfer" => cli_transfer(rest, db, currency),
        "summary" | "s" => cli_summary(rest, db, currency),
        "export" => cli_export(rest, db),
        "advice" => cli_advice(rest, db, config),
        "--help" | "-h" | "help" => {
            print_usage();
            Ok(())
        }
        "--version" | "-V" | "version" => {
            println!("moneymind {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => {
            print_usage();
            anyhow::bail!("Unknown command: {other}");
        }
    }
}

fn print_usage() {
    println!("MoneyMind - local-only personal finance tracker");
    println!();
    println!("Usage: moneymind <command> [args]");
    println!();
    println!("Commands:");
    println!("  register <username> <password>      Create a user");
    println!("  login <username> <password>         Check a user's credentials");
    println!("  users                               List users");
    println!("  categories                          List categories");
    println!("  category <name>                     Add a category");
    println!("  rename <old> <new>                  Rename a category");
    println!("  add <name> <amount> <category>      Record a transaction (negative = expense)");
    println!("    --date <YYYY-MM-DD>               Transaction date (default: today)");
    println!("  remove <name>                       Delete transactions with this name");
    println!("  list                                List transactions");
    println!("  budget <category> <amount>          Set a category budget for one month (no rollover)");
    println!("  unbudget <category>                 Remove a category budget");
    println!("  budgets                             Show budgets with their remaining balance");
    println!("  limit <amount>                      Set the overall monthly limit");
    println!("  transfer <recipient> <amount>       Send money to another user");
    println!("  summary [YYYY-MM]                   Print monthly financial summary");
    println!("  export [path]                       Export transactions to CSV");
    println!("  advice                              Print this month's spending advice");
    println!("  --help, -h                          Show this help");
    println!("  --version, -V                       Show version");
    println!();
    println!("All commands from 'add' on need --user <name>.");
    println!("list, budget, unbudget, budgets and export accept --month <YYYY-MM> (default: current).");
}

// ── Users & categories ────────────────────────────────────────

fn cli_register(args: &[String], db: &mut Database) -> Result<()> {
    let [username, password] = positional(args)[..] else {
        anyhow::bail!("Usage: moneymind register <username> <password>");
    };
    let id = db.register_user(username, password)?;
    println!("Registered user '{}' (id {id})", username.trim());
    Ok(())
}

fn cli_login(args: &[String], db: &mut Database) -> Result<()> {
    let [username, password] = positional(args)[..] else {
        anyhow::bail!("Usage: moneymind login <username> <password>");
    };
    match db.authenticate(username, password)? {
        Some(user) => {
            println!("Welcome back, {user}");
            Ok(())
        }
        None => anyhow::bail!("Invalid username or password"),
    }
}

fn cli_users(db: &mut Database, currency: &str) -> Result<()> {
    let users = db.get_users()?;
    if users.is_empty() {
        println!("No users. Create one with: moneymind register <username> <password>");
        return Ok(());
    }

    println!("{:<4} {:<20} {:>14}", "ID", "Username", "Monthly limit");
    println!("{}", "─".repeat(40));
    for user in &users {
        println!(
            "{:<4} {:<20} {:>14}",
            user.id.unwrap_or(0),
            user.username,
            money(user.total_limit, currency),
        );
    }
    Ok(())
}

fn cli_categories(db: &mut Database) -> Result<()> {
    for cat in db.get_categories()? {
        println!("{:<4} {cat}", cat.id.unwrap_or(0));
    }
    Ok(())
}

fn cli_add_category(args: &[String], db: &mut Database) -> Result<()> {
    let [name] = positional(args)[..] else {
        anyhow::bail!("Usage: moneymind category <name>");
    };
    if db.get_category_by_name(name)?.is_some() {
        anyhow::bail!("Category '{name}' already exists");
    }
    db.insert_category(&Category::new(name.trim().to_string()))?;
    println!("Added category '{}'", name.trim());
    Ok(())
}

fn cli_rename_category(args: &[String], db: &mut Database) -> Result<()> {
    let [old, new] = positional(args)[..] else {
        anyhow::bail!("Usage: moneymind rename <old> <new>");
    };
    let id = find_category(db, old)?;
    db.rename_category(id, new)?;
    if let Some(cat) = db.get_category_by_id(id)? {
        println!("Renamed '{old}' to '{cat}'");
    }
    Ok(())
}

// ── Transactions ──────────────────────────────────────────────

fn cli_add(args: &[String], db: &mut Database, currency: &str) -> Result<()> {
    let (user_id, user) = require_user(args, db)?;
    let [name, raw_amount, category] = positional(args)[..] else {
        anyhow::bail!(
            "Usage: moneymind add --user <name> <name> <amount> <category> [--date YYYY-MM-DD]"
        );
    };
    let amount = parse_amount(raw_amount)?;
    let category_id = find_category(db, category)?;
    let date = match flag_value(args, "--date") {
        Some(raw) => period::parse_date(raw)?,
        None => period::today(),
    };

    let txn = Transaction::new(user_id, name.to_string(), amount, Some(category_id), date);
    db.insert_transaction(&txn)?;
    println!(
        "Recorded '{name}' ({}) for {} on {date}",
        money(amount, currency),
        user.username
    );
    Ok(())
}

fn cli_remove(args: &[String], db: &mut Database) -> Result<()> {
    let (user_id, _) = require_user(args, db)?;
    let [name] = positional(args)[..] else {
        anyhow::bail!("Usage: moneymind remove --user <name> <transaction name>");
    };
    match db.delete_transactions_by_name(user_id, name)? {
        0 => println!("No transactions named '{name}'"),
        n => println!("Removed {n} transaction(s) named '{name}'"),
    }
    Ok(())
}

fn cli_list(args: &[String], db: &mut Database, currency: &str) -> Result<()> {
    let (user_id, _) = require_user(args, db)?;
    let month = month_flag(args)?;
    let txns = db.get_user_transactions(user_id, month.as_deref())?;
    if txns.is_empty() {
        println!("No transactions");
        return Ok(());
    }

    println!("{:<10}  {:<28} {:<16} {:>14}", "Date", "Name", "Category", "Amount");
    println!("{}", "─".repeat(72));
    for txn in &txns {
        println!(
            "{:<10}  {:<28} {:<16} {:>14}",
            txn.date,
            txn.name,
            txn.category_name(),
            money(txn.amount, currency),
        );
    }
    Ok(())
}

// ── Budgets ───────────────────────────────────────────────────

fn cli_budget(args: &[String], db: &mut Database, currency: &str) -> Result<()> {
    let (user_id, _) = require_user(args, db)?;
    let [category, raw_amount] = positional(args)[..] else {
        anyhow::bail!("Usage: moneymind budget --user <name> <category> <amount> [--month YYYY-MM]");
    };
    let amount = parse_amount(raw_amount)?;
    if amount <= Decimal::ZERO {
        anyhow::bail!("Budget amount must be positive");
    }
    let category_id = find_category(db, category)?;
    let month = month_flag(args)?.unwrap_or_else(period::current_month);

    let budget = Budget::new(user_id, category_id, category.to_string(), month.clone(), amount);
    db.upsert_budget(&budget)?;
    println!("Budget for '{category}' in {month}: {}", money(amount, currency));
    Ok(())
}

fn cli_unbudget(args: &[String], db: &mut Database) -> Result<()> {
    let (user_id, _) = require_user(args, db)?;
    let [category] = positional(args)[..] else {
        anyhow::bail!("Usage: moneymind unbudget --user <name> <category> [--month YYYY-MM]");
    };
    let category_id = find_category(db, category)?;
    let month = month_flag(args)?.unwrap_or_else(period::current_month);
    if db.delete_budget(user_id, category_id, &month)? {
        println!("Removed budget for '{category}' in {month}");
    } else {
        println!("No budget for '{category}' in {month}");
    }
    Ok(())
}

fn cli_budgets(args: &[String], db: &mut Database, currency: &str) -> Result<()> {
    let (user_id, _) = require_user(args, db)?;
    let month = month_flag(args)?.unwrap_or_else(period::current_month);
    let statuses = db.get_budget_statuses(user_id, &month)?;
    if statuses.is_empty() {
        println!("No budgets for {month}");
        return Ok(());
    }

    println!("Budgets for {month}");
    println!(
        "{:<16} {:>14} {:>14} {:>14} {:>14} {:>7}",
        "Category", "Limit", "Spent", "Income", "Current", "Used"
    );
    println!("{}", "─".repeat(84));
    for status in &statuses {
        let used = status
            .used_ratio()
            .map(|r| format!("{:.1}%", r.saturating_mul(Decimal::ONE_HUNDRED)))
            .unwrap_or_else(|| "-".into());
        println!(
            "{:<16} {:>14} {:>14} {:>14} {:>14} {:>7}",
            status.budget.name,
            money(status.budget.amount, currency),
            money(status.spent, currency),
            money(status.income, currency),
            money(status.current(), currency),
            used,
        );
    }
    Ok(())
}

fn cli_limit(args: &[String], db: &mut Database, currency: &str) -> Result<()> {
    let (user_id, user) = require_user(args, db)?;
    let [raw_amount] = positional(args)[..] else {
        anyhow::bail!("Usage: moneymind limit --user <name> <amount>");
    };
    let amount = parse_amount(raw_amount)?;
    if amount < Decimal::ZERO {
        anyhow::bail!("Limit must not be negative");
    }
    db.set_total_limit(user_id, amount)?;
    let updated = db.get_user_by_id(user_id)?.unwrap_or(user);
    println!(
        "Monthly limit for {}: {}",
        updated.username,
        money(updated.total_limit, currency)
    );
    Ok(())
}

fn cli_transfer(args: &[String], db: &mut Database, currency: &str) -> Result<()> {
    let (_, user) = require_user(args, db)?;
    let [recipient, raw_amount] = positional(args)[..] else {
        anyhow::bail!("Usage: moneymind transfer --user <name> <recipient> <amount>");
    };
    let amount = parse_amount(raw_amount)?;
    let transfer = db.transfer(&user.username, recipient, amount, period::today())?;
    println!(
        "Sent {} from {} to {recipient} on {}",
        money(transfer.amount, currency),
        user.username,
        transfer.date
    );
    Ok(())
}

// ── Reports ───────────────────────────────────────────────────

fn cli_summary(args: &[String], db: &mut Database, currency: &str) -> Result<()> {
    let (user_id, user) = require_user(args, db)?;
    let month = match positional(args).first() {
        Some(raw) => period::month_key(period::parse_month(raw)?),
        None => period::current_month(),
    };

    let (income, expenses) = db.get_monthly_totals(user_id, &month)?;
    let net = income.saturating_add(expenses);
    let balance = db.get_balance(user_id)?;
    let spending = db.get_spending_by_category(user_id, &month)?;

    println!("MoneyMind: {} ({month})", user.username);
    println!("{}", "─".repeat(40));
    println!("  Income:     {}", money(income, currency));
    println!("  Expenses:   {}", money(expenses.abs(), currency));
    println!("  Net:        {}", money(net, currency));
    println!("  Balance:    {}", money(balance, currency));
    if user.total_limit > Decimal::ZERO {
        println!(
            "  Limit:      {} ({} left)",
            money(user.total_limit, currency),
            money(user.total_limit.saturating_add(expenses), currency)
        );
    }

    if !spending.is_empty() {
        println!();
        println!("Spending by Category:");
        for (name, amount) in &spending {
            println!("  {name:<24} {}", money(*amount, currency));
        }
    }

    Ok(())
}

fn cli_export(args: &[String], db: &mut Database) -> Result<()> {
    let (user_id, user) = require_user(args, db)?;
    let month = month_flag(args)?.unwrap_or_else(period::current_month);

    let output_path = positional(args)
        .first()
        .map(|a| shellexpand(a))
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
            format!("{home}/moneymind-{}-{month}.csv", user.username)
        });

    let count = db.export_to_csv(user_id, &output_path, Some(&month))?;
    if count == 0 {
        println!("No transactions for {month}");
    } else {
        println!("Exported {count} transactions to {output_path}");
    }
    Ok(())
}

fn cli_advice(args: &[String], db: &mut Database, config: &Config) -> Result<()> {
    let (user_id, _) = require_user(args, db)?;

    let client = config
        .completion
        .as_ref()
        .and_then(|cfg| match OpenAiClient::new(cfg) {
            Ok(client) => Some(client),
            Err(err) => {
                warn!(error = %err, "Could not build completion client; continuing without it");
                None
            }
        });

    let ledger: &Database = db;
    let mut generator = AdviceGenerator::new(ledger, &config.advice);
    if let Some(client) = &client {
        generator = generator.with_completion(client);
    }

    println!("{}", generator.generate_monthly_advice(user_id)?);
    Ok(())
}

// ── Argument helpers ──────────────────────────────────────────

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

/// Arguments that are neither value flags nor their values.
fn positional(args: &[String]) -> Vec<&str> {
    let mut out = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if VALUE_FLAGS.contains(&arg.as_str()) {
            iter.next();
        } else {
            out.push(arg.as_str());
        }
    }
    out
}

fn month_flag(args: &[String]) -> Result<Option<String>> {
    flag_value(args, "--month")
        .map(|raw| period::parse_month(raw).map(period::month_key))
        .transpose()
}

/// Amounts may carry a `$` sign and thousands separators.
pub(crate) fn parse_amount(raw: &str) -> Result<Decimal> {
    let cleaned: String = raw.chars().filter(|c| *c != '$' && *c != ',').collect();
    let amount =
        Decimal::from_str(cleaned.trim()).with_context(|| format!("Invalid amount: '{raw}'"))?;
    if !amount_in_range(amount) {
        anyhow::bail!("Amount out of range: '{raw}' (at most {MAX_AMOUNT_UNITS} either way)");
    }
    Ok(amount)
}

fn require_user(args: &[String], db: &Database) -> Result<(i64, User)> {
    let name = flag_value(args, "--user")
        .ok_or_else(|| anyhow::anyhow!("Missing --user <name>"))?;
    let user = db
        .get_user_by_name(name)?
        .ok_or_else(|| anyhow::anyhow!("User '{name}' not found"))?;
    let id = user.id.ok_or_else(|| anyhow::anyhow!("User has no ID"))?;
    Ok((id, user))
}

fn find_category(db: &Database, name: &str) -> Result<i64> {
    db.get_category_by_name(name)?
        .and_then(|c| c.id)
        .ok_or_else(|| anyhow::anyhow!("Category '{name}' not found. See: moneymind categories"))
}

fn money(amount: Decimal, currency: &str) -> String {
    format!("{amount:.2} {currency}")
}

pub(crate) fn shellexpand(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
        format!("{home}/{rest}")
    } else {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use rust_decimal_macros::dec;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_amount_strips_symbols() {
        assert_eq!(parse_amount("$1,234.50").unwrap(), dec!(1234.50));
        assert_eq!(parse_amount("-42.99").unwrap(), dec!(-42.99));
        assert_eq!(parse_amount(" 7 ").unwrap(), dec!(7));
    }

    #[test]
    fn test_parse_amount_rejects_out_of_range() {
        let err = parse_amount("-99,999,999,999,999,999,999").unwrap_err();
        assert!(err.to_string().contains("out of range"));
        assert_eq!(parse_amount("$1,000,000,000,000").unwrap(), dec!(1000000000000));
    }

    #[test]
    fn test_parse_amount_rejects_garbage() {
        let err = parse_amount("lots").unwrap_err();
        assert!(err.to_string().contains("lots"));
        assert!(parse_amount("").is_err());
    }

    #[test]
    fn test_flag_value() {
        let a = args(&["Coffee", "--user", "alice", "-3.50", "Food"]);
        assert_eq!(flag_value(&a, "--user"), Some("alice"));
        assert_eq!(flag_value(&a, "--date"), None);
    }

    #[test]
    fn test_flag_without_value() {
        let a = args(&["Coffee", "--user"]);
        assert_eq!(flag_value(&a, "--user"), None);
    }

    #[test]
    fn test_positional_skips_flag_values() {
        let a = args(&[
            "--user", "alice", "Coffee", "-3.50", "--date", "2024-03-01", "Food",
        ]);
        assert_eq!(positional(&a), vec!["Coffee", "-3.50", "Food"]);
    }

    #[test]
    fn test_month_flag_normalizes() {
        assert_eq!(
            month_flag(&args(&["--month", "2024-03"])).unwrap().as_deref(),
            Some("2024-03")
        );
        assert_eq!(month_flag(&args(&[])).unwrap(), None);
        assert!(month_flag(&args(&["--month", "March"])).is_err());
    }

    #[test]
    fn test_shellexpand() {
        assert_eq!(shellexpand("/tmp/out.csv"), "/tmp/out.csv");
        assert!(!shellexpand("~/out.csv").starts_with('~'));
    }

    #[test]
    fn test_money() {
        assert_eq!(money(dec!(3), "DH"), "3.00 DH");
        assert_eq!(money(dec!(-42.999), "EUR"), "-43.00 EUR");
    }

    #[test]
    fn test_commands_against_database() {
        let mut db = Database::open_in_memory().unwrap();
        let config = Config::from_lookup(|_| None).unwrap();
        let run = |db: &mut Database, items: &[&str]| {
            let mut full = args(&["moneymind"]);
            full.extend(args(items));
            as_cli(&full, db, &config)
        };

        run(&mut db, &["register", "alice", "pw"]).unwrap();
        run(&mut db, &["register", "bob", "pw"]).unwrap();
        run(&mut db, &["login", "alice", "pw"]).unwrap();
        assert!(run(&mut db, &["login", "alice", "wrong"]).is_err());

        run(&mut db, &["add", "--user", "alice", "Market", "-95", "food", "--date", "2024-03-03"])
            .unwrap();
        run(&mut db, &["budget", "--user", "alice", "Food", "100", "--month", "2024-03"]).unwrap();
        assert!(run(&mut db, &["budget", "--user", "alice", "Food", "0"]).is_err());
        assert!(run(&mut db, &["add", "--user", "alice", "X", "-1", "Nope"]).is_err());
        assert!(run(&mut db, &["add", "--user", "carol", "X", "-1", "Food"]).is_err());

        run(&mut db, &["transfer", "--user", "alice", "bob", "$1,000"]).unwrap();
        assert!(run(&mut db, &["transfer", "--user", "alice", "alice", "5"]).is_err());

        let alice = db.get_user_by_name("alice").unwrap().unwrap();
        let statuses = db
            .get_budget_statuses(alice.id.unwrap(), "2024-03")
            .unwrap();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].current(), dec!(5));

        run(&mut db, &["category", "Pets"]).unwrap();
        assert!(run(&mut db, &["category", "pets"]).is_err());
        run(&mut db, &["rename", "Pets", "Animals"]).unwrap();
        assert!(db.get_category_by_name("Animals").unwrap().is_some());

        run(&mut db, &["remove", "--user", "alice", "Market"]).unwrap();
        assert!(run(&mut db, &["frobnicate"]).is_err());
    }
}
