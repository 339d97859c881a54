mod budget;
mod category;
mod transaction;
mod transfer;
mod user;

pub use budget::{Budget, BudgetStatus};
pub use category::{Category, DEFAULT_CATEGORIES, TRANSFER, UNCATEGORIZED};
pub use transaction::{amount_in_range, Transaction, MAX_AMOUNT_UNITS};
pub use transfer::Transfer;
pub use user::User;
