pub const UNCATEGORIZED: &str = "Uncategorized";

/// Category used for both legs of a user-to-user transfer.
pub const TRANSFER: &str = "Transfer";

pub const DEFAULT_CATEGORIES: &[&str] = &[
    "Education",
    "Entertainment",
    "Food",
    "Groceries",
    "Health",
    "Leisure",
    "Rent",
    "Salary",
    "Shopping",
    TRANSFER,
    "Transport",
    "Utilities",
];

#[derive(Debug, Clone)]
pub struct Category {
    pub id: Option<i64>,
    pub name: String,
}

impl Category {
    pub fn new(name: String) -> Self {
        Self { id: None, name }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}
