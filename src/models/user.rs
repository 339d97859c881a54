use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct User {
    pub id: Option<i64>,
    pub username: String,
    /// bcrypt hash, never the raw password.
    pub password_hash: String,
    /// Optional overall monthly limit; zero means unset.
    pub total_limit: Decimal,
    pub created_at: String,
}

impl User {
    pub fn new(username: String, password_hash: String) -> Self {
        Self {
            id: None,
            username,
            password_hash,
            total_limit: Decimal::ZERO,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn verify_password(&self, raw_password: &str) -> bool {
        bcrypt::verify(raw_password, &self.password_hash).unwrap_or(false)
    }
}

impl std::fmt::Display for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.username)
    }
}
