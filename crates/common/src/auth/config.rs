/// Configuration for issuing device credentials
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Path to the PEM-encoded RSA private key
    pub private_key_path: String,
    /// Audience claim the broker validates against (the project scope)
    pub audience: String,
    /// Credential lifetime in minutes
    pub token_lifetime_mins: u64,
}

impl JwtConfig {
    pub fn new(private_key_path: String, audience: String, token_lifetime_mins: u64) -> Self {
        Self {
            private_key_path,
            audience,
            token_lifetime_mins,
        }
    }

    pub fn token_lifetime(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.token_lifetime_mins as i64)
    }
}
