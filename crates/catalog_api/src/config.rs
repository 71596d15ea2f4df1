pub const TABLE_NAME_ENV: &str = "TABLE_NAME";
pub const DYNAMODB_ENDPOINT_ENV: &str = "DYNAMODB_ENDPOINT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LambdaConfig {
    pub table_name: String,
    /// Overrides the DynamoDB endpoint, e.g. for a local emulator.
    pub dynamodb_endpoint: Option<String>,
}

impl LambdaConfig {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let table_name = lookup(TABLE_NAME_ENV)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| format!("{TABLE_NAME_ENV} must be configured"))?;
        let dynamodb_endpoint =
            lookup(DYNAMODB_ENDPOINT_ENV).filter(|value| !value.trim().is_empty());
        Ok(Self {
            table_name,
            dynamodb_endpoint,
        })
    }
}
