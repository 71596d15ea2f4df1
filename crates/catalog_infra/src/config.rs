use serde::{Deserialize, Serialize};

pub const DEFAULT_TABLE_NAME: &str = "app_name_table";
pub const DEFAULT_API_NAME: &str = "app_name_api";
pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_CONNECTION_PARAMETER: &str = "Github-Connection";

/// Target account and region for every stack of a deployment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeployEnv {
    pub account: String,
    pub region: String,
}

impl DeployEnv {
    pub fn new(account: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            region: region.into(),
        }
    }
}

/// Source repository that triggers the deployment pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepositorySettings {
    pub owner: String,
    pub name: String,
    pub branch: String,
    /// Name of the SSM parameter holding the source-control connection ARN.
    pub connection_parameter: String,
}

impl RepositorySettings {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            branch: DEFAULT_BRANCH.to_string(),
            connection_parameter: DEFAULT_CONNECTION_PARAMETER.to_string(),
        }
    }

    pub fn full_repository_id(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// Everything the entry point needs to compose the app.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppSettings {
    pub env: DeployEnv,
    pub table_name: String,
    /// Application name used for parameter keys, the dashboard and the pipeline.
    pub api_name: String,
    pub api_description: Option<String>,
    pub repository: RepositorySettings,
}

impl AppSettings {
    pub fn new(env: DeployEnv, repository: RepositorySettings) -> Self {
        Self {
            env,
            table_name: DEFAULT_TABLE_NAME.to_string(),
            api_name: DEFAULT_API_NAME.to_string(),
            api_description: None,
            repository,
        }
    }

    pub fn pipeline_name(&self) -> String {
        format!("{}-Pipeline", self.api_name)
    }
}
