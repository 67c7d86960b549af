/// Default request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExpressEnvironment {
    Production,
    Staging,
}

#[derive(Clone, Debug)]
pub struct ExpressApiCredentials {
    pub api_key: String,
    pub user_id: String,
    pub session_id: String,
}

#[derive(Clone, Debug)]
pub struct ExpressApiConfig {
    pub base_url: String,
    pub credentials: ExpressApiCredentials,
    pub timeout_secs: u64,
}

impl ExpressApiConfig {
    pub fn default_config(
        environment: &ExpressEnvironment,
        credentials: ExpressApiCredentials,
    ) -> Self {
        match environment {
            ExpressEnvironment::Production => Self {
                base_url: "https://express.tangem.com/v1".to_string(),
                credentials,
                timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            },
            ExpressEnvironment::Staging => Self {
                base_url: "https://express-stage.tangem.com/v1".to_string(),
                credentials,
                timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            },
        }
    }
}
