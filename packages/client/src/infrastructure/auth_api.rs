//! Login against the TrustLink REST API.

use std::sync::Arc;

use async_trait::async_trait;
use trustlink_shared::time::{Clock, SystemClock};

use crate::{
    error::ClientError,
    infrastructure::dto::http::{ErrorBody, LoginForm, LoginResponse, UserData},
};

/// Exchange of user credentials for a bearer token
#[async_trait]
pub trait LoginApi: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ClientError>;
}

/// `POST {api_base}/auth/login` with a form body
pub struct HttpLoginApi {
    client: reqwest::Client,
    api_base: String,
}

impl HttpLoginApi {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into(),
        }
    }

    fn login_url(&self) -> String {
        format!("{}/auth/login", self.api_base.trim_end_matches('/'))
    }
}

#[async_trait]
impl LoginApi for HttpLoginApi {
    async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ClientError> {
        let response = self
            .client
            .post(self.login_url())
            .form(&LoginForm {
                username: email,
                password,
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let reason = serde_json::from_str::<ErrorBody>(&body)
                .map(|e| e.detail)
                .unwrap_or(body);
            tracing::warn!("Login rejected with status {}", status);
            return Err(ClientError::LoginFailed(reason));
        }

        let login: LoginResponse = serde_json::from_str(&body)?;
        tracing::info!("Logged in as user {}", login.user.id);
        Ok(login)
    }
}

/// Offline login with a fixed set of demo users
pub struct SimulatedLoginApi {
    users: Vec<UserData>,
    clock: Arc<dyn Clock>,
}

impl SimulatedLoginApi {
    const PASSWORD: &'static str = "password";

    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let users = vec![
            UserData {
                id: 1,
                email: "user@example.com".to_string(),
                first_name: "Ivan".to_string(),
                last_name: "Ivanov".to_string(),
                phone: Some("+77001234567".to_string()),
                role: Some("user".to_string()),
            },
            UserData {
                id: 2,
                email: "operator@example.com".to_string(),
                first_name: "Operator".to_string(),
                last_name: "Support".to_string(),
                phone: None,
                role: Some("operator".to_string()),
            },
        ];
        Self { users, clock }
    }
}

impl Default for SimulatedLoginApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LoginApi for SimulatedLoginApi {
    async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ClientError> {
        let user = self
            .users
            .iter()
            .find(|u| u.email == email)
            .filter(|_| password == Self::PASSWORD)
            .ok_or_else(|| ClientError::LoginFailed("Invalid email or password".to_string()))?;

        Ok(LoginResponse {
            access_token: format!("mock-token-{}", self.clock.now_millis()),
            token_type: "bearer".to_string(),
            user: user.clone(),
        })
    }
}
