//! Session configuration.

use std::time::Duration;

use reqwest::Url;

use crate::{
    domain::{ConversationTarget, Credential, ReconnectPolicy, SenderId},
    error::ClientError,
};

pub const DEFAULT_WS_ENDPOINT: &str = "wss://trustlink-backend-production.up.railway.app/api/ws";
pub const DEFAULT_API_BASE: &str = "https://trustlink-backend-production.up.railway.app/api";

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_ECHO_WINDOW: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Base WebSocket URL; `/chat/{target}` is appended
    pub endpoint: String,
    /// Sender id the backend uses for this client's own messages
    pub local_sender_id: SenderId,
    pub reconnect: ReconnectPolicy,
    /// Give up on a handshake that takes longer than this
    pub connect_timeout: Option<Duration>,
    /// Keep at most this many messages (oldest are evicted)
    pub store_capacity: Option<usize>,
    /// How long a sent message waits for the backend to echo it back
    pub echo_window: Duration,
}

impl SessionConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// `{endpoint}/chat/{target}?token={credential}`
    pub fn connection_url(
        &self,
        target: &ConversationTarget,
        credential: &Credential,
    ) -> Result<Url, ClientError> {
        let invalid = |reason: String| ClientError::InvalidEndpoint {
            endpoint: self.endpoint.clone(),
            reason,
        };

        let mut url = Url::parse(&self.endpoint).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| invalid("endpoint cannot be a base URL".to_string()))?
            .pop_if_empty()
            .push("chat")
            .push(target.as_str());
        url.query_pairs_mut()
            .clear()
            .append_pair("token", credential.as_str());
        Ok(url)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_WS_ENDPOINT.to_string(),
            local_sender_id: SenderId::CLIENT,
            reconnect: ReconnectPolicy::default(),
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            store_capacity: None,
            echo_window: DEFAULT_ECHO_WINDOW,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_url_contains_target_and_token() {
        // テスト項目: 接続 URL にターゲットとトークンが含まれる
        // given (前提条件):
        let config = SessionConfig::new("wss://example.test/api/ws");
        let target = ConversationTarget::new("42").unwrap();
        let credential = Credential::new("tok-A").unwrap();

        // when (操作):
        let url = config.connection_url(&target, &credential).unwrap();

        // then (期待する結果):
        assert_eq!(url.as_str(), "wss://example.test/api/ws/chat/42?token=tok-A");
    }

    #[test]
    fn test_connection_url_encodes_token_and_trailing_slash() {
        // テスト項目: 末尾スラッシュを扱い、トークンの特殊文字がエンコードされる
        // given (前提条件):
        let config = SessionConfig::new("ws://127.0.0.1:8080/ws/");
        let target = ConversationTarget::new("7").unwrap();
        let credential = Credential::new("a b&c").unwrap();

        // when (操作):
        let url = config.connection_url(&target, &credential).unwrap();

        // then (期待する結果):
        assert_eq!(url.as_str(), "ws://127.0.0.1:8080/ws/chat/7?token=a+b%26c");
    }

    #[test]
    fn test_connection_url_rejects_invalid_endpoint() {
        // テスト項目: 不正なエンドポイントではエラーが返される
        // given (前提条件):
        let config = SessionConfig::new("not a url");
        let target = ConversationTarget::new("1").unwrap();
        let credential = Credential::new("tok").unwrap();

        // when (操作):
        let result = config.connection_url(&target, &credential);

        // then (期待する結果):
        assert!(matches!(result, Err(ClientError::InvalidEndpoint { .. })));
    }
}
