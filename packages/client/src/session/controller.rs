//! Session controller: owns the lifecycle of the chat connection.
//!
//! ## 責務
//!
//! - One live connection per controller, scoped to a target and credential
//! - Reconnect when the credential changes while a target is remembered
//! - Optimistic local echo on send
//! - Bounded exponential backoff and a handshake timeout
//!
//! All transport events arrive on one channel and are applied in delivery
//! order by [`SessionController::process_next`] or
//! [`SessionController::handle_event`]. Events from handles that were
//! closed or replaced are ignored.

use std::sync::Arc;

use tokio::{
    sync::{mpsc, watch},
    time::Instant,
};
use trustlink_shared::time::{Clock, SystemClock};

use crate::{
    auth::AuthContext,
    config::SessionConfig,
    domain::{ConnectionState, ConversationTarget, Credential, HandleId, Message, Timestamp},
    infrastructure::transport::{
        Connection, EventSink, OpenRequest, Transport, TransportEvent, TransportEventKind,
    },
};

use super::{
    dispatcher::{Dispatch, InboundDispatcher},
    store::MessageStore,
};

/// Close code of an intentional shutdown; no retry follows it
const NORMAL_CLOSURE: u16 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Deadline {
    Retry,
    ConnectTimeout,
}

enum Wake {
    Event(Option<TransportEvent>),
    Credential(bool),
    Deadline(Deadline),
}

pub struct SessionController {
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    auth: AuthContext,
    /// `None` once the credential source is gone
    auth_rx: Option<watch::Receiver<Option<Credential>>>,
    clock: Arc<dyn Clock>,
    /// Used whenever nobody is logged in; fixed for the controller's lifetime
    guest: Credential,
    store: MessageStore,
    dispatcher: InboundDispatcher,
    state: watch::Sender<ConnectionState>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    events_rx: mpsc::UnboundedReceiver<TransportEvent>,
    next_handle: HandleId,
    target: Option<ConversationTarget>,
    /// Effective credential of the current (or last) connection
    credential: Option<Credential>,
    connection: Option<Box<dyn Connection>>,
    retry_attempt: u32,
    deadline: Option<(Instant, Deadline)>,
}

impl SessionController {
    pub fn new(config: SessionConfig, transport: Arc<dyn Transport>, auth: AuthContext) -> Self {
        Self::with_clock(config, transport, auth, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: SessionConfig,
        transport: Arc<dyn Transport>,
        auth: AuthContext,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state, _rx) = watch::channel(ConnectionState::Idle);
        let dispatcher =
            InboundDispatcher::new(config.local_sender_id, config.echo_window, clock.clone());
        let mut auth_rx = auth.subscribe();
        auth_rx.mark_unchanged();

        Self {
            store: MessageStore::with_capacity(config.store_capacity),
            dispatcher,
            config,
            transport,
            auth,
            auth_rx: Some(auth_rx),
            clock,
            guest: Credential::guest(),
            state,
            events_tx,
            events_rx,
            next_handle: HandleId::new(1),
            target: None,
            credential: None,
            connection: None,
            retry_attempt: 0,
            deadline: None,
        }
    }

    // ========================================
    // Observers
    // ========================================

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Read-only view of the conversation log
    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn messages(&self) -> Vec<Message> {
        self.store.snapshot()
    }

    pub fn target(&self) -> Option<&ConversationTarget> {
        self.target.as_ref()
    }

    /// Displayable reason of the last failure, while the session is failed
    pub fn last_error(&self) -> Option<String> {
        self.state.borrow().error().map(str::to_string)
    }

    pub fn has_pending_retry(&self) -> bool {
        matches!(self.deadline, Some((_, Deadline::Retry)))
    }

    // ========================================
    // Commands
    // ========================================

    /// Connect to `target` with the credential currently held by the
    /// authentication context (or the guest credential)
    pub fn connect(&mut self, target: ConversationTarget) {
        let credential = self.auth.current();
        self.connect_with_credential(target, credential);
    }

    /// Connect to `target` with an explicit credential
    ///
    /// Any existing connection is closed first. The message log is reset
    /// only when the target changes.
    pub fn connect_with_credential(
        &mut self,
        target: ConversationTarget,
        credential: Option<Credential>,
    ) {
        let credential = credential.unwrap_or_else(|| self.guest.clone());

        if self.target.as_ref() == Some(&target)
            && self.credential.as_ref() == Some(&credential)
            && self.state.borrow().is_live()
        {
            tracing::debug!("Already connected to conversation {}", target);
            return;
        }

        self.close_connection();

        if self.target.as_ref() != Some(&target) {
            if self.target.is_some() {
                tracing::info!("Switching conversation to {}", target);
                self.set_state(ConnectionState::Idle);
            }
            self.store.reset();
            self.dispatcher.reset();
        }

        self.target = Some(target);
        self.credential = Some(credential);
        self.retry_attempt = 0;
        self.deadline = None;
        self.open_connection();
    }

    /// Close the connection and forget the target
    pub fn disconnect(&mut self) {
        if self.target.is_none() && self.connection.is_none() {
            return;
        }
        if let Some(target) = &self.target {
            tracing::info!("Disconnecting from conversation {}", target);
        }
        self.close_connection();
        self.target = None;
        self.credential = None;
        self.retry_attempt = 0;
        self.deadline = None;
        self.set_state(ConnectionState::Closed);
    }

    /// Send `text` to the counterpart
    ///
    /// Returns `false` without side effects when the session is not open or
    /// the text is blank. Otherwise the local echo is in the store before
    /// this returns.
    pub fn send_message(&mut self, text: &str) -> bool {
        if !self.state.borrow().is_open() {
            tracing::debug!("Session is not open, dropping outbound message");
            return false;
        }
        if text.trim().is_empty() {
            return false;
        }
        let Some(connection) = &self.connection else {
            return false;
        };

        let echo = Message::local_echo(text, Timestamp::new(self.clock.now_millis()));
        self.dispatcher.track_echo(&echo);
        self.store.append(echo);
        connection.send(text);
        true
    }

    /// Reconnect if the authentication context now yields a different
    /// credential than the one in use
    pub fn refresh_credential(&mut self) {
        let credential = self.auth.current();
        self.on_credential_changed(credential);
    }

    // ========================================
    // Event loop
    // ========================================

    /// Wait for one transport event, credential change or timer and apply it
    ///
    /// Cancel safe: if the returned future is dropped before completion, no
    /// event is lost.
    pub async fn process_next(&mut self) {
        let deadline = self.deadline;

        let wake = tokio::select! {
            event = self.events_rx.recv() => Wake::Event(event),
            changed = credential_changed(self.auth_rx.as_mut()) => Wake::Credential(changed),
            _ = tokio::time::sleep_until(deadline.map_or_else(Instant::now, |(at, _)| at)),
                if deadline.is_some() =>
            {
                Wake::Deadline(deadline.map_or(Deadline::Retry, |(_, kind)| kind))
            }
        };

        match wake {
            Wake::Event(Some(event)) => self.handle_event(event),
            Wake::Event(None) => {}
            Wake::Credential(true) => {
                let credential = self
                    .auth_rx
                    .as_mut()
                    .and_then(|rx| rx.borrow_and_update().clone());
                self.on_credential_changed(credential);
            }
            Wake::Credential(false) => {
                tracing::debug!("Credential source closed");
                self.auth_rx = None;
            }
            Wake::Deadline(kind) => {
                self.deadline = None;
                self.on_deadline(kind);
            }
        }
    }

    /// Apply one transport event
    pub fn handle_event(&mut self, event: TransportEvent) {
        let active = self.connection.as_ref().map(|c| c.handle());
        if active != Some(event.handle) {
            tracing::trace!("Ignoring event from superseded connection {}", event.handle);
            return;
        }

        match event.kind {
            TransportEventKind::Open => {
                self.deadline = None;
                self.retry_attempt = 0;
                self.set_state(ConnectionState::Open);
                if let Some(target) = &self.target {
                    tracing::info!("Connected to conversation {}", target);
                }
            }
            TransportEventKind::Message(raw) => {
                if let Dispatch::Append(message) = self.dispatcher.dispatch(&raw) {
                    self.store.append(message);
                }
            }
            TransportEventKind::Error(detail) => {
                tracing::warn!("Transport error on {}: {}", event.handle, detail);
                if matches!(self.deadline, Some((_, Deadline::ConnectTimeout))) {
                    self.deadline = None;
                }
                self.set_state(ConnectionState::Failed(detail));
            }
            TransportEventKind::Close(code) => {
                self.connection = None;
                let failed = matches!(*self.state.borrow(), ConnectionState::Failed(_));
                if !failed {
                    self.set_state(ConnectionState::Closed);
                }
                tracing::info!("Connection {} closed (code {:?})", event.handle, code);
                if failed || code != Some(NORMAL_CLOSURE) {
                    self.schedule_retry();
                } else {
                    self.deadline = None;
                }
            }
        }
    }

    // ========================================
    // Internals
    // ========================================

    fn on_credential_changed(&mut self, credential: Option<Credential>) {
        let Some(target) = self.target.clone() else {
            return;
        };
        let credential = credential.unwrap_or_else(|| self.guest.clone());
        if self.credential.as_ref() == Some(&credential) {
            return;
        }

        tracing::info!("Credential changed, reconnecting to conversation {}", target);
        self.close_connection();
        self.credential = Some(credential);
        self.retry_attempt = 0;
        self.deadline = None;
        self.open_connection();
    }

    fn on_deadline(&mut self, kind: Deadline) {
        match kind {
            Deadline::Retry => {
                tracing::info!("Retrying connection (attempt {})", self.retry_attempt);
                self.open_connection();
            }
            Deadline::ConnectTimeout => {
                if !matches!(*self.state.borrow(), ConnectionState::Connecting) {
                    return;
                }
                tracing::warn!("Connection timed out");
                self.close_connection();
                self.set_state(ConnectionState::Failed("connection timed out".to_string()));
                self.schedule_retry();
            }
        }
    }

    fn open_connection(&mut self) {
        let (Some(target), Some(credential)) = (&self.target, &self.credential) else {
            return;
        };

        let url = match self.config.connection_url(target, credential) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!("Cannot connect to conversation {}: {}", target, e);
                self.set_state(ConnectionState::Failed(e.to_string()));
                return;
            }
        };

        let handle = self.next_handle;
        self.next_handle = handle.next();
        tracing::info!("Connecting to conversation {} ({})", target, handle);

        self.set_state(ConnectionState::Connecting);
        let connection = self.transport.open(OpenRequest {
            url: url.into(),
            events: EventSink::new(handle, self.events_tx.clone()),
        });
        self.connection = Some(connection);
        self.deadline = self
            .config
            .connect_timeout
            .map(|timeout| (Instant::now() + timeout, Deadline::ConnectTimeout));
    }

    fn close_connection(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.close();
        }
    }

    fn schedule_retry(&mut self) {
        if self.target.is_none() {
            return;
        }
        match self.config.reconnect.delay_for(self.retry_attempt) {
            Some(delay) => {
                self.retry_attempt += 1;
                tracing::info!(
                    "Reconnecting in {:?} (attempt {}/{})",
                    delay,
                    self.retry_attempt,
                    self.config.reconnect.max_attempts
                );
                self.deadline = Some((Instant::now() + delay, Deadline::Retry));
            }
            None => {
                if self.config.reconnect.max_attempts > 0 {
                    tracing::error!(
                        "Failed to reconnect after {} attempts",
                        self.config.reconnect.max_attempts
                    );
                }
                self.deadline = None;
            }
        }
    }

    fn set_state(&self, next: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            tracing::debug!("Session state: {} -> {}", current, next);
            *current = next;
            true
        });
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.close_connection();
    }
}

async fn credential_changed(rx: Option<&mut watch::Receiver<Option<Credential>>>) -> bool {
    match rx {
        Some(rx) => rx.changed().await.is_ok(),
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use super::*;
    use crate::{
        domain::{Originator, ReconnectPolicy},
        infrastructure::transport::{MockConnection, MockTransport},
    };
    use trustlink_shared::time::FixedClock;

    // ========================================
    // テスト作業記録
    // ========================================
    // 【何をテストするか】
    // - 接続・切断・ターゲット切り替え時の状態遷移
    // - 送信時の楽観的ローカルエコーとゲート条件
    // - クレデンシャル変更時の再接続（1 回だけ）
    // - 置き換えられた接続からのイベントの無視
    // - 再接続バックオフと接続タイムアウト
    //
    // 【どのようなシナリオをテストするか】
    // MockTransport が open/close/send を 1 本のログに記録し、
    // テストは EventSink 経由でトランスポートイベントを注入する。
    // ========================================

    const ENDPOINT: &str = "ws://chat.test/ws";

    type Log = Arc<Mutex<Vec<String>>>;
    type Sinks = Arc<Mutex<Vec<EventSink>>>;

    struct Harness {
        controller: SessionController,
        auth: AuthContext,
        log: Log,
        sinks: Sinks,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_config(SessionConfig {
                reconnect: ReconnectPolicy::disabled(),
                connect_timeout: None,
                ..SessionConfig::new(ENDPOINT)
            })
        }

        fn with_config(config: SessionConfig) -> Self {
            Self::with_auth(config, AuthContext::new())
        }

        fn with_auth(config: SessionConfig, auth: AuthContext) -> Self {
            let log: Log = Arc::new(Mutex::new(Vec::new()));
            let sinks: Sinks = Arc::new(Mutex::new(Vec::new()));

            let mut transport = MockTransport::new();
            let open_log = log.clone();
            let open_sinks = sinks.clone();
            transport.expect_open().returning(move |request: OpenRequest| {
                let handle = request.events.handle();
                open_log
                    .lock()
                    .unwrap()
                    .push(format!("open {} {}", handle, request.url));
                open_sinks.lock().unwrap().push(request.events);

                let mut connection = MockConnection::new();
                connection.expect_handle().return_const(handle);
                let send_log = open_log.clone();
                connection.expect_send().returning(move |text: &str| {
                    send_log.lock().unwrap().push(format!("send {} {}", handle, text));
                });
                let close_log = open_log.clone();
                connection.expect_close().returning(move || {
                    close_log.lock().unwrap().push(format!("close {}", handle));
                });
                Box::new(connection) as Box<dyn Connection>
            });

            let controller = SessionController::with_clock(
                config,
                Arc::new(transport),
                auth.clone(),
                Arc::new(FixedClock::new(1735689600000)),
            );
            Self {
                controller,
                auth,
                log,
                sinks,
            }
        }

        fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }

        fn emit(&self, index: usize, kind: TransportEventKind) {
            let sinks = self.sinks.lock().unwrap();
            assert!(sinks[index].emit(kind));
        }

        /// Deliver an event to connection `index` and let the controller apply it
        async fn deliver(&mut self, index: usize, kind: TransportEventKind) {
            self.emit(index, kind);
            self.controller.process_next().await;
        }
    }

    fn target(id: &str) -> ConversationTarget {
        ConversationTarget::new(id).unwrap()
    }

    fn credential(token: &str) -> Option<Credential> {
        Some(Credential::new(token).unwrap())
    }

    #[tokio::test]
    async fn test_connect_opens_and_becomes_open() {
        // テスト項目: connect で Connecting になり、Open イベントで Open になる
        // given (前提条件):
        let mut h = Harness::new();

        // when (操作):
        h.controller.connect_with_credential(target("42"), credential("tok-A"));
        let connecting = h.controller.state();
        h.deliver(0, TransportEventKind::Open).await;

        // then (期待する結果):
        assert_eq!(connecting, ConnectionState::Connecting);
        assert_eq!(h.controller.state(), ConnectionState::Open);
        assert_eq!(h.log(), vec!["open #1 ws://chat.test/ws/chat/42?token=tok-A"]);
    }

    #[tokio::test]
    async fn test_guest_credential_used_without_login() {
        // テスト項目: ログインしていない場合はゲスト用トークンで接続する
        // given (前提条件):
        let mut h = Harness::new();

        // when (操作):
        h.controller.connect(target("42"));

        // then (期待する結果):
        let log = h.log();
        assert_eq!(log.len(), 1);
        assert!(log[0].contains("token=guest-token-"));
    }

    #[tokio::test]
    async fn test_send_when_not_open_is_ignored() {
        // テスト項目: Open でない状態での送信はストアもトランスポートも変更しない
        // given (前提条件):
        let mut h = Harness::new();
        h.controller.connect_with_credential(target("42"), credential("tok-A"));

        // when (操作):
        let sent = h.controller.send_message("hello");

        // then (期待する結果):
        assert!(!sent);
        assert!(h.controller.store().is_empty());
        assert!(h.log().iter().all(|entry| !entry.starts_with("send")));
    }

    #[tokio::test]
    async fn test_send_whitespace_is_noop_and_text_appends_one_local() {
        // テスト項目: 空白のみの送信は何もせず、通常の送信は Local メッセージを 1 件追加する
        // given (前提条件):
        let mut h = Harness::new();
        h.controller.connect_with_credential(target("42"), credential("tok-A"));
        h.deliver(0, TransportEventKind::Open).await;

        // when (操作):
        let blank = h.controller.send_message("   ");
        let after_blank = h.controller.store().len();
        let sent = h.controller.send_message("hello");

        // then (期待する結果):
        assert!(!blank);
        assert_eq!(after_blank, 0);
        assert!(sent);
        let messages = h.controller.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "hello");
        assert_eq!(messages[0].originator, Originator::Local);
        assert_eq!(h.log().last().map(String::as_str), Some("send #1 hello"));
    }

    #[tokio::test]
    async fn test_switching_target_closes_old_handle_before_opening_new() {
        // テスト項目: ターゲット切り替え時、古い接続を 1 回だけ閉じてから新しい接続を開く
        // given (前提条件):
        let mut h = Harness::new();
        h.controller.connect_with_credential(target("1"), credential("tok-A"));
        h.deliver(0, TransportEventKind::Open).await;
        h.controller.send_message("from one");

        // when (操作):
        h.controller.connect_with_credential(target("2"), credential("tok-A"));

        // then (期待する結果):
        assert_eq!(
            h.log(),
            vec![
                "open #1 ws://chat.test/ws/chat/1?token=tok-A",
                "send #1 from one",
                "close #1",
                "open #2 ws://chat.test/ws/chat/2?token=tok-A",
            ]
        );
        assert_eq!(h.controller.state(), ConnectionState::Connecting);
        assert!(h.controller.store().is_empty());
    }

    #[tokio::test]
    async fn test_connect_to_same_target_and_credential_is_noop() {
        // テスト項目: 同じターゲット・同じクレデンシャルへの再 connect は何もしない
        // given (前提条件):
        let mut h = Harness::new();
        h.controller.connect_with_credential(target("1"), credential("tok-A"));

        // when (操作):
        h.controller.connect_with_credential(target("1"), credential("tok-A"));

        // then (期待する結果):
        assert_eq!(h.log().len(), 1);
    }

    #[tokio::test]
    async fn test_late_events_from_superseded_handle_are_ignored() {
        // テスト項目: 置き換えられた接続からの遅延イベントは無視される
        // given (前提条件):
        let mut h = Harness::new();
        h.controller.connect_with_credential(target("1"), credential("tok-A"));
        h.controller.connect_with_credential(target("2"), credential("tok-A"));

        // when (操作):
        h.deliver(0, TransportEventKind::Open).await;
        h.deliver(
            0,
            TransportEventKind::Message(r#"{"id":1,"content":"stale","sender_id":2}"#.to_string()),
        )
        .await;

        // then (期待する結果):
        assert_eq!(h.controller.state(), ConnectionState::Connecting);
        assert!(h.controller.store().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_payload_keeps_state() {
        // テスト項目: 不正なペイロードを受信しても状態は変わらずパニックしない
        // given (前提条件):
        let mut h = Harness::new();
        h.controller.connect_with_credential(target("42"), credential("tok-A"));
        h.deliver(0, TransportEventKind::Open).await;

        // when (操作):
        h.deliver(0, TransportEventKind::Message("not json at all".to_string()))
            .await;

        // then (期待する結果):
        assert_eq!(h.controller.state(), ConnectionState::Open);
        assert!(h.controller.store().is_empty());
    }

    #[tokio::test]
    async fn test_server_echo_of_sent_message_is_not_duplicated() {
        // テスト項目: 送信したメッセージのサーバーエコーを受信してもストアは 1 件のまま
        // given (前提条件):
        let mut h = Harness::new();
        h.controller.connect_with_credential(target("42"), credential("tok-A"));
        h.deliver(0, TransportEventKind::Open).await;
        h.controller.send_message("ok");

        // when (操作):
        h.deliver(
            0,
            TransportEventKind::Message(r#"{"id":8,"content":"ok","sender_id":0}"#.to_string()),
        )
        .await;

        // then (期待する結果):
        let messages = h.controller.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "ok");
        assert_eq!(messages[0].originator, Originator::Local);
    }

    #[tokio::test]
    async fn test_remote_message_then_local_send_scenario() {
        // テスト項目: 受信した Remote メッセージの後に送信した Local メッセージが順に並ぶ
        // given (前提条件):
        let mut h = Harness::new();
        h.controller.connect_with_credential(target("42"), credential("tok-A"));
        h.deliver(0, TransportEventKind::Open).await;

        // when (操作):
        h.deliver(
            0,
            TransportEventKind::Message(
                r#"{"id":1,"content":"hi","sender_id":99,"created_at":"2025-01-01T00:00:00Z"}"#
                    .to_string(),
            ),
        )
        .await;
        let after_receive = h.controller.messages();
        h.controller.send_message("ok");

        // then (期待する結果):
        assert_eq!(after_receive.len(), 1);
        assert_eq!(after_receive[0].text, "hi");
        assert_eq!(after_receive[0].originator, Originator::Remote);

        let messages = h.controller.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].text, "ok");
        assert_eq!(messages[1].originator, Originator::Local);
    }

    #[tokio::test]
    async fn test_credential_change_reconnects_once_and_keeps_history() {
        // テスト項目: 接続中にクレデンシャルが変わると 1 回だけ再接続し、履歴は保持される
        // given (前提条件):
        let mut h = Harness::new();
        h.controller.connect(target("7"));
        h.deliver(0, TransportEventKind::Open).await;
        h.controller.send_message("before login");

        // when (操作):
        h.auth.set(Credential::new("tok-B").unwrap());
        h.controller.process_next().await;

        // then (期待する結果):
        let log = h.log();
        assert_eq!(log.len(), 4);
        assert!(log[0].starts_with("open #1 ws://chat.test/ws/chat/7?token=guest-token-"));
        assert_eq!(log[1], "send #1 before login");
        assert_eq!(log[2], "close #1");
        assert_eq!(log[3], "open #2 ws://chat.test/ws/chat/7?token=tok-B");
        assert_eq!(h.controller.state(), ConnectionState::Connecting);
        assert_eq!(h.controller.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_credential_change_without_target_does_nothing() {
        // テスト項目: 切断後のクレデンシャル変更では再接続しない
        // given (前提条件):
        let mut h = Harness::new();
        h.controller.connect_with_credential(target("7"), credential("tok-A"));
        h.controller.disconnect();

        // when (操作):
        h.auth.set(Credential::new("tok-B").unwrap());
        h.controller.refresh_credential();

        // then (期待する結果):
        assert_eq!(
            h.log(),
            vec!["open #1 ws://chat.test/ws/chat/7?token=tok-A", "close #1"]
        );
        assert_eq!(h.controller.state(), ConnectionState::Closed);
        assert_eq!(h.controller.target(), None);
    }

    #[tokio::test]
    async fn test_error_then_close_keeps_failed_state() {
        // テスト項目: エラー後の Close でも Failed 状態と理由が保持される
        // given (前提条件):
        let mut h = Harness::new();
        h.controller.connect_with_credential(target("42"), credential("tok-A"));

        // when (操作):
        h.deliver(0, TransportEventKind::Error("handshake rejected".to_string()))
            .await;
        h.deliver(0, TransportEventKind::Close(None)).await;

        // then (期待する結果):
        assert_eq!(
            h.controller.state(),
            ConnectionState::Failed("handshake rejected".to_string())
        );
        assert_eq!(
            h.controller.last_error().as_deref(),
            Some("handshake rejected")
        );
        assert!(!h.controller.has_pending_retry());
        assert!(!h.controller.send_message("anyone?"));
    }

    #[tokio::test]
    async fn test_normal_remote_close_sets_closed_without_retry() {
        // テスト項目: 正常クローズ (1000) では Closed になり再接続は予約されない
        // given (前提条件):
        let mut h = Harness::with_config(SessionConfig {
            connect_timeout: None,
            ..SessionConfig::new(ENDPOINT)
        });
        h.controller.connect_with_credential(target("42"), credential("tok-A"));
        h.deliver(0, TransportEventKind::Open).await;

        // when (操作):
        h.deliver(0, TransportEventKind::Close(Some(1000))).await;

        // then (期待する結果):
        assert_eq!(h.controller.state(), ConnectionState::Closed);
        assert!(!h.controller.has_pending_retry());
        assert_eq!(h.controller.target(), Some(&target("42")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_retries_until_exhausted() {
        // テスト項目: 失敗時に上限回数まで再接続し、その後は諦める
        // given (前提条件):
        let mut h = Harness::with_config(SessionConfig {
            reconnect: ReconnectPolicy {
                max_attempts: 2,
                initial_delay: Duration::from_millis(100),
                max_delay: Duration::from_secs(1),
            },
            connect_timeout: None,
            ..SessionConfig::new(ENDPOINT)
        });
        h.controller.connect_with_credential(target("42"), credential("tok-A"));

        // when (操作):
        for index in 0..3 {
            h.deliver(index, TransportEventKind::Error("refused".to_string()))
                .await;
            h.deliver(index, TransportEventKind::Close(None)).await;
            if index < 2 {
                assert!(h.controller.has_pending_retry());
                // fires the retry timer
                h.controller.process_next().await;
            }
        }

        // then (期待する結果):
        let opens = h.log().iter().filter(|e| e.starts_with("open")).count();
        assert_eq!(opens, 3);
        assert!(!h.controller.has_pending_retry());
        assert_eq!(
            h.controller.state(),
            ConnectionState::Failed("refused".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_open_resets_retry_counter() {
        // テスト項目: 再接続に成功すると再試行回数がリセットされる
        // given (前提条件):
        let mut h = Harness::with_config(SessionConfig {
            reconnect: ReconnectPolicy {
                max_attempts: 1,
                initial_delay: Duration::from_millis(100),
                max_delay: Duration::from_secs(1),
            },
            connect_timeout: None,
            ..SessionConfig::new(ENDPOINT)
        });
        h.controller.connect_with_credential(target("42"), credential("tok-A"));
        h.deliver(0, TransportEventKind::Open).await;
        h.deliver(0, TransportEventKind::Close(Some(1006))).await;
        h.controller.process_next().await;

        // when (操作):
        h.deliver(1, TransportEventKind::Open).await;
        h.deliver(1, TransportEventKind::Close(Some(1006))).await;

        // then (期待する結果):
        assert!(h.controller.has_pending_retry());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout_fails_and_closes_handle() {
        // テスト項目: 接続タイムアウトで接続が閉じられ Failed になる
        // given (前提条件):
        let mut h = Harness::with_config(SessionConfig {
            reconnect: ReconnectPolicy::disabled(),
            connect_timeout: Some(Duration::from_secs(5)),
            ..SessionConfig::new(ENDPOINT)
        });
        h.controller.connect_with_credential(target("42"), credential("tok-A"));

        // when (操作):
        h.controller.process_next().await;

        // then (期待する結果):
        assert_eq!(
            h.controller.state(),
            ConnectionState::Failed("connection timed out".to_string())
        );
        assert_eq!(h.log().last().map(String::as_str), Some("close #1"));
    }

    #[tokio::test]
    async fn test_invalid_endpoint_fails_without_opening() {
        // テスト項目: 不正なエンドポイントでは open せずに Failed になる
        // given (前提条件):
        let mut h = Harness::with_config(SessionConfig {
            reconnect: ReconnectPolicy::disabled(),
            ..SessionConfig::new("not a url")
        });

        // when (操作):
        h.controller.connect_with_credential(target("42"), credential("tok-A"));

        // then (期待する結果):
        assert!(h.log().is_empty());
        assert!(matches!(h.controller.state(), ConnectionState::Failed(_)));
    }

    #[tokio::test]
    async fn test_state_subscribers_observe_transitions() {
        // テスト項目: 状態の購読者が遷移を観測できる
        // given (前提条件):
        let mut h = Harness::new();
        let mut rx = h.controller.subscribe_state();

        // when (操作):
        h.controller.connect_with_credential(target("42"), credential("tok-A"));
        let connecting = rx.borrow_and_update().clone();
        h.deliver(0, TransportEventKind::Open).await;

        // then (期待する結果):
        assert_eq!(connecting, ConnectionState::Connecting);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), ConnectionState::Open);
    }

    #[tokio::test]
    async fn test_logged_in_credential_used_on_connect() {
        // テスト項目: AuthContext にトークンがある場合はそれで接続する
        // given (前提条件):
        let auth = AuthContext::with_credential(credential("tok-A"));
        let mut h = Harness::with_auth(
            SessionConfig {
                reconnect: ReconnectPolicy::disabled(),
                connect_timeout: None,
                ..SessionConfig::new(ENDPOINT)
            },
            auth,
        );

        // when (操作):
        h.controller.connect(target("5"));

        // then (期待する結果):
        assert_eq!(h.log(), vec!["open #1 ws://chat.test/ws/chat/5?token=tok-A"]);
    }
}
