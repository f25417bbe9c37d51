//! Terminal chat client for TrustLink incident conversations.
//!
//! Connects to the operator chat of one incident and sends lines from stdin.
//! Without `--email`/`--password` the session runs as a guest; `/login` and
//! `/logout` switch credentials and the session reconnects on its own.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin trustlink-client -- --incident 42
//! cargo run --bin trustlink-client -- -i 42 --backend simulated
//! ```

use std::time::Duration;

use clap::Parser;

use trustlink_client::{
    Backend, ClientOptions,
    config::{DEFAULT_API_BASE, DEFAULT_WS_ENDPOINT, SessionConfig},
    domain::{ConversationTarget, ReconnectPolicy, SenderId},
};
use trustlink_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "trustlink-client")]
#[command(about = "Chat with the operator handling an incident", long_about = None)]
struct Args {
    /// Incident whose conversation to join
    #[arg(short = 'i', long)]
    incident: String,

    /// Backend to talk to
    #[arg(short = 'b', long, value_enum, default_value_t = Backend::Remote)]
    backend: Backend,

    /// WebSocket base URL
    #[arg(short = 'u', long, default_value = DEFAULT_WS_ENDPOINT)]
    endpoint: String,

    /// REST API base URL (used for login)
    #[arg(long, default_value = DEFAULT_API_BASE)]
    api: String,

    /// Log in with this email before connecting
    #[arg(long, requires = "password")]
    email: Option<String>,

    #[arg(long, requires = "email")]
    password: Option<String>,

    /// Sender id the backend uses for this client's own messages
    #[arg(long, default_value_t = 0)]
    sender_id: i64,

    /// Retries after a lost connection (0 disables reconnecting)
    #[arg(long, default_value_t = 5)]
    max_reconnect_attempts: u32,

    /// Seconds to wait for the handshake (0 waits forever)
    #[arg(long, default_value_t = 15)]
    connect_timeout: u64,

    /// Keep at most this many messages in memory
    #[arg(long)]
    history_limit: Option<usize>,
}

impl Args {
    fn into_options(self) -> Result<ClientOptions, trustlink_client::error::ClientError> {
        let incident = ConversationTarget::new(self.incident)?;
        let session = SessionConfig {
            local_sender_id: SenderId::new(self.sender_id),
            reconnect: ReconnectPolicy {
                max_attempts: self.max_reconnect_attempts,
                ..ReconnectPolicy::default()
            },
            connect_timeout: (self.connect_timeout > 0)
                .then(|| Duration::from_secs(self.connect_timeout)),
            store_capacity: self.history_limit,
            ..SessionConfig::new(self.endpoint)
        };

        Ok(ClientOptions {
            backend: self.backend,
            incident,
            session,
            api_base: self.api,
            login: self.email.zip(self.password),
        })
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), &["trustlink_client"], "info");

    let options = match Args::parse().into_options() {
        Ok(options) => options,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(2);
        }
    };

    // Run the client
    if let Err(e) = trustlink_client::run_client(options).await {
        tracing::error!("Client error: {}", e);
        std::process::exit(1);
    }
}
