//! Terminal client: wires the session controller to stdin and stdout.

use std::sync::Arc;

use rustyline::{DefaultEditor, error::ReadlineError};
use tokio::sync::mpsc;

use crate::{
    auth::AuthContext,
    config::SessionConfig,
    domain::{ConversationTarget, Credential, Message},
    error::ClientError,
    infrastructure::{
        auth_api::{HttpLoginApi, LoginApi, SimulatedLoginApi},
        transport::{SimulatedConfig, SimulatedTransport, Transport, WebSocketTransport},
    },
    session::SessionController,
};

use super::{
    formatter::MessageFormatter,
    ui::{Command, PROMPT, redisplay_prompt},
};

/// Which backend the client talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    /// TrustLink backend over WebSocket and HTTP
    Remote,
    /// In-process operator, no network
    Simulated,
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub backend: Backend,
    pub incident: ConversationTarget,
    pub session: SessionConfig,
    pub api_base: String,
    /// Email and password to log in with before connecting
    pub login: Option<(String, String)>,
}

enum Wake {
    Input(Option<String>),
    Session,
    State,
    Messages,
}

fn build_backend(options: &ClientOptions) -> (Arc<dyn Transport>, Arc<dyn LoginApi>) {
    match options.backend {
        Backend::Remote => (
            Arc::new(WebSocketTransport::new()),
            Arc::new(HttpLoginApi::new(options.api_base.clone())),
        ),
        Backend::Simulated => (
            Arc::new(SimulatedTransport::new(SimulatedConfig {
                incident_id: options.incident.as_incident_id(),
                ..SimulatedConfig::default()
            })),
            Arc::new(SimulatedLoginApi::new()),
        ),
    }
}

async fn login(
    api: &dyn LoginApi,
    auth: &AuthContext,
    email: &str,
    password: &str,
) -> Result<(), ClientError> {
    let response = api.login(email, password).await?;
    auth.set(Credential::new(response.access_token)?);
    tracing::info!("Logged in as {}", response.user.email);
    Ok(())
}

/// Spawn a blocking thread for rustyline (synchronous readline)
fn spawn_readline(input_tx: mpsc::UnboundedSender<String>) {
    std::thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                tracing::error!("Failed to initialize readline: {}", e);
                return;
            }
        };

        loop {
            match rl.readline(PROMPT) {
                Ok(line) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        rl.add_history_entry(line).ok();
                        if input_tx.send(line.to_string()).is_err() {
                            // Channel closed, exit thread
                            break;
                        }
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    // Ctrl+C
                    tracing::info!("Interrupted");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    // Ctrl+D
                    tracing::info!("EOF");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {}", err);
                    break;
                }
            }
        }
    });
}

/// Run the terminal chat client until the user quits or input ends
pub async fn run_client(options: ClientOptions) -> Result<(), ClientError> {
    let auth = AuthContext::new();
    let (transport, login_api) = build_backend(&options);

    if let Some((email, password)) = &options.login {
        login(login_api.as_ref(), &auth, email, password).await?;
    }

    let mut controller = SessionController::new(options.session.clone(), transport, auth.clone());
    let mut state_rx = controller.subscribe_state();
    let mut messages_rx = controller.store().subscribe();

    print!(
        "{}",
        MessageFormatter::format_welcome(&options.incident, auth.current().is_some())
    );
    controller.connect(options.incident.clone());

    let (input_tx, mut input_rx) = mpsc::unbounded_channel::<String>();
    spawn_readline(input_tx);

    let mut last_rendered: Option<Message> = None;

    loop {
        let wake = tokio::select! {
            line = input_rx.recv() => Wake::Input(line),
            _ = controller.process_next() => Wake::Session,
            Ok(()) = state_rx.changed() => Wake::State,
            Ok(()) = messages_rx.changed() => Wake::Messages,
        };

        match wake {
            Wake::Input(None) => break,
            Wake::Input(Some(line)) => match Command::parse(&line) {
                Command::Quit => break,
                Command::Send(text) => {
                    if !controller.send_message(&text) {
                        print!("{}", MessageFormatter::format_not_sent(&controller.state()));
                        redisplay_prompt();
                    }
                }
                Command::Logout => {
                    auth.clear();
                    let notice = MessageFormatter::format_notice("Logged out, continuing as guest");
                    print!("{}", notice);
                    redisplay_prompt();
                }
                Command::Login { email, password } => {
                    let notice = match login(login_api.as_ref(), &auth, &email, &password).await {
                        Ok(()) => format!("Logged in as {}", email),
                        Err(e) => e.to_string(),
                    };
                    print!("{}", MessageFormatter::format_notice(&notice));
                    redisplay_prompt();
                }
                Command::Invalid(reason) => {
                    print!("{}", MessageFormatter::format_notice(&reason));
                    redisplay_prompt();
                }
            },
            Wake::Session => {}
            Wake::State => {
                let state = state_rx.borrow_and_update().clone();
                print!("{}", MessageFormatter::format_state(&state));
                redisplay_prompt();
            }
            Wake::Messages => {
                let messages = controller.messages();
                // everything after the last message already shown; all of
                // them if it was evicted or the conversation was reset
                let start = last_rendered
                    .as_ref()
                    .and_then(|last| messages.iter().rposition(|m| m == last))
                    .map_or(0, |index| index + 1);
                for message in &messages[start..] {
                    // our own lines are already on screen
                    if !message.is_local() {
                        print!("{}", MessageFormatter::format_message(message));
                    }
                }
                last_rendered = messages.last().cloned();
                redisplay_prompt();
            }
        }
    }

    controller.disconnect();
    tracing::info!("Client session ended");
    Ok(())
}
