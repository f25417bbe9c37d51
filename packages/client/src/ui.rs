//! UI utilities for the terminal client.

use std::io::Write;

pub const PROMPT: &str = "you> ";

/// Redisplay the prompt after printing output
pub fn redisplay_prompt() {
    print!("{}", PROMPT);
    std::io::stdout().flush().ok();
}

/// What a line of input asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    Login { email: String, password: String },
    Logout,
    Quit,
    /// Unknown slash command or missing arguments
    Invalid(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let Some(rest) = line.strip_prefix('/') else {
            return Command::Send(line.to_string());
        };

        let mut words = rest.split_whitespace();
        match (words.next(), words.next(), words.next(), words.next()) {
            (Some("quit" | "exit"), None, ..) => Command::Quit,
            (Some("logout"), None, ..) => Command::Logout,
            (Some("login"), Some(email), Some(password), None) => Command::Login {
                email: email.to_string(),
                password: password.to_string(),
            },
            (Some("login"), ..) => Command::Invalid("usage: /login <email> <password>".to_string()),
            _ => Command::Invalid(format!("unknown command: {}", line)),
        }
    }
}
