use std::fmt;
use std::io::{self, BufRead, Write};

use super::AuthError;

pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Source of dashboard credentials for interactive logins.
pub trait CredentialPrompt: Send + Sync {
    fn credentials(&self) -> Result<Credentials, AuthError>;
}

/// Reads the username from stdin and the password without echo.
pub struct TerminalPrompt {
    non_interactive: bool,
}

impl TerminalPrompt {
    pub fn new(non_interactive: bool) -> Self {
        Self { non_interactive }
    }
}

impl CredentialPrompt for TerminalPrompt {
    fn credentials(&self) -> Result<Credentials, AuthError> {
        if self.non_interactive {
            return Err(AuthError::NonInteractive);
        }

        println!("Please provide your dashboard credentials.");
        let mut stdout = io::stdout();
        write!(stdout, "Username (email): ").map_err(AuthError::Prompt)?;
        stdout.flush().map_err(AuthError::Prompt)?;

        let mut username = String::new();
        io::stdin()
            .lock()
            .read_line(&mut username)
            .map_err(AuthError::Prompt)?;

        write!(stdout, "Password: ").map_err(AuthError::Prompt)?;
        stdout.flush().map_err(AuthError::Prompt)?;
        let password = read_password()?;
        println!();

        let username = username.trim().to_string();
        if username.is_empty() {
            return Err(AuthError::LoginFailed("username must not be empty".into()));
        }
        Ok(Credentials { username, password })
    }
}

#[cfg(unix)]
fn read_password() -> Result<String, AuthError> {
    use termion::input::TermRead;

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    stdin
        .lock()
        .read_passwd(&mut stdout)
        .map_err(AuthError::Prompt)?
        .ok_or_else(|| AuthError::LoginFailed("no password given".into()))
}

#[cfg(not(unix))]
fn read_password() -> Result<String, AuthError> {
    let mut password = String::new();
    io::stdin()
        .lock()
        .read_line(&mut password)
        .map_err(AuthError::Prompt)?;
    Ok(password.trim_end_matches(['\r', '\n']).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_hides_password() {
        let creds = Credentials {
            username: "user@example.com".into(),
            password: "hunter2".into(),
        };
        let printed = format!("{:?}", creds);
        assert!(printed.contains("user@example.com"));
        assert!(!printed.contains("hunter2"));
    }

    #[test]
    fn test_non_interactive_refuses() {
        let err = TerminalPrompt::new(true).credentials().unwrap_err();
        assert!(matches!(err, AuthError::NonInteractive));
    }
}
