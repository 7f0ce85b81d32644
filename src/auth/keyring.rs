//! OS secret store via the platform's command-line helper.
//!
//! Linux uses `secret-tool` (libsecret), macOS uses `security`. The token
//! is kept as one JSON secret under `service`/`account`.

use std::io::{ErrorKind, Write};
use std::process::{Command, Output, Stdio};

use super::store::{StoredToken, TokenStore};
use super::AuthError;

/// Keyring service name.
pub const SERVICE: &str = "claude-history-sync";

/// Keyring account name.
pub const ACCOUNT: &str = "token";

const NAME: &str = "keyring";

/// Helper program family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyringBackend {
    /// libsecret's `secret-tool`.
    SecretTool,
    /// macOS `security`.
    Security,
    /// No supported helper on this platform.
    Unsupported,
}

impl KeyringBackend {
    /// The backend for the current platform.
    #[must_use]
    pub const fn detect() -> Self {
        if cfg!(target_os = "macos") {
            Self::Security
        } else if cfg!(target_os = "linux") {
            Self::SecretTool
        } else {
            Self::Unsupported
        }
    }

    const fn default_program(self) -> &'static str {
        match self {
            Self::SecretTool => "secret-tool",
            Self::Security => "security",
            Self::Unsupported => "",
        }
    }
}

/// Whether helper output means the secret service itself is unreachable.
#[must_use]
pub fn is_unavailable_message(stderr: &str) -> bool {
    let lower = stderr.to_ascii_lowercase();
    ["dbus", "session bus", "secret service", "keyring", "cannot autolaunch"]
        .iter()
        .any(|needle| lower.contains(needle))
}

/// Tokens in the OS keyring.
#[derive(Debug, Clone)]
pub struct KeyringStore {
    backend: KeyringBackend,
    program: String,
    service: String,
    account: String,
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyringStore {
    #[must_use]
    pub fn new() -> Self {
        let backend = KeyringBackend::detect();
        Self::with_program(backend, backend.default_program())
    }

    /// Use a specific helper binary for `backend`.
    pub fn with_program(backend: KeyringBackend, program: impl Into<String>) -> Self {
        Self {
            backend,
            program: program.into(),
            service: SERVICE.to_string(),
            account: ACCOUNT.to_string(),
        }
    }

    fn unavailable(message: impl Into<String>) -> AuthError {
        AuthError::Unavailable {
            backend: NAME,
            message: message.into(),
        }
    }

    /// Run the helper, feeding `stdin` if given.
    fn run(&self, args: &[&str], stdin: Option<&str>) -> Result<Output, AuthError> {
        if self.backend == KeyringBackend::Unsupported {
            return Err(Self::unavailable("no keyring helper on this platform"));
        }

        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => Self::unavailable(format!("{} not installed", self.program)),
                _ => Self::unavailable(format!("cannot run {}: {e}", self.program)),
            })?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes())
                .map_err(|e| Self::unavailable(format!("cannot write to {}: {e}", self.program)))?;
        }

        child
            .wait_with_output()
            .map_err(|e| Self::unavailable(format!("{} failed: {e}", self.program)))
    }

    /// Map a failed helper run to an error, or `None` for "no such item".
    fn failure(output: &Output) -> Option<AuthError> {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        if is_unavailable_message(stderr) {
            return Some(Self::unavailable(stderr));
        }
        if stderr.is_empty() || stderr.contains("could not be found") {
            return None;
        }
        Some(AuthError::Store {
            backend: NAME,
            message: stderr.to_string(),
        })
    }
}

impl TokenStore for KeyringStore {
    fn name(&self) -> &'static str {
        NAME
    }

    fn load(&self) -> Result<Option<StoredToken>, AuthError> {
        let output = match self.backend {
            KeyringBackend::Security => self.run(
                &["find-generic-password", "-s", &self.service, "-a", &self.account, "-w"],
                None,
            )?,
            _ => self.run(
                &["lookup", "service", &self.service, "account", &self.account],
                None,
            )?,
        };

        if !output.status.success() {
            return Self::failure(&output).map_or(Ok(None), Err);
        }

        let secret = String::from_utf8_lossy(&output.stdout);
        let secret = secret.trim();
        if secret.is_empty() {
            return Ok(None);
        }

        serde_json::from_str(secret).map(Some).map_err(|e| AuthError::Store {
            backend: NAME,
            message: format!("stored token is not valid JSON: {e}"),
        })
    }

    fn save(&self, token: &StoredToken) -> Result<(), AuthError> {
        let secret = serde_json::to_string(token).map_err(|e| AuthError::Store {
            backend: NAME,
            message: e.to_string(),
        })?;

        let output = match self.backend {
            KeyringBackend::Security => self.run(
                &[
                    "add-generic-password",
                    "-U",
                    "-s",
                    &self.service,
                    "-a",
                    &self.account,
                    "-w",
                    &secret,
                ],
                None,
            )?,
            _ => self.run(
                &[
                    "store",
                    "--label=claude-history-sync",
                    "service",
                    &self.service,
                    "account",
                    &self.account,
                ],
                Some(&secret),
            )?,
        };

        if output.status.success() {
            return Ok(());
        }
        Err(Self::failure(&output).unwrap_or(AuthError::Store {
            backend: NAME,
            message: format!("{} exited with {}", self.program, output.status),
        }))
    }

    fn clear(&self) -> Result<(), AuthError> {
        let output = match self.backend {
            KeyringBackend::Security => self.run(
                &["delete-generic-password", "-s", &self.service, "-a", &self.account],
                None,
            )?,
            _ => self.run(
                &["clear", "service", &self.service, "account", &self.account],
                None,
            )?,
        };

        if output.status.success() {
            return Ok(());
        }
        Self::failure(&output).map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_messages() {
        assert!(is_unavailable_message(
            "Cannot autolaunch D-Bus without X11 $DISPLAY"
        ));
        assert!(is_unavailable_message(
            "Failed to connect to the session bus"
        ));
        assert!(is_unavailable_message(
            "The name org.freedesktop.secrets was not provided: Secret Service"
        ));
        assert!(!is_unavailable_message("permission denied"));
        assert!(!is_unavailable_message(""));
    }

    #[test]
    fn test_missing_helper_is_unavailable() {
        let store = KeyringStore::with_program(
            KeyringBackend::SecretTool,
            "claude-history-sync-no-such-helper",
        );
        let err = store.load().unwrap_err();
        assert!(err.is_unavailable());
    }

    #[test]
    fn test_unsupported_backend() {
        let store = KeyringStore::with_program(KeyringBackend::Unsupported, "");
        assert!(store.load().unwrap_err().is_unavailable());
        assert!(store.save(&StoredToken::new("a")).unwrap_err().is_unavailable());
    }

    #[cfg(unix)]
    #[test]
    fn test_silent_failure_means_not_found() {
        // `false` exits 1 with no output, like `secret-tool lookup` on a miss.
        let store = KeyringStore::with_program(KeyringBackend::SecretTool, "false");
        assert!(store.load().unwrap().is_none());
        assert!(store.clear().is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_empty_secret_means_not_found() {
        let store = KeyringStore::with_program(KeyringBackend::SecretTool, "true");
        assert!(store.load().unwrap().is_none());
    }
}
