//! Invitation Executor: spawn operator-configured CLI-agent subprocesses
//! from a static catalog (spec §4.6).
//!
//! The subprocess-plus-timeout shape is grounded on
//! `swedishembedded-sven/crates/sven-tools/src/builtin/run_terminal_command.rs`
//! (`tokio::process::Command` + `tokio::time::timeout` around `.output()`).
//! Unlike that tool, invocations here are detached (stdout/stderr land in
//! a log file, not in the caller's response) and the command template
//! comes from an operator-authored catalog rather than agent input, so
//! placeholder substitution is whitelisted rather than free-form.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::Serialize;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{info, warn};

use crate::domain::CatalogEntry;
use crate::error::{BusError, Result};

/// Result of attempting to invite an agent. Always returned synchronously
/// to the caller — the subprocess itself keeps running detached after
/// this is produced, except when we had to hard-kill it for exceeding
/// `timeout_seconds`.
#[derive(Debug, Serialize)]
pub struct InviteOutcome {
    pub ok: bool,
    pub command_executed: String,
    pub reason: String,
}

pub struct InvitationExecutor {
    catalog: Vec<CatalogEntry>,
    log_dir: PathBuf,
}

impl InvitationExecutor {
    pub fn new(catalog: Vec<CatalogEntry>, log_dir: PathBuf) -> Self {
        Self { catalog, log_dir }
    }

    pub fn catalog(&self) -> &[CatalogEntry] {
        &self.catalog
    }

    fn find(&self, name: &str) -> Result<&CatalogEntry> {
        self.catalog
            .iter()
            .find(|e| e.name == name && e.enabled)
            .ok_or_else(|| BusError::invalid_input(format!("no enabled catalog entry named {name}")))
    }

    /// Substitute `{thread_id}` into the entry's command template,
    /// rejecting any other `{...}` placeholder outright. This is the
    /// catalog's whole trust boundary: an operator writes the template,
    /// but only the bus supplies the one value it's allowed to inject.
    fn render_command(template: &str, thread_id: &str) -> Result<String> {
        let mut rendered = String::with_capacity(template.len());
        let mut chars = template.char_indices().peekable();
        while let Some((_, c)) = chars.next() {
            if c == '{' {
                let mut placeholder = String::new();
                let mut closed = false;
                for (_, c2) in chars.by_ref() {
                    if c2 == '}' {
                        closed = true;
                        break;
                    }
                    placeholder.push(c2);
                }
                if !closed {
                    return Err(BusError::invalid_input("unterminated placeholder in invoke_command"));
                }
                if placeholder != "thread_id" {
                    return Err(BusError::invalid_input(format!(
                        "unsupported placeholder {{{placeholder}}} in invoke_command"
                    )));
                }
                rendered.push_str(&shell_quote(thread_id));
            } else {
                rendered.push(c);
            }
        }
        Ok(rendered)
    }

    pub async fn invite(&self, catalog_name: &str, thread_id: &str) -> Result<InviteOutcome> {
        let entry = self.find(catalog_name)?;
        let command = Self::render_command(&entry.invoke_command, thread_id)?;

        fs::create_dir_all(&self.log_dir)
            .await
            .map_err(|e| BusError::internal(format!("failed to create invite log dir: {e}")))?;
        let log_path = self
            .log_dir
            .join(format!("{}-{}.log", catalog_name, uuid::Uuid::new_v4()));

        let outcome = self
            .spawn_detached(&command, &log_path, Duration::from_secs(entry.timeout_seconds))
            .await;

        match outcome {
            Ok(()) => {
                info!(catalog_name, %thread_id, "invited agent");
                Ok(InviteOutcome {
                    ok: true,
                    command_executed: command,
                    reason: "spawned".into(),
                })
            }
            Err(reason) => {
                warn!(catalog_name, %thread_id, %reason, "invite failed");
                Ok(InviteOutcome {
                    ok: false,
                    command_executed: command,
                    reason,
                })
            }
        }
    }

    async fn spawn_detached(&self, command: &str, log_path: &Path, timeout: Duration) -> std::result::Result<(), String> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false);

        let mut child = cmd.spawn().map_err(|e| format!("spawn error: {e}"))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let log_path = log_path.to_path_buf();

        tokio::spawn(async move {
            if let Ok(mut file) = File::create(&log_path).await {
                use tokio::io::AsyncReadExt;
                if let Some(mut out) = stdout {
                    let mut buf = Vec::new();
                    let _ = out.read_to_end(&mut buf).await;
                    let _ = file.write_all(&buf).await;
                }
                if let Some(mut err) = stderr {
                    let mut buf = Vec::new();
                    let _ = err.read_to_end(&mut buf).await;
                    let _ = file.write_all(b"[stderr]\n").await;
                    let _ = file.write_all(&buf).await;
                }
            }
        });

        // Hold the deadline so a runaway invocation gets killed, but
        // don't block the caller on full completion — detached means
        // "fire and watch", not "wait for exit".
        tokio::spawn(async move {
            if tokio::time::timeout(timeout, child.wait()).await.is_err() {
                let _ = child.kill().await;
            }
        });

        Ok(())
    }
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(invoke_command: &str) -> CatalogEntry {
        CatalogEntry {
            name: "claude".into(),
            display_name: "Claude".into(),
            description: "desc".into(),
            invoke_command: invoke_command.into(),
            timeout_seconds: 5,
            enabled: true,
        }
    }

    #[test]
    fn render_command_substitutes_thread_id() {
        let rendered = InvitationExecutor::render_command("echo {thread_id}", "abc 123").unwrap();
        assert_eq!(rendered, "echo 'abc 123'");
    }

    #[test]
    fn render_command_rejects_unknown_placeholder() {
        let err = InvitationExecutor::render_command("echo {api_key}", "abc").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::InvalidInput);
    }

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
    }

    #[tokio::test]
    async fn invite_runs_enabled_entry() {
        let dir = tempfile::tempdir().unwrap();
        let executor = InvitationExecutor::new(vec![entry("echo {thread_id}")], dir.path().to_path_buf());
        let outcome = executor.invite("claude", "t1").await.unwrap();
        assert!(outcome.ok);
        assert_eq!(outcome.command_executed, "echo 't1'");
    }

    #[tokio::test]
    async fn invite_unknown_catalog_name_is_invalid_input() {
        let dir = tempfile::tempdir().unwrap();
        let executor = InvitationExecutor::new(vec![], dir.path().to_path_buf());
        let err = executor.invite("ghost", "t1").await.unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::InvalidInput);
    }
}
