//! Issue-board integration: a pluggable [`BoardProvider`] with a code-hosting
//! CLI fallback, used by the deliberation engine on consensus and by the
//! proactive loop when an audit finds something worth filing.

pub mod github;
pub mod traits;

pub use traits::{BoardProvider, BoardProviderDyn, IssueRef, NewIssue};

/// Outcome of triaging one audit report into at most one issue.
#[derive(Debug, Clone)]
pub enum AuditTriageOutcome {
    Filed(IssueRef),
    NoBoard(String),
}

use crate::config::BOARD_CLI_TIMEOUT_SECS;
use crate::error::{BoardError, Result};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

/// Wraps an optional [`BoardProviderDyn`] with a CLI fallback invoked
/// through the nested self-executable's `board` subcommand (or, for close,
/// the code-hosting CLI directly).
pub struct BoardIntegration {
    provider: Option<Arc<dyn BoardProviderDyn>>,
    self_executable: Vec<String>,
}

impl BoardIntegration {
    pub fn new(provider: Option<Arc<dyn BoardProviderDyn>>, self_executable: Vec<String>) -> Self {
        Self { provider, self_executable }
    }

    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    /// File a new issue from a code-watch consensus approval.
    pub async fn open_issue_from_trigger(&self, signal: &str, location: &str, body: &str) -> Result<IssueRef> {
        let title = crate::parser::code_watch_issue_title(signal, location);
        let issue = NewIssue {
            title,
            body: body.to_string(),
            column: "In Progress".to_string(),
        };

        match &self.provider {
            Some(provider) => {
                let created = provider
                    .create_issue(issue.clone())
                    .await
                    .map_err(|error| BoardError::CreateFailed(error.to_string()))?;
                if created.column != issue.column {
                    provider
                        .move_issue(created.number, &issue.column)
                        .await
                        .map_err(|error| BoardError::MoveFailed(error.to_string()))?;
                }
                Ok(created)
            }
            None => Err(BoardError::NotConfigured.into()),
        }
    }

    /// Triage an audit report into exactly one tracking issue. `NO_ISSUES_FOUND`
    /// or an empty report is the caller's responsibility to filter before
    /// calling this. When no board is configured, no issue is created and the
    /// report body is returned for the caller to post as a plain chat line.
    pub async fn handle_audit_report(&self, report: &str) -> Result<AuditTriageOutcome> {
        let body = report
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or_else(|| report.trim())
            .to_string();

        let Some(provider) = &self.provider else {
            return Ok(AuditTriageOutcome::NoBoard(body));
        };

        let title = crate::parser::audit_issue_title(&body);
        let issue = NewIssue { title, body: body.clone(), column: "Ready".to_string() };
        let created = provider
            .create_issue(issue)
            .await
            .map_err(|error| BoardError::CreateFailed(error.to_string()))?;

        Ok(AuditTriageOutcome::Filed(created))
    }

    /// Move an issue-review trigger's issue to `column`, falling back to the
    /// self-executable's `board move-issue` subcommand on provider failure
    /// or absence.
    pub async fn move_issue(&self, number: u64, column: &str) -> Result<()> {
        if let Some(provider) = &self.provider
            && provider.move_issue(number, column).await.is_ok()
        {
            return Ok(());
        }

        self.run_cli(&[
            "board",
            "move-issue",
            &number.to_string(),
            "--column",
            column,
        ])
        .await
    }

    /// Close an issue via the code-hosting CLI (`gh`).
    pub async fn close_issue(&self, number: u64, repo: &str) -> Result<()> {
        self.run_gh(&["issue", "close", &number.to_string(), "-R", repo]).await
    }

    async fn run_cli(&self, args: &[&str]) -> Result<()> {
        let Some((program, prefix)) = self.self_executable.split_first() else {
            return Err(BoardError::CliFallbackFailed("no self-executable configured".to_string()).into());
        };

        let mut command = Command::new(program);
        command.args(prefix).args(args).stdout(Stdio::null()).stderr(Stdio::piped());

        run_with_timeout(command).await
    }

    async fn run_gh(&self, args: &[&str]) -> Result<()> {
        let mut command = Command::new("gh");
        command.args(args).stdout(Stdio::null()).stderr(Stdio::piped());

        run_with_timeout(command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::traits::BoardProvider;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeProvider {
        create_calls: AtomicUsize,
    }

    impl FakeProvider {
        fn new() -> Self {
            Self { create_calls: AtomicUsize::new(0) }
        }
    }

    impl BoardProvider for FakeProvider {
        async fn create_issue(&self, issue: NewIssue) -> Result<IssueRef> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            Ok(IssueRef { number: 7, title: issue.title, url: "https://example.com/issues/7".into(), column: issue.column })
        }

        async fn move_issue(&self, _number: u64, _column: &str) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn audit_triage_files_exactly_one_issue_in_ready_column() {
        let provider = Arc::new(FakeProvider::new());
        let board = BoardIntegration::new(Some(provider.clone() as Arc<dyn BoardProviderDyn>), vec![]);

        let outcome = board.handle_audit_report("Stale dependency in Cargo.lock\nsecond line ignored").await.unwrap();

        assert_eq!(provider.create_calls.load(Ordering::SeqCst), 1);
        match outcome {
            AuditTriageOutcome::Filed(issue) => assert_eq!(issue.column, "Ready"),
            AuditTriageOutcome::NoBoard(_) => panic!("expected a filed issue"),
        }
    }

    #[tokio::test]
    async fn audit_triage_without_a_board_creates_no_issue() {
        let board = BoardIntegration::new(None, vec![]);

        let outcome = board.handle_audit_report("Stale dependency in Cargo.lock").await.unwrap();

        match outcome {
            AuditTriageOutcome::NoBoard(summary) => assert_eq!(summary, "Stale dependency in Cargo.lock"),
            AuditTriageOutcome::Filed(_) => panic!("expected no board configured"),
        }
    }
}

async fn run_with_timeout(mut command: Command) -> Result<()> {
    let child = command
        .spawn()
        .map_err(|error| BoardError::CliFallbackFailed(error.to_string()))?;

    let output = tokio::time::timeout(Duration::from_secs(BOARD_CLI_TIMEOUT_SECS), child.wait_with_output())
        .await
        .map_err(|_| BoardError::CliFallbackFailed("timed out".to_string()))?
        .map_err(|error| BoardError::CliFallbackFailed(error.to_string()))?;

    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        tracing::warn!(%stderr, "board CLI fallback exited non-zero");
        Err(BoardError::CliFallbackFailed(stderr).into())
    }
}
