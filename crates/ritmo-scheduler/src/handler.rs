//! Task handler contract and the built-in subprocess handler.

use anyhow::bail;
use async_trait::async_trait;

use ritmo_types::{TaskContext, TaskResult};

/// A schedulable unit of work.
///
/// The scheduler treats handlers as opaque: it only observes whether a run
/// succeeded and what message/payload it reported. Handlers are responsible
/// for their own bounded execution; the scheduler imposes no timeout.
///
/// Use `&self` — implementations keep any mutable state behind interior
/// mutability so a handler can be shared across dispatches.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn run(&self, ctx: TaskContext) -> anyhow::Result<TaskResult>;
}

/// Maximum characters of subprocess output kept as the run message.
const MAX_MESSAGE_CHARS: usize = 4_000;

/// Handler backed by a configured command.
///
/// The command is spawned with `RITMO_TASK_ID`, `RITMO_FIRED_AT` and
/// `RITMO_SETTINGS` in its environment. A zero exit is a success with
/// stdout as the message; a non-zero exit is a failure with stderr (or the
/// exit code) as the error.
pub struct CommandHandler {
    argv: Vec<String>,
}

impl CommandHandler {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }
}

#[async_trait]
impl TaskHandler for CommandHandler {
    async fn run(&self, ctx: TaskContext) -> anyhow::Result<TaskResult> {
        let Some((program, args)) = self.argv.split_first() else {
            bail!("no command configured");
        };

        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args)
            .env("RITMO_TASK_ID", &ctx.task_id)
            .env("RITMO_FIRED_AT", ctx.fired_at.to_rfc3339())
            .env("RITMO_SETTINGS", ctx.settings.to_string())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        let output = cmd.output().await?;

        let exit_code = output.status.code().unwrap_or(-1);
        let mut stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if stdout.len() > MAX_MESSAGE_CHARS {
            let mut cut = MAX_MESSAGE_CHARS;
            while !stdout.is_char_boundary(cut) {
                cut -= 1;
            }
            stdout.truncate(cut);
            stdout.push_str("... [truncated]");
        }

        if output.status.success() {
            let message = if stdout.is_empty() {
                "command completed".to_string()
            } else {
                stdout
            };
            Ok(TaskResult::ok(message))
        } else {
            let error = if stderr.is_empty() {
                format!("exit code {exit_code}")
            } else {
                stderr
            };
            Ok(TaskResult {
                success: false,
                message: format!("command failed with exit code {exit_code}"),
                data: None,
                error: Some(error),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn ctx(task_id: &str) -> TaskContext {
        TaskContext {
            task_id: task_id.into(),
            fired_at: Utc::now(),
            settings: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn test_successful_command_reports_stdout() {
        let handler = CommandHandler::new(vec!["sh".into(), "-c".into(), "echo analyzed".into()]);
        let result = handler.run(ctx("metrics")).await.unwrap();
        assert!(result.success);
        assert_eq!(result.message, "analyzed");
    }

    #[tokio::test]
    async fn test_failing_command_reports_stderr() {
        let handler = CommandHandler::new(vec![
            "sh".into(),
            "-c".into(),
            "echo 'quota exceeded' >&2; exit 3".into(),
        ]);
        let result = handler.run(ctx("metrics")).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("quota exceeded"));
        assert!(result.message.contains("exit code 3"));
    }

    #[tokio::test]
    async fn test_task_id_is_exported_to_the_command() {
        let handler =
            CommandHandler::new(vec!["sh".into(), "-c".into(), "echo \"$RITMO_TASK_ID\"".into()]);
        let result = handler.run(ctx("data-backup")).await.unwrap();
        assert_eq!(result.message, "data-backup");
    }

    #[tokio::test]
    async fn test_empty_command_is_an_error() {
        let handler = CommandHandler::new(vec![]);
        assert!(handler.run(ctx("metrics")).await.is_err());
    }
}
