//! Subprocess Runtime
//!
//! Runs command/code bodies through an external interpreter binary
//! (`sh -c`, `node -e`, `python3 -c`) with piped stdio and a hard timeout.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{Runtime, RuntimeContext, RuntimeResult};

pub struct ProcessRuntime {
    name: &'static str,
    program: &'static str,
    args: &'static [&'static str],
}

impl ProcessRuntime {
    pub fn shell() -> Self {
        Self {
            name: "sh",
            program: "sh",
            args: &["-c"],
        }
    }

    pub fn node() -> Self {
        Self {
            name: "js",
            program: "node",
            args: &["-e"],
        }
    }

    pub fn python() -> Self {
        Self {
            name: "python",
            program: "python3",
            args: &["-c"],
        }
    }
}

#[async_trait]
impl Runtime for ProcessRuntime {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn execute(&self, ctx: RuntimeContext) -> RuntimeResult {
        let mut command = Command::new(self.program);
        command
            .args(self.args)
            .arg(&ctx.code)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &ctx.env_vars {
            command.env(key, value);
        }
        if std::path::Path::new(&ctx.cwd).is_dir() {
            command.current_dir(&ctx.cwd);
        }

        tracing::debug!(runtime = self.name, "spawning subprocess");
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                return RuntimeResult::error(
                    format!("{}: failed to start: {}", self.program, e),
                    127,
                );
            }
        };
        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(ctx.stdin.as_bytes()).await;
            // Closing stdin lets the child see EOF
        }

        let wait = child.wait_with_output();
        match tokio::time::timeout(Duration::from_millis(ctx.timeout_ms), wait).await {
            Ok(Ok(output)) => RuntimeResult {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                exit_code: output.status.code().unwrap_or(-1),
                timed_out: false,
            },
            Ok(Err(e)) => RuntimeResult::error(format!("{}: {}", self.program, e), 126),
            Err(_) => {
                // kill_on_drop reaps the child when the future is dropped
                RuntimeResult::timeout()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn ctx(code: &str) -> RuntimeContext {
        RuntimeContext {
            code: code.to_string(),
            env_vars: IndexMap::new(),
            stdin: String::new(),
            cwd: "/".to_string(),
            timeout_ms: 5_000,
        }
    }

    #[tokio::test]
    async fn test_shell_echo() {
        let runtime = ProcessRuntime::shell();
        let result = runtime.execute(ctx("echo hello world")).await;
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, "hello world\n");
    }

    #[tokio::test]
    async fn test_shell_env_vars() {
        let runtime = ProcessRuntime::shell();
        let mut context = ctx("printf '%s' \"$GREETING\"");
        context.env_vars.insert("GREETING".to_string(), "hi".to_string());
        let result = runtime.execute(context).await;
        assert_eq!(result.stdout, "hi");
    }

    #[tokio::test]
    async fn test_shell_stdin() {
        let runtime = ProcessRuntime::shell();
        let mut context = ctx("cat");
        context.stdin = "piped input".to_string();
        let result = runtime.execute(context).await;
        assert_eq!(result.stdout, "piped input");
    }

    #[tokio::test]
    async fn test_shell_nonzero_exit() {
        let runtime = ProcessRuntime::shell();
        let result = runtime.execute(ctx("exit 3")).await;
        assert_eq!(result.exit_code, 3);
    }

    #[tokio::test]
    async fn test_timeout() {
        let runtime = ProcessRuntime::shell();
        let mut context = ctx("sleep 10");
        context.timeout_ms = 50;
        let result = runtime.execute(context).await;
        assert!(result.timed_out);
    }

    #[tokio::test]
    async fn test_missing_program() {
        let runtime = ProcessRuntime {
            name: "none",
            program: "definitely-not-a-real-binary",
            args: &[],
        };
        let result = runtime.execute(ctx("")).await;
        assert_eq!(result.exit_code, 127);
    }
}
