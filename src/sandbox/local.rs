//! 本地沙箱后端（开发用）
//!
//! 每个环境是一个临时目录，沙箱内的绝对路径映射到该目录下；命令通过 sh -c 执行，
//! 超时后进程被杀掉。没有网络隔离，只适合本机调试与测试。

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::process::Command;

use crate::sandbox::{CommandSpec, ProcessOutput, Sandbox, SandboxError, SandboxProvider};

/// 本地提供方：不需要凭据
#[derive(Debug, Default)]
pub struct LocalSandboxProvider;

impl LocalSandboxProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SandboxProvider for LocalSandboxProvider {
    async fn provision(&self) -> Result<Box<dyn Sandbox>, SandboxError> {
        let dir = tempfile::Builder::new()
            .prefix("simforge-")
            .tempdir()
            .map_err(|e| SandboxError::Provisioning(e.to_string()))?;
        let root = dir.path().to_path_buf();
        let id = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "local".to_string());
        Ok(Box::new(LocalSandbox {
            id,
            root,
            dir: Mutex::new(Some(dir)),
        }))
    }
}

struct LocalSandbox {
    id: String,
    root: PathBuf,
    /// teardown 时取出并删除；None 表示已销毁
    dir: Mutex<Option<TempDir>>,
}

impl LocalSandbox {
    /// 沙箱内路径（绝对或相对）映射到临时目录下
    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

#[async_trait]
impl Sandbox for LocalSandbox {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(&self, command: &CommandSpec) -> Result<ProcessOutput, SandboxError> {
        let cwd = command
            .cwd
            .as_deref()
            .map(|c| self.resolve(c))
            .unwrap_or_else(|| self.root.clone());

        tracing::info!(sandbox_id = %self.id, command = %command.command, "local sandbox execute");

        let child = Command::new("sh")
            .args(["-c", command.command.as_str()])
            .current_dir(&cwd)
            .env("HOME", &self.root)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(command.timeout, child)
            .await
            .map_err(|_| {
                SandboxError::Process(format!(
                    "command timed out after {}s",
                    command.timeout.as_secs()
                ))
            })?
            .map_err(|e| SandboxError::Process(format!("execution failed: {e}")))?;

        Ok(ProcessOutput {
            // 被信号终止时没有退出码
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn write_file(&self, path: &str, contents: &str) -> Result<(), SandboxError> {
        let target = self.resolve(path);
        if let Some(parent) = target.parent() {
            create_dir(parent).await?;
        }
        tokio::fs::write(&target, contents)
            .await
            .map_err(|e| SandboxError::Staging(format!("{}: {e}", target.display())))
    }

    async fn make_dir(&self, path: &str) -> Result<(), SandboxError> {
        create_dir(&self.resolve(path)).await
    }

    async fn teardown(&self) -> Result<(), SandboxError> {
        let dir = self
            .dir
            .lock()
            .map_err(|e| SandboxError::Teardown(e.to_string()))?
            .take();
        match dir {
            Some(dir) => dir
                .close()
                .map_err(|e| SandboxError::Teardown(e.to_string())),
            None => Ok(()),
        }
    }
}

async fn create_dir(path: &Path) -> Result<(), SandboxError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| SandboxError::Staging(format!("{}: {e}", path.display())))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_stage_run_and_teardown() {
        let sandbox = LocalSandboxProvider::new().provision().await.unwrap();
        sandbox.make_dir("/home/user/project/sources").await.unwrap();
        sandbox
            .write_file("/home/user/project/sources/a.move", "module 0x1::a {}")
            .await
            .unwrap();

        let spec = CommandSpec::new("cat sources/a.move", Duration::from_secs(10))
            .in_dir("/home/user/project");
        let output = sandbox.run(&spec).await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, "module 0x1::a {}");

        sandbox.teardown().await.unwrap();
        // 二次销毁是空操作
        sandbox.teardown().await.unwrap();
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_data() {
        let sandbox = LocalSandboxProvider::new().provision().await.unwrap();
        let spec = CommandSpec::new("echo 'error: boom' >&2; exit 3", Duration::from_secs(10));
        let output = sandbox.run(&spec).await.unwrap();
        assert_eq!(output.exit_code, 3);
        assert_eq!(output.stderr.trim(), "error: boom");
        sandbox.teardown().await.unwrap();
    }

    #[tokio::test]
    async fn test_command_timeout() {
        let sandbox = LocalSandboxProvider::new().provision().await.unwrap();
        let spec = CommandSpec::new("sleep 5", Duration::from_millis(50));
        let err = sandbox.run(&spec).await.unwrap_err();
        assert!(matches!(err, SandboxError::Process(_)));
        sandbox.teardown().await.unwrap();
    }
}
