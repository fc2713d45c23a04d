//! 沙箱提供方抽象
//!
//! SandboxProvider 负责创建环境；Sandbox 是一个已创建的环境，暴露
//! 运行进程 / 写文件 / 建目录 / 销毁 四个原语。每次编译创建一个新环境，用完即毁。

use std::time::Duration;

use async_trait::async_trait;

use crate::sandbox::SandboxError;

/// 沙箱内进程的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn new(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// 一条待执行的命令（shell 语法，由沙箱内的 sh 解释）
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub command: String,
    /// 工作目录；None 表示沙箱默认目录
    pub cwd: Option<String>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            cwd: None,
            timeout,
        }
    }

    pub fn in_dir(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }
}

/// 已创建的一次性环境
#[async_trait]
pub trait Sandbox: Send + Sync {
    fn id(&self) -> &str;

    async fn run(&self, command: &CommandSpec) -> Result<ProcessOutput, SandboxError>;

    async fn write_file(&self, path: &str, contents: &str) -> Result<(), SandboxError>;

    async fn make_dir(&self, path: &str) -> Result<(), SandboxError>;

    async fn teardown(&self) -> Result<(), SandboxError>;
}

/// 环境提供方（E2B 风格远程服务 / 本地临时目录 / Mock）
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    /// 凭据是否就绪；为 false 时管理器直接返回 Configuration，不调用 provision
    fn credential_configured(&self) -> bool {
        true
    }

    async fn provision(&self) -> Result<Box<dyn Sandbox>, SandboxError>;
}
