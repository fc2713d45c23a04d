//! Mock 沙箱提供方（用于测试，无需远程服务）
//!
//! 第一次 run 视为工具链安装，之后的 run 视为编译；每一步的行为可单独设定。
//! 计数 provision / teardown 次数，并记录写入的文件，便于断言「必定销毁」等性质。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::sandbox::{CommandSpec, ProcessOutput, Sandbox, SandboxError, SandboxProvider};

/// 某一步的预设行为
#[derive(Debug, Clone)]
pub enum MockStep {
    Output(ProcessOutput),
    Fail(String),
    Panic(String),
    /// 永不返回，交给管理器的超时处理
    Hang,
    /// 延迟后返回给定输出
    Delayed(Duration, ProcessOutput),
}

#[derive(Debug, Default)]
struct MockCounters {
    provisions: AtomicUsize,
    teardowns: AtomicUsize,
    files: Mutex<Vec<(String, String)>>,
    dirs: Mutex<Vec<String>>,
    commands: Mutex<Vec<CommandSpec>>,
}

/// Mock 提供方
pub struct MockSandboxProvider {
    credential: bool,
    provision_error: Option<String>,
    install: MockStep,
    compile: MockStep,
    teardown_error: Option<String>,
    counters: Arc<MockCounters>,
}

impl MockSandboxProvider {
    /// 安装成功，编译返回给定输出
    pub fn compiling(output: ProcessOutput) -> Self {
        Self {
            credential: true,
            provision_error: None,
            install: MockStep::Output(ProcessOutput::new(0, "aptos 7.0.0", "")),
            compile: MockStep::Output(output),
            teardown_error: None,
            counters: Arc::new(MockCounters::default()),
        }
    }

    pub fn with_compile(mut self, step: MockStep) -> Self {
        self.compile = step;
        self
    }

    pub fn with_install(mut self, step: MockStep) -> Self {
        self.install = step;
        self
    }

    pub fn without_credential(mut self) -> Self {
        self.credential = false;
        self
    }

    pub fn failing_provision(mut self, message: impl Into<String>) -> Self {
        self.provision_error = Some(message.into());
        self
    }

    pub fn failing_teardown(mut self, message: impl Into<String>) -> Self {
        self.teardown_error = Some(message.into());
        self
    }

    pub fn provision_count(&self) -> usize {
        self.counters.provisions.load(Ordering::SeqCst)
    }

    pub fn teardown_count(&self) -> usize {
        self.counters.teardowns.load(Ordering::SeqCst)
    }

    /// (路径, 内容)，按写入顺序
    pub fn written_files(&self) -> Vec<(String, String)> {
        self.counters
            .files
            .lock()
            .map(|f| f.clone())
            .unwrap_or_default()
    }

    pub fn created_dirs(&self) -> Vec<String> {
        self.counters
            .dirs
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }

    pub fn commands(&self) -> Vec<CommandSpec> {
        self.counters
            .commands
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SandboxProvider for MockSandboxProvider {
    fn credential_configured(&self) -> bool {
        self.credential
    }

    async fn provision(&self) -> Result<Box<dyn Sandbox>, SandboxError> {
        if let Some(message) = &self.provision_error {
            return Err(SandboxError::Provisioning(message.clone()));
        }
        let n = self.counters.provisions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSandbox {
            id: format!("mock-sandbox-{n}"),
            install: self.install.clone(),
            compile: self.compile.clone(),
            teardown_error: self.teardown_error.clone(),
            runs: AtomicUsize::new(0),
            counters: self.counters.clone(),
        }))
    }
}

struct MockSandbox {
    id: String,
    install: MockStep,
    compile: MockStep,
    teardown_error: Option<String>,
    runs: AtomicUsize,
    counters: Arc<MockCounters>,
}

#[async_trait]
impl Sandbox for MockSandbox {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(&self, command: &CommandSpec) -> Result<ProcessOutput, SandboxError> {
        if let Ok(mut commands) = self.counters.commands.lock() {
            commands.push(command.clone());
        }
        let step = if self.runs.fetch_add(1, Ordering::SeqCst) == 0 {
            &self.install
        } else {
            &self.compile
        };
        match step {
            MockStep::Output(output) => Ok(output.clone()),
            MockStep::Fail(message) => Err(SandboxError::Process(message.clone())),
            MockStep::Panic(message) => panic!("{}", message),
            MockStep::Hang => {
                std::future::pending::<()>().await;
                Err(SandboxError::Process("unreachable".into()))
            }
            MockStep::Delayed(delay, output) => {
                tokio::time::sleep(*delay).await;
                Ok(output.clone())
            }
        }
    }

    async fn write_file(&self, path: &str, contents: &str) -> Result<(), SandboxError> {
        if let Ok(mut files) = self.counters.files.lock() {
            files.push((path.to_string(), contents.to_string()));
        }
        Ok(())
    }

    async fn make_dir(&self, path: &str) -> Result<(), SandboxError> {
        if let Ok(mut dirs) = self.counters.dirs.lock() {
            dirs.push(path.to_string());
        }
        Ok(())
    }

    async fn teardown(&self) -> Result<(), SandboxError> {
        self.counters.teardowns.fetch_add(1, Ordering::SeqCst);
        match &self.teardown_error {
            Some(message) => Err(SandboxError::Teardown(message.clone())),
            None => Ok(()),
        }
    }
}
