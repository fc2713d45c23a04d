//! 沙箱生命周期管理
//!
//! 每次 compile：检查凭据 → 创建新环境 → 安装工具链 → 写入 Move.toml 与源文件 → 运行编译器 → 销毁。
//! 销毁在所有路径上都会执行（包括步骤 3–5 中的 panic）；销毁失败只记日志，不覆盖主结果。
//! 每次调用输出结构化审计日志（JSON）。

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use serde::Serialize;
use tokio::time::timeout;

use crate::config::SandboxSection;
use crate::sandbox::{
    error_lines, warning_lines, CommandSpec, ProcessOutput, ProjectLayout, Sandbox,
    SandboxError, SandboxProvider,
};

/// 编译相关设置：项目布局、工具链脚本、编译命令与各自的超时
#[derive(Debug, Clone)]
pub struct CompileSettings {
    pub layout: ProjectLayout,
    pub install_script: String,
    pub install_timeout: Duration,
    pub compile_command: String,
    pub compile_timeout: Duration,
}

impl CompileSettings {
    pub fn from_config(cfg: &SandboxSection) -> Self {
        Self {
            layout: ProjectLayout::from_config(cfg),
            install_script: cfg.install_script.clone(),
            install_timeout: Duration::from_secs(cfg.install_timeout_secs),
            compile_command: cfg.compile_command.clone(),
            compile_timeout: Duration::from_secs(cfg.compile_timeout_secs),
        }
    }
}

impl Default for CompileSettings {
    fn default() -> Self {
        Self::from_config(&SandboxSection::default())
    }
}

/// 一次编译的结果；success 只看退出码
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompileOutcome {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration_ms: u64,
}

impl CompileOutcome {
    fn from_output(output: ProcessOutput, duration_ms: u64) -> Self {
        Self {
            success: output.success(),
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.exit_code,
            duration_ms,
        }
    }

    /// 失败时 stderr 的非空行；成功时为空
    pub fn errors(&self) -> Vec<String> {
        if self.success {
            Vec::new()
        } else {
            error_lines(&self.stderr)
        }
    }

    /// 成功时 stdout 中的警告行；失败时为空
    pub fn warnings(&self) -> Vec<String> {
        if self.success {
            warning_lines(&self.stdout)
        } else {
            Vec::new()
        }
    }
}

/// 沙箱生命周期管理器：不重试，重试策略由上层决定
pub struct SandboxManager {
    provider: Arc<dyn SandboxProvider>,
    settings: CompileSettings,
    manifest: String,
}

impl SandboxManager {
    pub fn new(
        provider: Arc<dyn SandboxProvider>,
        settings: CompileSettings,
    ) -> Result<Self, SandboxError> {
        let manifest = settings.layout.render_manifest()?;
        Ok(Self {
            provider,
            settings,
            manifest,
        })
    }

    pub fn settings(&self) -> &CompileSettings {
        &self.settings
    }

    /// 在一次性环境中编译 source
    pub async fn compile(&self, source: &str) -> Result<CompileOutcome, SandboxError> {
        if !self.provider.credential_configured() {
            return Err(SandboxError::Configuration(
                "no API key configured for the sandbox provider".into(),
            ));
        }

        let start = Instant::now();
        let sandbox = self.provider.provision().await.map_err(|e| match e {
            SandboxError::Provisioning(_) => e,
            other => SandboxError::Provisioning(other.to_string()),
        })?;
        let sandbox_id = sandbox.id().to_string();
        tracing::info!(sandbox_id = %sandbox_id, "sandbox provisioned");

        let result = AssertUnwindSafe(self.build_in(sandbox.as_ref(), source))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(SandboxError::Internal(panic_message(panic))));

        if let Err(e) = sandbox.teardown().await {
            tracing::warn!(sandbox_id = %sandbox_id, error = %e, "sandbox teardown failed");
        } else {
            tracing::debug!(sandbox_id = %sandbox_id, "sandbox released");
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        let (ok, outcome, exit_code): (bool, &str, Option<i32>) = match &result {
            Ok(output) if output.success() => (true, "compiled", Some(output.exit_code)),
            Ok(output) => (true, "compile_failed", Some(output.exit_code)),
            Err(SandboxError::CompileTimeout(_)) => (false, "timeout", None),
            Err(_) => (false, "error", None),
        };
        let audit = serde_json::json!({
            "event": "sandbox_audit",
            "sandbox_id": sandbox_id,
            "ok": ok,
            "outcome": outcome,
            "exit_code": exit_code,
            "duration_ms": duration_ms,
        });
        tracing::info!(audit = %audit.to_string(), "sandbox");

        result.map(|output| CompileOutcome::from_output(output, duration_ms))
    }

    /// 步骤 3–5：工具链、写文件、编译。编译器退出码是数据，不是错误
    async fn build_in(
        &self,
        sandbox: &dyn Sandbox,
        source: &str,
    ) -> Result<ProcessOutput, SandboxError> {
        let settings = &self.settings;
        let layout = &settings.layout;

        let install = CommandSpec::new(&settings.install_script, settings.install_timeout);
        let installed = timeout(install.timeout, sandbox.run(&install))
            .await
            .map_err(|_| {
                SandboxError::ToolchainInstall(format!(
                    "install script timed out after {}s",
                    settings.install_timeout.as_secs()
                ))
            })?
            .map_err(|e| SandboxError::ToolchainInstall(e.to_string()))?;
        if !installed.success() {
            return Err(SandboxError::ToolchainInstall(format!(
                "install script exited with code {}: {}",
                installed.exit_code,
                installed.stderr.trim()
            )));
        }
        tracing::debug!(sandbox_id = %sandbox.id(), "toolchain ready");

        sandbox
            .make_dir(&layout.sources_dir())
            .await
            .map_err(staging)?;
        sandbox
            .write_file(&layout.manifest_path(), &self.manifest)
            .await
            .map_err(staging)?;
        sandbox
            .write_file(&layout.source_path(), source)
            .await
            .map_err(staging)?;

        let compile = CommandSpec::new(&settings.compile_command, settings.compile_timeout)
            .in_dir(&layout.project_dir);
        let output = timeout(compile.timeout, sandbox.run(&compile))
            .await
            .map_err(|_| SandboxError::CompileTimeout(settings.compile_timeout.as_secs()))??;
        tracing::info!(
            sandbox_id = %sandbox.id(),
            exit_code = output.exit_code,
            "compiler finished"
        );
        Ok(output)
    }
}

fn staging(e: SandboxError) -> SandboxError {
    match e {
        SandboxError::Staging(_) => e,
        other => SandboxError::Staging(other.to_string()),
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic during compile: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic during compile: {s}")
    } else {
        "panic during compile".to_string()
    }
}
