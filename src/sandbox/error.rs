//! 沙箱错误类型
//!
//! 编译器非零退出不是错误（那是 CompileOutcome 里的数据）；这里只有「环境本身」出的问题。

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum SandboxError {
    /// 未配置沙箱服务凭据，不会创建任何环境
    #[error("Sandbox credential missing: {0}")]
    Configuration(String),

    #[error("Sandbox provisioning failed: {0}")]
    Provisioning(String),

    #[error("Toolchain install failed: {0}")]
    ToolchainInstall(String),

    #[error("Compiler timed out after {0}s")]
    CompileTimeout(u64),

    /// 写入 Move.toml / 源文件或创建目录失败
    #[error("Staging project files failed: {0}")]
    Staging(String),

    /// 远程进程无法启动或结果无法读取
    #[error("Sandbox process error: {0}")]
    Process(String),

    /// 沙箱内部 panic 等意外
    #[error("Sandbox internal failure: {0}")]
    Internal(String),

    #[error("Sandbox teardown failed: {0}")]
    Teardown(String),
}
