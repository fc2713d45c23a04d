//! 沙箱层：一次性执行环境的提供方抽象、生命周期管理与编译输出分类
//!
//! - **provider**: SandboxProvider / Sandbox 原语（provision / run / write_file / make_dir / teardown）
//! - **manager**: 每次编译一个新环境，保证销毁
//! - **remote**: E2B 风格 REST 服务；**local**: 临时目录（开发用）；**mock**: 测试用

pub mod classify;
pub mod error;
pub mod local;
pub mod manager;
pub mod manifest;
pub mod mock;
pub mod provider;
pub mod remote;

pub use classify::{error_lines, warning_lines};
pub use error::SandboxError;
pub use local::LocalSandboxProvider;
pub use manager::{CompileOutcome, CompileSettings, SandboxManager};
pub use manifest::ProjectLayout;
pub use mock::{MockSandboxProvider, MockStep};
pub use provider::{CommandSpec, ProcessOutput, Sandbox, SandboxProvider};
pub use remote::RemoteSandboxProvider;
