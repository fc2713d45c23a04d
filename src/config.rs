//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SIMFORGE__*` 覆盖（双下划线表示嵌套，如 `SIMFORGE__LLM__MODEL=...`）。
//! 凭据可不写进配置文件：`llm.api_key` 缺省时读 `OPENROUTER_API_KEY` / `OPENAI_API_KEY`，
//! `sandbox.api_key` 缺省时读 `E2B_API_KEY`。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmSection,
    pub sandbox: SandboxSection,
}

/// [llm] 段：模型端点、模型名、重试与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// OpenAI 兼容端点（不含 /chat/completions）
    pub base_url: String,
    /// 代码生成模型；带 `:free` 后缀的为免费档，限流后自动降级为标准档
    pub model: String,
    /// 分析模型，未设置时与 model 相同
    pub analysis_model: Option<String>,
    pub api_key: Option<String>,
    pub max_retries: u32,
    /// 指数退避的基本单位（毫秒），第 n 次重试等待 base * 2^n
    pub backoff_base_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            model: "deepseek/deepseek-chat-v3-0324:free".to_string(),
            analysis_model: None,
            api_key: None,
            max_retries: 3,
            backoff_base_ms: 1000,
            request_timeout_secs: 120,
        }
    }
}

impl LlmSection {
    /// 配置中的 key 优先，其次 OPENROUTER_API_KEY、OPENAI_API_KEY；空串视为未配置
    pub fn resolve_api_key(&self) -> Option<String> {
        self.resolve_api_key_with(env_var)
    }

    fn resolve_api_key_with(&self, env: impl Fn(&str) -> Option<String>) -> Option<String> {
        non_blank(self.api_key.clone())
            .or_else(|| non_blank(env("OPENROUTER_API_KEY")))
            .or_else(|| non_blank(env("OPENAI_API_KEY")))
    }

    pub fn analysis_model(&self) -> &str {
        self.analysis_model.as_deref().unwrap_or(&self.model)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// [sandbox] 段：沙箱后端、模板、各阶段超时、工具链脚本与 Move 项目布局
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SandboxSection {
    /// remote / local
    pub provider: String,
    pub base_url: String,
    pub template: String,
    pub api_key: Option<String>,
    /// 沙箱存活上限（秒），由服务端强制回收；应大于安装与编译超时之和
    pub sandbox_timeout_secs: u64,
    /// 单次 REST 调用超时（秒）
    pub request_timeout_secs: u64,
    pub install_timeout_secs: u64,
    pub compile_timeout_secs: u64,
    pub project_dir: String,
    pub install_script: String,
    pub compile_command: String,
    pub package_name: String,
    pub named_address: String,
    pub dev_address: String,
    pub framework_rev: String,
    pub source_file: String,
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            provider: "remote".to_string(),
            base_url: "https://api.e2b.dev".to_string(),
            template: "base".to_string(),
            api_key: None,
            sandbox_timeout_secs: 600,
            request_timeout_secs: 60,
            install_timeout_secs: 240,
            compile_timeout_secs: 180,
            project_dir: "/home/user/project".to_string(),
            install_script: default_install_script(),
            compile_command: default_compile_command(),
            package_name: "simulation".to_string(),
            named_address: "simulation".to_string(),
            dev_address: "0xcafe".to_string(),
            framework_rev: "mainnet".to_string(),
            source_file: "simulation.move".to_string(),
        }
    }
}

fn default_install_script() -> String {
    "command -v aptos >/dev/null 2>&1 || \
     (curl -fsSL https://aptos.dev/scripts/install_cli.sh | sh)"
        .to_string()
}

fn default_compile_command() -> String {
    "export PATH=\"$HOME/.local/bin:$PATH\" && \
     aptos move compile --dev --skip-fetch-latest-git-deps"
        .to_string()
}

impl SandboxSection {
    pub fn resolve_api_key(&self) -> Option<String> {
        self.resolve_api_key_with(env_var)
    }

    fn resolve_api_key_with(&self, env: impl Fn(&str) -> Option<String>) -> Option<String> {
        non_blank(self.api_key.clone()).or_else(|| non_blank(env("E2B_API_KEY")))
    }
}

/// 空串与纯空白视为未配置
fn non_blank(key: Option<String>) -> Option<String> {
    key.filter(|k| !k.trim().is_empty())
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// 从 config 目录加载配置，环境变量 SIMFORGE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 SIMFORGE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SIMFORGE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 重新从磁盘与环境变量加载配置（调用方决定是否用新配置重建编排器）
pub fn reload_config() -> Result<AppConfig, config::ConfigError> {
    load_config(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.llm.max_retries, 3);
        assert!(cfg.llm.model.ends_with(":free"));
        assert_eq!(cfg.llm.analysis_model(), cfg.llm.model);
        assert_eq!(cfg.sandbox.provider, "remote");
        assert_eq!(cfg.sandbox.compile_timeout_secs, 180);
    }

    #[test]
    fn test_default_sandbox_outlives_install_and_compile() {
        let sandbox = SandboxSection::default();
        assert!(
            sandbox.sandbox_timeout_secs
                > sandbox.install_timeout_secs + sandbox.compile_timeout_secs
        );
    }

    #[test]
    fn test_load_explicit_file_overrides() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[llm]\nmodel = \"qwen/qwen3-coder\"\nmax_retries = 1\n\n[sandbox]\nprovider = \"local\""
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.llm.model, "qwen/qwen3-coder");
        assert_eq!(cfg.llm.max_retries, 1);
        assert_eq!(cfg.sandbox.provider, "local");
        // 未写的字段保持默认
        assert_eq!(cfg.sandbox.package_name, "simulation");
    }

    #[test]
    fn test_blank_key_is_unconfigured() {
        let section = SandboxSection {
            api_key: Some("   ".to_string()),
            ..SandboxSection::default()
        };
        assert!(section.resolve_api_key_with(|_| None).is_none());
        assert!(section.resolve_api_key_with(|_| Some(String::new())).is_none());
    }

    #[test]
    fn test_blank_key_falls_back_to_env() {
        let sandbox = SandboxSection {
            api_key: Some("  ".to_string()),
            ..SandboxSection::default()
        };
        let key = sandbox.resolve_api_key_with(|name| {
            (name == "E2B_API_KEY").then(|| "e2b_from_env".to_string())
        });
        assert_eq!(key.as_deref(), Some("e2b_from_env"));

        let llm = LlmSection {
            api_key: Some(String::new()),
            ..LlmSection::default()
        };
        let key = llm.resolve_api_key_with(|name| match name {
            "OPENROUTER_API_KEY" => Some(" ".to_string()),
            "OPENAI_API_KEY" => Some("sk-from-env".to_string()),
            _ => None,
        });
        assert_eq!(key.as_deref(), Some("sk-from-env"));
    }

    #[test]
    fn test_configured_key_wins_over_env() {
        let llm = LlmSection {
            api_key: Some("sk-config".to_string()),
            ..LlmSection::default()
        };
        let key = llm.resolve_api_key_with(|_| Some("sk-env".to_string()));
        assert_eq!(key.as_deref(), Some("sk-config"));
    }
}
