//! E2B 风格的远程沙箱服务
//!
//! REST 约定（`X-API-Key` 头携带凭据）：
//! - `POST   {base}/sandboxes`                     `{templateID, timeout}` → `{sandboxID}`
//! - `POST   {base}/sandboxes/{id}/commands`       `{cmd, cwd, timeout}`   → `{exitCode, stdout, stderr}`
//! - `POST   {base}/sandboxes/{id}/files`          `{path, content}`
//! - `POST   {base}/sandboxes/{id}/directories`    `{path}`
//! - `DELETE {base}/sandboxes/{id}`
//!
//! 每个环境由模板创建，服务端默认隔离网络；sandbox_timeout 作为服务端强制回收的兜底。
//! 超时按请求设置：普通调用用 request_timeout，`/commands` 会阻塞到进程结束，
//! 用命令自身的超时再加 request_timeout。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::SandboxSection;
use crate::sandbox::{CommandSpec, ProcessOutput, Sandbox, SandboxError, SandboxProvider};

const API_KEY_HEADER: &str = "X-API-Key";

/// 共享的 HTTP 访问信息
struct RemoteApi {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    request_timeout: Duration,
}

impl RemoteApi {
    fn key(&self) -> &str {
        self.api_key.as_deref().unwrap_or_default()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// 远程提供方
pub struct RemoteSandboxProvider {
    api: Arc<RemoteApi>,
    template: String,
    sandbox_timeout: Duration,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateSandboxRequest<'a> {
    #[serde(rename = "templateID")]
    template_id: &'a str,
    timeout: u64,
}

#[derive(Deserialize)]
struct CreateSandboxResponse {
    #[serde(rename = "sandboxID")]
    sandbox_id: String,
}

#[derive(Serialize)]
struct RunCommandRequest<'a> {
    cmd: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    cwd: Option<&'a str>,
    timeout: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunCommandResponse {
    exit_code: i32,
    #[serde(default)]
    stdout: String,
    #[serde(default)]
    stderr: String,
}

#[derive(Serialize)]
struct WriteFileRequest<'a> {
    path: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct MakeDirRequest<'a> {
    path: &'a str,
}

impl RemoteSandboxProvider {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        template: &str,
        sandbox_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, SandboxError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| SandboxError::Configuration(e.to_string()))?;
        Ok(Self {
            api: Arc::new(RemoteApi {
                http,
                base_url: base_url.trim_end_matches('/').to_string(),
                api_key: api_key.filter(|k| !k.trim().is_empty()),
                request_timeout,
            }),
            template: template.to_string(),
            sandbox_timeout,
        })
    }

    pub fn from_config(cfg: &SandboxSection) -> Result<Self, SandboxError> {
        Self::new(
            &cfg.base_url,
            cfg.resolve_api_key(),
            &cfg.template,
            Duration::from_secs(cfg.sandbox_timeout_secs),
            Duration::from_secs(cfg.request_timeout_secs),
        )
    }
}

#[async_trait]
impl SandboxProvider for RemoteSandboxProvider {
    fn credential_configured(&self) -> bool {
        self.api.api_key.is_some()
    }

    async fn provision(&self) -> Result<Box<dyn Sandbox>, SandboxError> {
        let body = CreateSandboxRequest {
            template_id: &self.template,
            timeout: self.sandbox_timeout.as_secs(),
        };
        let response = self
            .api
            .http
            .post(self.api.url("/sandboxes"))
            .header(API_KEY_HEADER, self.api.key())
            .timeout(self.api.request_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| SandboxError::Provisioning(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SandboxError::Provisioning(format!(
                "HTTP {}: {}",
                status.as_u16(),
                text.trim()
            )));
        }
        let created: CreateSandboxResponse = response
            .json()
            .await
            .map_err(|e| SandboxError::Provisioning(format!("invalid response: {e}")))?;

        Ok(Box::new(RemoteSandbox {
            id: created.sandbox_id,
            api: self.api.clone(),
        }))
    }
}

struct RemoteSandbox {
    id: String,
    api: Arc<RemoteApi>,
}

impl RemoteSandbox {
    fn url(&self, suffix: &str) -> String {
        self.api.url(&format!("/sandboxes/{}{}", self.id, suffix))
    }

    async fn post_json<T: Serialize + Sync>(
        &self,
        suffix: &str,
        body: &T,
        timeout: Duration,
    ) -> Result<reqwest::Response, String> {
        let response = self
            .api
            .http
            .post(self.url(suffix))
            .header(API_KEY_HEADER, self.api.key())
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let text = response.text().await.unwrap_or_default();
            Err(format!("HTTP {}: {}", status.as_u16(), text.trim()))
        }
    }
}

#[async_trait]
impl Sandbox for RemoteSandbox {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(&self, command: &CommandSpec) -> Result<ProcessOutput, SandboxError> {
        let body = RunCommandRequest {
            cmd: &command.command,
            cwd: command.cwd.as_deref(),
            timeout: command.timeout.as_secs(),
        };
        let response = self
            .post_json(
                "/commands",
                &body,
                command.timeout.saturating_add(self.api.request_timeout),
            )
            .await
            .map_err(SandboxError::Process)?;
        let result: RunCommandResponse = response
            .json()
            .await
            .map_err(|e| SandboxError::Process(format!("invalid command result: {e}")))?;
        Ok(ProcessOutput {
            exit_code: result.exit_code,
            stdout: result.stdout,
            stderr: result.stderr,
        })
    }

    async fn write_file(&self, path: &str, contents: &str) -> Result<(), SandboxError> {
        self.post_json(
            "/files",
            &WriteFileRequest {
                path,
                content: contents,
            },
            self.api.request_timeout,
        )
        .await
        .map(|_| ())
        .map_err(|e| SandboxError::Staging(format!("{path}: {e}")))
    }

    async fn make_dir(&self, path: &str) -> Result<(), SandboxError> {
        self.post_json(
            "/directories",
            &MakeDirRequest { path },
            self.api.request_timeout,
        )
            .await
            .map(|_| ())
            .map_err(|e| SandboxError::Staging(format!("{path}: {e}")))
    }

    async fn teardown(&self) -> Result<(), SandboxError> {
        let response = self
            .api
            .http
            .delete(self.url(""))
            .header(API_KEY_HEADER, self.api.key())
            .timeout(self.api.request_timeout)
            .send()
            .await
            .map_err(|e| SandboxError::Teardown(e.to_string()))?;
        let status = response.status();
        // 已被服务端回收的环境视为销毁成功
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(SandboxError::Teardown(format!("HTTP {}", status.as_u16())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// 本机 HTTP 桩：创建沙箱立即返回，`/commands` 延迟 command_delay 后返回 exitCode 0
    async fn serve_stub(command_delay: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let Some(head) = read_request(&mut socket).await else {
                        return;
                    };
                    let body = if head.starts_with("POST /sandboxes/sb1/commands") {
                        tokio::time::sleep(command_delay).await;
                        r#"{"exitCode":0,"stdout":"BUILDING simulation","stderr":""}"#
                    } else if head.starts_with("POST /sandboxes ") {
                        r#"{"sandboxID":"sb1"}"#
                    } else {
                        "{}"
                    };
                    let response = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\n\
                         content-length: {}\r\nconnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                });
            }
        });
        format!("http://{addr}")
    }

    /// 读完请求头与 body，返回请求头文本
    async fn read_request(socket: &mut tokio::net::TcpStream) -> Option<String> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.ok()?;
            if n == 0 {
                return None;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).into_owned();
            if let Some(end) = text.find("\r\n\r\n") {
                let head = &text[..end];
                let body_len = head
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + body_len {
                    return Some(head.to_string());
                }
            }
        }
    }

    #[tokio::test]
    async fn test_command_may_outlive_request_timeout() {
        let base_url = serve_stub(Duration::from_millis(600)).await;
        let provider = RemoteSandboxProvider::new(
            &base_url,
            Some("e2b_test".into()),
            "base",
            Duration::from_secs(600),
            Duration::from_millis(200),
        )
        .unwrap();

        let sandbox = provider.provision().await.unwrap();
        assert_eq!(sandbox.id(), "sb1");
        // 命令耗时超过 request_timeout，但在命令自身的超时之内
        let spec = CommandSpec::new("aptos move compile --dev", Duration::from_secs(10));
        let output = sandbox.run(&spec).await.unwrap();
        assert_eq!(output.exit_code, 0);
        assert_eq!(output.stdout, "BUILDING simulation");
        sandbox.teardown().await.unwrap();
    }

    #[test]
    fn test_credential_configured() {
        let with_key = RemoteSandboxProvider::new(
            "https://api.e2b.dev/",
            Some("e2b_test".into()),
            "base",
            Duration::from_secs(300),
            Duration::from_secs(60),
        )
        .unwrap();
        assert!(with_key.credential_configured());
        assert_eq!(with_key.api.url("/sandboxes"), "https://api.e2b.dev/sandboxes");

        let blank = RemoteSandboxProvider::new(
            "https://api.e2b.dev",
            Some("  ".into()),
            "base",
            Duration::from_secs(300),
            Duration::from_secs(60),
        )
        .unwrap();
        assert!(!blank.credential_configured());
    }

    #[test]
    fn test_create_request_shape() {
        let body = CreateSandboxRequest {
            template_id: "base",
            timeout: 300,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["templateID"], "base");
        assert_eq!(json["timeout"], 300);
    }

    #[test]
    fn test_command_response_parses_camel_case() {
        let parsed: RunCommandResponse =
            serde_json::from_str(r#"{"exitCode": 1, "stderr": "error: x"}"#).unwrap();
        assert_eq!(parsed.exit_code, 1);
        assert_eq!(parsed.stdout, "");
        assert_eq!(parsed.stderr, "error: x");
    }
}
