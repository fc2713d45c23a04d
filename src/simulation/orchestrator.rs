//! 模拟编排器：对外的唯一入口
//!
//! generate：pending → generating → pending（拿到代码）/ error（失败并向调用方返回错误）。
//! compile_and_analyze：→ compiling → success / error；沙箱与分析的失败都写进 result，不向上抛。
//! 同一个模拟的 generate / compile_and_analyze 通过 per-id 互斥门串行执行，不同模拟互不影响。
//! 每次状态变化向 broadcast 通道发一条 SimulationEvent。

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use tokio::sync::{broadcast, Mutex as AsyncMutex};

use crate::config::{load_config, AppConfig, LlmSection};
use crate::llm::{HttpChatTransport, ResilientClient};
use crate::prompt;
use crate::sandbox::{
    CompileOutcome, CompileSettings, LocalSandboxProvider, RemoteSandboxProvider,
    SandboxManager, SandboxProvider,
};
use crate::simulation::{
    ArtifactParameters, Simulation, SimulationError, SimulationEvent, SimulationId,
    SimulationPatch, SimulationRegistry, SimulationResult, SimulationStatus,
};

const EVENT_CAPACITY: usize = 64;

/// 每个模拟一把异步互斥门，只为注册表中存在的 id 创建
type Gates = HashMap<SimulationId, Arc<AsyncMutex<()>>>;

/// 模型与重试设置
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub generation_model: String,
    pub analysis_model: String,
    pub max_retries: u32,
}

impl OrchestratorSettings {
    pub fn from_config(cfg: &LlmSection) -> Self {
        Self {
            generation_model: cfg.model.clone(),
            analysis_model: cfg.analysis_model().to_string(),
            max_retries: cfg.max_retries,
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&LlmSection::default())
    }
}

pub struct SimulationOrchestrator {
    registry: Arc<SimulationRegistry>,
    llm: Arc<ResilientClient>,
    sandbox: Arc<SandboxManager>,
    settings: OrchestratorSettings,
    gates: Mutex<Gates>,
    events: broadcast::Sender<SimulationEvent>,
}

impl SimulationOrchestrator {
    pub fn new(
        registry: Arc<SimulationRegistry>,
        llm: Arc<ResilientClient>,
        sandbox: Arc<SandboxManager>,
        settings: OrchestratorSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            registry,
            llm,
            sandbox,
            settings,
            gates: Mutex::new(HashMap::new()),
            events,
        }
    }

    pub fn registry(&self) -> &Arc<SimulationRegistry> {
        &self.registry
    }

    /// 订阅状态变化事件；接收端落后时丢弃旧事件，不会阻塞编排
    pub fn subscribe(&self) -> broadcast::Receiver<SimulationEvent> {
        self.events.subscribe()
    }

    pub async fn create_simulation(
        &self,
        parameters: ArtifactParameters,
    ) -> Result<Simulation, SimulationError> {
        let simulation = self.registry.create(parameters).await?;
        tracing::info!(
            simulation_id = %simulation.id,
            artifact = %simulation.artifact_type,
            "simulation created"
        );
        self.emit(&simulation.id, SimulationStatus::Pending, "simulation created");
        Ok(simulation)
    }

    pub async fn get_simulation(&self, id: &str) -> Option<Simulation> {
        self.registry.get(id).await
    }

    pub async fn list_simulations(&self) -> Vec<Simulation> {
        self.registry.list().await
    }

    pub async fn delete_simulation(&self, id: &str) -> bool {
        self.lock_gates().remove(id);
        self.registry.delete(id).await
    }

    pub async fn clear_all(&self) {
        self.lock_gates().clear();
        self.registry.clear().await;
    }

    /// 向模型请求代码；成功后回到 pending 等待编译，失败时状态为 error 并返回同类错误
    pub async fn generate(&self, id: &str) -> Result<Simulation, SimulationError> {
        let gate = self.gate(id).await?;
        let _turn = gate.lock().await;

        let simulation = self.current(id).await?;
        // 缺凭据时不改变状态，也不发起请求
        self.llm.ensure_credential()?;

        self.transition(
            id,
            SimulationPatch::status(SimulationStatus::Generating),
            "generating source",
        )
        .await?;

        let messages = prompt::generation_messages(&simulation.parameters);
        match self
            .llm
            .send(
                &messages,
                &self.settings.generation_model,
                self.settings.max_retries,
            )
            .await
        {
            Ok(raw) => {
                let source = prompt::extract_code_block(&raw);
                tracing::info!(simulation_id = %id, chars = source.len(), "source generated");
                self.transition(
                    id,
                    SimulationPatch::status(SimulationStatus::Pending)
                        .with_source(source)
                        .clear_result(),
                    "source generated",
                )
                .await
            }
            Err(err) => {
                tracing::warn!(simulation_id = %id, error = %err, "generation failed");
                self.transition(
                    id,
                    SimulationPatch::status(SimulationStatus::Error)
                        .with_result(SimulationResult::failure(err.to_string())),
                    &format!("generation failed: {err}"),
                )
                .await?;
                Err(err.into())
            }
        }
    }

    /// 在沙箱中编译并请求分析；除 NotFound / NoSource 外总是返回 Ok，
    /// 结束时状态为 success / error，execution_count 恰好 +1
    pub async fn compile_and_analyze(&self, id: &str) -> Result<Simulation, SimulationError> {
        let gate = self.gate(id).await?;
        let _turn = gate.lock().await;

        let simulation = self.current(id).await?;
        let source = simulation
            .source()
            .ok_or_else(|| SimulationError::NoSource(id.to_string()))?
            .to_string();

        self.transition(
            id,
            SimulationPatch::status(SimulationStatus::Compiling),
            "compiling in sandbox",
        )
        .await?;

        let result = match self.sandbox.compile(&source).await {
            Ok(outcome) => self.verdict(&simulation, &source, outcome).await,
            Err(err) => {
                tracing::warn!(simulation_id = %id, error = %err, "sandbox compile failed");
                SimulationResult::failure(err.to_string())
            }
        };

        let (status, message) = if result.success {
            (SimulationStatus::Success, "compiled successfully".to_string())
        } else {
            let first = result.errors.first().cloned().unwrap_or_default();
            (SimulationStatus::Error, format!("compile failed: {first}"))
        };
        tracing::info!(
            simulation_id = %id,
            status = %status,
            errors = result.errors.len(),
            warnings = result.warnings.len(),
            "compile cycle finished"
        );
        self.transition(
            id,
            SimulationPatch::status(status)
                .with_result(result)
                .bump_execution_count(),
            &message,
        )
        .await
    }

    /// 编译器跑完（无论退出码）后组装结论；分析失败只记日志
    async fn verdict(
        &self,
        simulation: &Simulation,
        source: &str,
        outcome: CompileOutcome,
    ) -> SimulationResult {
        let mut errors = outcome.errors();
        if !outcome.success && errors.is_empty() {
            errors.push(format!(
                "compiler exited with code {} without diagnostics",
                outcome.exit_code
            ));
        }

        let messages = prompt::analysis_messages(simulation.artifact_type, source, &outcome);
        let analysis = match self
            .llm
            .send(
                &messages,
                &self.settings.analysis_model,
                self.settings.max_retries,
            )
            .await
        {
            Ok(text) => Some(text),
            Err(err) => {
                tracing::warn!(simulation_id = %simulation.id, error = %err, "analysis skipped");
                None
            }
        };

        SimulationResult {
            success: outcome.success,
            errors,
            warnings: outcome.warnings(),
            gas_estimate: Some(prompt::estimate_gas_label(simulation.artifact_type)),
            analysis,
            execution_time_ms: Some(outcome.duration_ms),
        }
    }

    async fn transition(
        &self,
        id: &str,
        patch: SimulationPatch,
        message: &str,
    ) -> Result<Simulation, SimulationError> {
        let status = patch.status;
        let simulation = self.registry.update(id, patch).await?;
        if let Some(status) = status {
            tracing::debug!(simulation_id = %id, status = %status, "{}", message);
            self.emit(id, status, message);
        }
        Ok(simulation)
    }

    fn emit(&self, id: &str, status: SimulationStatus, message: &str) {
        // 没有订阅者时 send 返回 Err，忽略即可
        let _ = self.events.send(SimulationEvent::new(id, status, message));
    }

    /// 未知 id 直接返回 NotFound，不留下门
    async fn gate(&self, id: &str) -> Result<Arc<AsyncMutex<()>>, SimulationError> {
        if !self.registry.contains(id).await {
            return Err(SimulationError::NotFound(id.to_string()));
        }
        Ok(self
            .lock_gates()
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone())
    }

    /// 拿到门之后再取快照；等待期间被删除时顺带清掉门
    async fn current(&self, id: &str) -> Result<Simulation, SimulationError> {
        match self.registry.get(id).await {
            Some(simulation) => Ok(simulation),
            None => {
                self.lock_gates().remove(id);
                Err(SimulationError::NotFound(id.to_string()))
            }
        }
    }

    fn lock_gates(&self) -> std::sync::MutexGuard<'_, Gates> {
        self.gates.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// 根据配置选择沙箱后端（remote / local）
fn create_sandbox_provider(cfg: &AppConfig) -> anyhow::Result<Arc<dyn SandboxProvider>> {
    match cfg.sandbox.provider.to_lowercase().as_str() {
        "local" => {
            tracing::warn!("Using local sandbox provider (no network isolation)");
            Ok(Arc::new(LocalSandboxProvider::new()))
        }
        "remote" => {
            let provider = RemoteSandboxProvider::from_config(&cfg.sandbox)
                .context("Failed to create remote sandbox provider")?;
            if !provider.credential_configured() {
                tracing::warn!(
                    "No sandbox API key set; compile attempts will report a configuration error"
                );
            }
            tracing::info!("Using remote sandbox provider ({})", cfg.sandbox.base_url);
            Ok(Arc::new(provider))
        }
        other => anyhow::bail!("Unknown sandbox provider '{other}' (expected remote or local)"),
    }
}

/// 由已加载的配置组装编排器
pub fn build_orchestrator(cfg: &AppConfig) -> anyhow::Result<SimulationOrchestrator> {
    let api_key = cfg.llm.resolve_api_key();
    if api_key.is_none() {
        tracing::warn!("No LLM API key set; generate will fail with a configuration error");
    }
    tracing::info!("Using LLM endpoint {} ({})", cfg.llm.base_url, cfg.llm.model);
    let llm = ResilientClient::new(Arc::new(HttpChatTransport::new(&cfg.llm.base_url)), api_key)
        .with_backoff_base(cfg.llm.backoff_base())
        .with_request_timeout(cfg.llm.request_timeout());

    let sandbox = SandboxManager::new(
        create_sandbox_provider(cfg)?,
        CompileSettings::from_config(&cfg.sandbox),
    )
    .context("Failed to create sandbox manager")?;

    Ok(SimulationOrchestrator::new(
        Arc::new(SimulationRegistry::new()),
        Arc::new(llm),
        Arc::new(sandbox),
        OrchestratorSettings::from_config(&cfg.llm),
    ))
}

/// 加载配置并创建编排器；配置加载失败时使用默认值
pub fn create_orchestrator(config_path: Option<PathBuf>) -> anyhow::Result<SimulationOrchestrator> {
    let cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });
    build_orchestrator(&cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockTransport;
    use crate::sandbox::{MockSandboxProvider, ProcessOutput};
    use crate::simulation::TokenParams;

    fn orchestrator() -> SimulationOrchestrator {
        let llm = ResilientClient::new(
            Arc::new(MockTransport::replying("```move\nmodule simulation::demo {}\n```")),
            Some("sk-test".to_string()),
        );
        let provider = Arc::new(MockSandboxProvider::compiling(ProcessOutput::new(0, "", "")));
        SimulationOrchestrator::new(
            Arc::new(SimulationRegistry::new()),
            Arc::new(llm),
            Arc::new(SandboxManager::new(provider, CompileSettings::default()).unwrap()),
            OrchestratorSettings::default(),
        )
    }

    fn token() -> ArtifactParameters {
        ArtifactParameters::Token(TokenParams {
            name: "Demo".into(),
            symbol: "DMO".into(),
            decimals: 8,
            total_supply: "1000000".into(),
            icon_uri: None,
            project_uri: None,
        })
    }

    fn gate_count(orch: &SimulationOrchestrator) -> usize {
        orch.lock_gates().len()
    }

    #[tokio::test]
    async fn test_unknown_ids_leave_no_gates() {
        let orch = orchestrator();
        for i in 0..100 {
            let err = orch.generate(&format!("missing-{i}")).await.unwrap_err();
            assert!(matches!(err, SimulationError::NotFound(_)));
            let err = orch
                .compile_and_analyze(&format!("gone-{i}"))
                .await
                .unwrap_err();
            assert!(matches!(err, SimulationError::NotFound(_)));
        }
        assert_eq!(gate_count(&orch), 0);
    }

    #[tokio::test]
    async fn test_deleted_simulation_releases_gate() {
        let orch = orchestrator();
        let sim = orch.create_simulation(token()).await.unwrap();
        orch.generate(&sim.id).await.unwrap();
        assert_eq!(gate_count(&orch), 1);

        assert!(orch.delete_simulation(&sim.id).await);
        assert_eq!(gate_count(&orch), 0);
        assert!(orch.generate(&sim.id).await.is_err());
        assert!(orch.compile_and_analyze(&sim.id).await.is_err());
        assert_eq!(gate_count(&orch), 0);
    }

    #[tokio::test]
    async fn test_lookup_after_concurrent_delete_drops_gate() {
        let orch = orchestrator();
        let sim = orch.create_simulation(token()).await.unwrap();
        let gate = orch.gate(&sim.id).await.unwrap();
        assert_eq!(gate_count(&orch), 1);

        // 拿到门之后、取快照之前被删除
        orch.registry().delete(&sim.id).await;
        drop(gate);
        let err = orch.current(&sim.id).await.unwrap_err();
        assert!(matches!(err, SimulationError::NotFound(_)));
        assert_eq!(gate_count(&orch), 0);
    }
}
