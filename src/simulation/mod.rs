//! 模拟层：实体、参数校验、状态机、内存注册表与编排器
//!
//! 注册表是 Simulation 的唯一持有者；其它组件只拿快照（clone），修改一律走 `update(id, patch)`。

pub mod error;
pub mod events;
pub mod orchestrator;
pub mod params;
pub mod registry;
pub mod state;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub use error::SimulationError;
pub use events::SimulationEvent;
pub use orchestrator::{
    build_orchestrator, create_orchestrator, OrchestratorSettings, SimulationOrchestrator,
};
pub use params::{
    ArtifactParameters, ArtifactType, PoolParams, TokenParams, ValidationError, VaultParams,
};
pub use registry::SimulationRegistry;
pub use state::SimulationStatus;

/// 模拟 ID（UUID v4 字符串）
pub type SimulationId = String;

/// 一次编译 + 分析周期的结论
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulationResult {
    pub success: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// 费用估算标签（不透明字符串，不是经过验证的 gas 数值）
    pub gas_estimate: Option<String>,
    pub analysis: Option<String>,
    pub execution_time_ms: Option<u64>,
}

impl SimulationResult {
    /// 只含一条错误信息的失败结论
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            errors: vec![message.into()],
            warnings: Vec::new(),
            gas_estimate: None,
            analysis: None,
            execution_time_ms: None,
        }
    }
}

/// 模拟实体
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Simulation {
    pub id: SimulationId,
    pub artifact_type: ArtifactType,
    pub parameters: ArtifactParameters,
    pub generated_source: Option<String>,
    pub status: SimulationStatus,
    pub result: Option<SimulationResult>,
    pub created_at: DateTime<Utc>,
    /// 已完成的编译次数（成功或失败都算）
    pub execution_count: u32,
}

impl Simulation {
    pub(crate) fn new(id: SimulationId, parameters: ArtifactParameters) -> Self {
        Self {
            id,
            artifact_type: parameters.artifact_type(),
            parameters,
            generated_source: None,
            status: SimulationStatus::Pending,
            result: None,
            created_at: Utc::now(),
            execution_count: 0,
        }
    }

    /// 非空的生成代码
    pub fn source(&self) -> Option<&str> {
        self.generated_source
            .as_deref()
            .filter(|s| !s.trim().is_empty())
    }
}

/// 合并式更新：None 表示不改动该字段
///
/// `result` 为 `Some(None)` 时清空结论；执行次数只能 +1，不能直接赋值。
#[derive(Debug, Clone, Default)]
pub struct SimulationPatch {
    pub status: Option<SimulationStatus>,
    pub generated_source: Option<String>,
    pub result: Option<Option<SimulationResult>>,
    pub bump_execution_count: bool,
}

impl SimulationPatch {
    pub fn status(status: SimulationStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.generated_source = Some(source.into());
        self
    }

    pub fn with_result(mut self, result: SimulationResult) -> Self {
        self.result = Some(Some(result));
        self
    }

    pub fn clear_result(mut self) -> Self {
        self.result = Some(None);
        self
    }

    pub fn bump_execution_count(mut self) -> Self {
        self.bump_execution_count = true;
        self
    }

    /// 应用到实体；状态迁移非法时不做任何修改
    pub(crate) fn apply(self, simulation: &mut Simulation) -> Result<(), SimulationError> {
        if let Some(next) = self.status {
            if !simulation.status.can_transition_to(next) {
                return Err(SimulationError::InvalidTransition {
                    from: simulation.status,
                    to: next,
                });
            }
            simulation.status = next;
        }
        if let Some(source) = self.generated_source {
            simulation.generated_source = Some(source);
        }
        if let Some(result) = self.result {
            simulation.result = result;
        }
        if self.bump_execution_count {
            simulation.execution_count = simulation.execution_count.saturating_add(1);
        }
        Ok(())
    }
}
