//! 模拟过程事件：每次状态变化广播一条，供 UI / 日志等外部观察者订阅

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::simulation::{SimulationId, SimulationStatus};

/// 单次状态变化（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, Serialize)]
pub struct SimulationEvent {
    pub simulation_id: SimulationId,
    pub status: SimulationStatus,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl SimulationEvent {
    pub fn new(
        simulation_id: impl Into<SimulationId>,
        status: SimulationStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            simulation_id: simulation_id.into(),
            status,
            message: message.into(),
            at: Utc::now(),
        }
    }
}
