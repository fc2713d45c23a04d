//! 模拟层错误
//!
//! generate 的失败原样透出（Llm）；compile_and_analyze 只会因 NotFound / NoSource 失败，
//! 编译与分析中的问题都折叠进 SimulationResult。

use thiserror::Error;

use crate::llm::LlmError;
use crate::simulation::{SimulationId, SimulationStatus, ValidationError};

#[derive(Error, Debug, Clone)]
pub enum SimulationError {
    #[error("Simulation not found: {0}")]
    NotFound(SimulationId),

    #[error("Simulation {0} has no generated source; run generate first")]
    NoSource(SimulationId),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("Illegal status transition {from} -> {to}")]
    InvalidTransition {
        from: SimulationStatus,
        to: SimulationStatus,
    },
}
