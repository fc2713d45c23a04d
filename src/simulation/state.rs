//! 模拟状态机
//!
//! `Pending → Generating → (Pending | Error)`；`Pending | Success | Error → Compiling → (Success | Error)`；
//! `Success | Error → Generating`（重新生成）。Generating / Compiling 期间不能开始新的周期。

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimulationStatus {
    Pending,
    Generating,
    Compiling,
    Success,
    Error,
}

impl SimulationStatus {
    /// 是否处于进行中的周期
    pub fn is_busy(self) -> bool {
        matches!(self, SimulationStatus::Generating | SimulationStatus::Compiling)
    }

    /// 状态不变视为合法（合并更新时可能重复写同一状态）
    pub fn can_transition_to(self, next: SimulationStatus) -> bool {
        use SimulationStatus::*;
        if self == next {
            return true;
        }
        match (self, next) {
            (Pending | Success | Error, Generating) => true,
            (Generating, Pending | Error) => true,
            (Pending | Success | Error, Compiling) => true,
            (Compiling, Success | Error) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SimulationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SimulationStatus::Pending => "pending",
            SimulationStatus::Generating => "generating",
            SimulationStatus::Compiling => "compiling",
            SimulationStatus::Success => "success",
            SimulationStatus::Error => "error",
        };
        f.write_str(name)
    }
}
