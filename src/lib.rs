//! Simforge - 链上制品模拟核心
//!
//! 用户描述一个 token / pool / vault，远程模型生成 Move 代码，代码在一次性、网络隔离的沙箱中编译验证。
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **llm**: 模型服务传输抽象、OpenAI 兼容 HTTP 实现、重试 / 退避 / 降级客户端
//! - **sandbox**: 沙箱提供方抽象（远程 / 本地 / Mock）、生命周期管理、编译输出分类
//! - **simulation**: 模拟实体、参数校验、状态机、内存注册表、编排器
//! - **prompt**: 生成与分析提示词
//! - **observability**: tracing 初始化

pub mod config;
pub mod llm;
pub mod observability;
pub mod prompt;
pub mod sandbox;
pub mod simulation;

pub use simulation::{
    create_orchestrator, ArtifactParameters, ArtifactType, Simulation, SimulationError,
    SimulationOrchestrator, SimulationResult, SimulationStatus,
};
