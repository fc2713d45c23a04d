//! 内存模拟注册表
//!
//! 单把 RwLock 保护整个 map；get / list 返回快照，update 是唯一的修改路径。进程结束即丢弃。

use std::collections::HashMap;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::simulation::{
    ArtifactParameters, Simulation, SimulationError, SimulationId, SimulationPatch,
    ValidationError,
};

#[derive(Debug, Default)]
pub struct SimulationRegistry {
    simulations: RwLock<HashMap<SimulationId, Simulation>>,
}

impl SimulationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 校验参数并创建（status = pending）；校验失败时注册表不变
    pub async fn create(
        &self,
        parameters: ArtifactParameters,
    ) -> Result<Simulation, ValidationError> {
        parameters.validate()?;

        let mut simulations = self.simulations.write().await;
        let mut id = Uuid::new_v4().to_string();
        while simulations.contains_key(&id) {
            id = Uuid::new_v4().to_string();
        }
        let simulation = Simulation::new(id.clone(), parameters);
        simulations.insert(id, simulation.clone());
        Ok(simulation)
    }

    pub async fn get(&self, id: &str) -> Option<Simulation> {
        self.simulations.read().await.get(id).cloned()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.simulations.read().await.contains_key(id)
    }

    /// 合并 patch 并返回更新后的快照
    pub async fn update(
        &self,
        id: &str,
        patch: SimulationPatch,
    ) -> Result<Simulation, SimulationError> {
        let mut simulations = self.simulations.write().await;
        let simulation = simulations
            .get_mut(id)
            .ok_or_else(|| SimulationError::NotFound(id.to_string()))?;
        patch.apply(simulation)?;
        Ok(simulation.clone())
    }

    /// 快照，按创建时间排序
    pub async fn list(&self) -> Vec<Simulation> {
        let mut all: Vec<Simulation> = self.simulations.read().await.values().cloned().collect();
        all.sort_by_key(|s| s.created_at);
        all
    }

    pub async fn delete(&self, id: &str) -> bool {
        self.simulations.write().await.remove(id).is_some()
    }

    pub async fn clear(&self) {
        self.simulations.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.simulations.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.simulations.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::{SimulationResult, SimulationStatus, TokenParams, VaultParams};
    use std::collections::HashSet;

    fn token(symbol: &str) -> ArtifactParameters {
        ArtifactParameters::Token(TokenParams {
            name: "Demo".into(),
            symbol: symbol.into(),
            decimals: 8,
            total_supply: "1000000".into(),
            icon_uri: None,
            project_uri: None,
        })
    }

    #[tokio::test]
    async fn test_create_initial_state() {
        let registry = SimulationRegistry::new();
        let sim = registry.create(token("DMO")).await.unwrap();
        assert_eq!(sim.status, SimulationStatus::Pending);
        assert!(sim.generated_source.is_none());
        assert!(sim.result.is_none());
        assert_eq!(sim.execution_count, 0);
        assert!(registry.contains(&sim.id).await);
        assert_eq!(registry.get(&sim.id).await, Some(sim));
        assert!(!registry.contains("nope").await);
    }

    #[tokio::test]
    async fn test_ids_are_unique() {
        let registry = SimulationRegistry::new();
        let mut ids = HashSet::new();
        for _ in 0..50 {
            let sim = registry.create(token("DMO")).await.unwrap();
            assert!(ids.insert(sim.id));
        }
        assert_eq!(registry.len().await, 50);
    }

    #[tokio::test]
    async fn test_invalid_parameters_leave_registry_unchanged() {
        let registry = SimulationRegistry::new();
        let err = registry.create(token("ELEVENCHARS")).await.unwrap_err();
        assert_eq!(err.field, "symbol");

        let vault = ArtifactParameters::Vault(VaultParams {
            name: "V".into(),
            token: "APT".into(),
            strategy: "lend".into(),
            fee: 1.0,
            min_deposit: "0".into(),
        });
        assert!(registry.create(vault).await.is_err());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_get_is_idempotent() {
        let registry = SimulationRegistry::new();
        let sim = registry.create(token("DMO")).await.unwrap();
        let first = registry.get(&sim.id).await;
        let second = registry.get(&sim.id).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_update_merges_fields() {
        let registry = SimulationRegistry::new();
        let sim = registry.create(token("DMO")).await.unwrap();

        registry
            .update(&sim.id, SimulationPatch::status(SimulationStatus::Compiling))
            .await
            .unwrap();
        let updated = registry
            .update(
                &sim.id,
                SimulationPatch::status(SimulationStatus::Error)
                    .with_result(SimulationResult::failure("boom"))
                    .bump_execution_count(),
            )
            .await
            .unwrap();
        assert_eq!(updated.status, SimulationStatus::Error);
        assert_eq!(updated.execution_count, 1);
        assert_eq!(updated.result.unwrap().errors, vec!["boom"]);
        // 未提供的字段不变
        assert_eq!(updated.parameters, sim.parameters);
        assert_eq!(updated.created_at, sim.created_at);
    }

    #[tokio::test]
    async fn test_update_missing_id() {
        let registry = SimulationRegistry::new();
        let err = registry
            .update("nope", SimulationPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SimulationError::NotFound(ref id) if id == "nope"));
    }

    #[tokio::test]
    async fn test_update_rejects_illegal_transition() {
        let registry = SimulationRegistry::new();
        let sim = registry.create(token("DMO")).await.unwrap();
        let err = registry
            .update(&sim.id, SimulationPatch::status(SimulationStatus::Success))
            .await
            .unwrap_err();
        assert!(matches!(err, SimulationError::InvalidTransition { .. }));
        assert_eq!(
            registry.get(&sim.id).await.unwrap().status,
            SimulationStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let registry = SimulationRegistry::new();
        let a = registry.create(token("AAA")).await.unwrap();
        registry.create(token("BBB")).await.unwrap();

        assert!(registry.delete(&a.id).await);
        assert!(!registry.delete(&a.id).await);
        assert_eq!(registry.list().await.len(), 1);

        registry.clear().await;
        assert!(registry.list().await.is_empty());
    }
}
