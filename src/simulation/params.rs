//! 制品参数：token / pool / vault 三种封闭记录，创建模拟时校验一次，下游不再重复校验

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 参数校验失败：指出字段与原因
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid {field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// 制品类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactType {
    Token,
    Pool,
    Vault,
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArtifactType::Token => "token",
            ArtifactType::Pool => "pool",
            ArtifactType::Vault => "vault",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenParams {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    /// 十进制数字串，> 0
    pub total_supply: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_uri: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolParams {
    pub name: String,
    pub token_a: String,
    pub token_b: String,
    /// 百分比 0–100
    pub fee: f64,
    pub initial_liquidity_a: String,
    pub initial_liquidity_b: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultParams {
    pub name: String,
    pub token: String,
    pub strategy: String,
    /// 百分比 0–100
    pub fee: f64,
    pub min_deposit: String,
}

/// 三种制品参数的标签联合（JSON 中以 `"type"` 区分）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ArtifactParameters {
    Token(TokenParams),
    Pool(PoolParams),
    Vault(VaultParams),
}

impl ArtifactParameters {
    pub fn artifact_type(&self) -> ArtifactType {
        match self {
            ArtifactParameters::Token(_) => ArtifactType::Token,
            ArtifactParameters::Pool(_) => ArtifactType::Pool,
            ArtifactParameters::Vault(_) => ArtifactType::Vault,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ArtifactParameters::Token(p) => &p.name,
            ArtifactParameters::Pool(p) => &p.name,
            ArtifactParameters::Vault(p) => &p.name,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            ArtifactParameters::Token(p) => p.validate(),
            ArtifactParameters::Pool(p) => p.validate(),
            ArtifactParameters::Vault(p) => p.validate(),
        }
    }
}

impl TokenParams {
    pub fn validate(&self) -> Result<(), ValidationError> {
        non_empty("name", &self.name)?;
        let symbol_len = self.symbol.trim().chars().count();
        if symbol_len == 0 || self.symbol.chars().count() > 10 {
            return Err(ValidationError::new("symbol", "must be 1-10 characters"));
        }
        if self.decimals > 18 {
            return Err(ValidationError::new("decimals", "must be between 0 and 18"));
        }
        positive_amount("total_supply", &self.total_supply)
    }
}

impl PoolParams {
    pub fn validate(&self) -> Result<(), ValidationError> {
        non_empty("name", &self.name)?;
        non_empty("token_a", &self.token_a)?;
        non_empty("token_b", &self.token_b)?;
        if self.token_a.trim() == self.token_b.trim() {
            return Err(ValidationError::new("token_b", "must differ from token_a"));
        }
        fee_percent("fee", self.fee)?;
        positive_amount("initial_liquidity_a", &self.initial_liquidity_a)?;
        positive_amount("initial_liquidity_b", &self.initial_liquidity_b)
    }
}

impl VaultParams {
    pub fn validate(&self) -> Result<(), ValidationError> {
        non_empty("name", &self.name)?;
        non_empty("token", &self.token)?;
        non_empty("strategy", &self.strategy)?;
        fee_percent("fee", self.fee)?;
        positive_amount("min_deposit", &self.min_deposit)
    }
}

fn non_empty(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::new(field, "must not be empty"))
    } else {
        Ok(())
    }
}

fn fee_percent(field: &'static str, fee: f64) -> Result<(), ValidationError> {
    if fee.is_finite() && (0.0..=100.0).contains(&fee) {
        Ok(())
    } else {
        Err(ValidationError::new(field, "must be between 0 and 100"))
    }
}

/// 十进制数字串（至多一个小数点），且数值 > 0
fn positive_amount(field: &'static str, value: &str) -> Result<(), ValidationError> {
    let value = value.trim();
    let mut digits = 0usize;
    let mut nonzero = false;
    let mut dots = 0usize;
    for c in value.chars() {
        match c {
            '0'..='9' => {
                digits += 1;
                nonzero |= c != '0';
            }
            '.' => dots += 1,
            _ => {
                return Err(ValidationError::new(field, "must be a decimal number"));
            }
        }
    }
    if digits == 0 || dots > 1 {
        return Err(ValidationError::new(field, "must be a decimal number"));
    }
    if !nonzero {
        return Err(ValidationError::new(field, "must be greater than zero"));
    }
    Ok(())
}
