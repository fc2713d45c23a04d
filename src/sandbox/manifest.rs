//! Move 项目布局与 Move.toml 渲染
//!
//! 沙箱内固定布局：`{project_dir}/Move.toml` + `{project_dir}/sources/{source_file}`。

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::SandboxSection;
use crate::sandbox::SandboxError;

const APTOS_CORE_GIT: &str = "https://github.com/aptos-labs/aptos-core.git";
const APTOS_FRAMEWORK_SUBDIR: &str = "aptos-move/framework/aptos-framework";

/// 沙箱中 Move 项目的位置与包信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    pub project_dir: String,
    pub package_name: String,
    pub named_address: String,
    pub dev_address: String,
    pub framework_rev: String,
    pub source_file: String,
}

impl Default for ProjectLayout {
    fn default() -> Self {
        Self::from_config(&SandboxSection::default())
    }
}

#[derive(Serialize)]
struct Manifest<'a> {
    package: PackageSection<'a>,
    addresses: BTreeMap<&'a str, &'a str>,
    #[serde(rename = "dev-addresses")]
    dev_addresses: BTreeMap<&'a str, &'a str>,
    dependencies: BTreeMap<&'a str, GitDependency<'a>>,
}

#[derive(Serialize)]
struct PackageSection<'a> {
    name: &'a str,
    version: &'a str,
}

#[derive(Serialize)]
struct GitDependency<'a> {
    git: &'a str,
    rev: &'a str,
    subdir: &'a str,
}

impl ProjectLayout {
    pub fn from_config(cfg: &SandboxSection) -> Self {
        Self {
            project_dir: cfg.project_dir.trim_end_matches('/').to_string(),
            package_name: cfg.package_name.clone(),
            named_address: cfg.named_address.clone(),
            dev_address: cfg.dev_address.clone(),
            framework_rev: cfg.framework_rev.clone(),
            source_file: cfg.source_file.clone(),
        }
    }

    pub fn manifest_path(&self) -> String {
        format!("{}/Move.toml", self.project_dir)
    }

    pub fn sources_dir(&self) -> String {
        format!("{}/sources", self.project_dir)
    }

    pub fn source_path(&self) -> String {
        format!("{}/{}", self.sources_dir(), self.source_file)
    }

    /// 渲染 Move.toml：命名地址在正式构建中留空（`_`），`--dev` 构建使用 dev_address
    pub fn render_manifest(&self) -> Result<String, SandboxError> {
        let manifest = Manifest {
            package: PackageSection {
                name: &self.package_name,
                version: "1.0.0",
            },
            addresses: BTreeMap::from([(self.named_address.as_str(), "_")]),
            dev_addresses: BTreeMap::from([(
                self.named_address.as_str(),
                self.dev_address.as_str(),
            )]),
            dependencies: BTreeMap::from([(
                "AptosFramework",
                GitDependency {
                    git: APTOS_CORE_GIT,
                    rev: &self.framework_rev,
                    subdir: APTOS_FRAMEWORK_SUBDIR,
                },
            )]),
        };
        toml::to_string(&manifest)
            .map_err(|e| SandboxError::Configuration(format!("cannot render Move.toml: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let layout = ProjectLayout::default();
        assert_eq!(layout.manifest_path(), "/home/user/project/Move.toml");
        assert_eq!(
            layout.source_path(),
            "/home/user/project/sources/simulation.move"
        );
    }

    #[test]
    fn test_render_manifest_round_trips_as_toml() {
        let rendered = ProjectLayout::default().render_manifest().unwrap();
        let parsed: toml::Value = toml::from_str(&rendered).unwrap();

        assert_eq!(parsed["package"]["name"].as_str(), Some("simulation"));
        assert_eq!(parsed["addresses"]["simulation"].as_str(), Some("_"));
        assert_eq!(parsed["dev-addresses"]["simulation"].as_str(), Some("0xcafe"));
        let framework = &parsed["dependencies"]["AptosFramework"];
        assert_eq!(framework["rev"].as_str(), Some("mainnet"));
        assert_eq!(
            framework["subdir"].as_str(),
            Some("aptos-move/framework/aptos-framework")
        );
    }
}
