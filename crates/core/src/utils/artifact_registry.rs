use crate::error::DeployError;
use alloy::json_abi::JsonAbi;
use alloy::primitives::Bytes;
use log::debug;
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A compiled, deployable contract factory.
#[derive(Debug, Clone)]
pub struct FactoryArtifact {
    pub contract_name: String,
    pub source_name: String,
    pub abi: JsonAbi,
    pub bytecode: Bytes,
    /// Compiler input/output the artifact was produced from, if known.
    pub build_info: Option<PathBuf>,
}

impl FactoryArtifact {
    pub fn fully_qualified_name(&self) -> String {
        format!("{}:{}", self.source_name, self.contract_name)
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait ArtifactRegistry: Send + Sync {
    fn resolve(&self, name: &str) -> Result<FactoryArtifact, DeployError>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HardhatArtifact {
    contract_name: String,
    source_name: String,
    abi: JsonAbi,
    bytecode: String,
    #[serde(default)]
    link_references: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HardhatDebugFile {
    build_info: String,
}

/// Artifacts as laid out by Hardhat:
/// `<root>/<source path>/<Name>.json` next to `<Name>.dbg.json`, with the
/// compiler runs under `<root>/build-info`.
pub struct HardhatArtifacts {
    root: PathBuf,
}

impl HardhatArtifacts {
    const BUILD_INFO_DIR: &'static str = "build-info";

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn find_candidates(&self, name: &str) -> Vec<PathBuf> {
        let file_name = format!("{}.json", name);
        WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|e| e.file_name() != Self::BUILD_INFO_DIR)
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && e.file_name().to_string_lossy() == file_name)
            .map(|e| e.into_path())
            .collect()
    }

    fn load(&self, name: &str, path: &Path) -> Result<FactoryArtifact, DeployError> {
        let invalid = |reason: String| DeployError::InvalidArtifact {
            name: name.to_string(),
            reason,
        };

        let content = fs::read_to_string(path)
            .map_err(|e| invalid(format!("cannot read {}: {}", path.display(), e)))?;
        let artifact: HardhatArtifact = serde_json::from_str(&content)
            .map_err(|e| invalid(format!("malformed artifact {}: {}", path.display(), e)))?;

        if link_references_present(&artifact.link_references) || artifact.bytecode.contains("__$") {
            return Err(invalid("creation code has unlinked library references".to_string()));
        }
        let bytecode: Bytes = artifact
            .bytecode
            .parse()
            .map_err(|e| invalid(format!("creation code is not valid hex: {}", e)))?;
        if bytecode.is_empty() {
            return Err(invalid(
                "creation code is empty (abstract contract or interface)".to_string(),
            ));
        }

        let build_info = path
            .file_stem()
            .map(|stem| path.with_file_name(format!("{}.dbg.json", stem.to_string_lossy())))
            .and_then(|dbg| read_build_info_path(&dbg));

        Ok(FactoryArtifact {
            contract_name: artifact.contract_name,
            source_name: artifact.source_name,
            abi: artifact.abi,
            bytecode,
            build_info,
        })
    }
}

impl ArtifactRegistry for HardhatArtifacts {
    fn resolve(&self, name: &str) -> Result<FactoryArtifact, DeployError> {
        let not_found = || DeployError::ArtifactNotFound {
            name: name.to_string(),
            searched: self.root.clone(),
        };
        if name.trim().is_empty() || !self.root.is_dir() {
            return Err(not_found());
        }

        for candidate in self.find_candidates(name) {
            debug!("Inspecting artifact candidate {}", candidate.display());
            match self.load(name, &candidate) {
                Ok(artifact) if artifact.contract_name == name => return Ok(artifact),
                Ok(_) => continue,
                // Same-named json that is not an artifact at all
                Err(DeployError::InvalidArtifact { reason, .. }) if reason.starts_with("malformed") => {
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        Err(not_found())
    }
}

fn link_references_present(link_references: &Value) -> bool {
    link_references.as_object().is_some_and(|refs| !refs.is_empty())
}

fn read_build_info_path(dbg_path: &Path) -> Option<PathBuf> {
    let content = fs::read_to_string(dbg_path).ok()?;
    let dbg: HardhatDebugFile = serde_json::from_str(&content).ok()?;
    let build_info = dbg_path.parent()?.join(dbg.build_info);
    build_info.is_file().then_some(build_info)
}
