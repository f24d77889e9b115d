//! Solidity compiler adapter.
//!
//! Runs `solc --standard-json` over one source file and turns the output tree into a
//! typed [`CompilationArtifact`] for a named contract.

mod cmd;
pub mod install;
pub mod standard_json;

use std::{
    path::{Path, PathBuf},
    process::Stdio,
};

use alloy_core::{json_abi::JsonAbi, primitives::Bytes};
use serde_json::Value;
use tokio::io::AsyncWriteExt;

pub use cmd::SolcCmdBuilder;
pub use install::SolcInstaller;
pub use standard_json::{Optimizer, StandardJsonInput, StandardJsonOutput};

use crate::DeployError;

/// Bytecode and interface of one compiled contract.
#[derive(Debug, Clone, PartialEq)]
pub struct CompilationArtifact {
    pub source_name: String,
    pub contract_name: String,
    /// Creation bytecode.
    pub bytecode: Bytes,
    pub abi: JsonAbi,
    /// Compiler metadata JSON, as emitted.
    pub metadata: String,
    pub source_map: Option<String>,
}

/// Result of compiling one source: the raw output tree plus its typed view.
#[derive(Debug, Clone)]
pub struct Compilation {
    pub raw: Value,
    pub output: StandardJsonOutput,
}

impl Compilation {
    /// Extract the artifact for `contract_name` declared in `source_name`.
    pub fn artifact(
        &self,
        source_name: &str,
        contract_name: &str,
    ) -> Result<CompilationArtifact, DeployError> {
        let contract = self
            .output
            .contracts
            .get(source_name)
            .and_then(|contracts| contracts.get(contract_name))
            .ok_or_else(|| DeployError::ContractNotFound {
                source_name: source_name.to_string(),
                contract: contract_name.to_string(),
            })?;

        let object = contract.evm.bytecode.object.trim_start_matches("0x");
        if object.contains("__") {
            return Err(DeployError::Compilation(format!(
                "`{contract_name}` has unlinked library references"
            )));
        }

        let bytecode = hex::decode(object).map_err(|e| {
            DeployError::Compilation(format!("invalid bytecode for `{contract_name}`: {e}"))
        })?;

        Ok(CompilationArtifact {
            source_name: source_name.to_string(),
            contract_name: contract_name.to_string(),
            bytecode: bytecode.into(),
            abi: contract.abi.clone(),
            metadata: contract.metadata.clone(),
            source_map: contract.evm.bytecode.source_map.clone(),
        })
    }

    /// Write the full compiler output tree as pretty JSON.
    pub fn save_output(&self, path: &Path) -> Result<(), DeployError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(&self.raw)
            .map_err(|e| DeployError::Compilation(format!("failed to serialize output: {e}")))?;
        std::fs::write(path, json)?;

        tracing::info!(path = %path.display(), "Compiler output saved");
        Ok(())
    }
}

/// Where the compiler binary comes from.
#[derive(Debug, Clone)]
pub enum SolcBinary {
    /// An explicit binary, used as-is.
    Path(PathBuf),
    /// A cached release, installed on first use.
    Managed(SolcInstaller),
}

/// Compiles Solidity sources with a pinned compiler version.
#[derive(Debug, Clone)]
pub struct SolcCompiler {
    version: String,
    binary: SolcBinary,
    optimizer: Option<Optimizer>,
    extra_args: Vec<String>,
}

impl SolcCompiler {
    pub fn new(version: impl Into<String>, binary: SolcBinary) -> Self {
        Self {
            version: version.into(),
            binary,
            optimizer: None,
            extra_args: Vec::new(),
        }
    }

    pub fn optimizer(mut self, optimizer: Option<Optimizer>) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Extra command line arguments passed to solc.
    pub fn extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Resolve the compiler binary, installing the release if needed.
    pub async fn binary(&self) -> Result<PathBuf, DeployError> {
        match &self.binary {
            SolcBinary::Path(path) => {
                if !path.exists() {
                    return Err(DeployError::VersionUnavailable {
                        version: self.version.clone(),
                        reason: format!("solc binary {} does not exist", path.display()),
                    });
                }
                Ok(path.clone())
            }
            SolcBinary::Managed(installer) => installer.ensure(&self.version).await,
        }
    }

    /// Read `path` and compile it. The source is keyed by its file name.
    pub async fn compile_file(&self, path: &Path) -> Result<(String, Compilation), DeployError> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => DeployError::SourceNotFound(path.to_path_buf()),
            _ => DeployError::Io(e),
        })?;

        let source_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| DeployError::SourceNotFound(path.to_path_buf()))?;

        let mut cmd =
            SolcCmdBuilder::new(self.binary().await?).extra_args(self.extra_args.clone());
        if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            cmd = cmd.base_path(dir).allow_path(dir);
        }

        let compilation = self.run(&cmd, &source_name, &content).await?;
        Ok((source_name, compilation))
    }

    async fn run(
        &self,
        cmd: &SolcCmdBuilder,
        source_name: &str,
        content: &str,
    ) -> Result<Compilation, DeployError> {
        let input = StandardJsonInput::single_source(source_name, content, self.optimizer);
        let input = serde_json::to_vec(&input)
            .map_err(|e| DeployError::Compilation(format!("failed to encode input: {e}")))?;

        tracing::info!(version = %self.version, source = source_name, "Compiling...");

        let mut child = tokio::process::Command::new(cmd.binary())
            .args(cmd.build())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&input).await?;
        }

        let output = child.wait_with_output().await?;

        if !output.status.success() {
            return Err(DeployError::Compilation(format!(
                "solc exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let compilation = parse_output(&output.stdout)?;

        for warning in compilation.output.errors.iter().filter(|m| !m.is_error()) {
            tracing::debug!(kind = %warning.kind, message = %warning.message, "Compiler warning");
        }

        if compilation.output.has_errors() {
            return Err(DeployError::Compilation(compilation.output.error_report()));
        }

        tracing::info!(
            contracts = compilation
                .output
                .contracts
                .values()
                .map(|c| c.len())
                .sum::<usize>(),
            "Compilation finished"
        );

        Ok(compilation)
    }
}

/// Parse solc's standard-JSON stdout, keeping the raw tree.
pub fn parse_output(stdout: &[u8]) -> Result<Compilation, DeployError> {
    let raw: Value = serde_json::from_slice(stdout)
        .map_err(|e| DeployError::Compilation(format!("unreadable compiler output: {e}")))?;
    let output: StandardJsonOutput = serde_json::from_value(raw.clone())
        .map_err(|e| DeployError::Compilation(format!("unexpected compiler output: {e}")))?;

    Ok(Compilation { raw, output })
}
