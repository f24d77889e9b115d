//! Typed subset of the `solc --standard-json` input and output formats.

use std::collections::BTreeMap;

use alloy_core::json_abi::JsonAbi;
use serde::{Deserialize, Serialize};

/// Output fields requested for every contract.
pub const OUTPUT_SELECTION: &[&str] = &["abi", "metadata", "evm.bytecode", "evm.sourceMap"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StandardJsonInput {
    pub language: String,
    pub sources: BTreeMap<String, SourceInput>,
    pub settings: Settings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceInput {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// file → contract → requested outputs.
    pub output_selection: BTreeMap<String, BTreeMap<String, Vec<String>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimizer: Option<Optimizer>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Optimizer {
    pub enabled: bool,
    pub runs: u32,
}

impl StandardJsonInput {
    /// A single-source input selecting [`OUTPUT_SELECTION`] for every contract.
    pub fn single_source(
        source_name: impl Into<String>,
        content: impl Into<String>,
        optimizer: Option<Optimizer>,
    ) -> Self {
        let selection = OUTPUT_SELECTION.iter().map(|s| s.to_string()).collect();
        let output_selection =
            BTreeMap::from([("*".to_string(), BTreeMap::from([("*".to_string(), selection)]))]);

        Self {
            language: "Solidity".to_string(),
            sources: BTreeMap::from([(
                source_name.into(),
                SourceInput {
                    content: content.into(),
                },
            )]),
            settings: Settings {
                output_selection,
                optimizer,
            },
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StandardJsonOutput {
    #[serde(default)]
    pub errors: Vec<CompilerMessage>,
    /// file → contract name → output.
    #[serde(default)]
    pub contracts: BTreeMap<String, BTreeMap<String, ContractOutput>>,
}

impl StandardJsonOutput {
    pub fn has_errors(&self) -> bool {
        self.errors.iter().any(CompilerMessage::is_error)
    }

    /// Formatted messages for every error-severity diagnostic.
    pub fn error_report(&self) -> String {
        self.errors
            .iter()
            .filter(|m| m.is_error())
            .map(CompilerMessage::display)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilerMessage {
    pub severity: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub message: String,
    #[serde(default)]
    pub formatted_message: Option<String>,
}

impl CompilerMessage {
    pub fn is_error(&self) -> bool {
        self.severity == "error"
    }

    fn display(&self) -> &str {
        self.formatted_message.as_deref().unwrap_or(&self.message)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContractOutput {
    #[serde(default)]
    pub abi: JsonAbi,
    #[serde(default)]
    pub metadata: String,
    #[serde(default)]
    pub evm: EvmOutput,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EvmOutput {
    #[serde(default)]
    pub bytecode: BytecodeOutput,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BytecodeOutput {
    /// Hex without `0x`. Contains `__$…$__` placeholders when libraries are unlinked.
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub source_map: Option<String>,
}
