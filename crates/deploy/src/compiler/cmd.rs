//! Command builder for solc.

use std::path::{Path, PathBuf};

/// Builder for `solc` invocations in standard-JSON mode.
#[derive(Debug, Clone)]
pub struct SolcCmdBuilder {
    binary: PathBuf,
    base_path: Option<String>,
    allow_paths: Vec<String>,
    extra_args: Vec<String>,
}

impl SolcCmdBuilder {
    /// Create a new builder for the compiler at `binary`.
    pub fn new(binary: impl AsRef<Path>) -> Self {
        Self {
            binary: binary.as_ref().to_path_buf(),
            base_path: None,
            allow_paths: Vec::new(),
            extra_args: Vec::new(),
        }
    }

    /// Set the root used to resolve imports.
    pub fn base_path(mut self, path: impl AsRef<Path>) -> Self {
        self.base_path = Some(path.as_ref().display().to_string());
        self
    }

    /// Allow imports from an extra directory.
    pub fn allow_path(mut self, path: impl AsRef<Path>) -> Self {
        self.allow_paths.push(path.as_ref().display().to_string());
        self
    }

    /// Set extra arguments to pass to solc.
    pub fn extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    /// The compiler binary the command runs.
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Build the argument list. The standard-JSON input is expected on stdin.
    pub fn build(&self) -> Vec<String> {
        let mut cmd = vec!["--standard-json".to_string()];

        if let Some(ref base_path) = self.base_path {
            cmd.push("--base-path".to_string());
            cmd.push(base_path.clone());
        }

        if !self.allow_paths.is_empty() {
            cmd.push("--allow-paths".to_string());
            cmd.push(self.allow_paths.join(","));
        }

        cmd.extend(self.extra_args.iter().cloned());

        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_command() {
        let cmd = SolcCmdBuilder::new("/usr/bin/solc").build();
        assert_eq!(cmd, vec!["--standard-json"]);
    }

    #[test]
    fn test_full_command() {
        let cmd = SolcCmdBuilder::new("solc")
            .base_path("contracts")
            .allow_path("lib")
            .allow_path("node_modules")
            .extra_args(vec!["--pretty-json".to_string()])
            .build();

        assert_eq!(
            cmd,
            vec![
                "--standard-json",
                "--base-path",
                "contracts",
                "--allow-paths",
                "lib,node_modules",
                "--pretty-json",
            ]
        );
    }
}
