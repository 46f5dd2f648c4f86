//! Driver configuration
//!
//! [`CompilerConfig`] carries the knobs the build driver honors: which
//! artifact to stop at, whether to keep intermediates, and what to hand
//! the downstream toolchain. An optional `minicc.toml` project file can
//! supply defaults (linker libraries, search paths, a toolchain
//! override); explicit CLI flags always win.

use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct CompilerConfig {
    /// Keep the intermediate `.s` after assembling
    pub keep_asm: bool,
    /// Write the three-address IR listing next to the output
    pub emit_ir: bool,
    /// Stop after code generation; the output is the `.s` itself
    pub asm_only: bool,
    /// Stop after assembling; the output is an object file
    pub object_only: bool,
    /// Extra `-l` libraries for the link step
    pub libraries: Vec<String>,
    /// Extra `-L` search paths for the link step
    pub library_paths: Vec<PathBuf>,
    /// Downstream assembler/linker command; `gcc` when unset
    pub toolchain: Option<String>,
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig::default()
    }

    pub fn with_keep_asm(mut self, keep: bool) -> Self {
        self.keep_asm = keep;
        self
    }

    pub fn with_emit_ir(mut self, emit: bool) -> Self {
        self.emit_ir = emit;
        self
    }

    pub fn with_asm_only(mut self, asm_only: bool) -> Self {
        self.asm_only = asm_only;
        self
    }

    pub fn with_object_only(mut self, object_only: bool) -> Self {
        self.object_only = object_only;
        self
    }

    pub fn with_libraries(mut self, libs: impl IntoIterator<Item = String>) -> Self {
        self.libraries.extend(libs);
        self
    }

    pub fn with_library_paths(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.library_paths.extend(paths);
        self
    }

    pub fn toolchain_command(&self) -> &str {
        self.toolchain.as_deref().unwrap_or("gcc")
    }

    /// Fold project-file defaults in under the explicit settings
    pub fn merge_project(&mut self, project: ProjectConfig) {
        if self.toolchain.is_none() {
            self.toolchain = project.toolchain;
        }
        self.libraries.extend(project.libraries);
        self.library_paths.extend(project.library_paths);
    }
}

/// Defaults read from an optional `minicc.toml`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectConfig {
    pub toolchain: Option<String>,
    pub libraries: Vec<String>,
    pub library_paths: Vec<PathBuf>,
}

impl ProjectConfig {
    /// Parse project configuration from TOML text
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str).map_err(|e| format!("failed to parse project config: {}", e))
    }

    /// Load `path` if it exists; `Ok(None)` when there is no file
    pub fn load(path: &Path) -> Result<Option<Self>, String> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
        Self::from_toml(&content).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CompilerConfig::new();
        assert!(!config.keep_asm);
        assert_eq!(config.toolchain_command(), "gcc");
    }

    #[test]
    fn test_builders() {
        let config = CompilerConfig::new()
            .with_emit_ir(true)
            .with_libraries(["m".to_string()]);
        assert!(config.emit_ir);
        assert_eq!(config.libraries, vec!["m"]);
    }

    #[test]
    fn test_project_toml() {
        let project = ProjectConfig::from_toml(
            r#"
toolchain = "cc"
libraries = ["m", "dl"]
library_paths = ["/opt/lib"]
"#,
        )
        .unwrap();
        assert_eq!(project.toolchain.as_deref(), Some("cc"));
        assert_eq!(project.libraries.len(), 2);
    }

    #[test]
    fn test_project_toml_rejects_unknown_keys() {
        assert!(ProjectConfig::from_toml("linker = \"ld\"").is_err());
    }

    #[test]
    fn test_merge_keeps_explicit_toolchain() {
        let mut config = CompilerConfig {
            toolchain: Some("clang".to_string()),
            ..CompilerConfig::default()
        };
        config.merge_project(ProjectConfig {
            toolchain: Some("cc".to_string()),
            libraries: vec!["m".to_string()],
            library_paths: vec![],
        });
        assert_eq!(config.toolchain_command(), "clang");
        assert_eq!(config.libraries, vec!["m"]);
    }
}
