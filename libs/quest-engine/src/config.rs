// Engine configuration: limits, gate patterns, builtin whitelist, backend
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::grader::ExerciseDefinition;

pub const DEFAULT_CONFIG_PATH: &str = "config/engine.json";

/// Patterns rejected by the safety gate, checked in order
pub const DEFAULT_FORBIDDEN_PATTERNS: &[&str] = &[
    r"import\s+os",
    r"import\s+sys",
    r"import\s+subprocess",
    r"import\s+socket",
    r"import\s+urllib",
    r"import\s+requests",
    r"import\s+shutil",
    r"import\s+glob",
    r"from\s+os\s+import",
    r"from\s+sys\s+import",
    r"from\s+subprocess\s+import",
    r"__import__",
    r"eval\s*\(",
    r"exec\s*\(",
    r"open\s*\(",
    r"file\s*\(",
    r"input\s*\(",
    r"raw_input\s*\(",
];

/// Builtins exposed to submitted code
pub const DEFAULT_BUILTINS: &[&str] = &[
    "print", "len", "str", "int", "float", "bool", "list", "dict", "tuple", "set", "range",
    "enumerate", "zip", "map", "filter", "sorted", "sum", "min", "max", "abs", "round",
    "isinstance", "type", "hasattr", "getattr", "setattr", "dir", "help", "ord", "chr", "bin",
    "hex", "oct", "pow", "divmod", "True", "False", "None",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub timeout_ms: u64,
    pub memory_limit_mb: u32,
    pub cpu_limit: f32,
    pub max_source_bytes: usize,
    pub max_output_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            memory_limit_mb: 100,
            cpu_limit: 0.5,
            max_source_bytes: 64 * 1024,
            max_output_bytes: 1024 * 1024,
        }
    }
}

impl Limits {
    pub fn memory_limit_bytes(&self) -> u64 {
        u64::from(self.memory_limit_mb) * 1024 * 1024
    }
}

/// Where the restricted namespace is hosted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    Process {
        #[serde(default = "default_interpreter")]
        interpreter: String,
    },
    Docker {
        #[serde(default = "default_image")]
        image: String,
    },
}

fn default_interpreter() -> String {
    "python3".to_string()
}

fn default_image() -> String {
    "python:3.12-slim".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Process {
            interpreter: default_interpreter(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub limits: Limits,
    pub forbidden_patterns: Vec<String>,
    pub builtins: Vec<String>,
    pub backend: BackendConfig,
    /// Exercise ids the quest catalog serves; each must have a strategy
    pub required_exercises: Vec<String>,
    /// Extra exercises registered on top of the built-in ones
    pub exercises: Vec<ExerciseDefinition>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            forbidden_patterns: DEFAULT_FORBIDDEN_PATTERNS.iter().map(|p| p.to_string()).collect(),
            builtins: DEFAULT_BUILTINS.iter().map(|b| b.to_string()).collect(),
            backend: BackendConfig::default(),
            required_exercises: vec![
                "basic-1".to_string(),
                "basic-2".to_string(),
                "basic-3".to_string(),
            ],
            exercises: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Engine config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let config: EngineConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        config.validated()
    }

    /// Load config/engine.json if present, defaults otherwise, then apply env overrides
    pub fn load_default() -> Result<Self> {
        let default_path = Path::new(DEFAULT_CONFIG_PATH);
        let config = if default_path.exists() {
            Self::load(default_path)?
        } else {
            Self::default()
        };
        config.with_env_overrides()
    }

    /// Apply QUEST_* environment overrides
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(value) = std::env::var("QUEST_TIMEOUT_MS") {
            self.limits.timeout_ms = value
                .parse()
                .with_context(|| format!("QUEST_TIMEOUT_MS is not a number: {}", value))?;
        }
        if let Ok(value) = std::env::var("QUEST_MEMORY_LIMIT_MB") {
            self.limits.memory_limit_mb = value
                .parse()
                .with_context(|| format!("QUEST_MEMORY_LIMIT_MB is not a number: {}", value))?;
        }
        if let Ok(value) = std::env::var("QUEST_BACKEND") {
            self.backend = match value.to_lowercase().as_str() {
                "process" => BackendConfig::Process {
                    interpreter: default_interpreter(),
                },
                "docker" => BackendConfig::Docker {
                    image: default_image(),
                },
                other => bail!("Invalid QUEST_BACKEND: {} (valid options: process, docker)", other),
            };
        }
        match &mut self.backend {
            BackendConfig::Process { interpreter } => {
                if let Ok(value) = std::env::var("QUEST_INTERPRETER") {
                    *interpreter = value;
                }
            }
            BackendConfig::Docker { image } => {
                if let Ok(value) = std::env::var("QUEST_DOCKER_IMAGE") {
                    *image = value;
                }
            }
        }
        self.validated()
    }

    fn validated(self) -> Result<Self> {
        if self.limits.timeout_ms == 0 {
            bail!("limits.timeout_ms must be greater than zero");
        }
        if self.limits.memory_limit_mb == 0 {
            bail!("limits.memory_limit_mb must be greater than zero");
        }
        if self.builtins.iter().any(|b| b.contains("import")) {
            bail!("builtins whitelist must not expose an import capability");
        }
        Ok(self)
    }

    /// Write configuration as pretty JSON, creating parent directories
    pub fn save(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json_content = serde_json::to_string_pretty(self)
            .context("Failed to serialize engine config")?;

        fs::write(config_path, json_content)
            .with_context(|| format!("Failed to write {}", config_path.display()))?;

        Ok(())
    }
}
