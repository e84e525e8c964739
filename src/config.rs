//! 程序配置
//!
//! 配置以值的方式传入各组件的构造函数，任何组件都不修改进程环境变量。
//! 支持三种来源：`Default`、环境变量（`from_env`）、TOML 文件（`from_toml_file`）。

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 输出根目录（JSON 产物、图片、文档）
    pub output_dir: PathBuf,
    /// 编译草稿目录
    pub scratch_dir: PathBuf,
    /// 外部编译器可执行文件
    pub compiler_path: String,
    /// pdfium 动态库所在目录（为空时使用系统库）
    pub pdfium_library_path: Option<PathBuf>,
    /// 目标分辨率
    pub dpi: u32,
    /// 渲染线程池宽度
    pub max_workers: usize,
    /// 每个阶段的最大尝试次数
    pub max_retries: u32,
    /// 线性退避基数（毫秒）
    pub retry_backoff_ms: u64,
    pub compile_timeout_secs: u64,
    pub raster_timeout_secs: u64,
    /// 调试用：保留中间产物
    pub keep_intermediate: bool,
    /// 是否进行可解性检查
    pub validate_solvability: bool,
    /// false 时顺序渲染，便于调试
    pub parallel_rendering: bool,
    pub patterns_per_topic: usize,
    pub questions_per_pattern: usize,
    /// 生成失败时使用内置模式模板
    pub use_fallback_patterns: bool,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    pub llm_temperature: f32,
    pub llm_max_tokens: u32,
    pub llm_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            scratch_dir: PathBuf::from("output/temp"),
            compiler_path: "tectonic".to_string(),
            pdfium_library_path: None,
            dpi: 300,
            max_workers: 4,
            max_retries: 3,
            retry_backoff_ms: 100,
            compile_timeout_secs: 60,
            raster_timeout_secs: 30,
            keep_intermediate: false,
            validate_solvability: true,
            parallel_rendering: true,
            patterns_per_topic: 10,
            questions_per_pattern: 10,
            use_fallback_patterns: true,
            verbose_logging: false,
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.groq.com/openai/v1".to_string(),
            llm_model_name: "llama-3.3-70b-versatile".to_string(),
            llm_temperature: 0.7,
            llm_max_tokens: 8000,
            llm_timeout_secs: 120,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            output_dir: std::env::var("OUTPUT_DIR").map(PathBuf::from).unwrap_or(default.output_dir),
            scratch_dir: std::env::var("SCRATCH_DIR").map(PathBuf::from).unwrap_or(default.scratch_dir),
            compiler_path: std::env::var("TECTONIC_PATH").unwrap_or(default.compiler_path),
            pdfium_library_path: std::env::var("PDFIUM_LIBRARY_PATH").ok().map(PathBuf::from).or(default.pdfium_library_path),
            dpi: std::env::var("RENDER_DPI").ok().and_then(|v| v.parse().ok()).unwrap_or(default.dpi),
            max_workers: std::env::var("MAX_WORKERS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_workers),
            max_retries: std::env::var("MAX_RETRIES").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_retries),
            retry_backoff_ms: std::env::var("RETRY_BACKOFF_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.retry_backoff_ms),
            compile_timeout_secs: std::env::var("COMPILE_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.compile_timeout_secs),
            raster_timeout_secs: std::env::var("RASTER_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.raster_timeout_secs),
            keep_intermediate: std::env::var("KEEP_INTERMEDIATE").ok().and_then(|v| v.parse().ok()).unwrap_or(default.keep_intermediate),
            validate_solvability: std::env::var("VALIDATE_SOLVABILITY").ok().and_then(|v| v.parse().ok()).unwrap_or(default.validate_solvability),
            parallel_rendering: std::env::var("PARALLEL_RENDERING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.parallel_rendering),
            patterns_per_topic: std::env::var("PATTERNS_PER_TOPIC").ok().and_then(|v| v.parse().ok()).unwrap_or(default.patterns_per_topic),
            questions_per_pattern: std::env::var("QUESTIONS_PER_PATTERN").ok().and_then(|v| v.parse().ok()).unwrap_or(default.questions_per_pattern),
            use_fallback_patterns: std::env::var("USE_FALLBACK_PATTERNS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.use_fallback_patterns),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.verbose_logging),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
            llm_temperature: std::env::var("LLM_TEMPERATURE").ok().and_then(|v| v.parse().ok()).unwrap_or(default.llm_temperature),
            llm_max_tokens: std::env::var("LLM_MAX_TOKENS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.llm_max_tokens),
            llm_timeout_secs: std::env::var("LLM_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.llm_timeout_secs),
        }
    }

    /// 从 TOML 文件加载配置，缺省字段取默认值
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// 检查取值范围
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dpi == 0 {
            return Err(ConfigError::Invalid("dpi 必须大于 0".to_string()));
        }
        if self.max_workers == 0 {
            return Err(ConfigError::Invalid("max_workers 必须大于 0".to_string()));
        }
        if self.max_retries == 0 {
            return Err(ConfigError::Invalid("max_retries 必须大于 0".to_string()));
        }
        Ok(())
    }

    pub fn diagrams_dir(&self) -> PathBuf {
        self.output_dir.join("diagrams")
    }

    pub fn documents_dir(&self) -> PathBuf {
        self.output_dir.join("documents")
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.dpi, 300);
        assert_eq!(config.max_workers, 4);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.compile_timeout_secs, 60);
        assert!(config.parallel_rendering);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_overrides_only_given_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "dpi = 150\nmax_workers = 2\nkeep_intermediate = true").unwrap();

        let config = Config::from_toml_file(file.path()).unwrap();
        assert_eq!(config.dpi, 150);
        assert_eq!(config.max_workers, 2);
        assert!(config.keep_intermediate);
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_workers = 0").unwrap();

        let err = Config::from_toml_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
