//! 错误类型
//!
//! 组件级错误用 `thiserror` 定义强类型枚举；编排层和入口使用 `anyhow::Result`。
//! 图表编译器从不返回错误，失败信息全部累积在 `RenderResult` 中。

use std::path::PathBuf;

use thiserror::Error;

/// 恢复引擎诊断预览的最大字符数
pub const PREVIEW_CHARS: usize = 500;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    #[error("恢复错误: {0}")]
    Recovery(#[from] RecoveryError),
    #[error("生成错误: {0}")]
    Generation(#[from] GenerationError),
    #[error("存储错误: {0}")]
    Storage(#[from] StorageError),
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),
}

/// 结构化响应恢复错误
#[derive(Debug, Error)]
pub enum RecoveryError {
    /// 输入为空白
    #[error("输入为空 (empty input)")]
    EmptyInput,
    /// 所有策略都没有得到记录
    #[error("无法恢复结构化数据 (unrecoverable format)，输入预览: {preview}")]
    UnrecoverableFormat { preview: String },
}

impl RecoveryError {
    pub fn unrecoverable(raw_text: &str) -> Self {
        RecoveryError::UnrecoverableFormat {
            preview: raw_text.chars().take(PREVIEW_CHARS).collect(),
        }
    }
}

/// 文本生成及记录转换错误
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("文本生成服务调用失败: {0}")]
    Service(String),
    #[error("文本生成超时 ({secs}s)")]
    Timeout { secs: u64 },
    #[error("文本生成返回内容为空")]
    EmptyResponse,
    #[error(transparent)]
    Recovery(#[from] RecoveryError),
    #[error("记录转换失败: {0}")]
    InvalidRecord(String),
}

/// 持久化存储错误
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("创建目录 {path} 失败: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("写入 {path} 失败: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("序列化 {what} 失败: {source}")]
    Serialize {
        what: String,
        #[source]
        source: serde_json::Error,
    },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path} 失败: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("配置取值无效: {0}")]
    Invalid(String),
}

/// 应用程序 Result 类型别名
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unrecoverable_preview_is_capped() {
        let raw = "x".repeat(2000);
        match RecoveryError::unrecoverable(&raw) {
            RecoveryError::UnrecoverableFormat { preview } => {
                assert_eq!(preview.chars().count(), PREVIEW_CHARS)
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_recovery_error_converts_into_app_error() {
        let err: AppError = RecoveryError::EmptyInput.into();
        assert!(err.to_string().contains("empty input"));
    }
}
