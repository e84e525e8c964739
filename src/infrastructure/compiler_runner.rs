//! 外部排版编译器
//!
//! 只暴露 `run_compiler(path) -> ExitResult` 一个能力，编译器的重试和校验逻辑
//! 由上层负责，测试中可以用桩实现替换。

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// 子进程退出结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExitResult {
    /// 被信号终止或超时时为 None
    pub status_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl ExitResult {
    pub fn ok() -> Self {
        Self {
            status_code: Some(0),
            ..Default::default()
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            status_code: Some(code),
            stderr: stderr.into(),
            ..Default::default()
        }
    }

    pub fn success(&self) -> bool {
        !self.timed_out && self.status_code == Some(0)
    }

    /// 提取第一行包含 "Error:" 的输出，便于诊断
    pub fn first_error_line(&self) -> Option<String> {
        self.stderr
            .lines()
            .chain(self.stdout.lines())
            .find(|line| line.contains("Error:") || line.starts_with("error:"))
            .map(|line| line.trim().to_string())
    }

    /// 失败时的诊断描述
    pub fn describe_failure(&self) -> String {
        if self.timed_out {
            return "编译超时 (timeout)".to_string();
        }
        let code = self
            .status_code
            .map_or_else(|| "signal".to_string(), |c| c.to_string());
        match self.first_error_line() {
            Some(line) => format!("编译器退出码 {}: {}", code, line),
            None => {
                let tail: String = self.stderr.trim().chars().take(300).collect();
                format!("编译器退出码 {}: {}", code, tail)
            }
        }
    }
}

/// 外部编译器能力
#[async_trait]
pub trait CompilerRunner: Send + Sync {
    /// 以文档路径为唯一位置参数运行编译器，工作目录为文档所在目录
    async fn run_compiler(&self, document: &Path) -> std::io::Result<ExitResult>;
}

/// tectonic 子进程实现
#[derive(Debug, Clone)]
pub struct TectonicRunner {
    program: String,
    timeout: Duration,
}

impl TectonicRunner {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// 依次探测配置路径和常见安装位置，返回第一个能运行 `--version` 的
    pub async fn locate(configured: &str, timeout_after: Duration) -> Option<Self> {
        let home_cargo = std::env::var("HOME")
            .map(|h| format!("{}/.cargo/bin/tectonic", h))
            .unwrap_or_default();
        let candidates = [
            configured,
            "tectonic",
            "/usr/local/bin/tectonic",
            "/usr/bin/tectonic",
            "/opt/homebrew/bin/tectonic",
            home_cargo.as_str(),
        ];

        for candidate in candidates.iter().filter(|c| !c.is_empty()) {
            let probe = timeout(
                Duration::from_secs(10),
                Command::new(candidate).arg("--version").kill_on_drop(true).output(),
            )
            .await;
            if let Ok(Ok(output)) = probe {
                if output.status.success() {
                    info!("✓ 找到编译器: {}", candidate);
                    return Some(Self::new(*candidate, timeout_after));
                }
            }
            debug!("编译器候选不可用: {}", candidate);
        }
        warn!("⚠️ 未找到可用的 tectonic");
        None
    }
}

#[async_trait]
impl CompilerRunner for TectonicRunner {
    async fn run_compiler(&self, document: &Path) -> std::io::Result<ExitResult> {
        let work_dir = document.parent().unwrap_or_else(|| Path::new("."));
        let file_name = document.file_name().unwrap_or(document.as_os_str());

        let mut command = Command::new(&self.program);
        command
            .arg(file_name)
            .current_dir(work_dir)
            .kill_on_drop(true);

        debug!("运行编译器: {} {:?}", self.program, file_name);
        match timeout(self.timeout, command.output()).await {
            Ok(output) => {
                let output = output?;
                Ok(ExitResult {
                    status_code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    timed_out: false,
                })
            }
            Err(_) => Ok(ExitResult {
                timed_out: true,
                ..Default::default()
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_error_line_prefers_error_marker() {
        let exit = ExitResult {
            status_code: Some(1),
            stdout: "note: running TeX\n".to_string(),
            stderr: "warning: x\nerror: texput.tex:3: Undefined control sequence\n".to_string(),
            timed_out: false,
        };
        assert_eq!(
            exit.first_error_line().as_deref(),
            Some("error: texput.tex:3: Undefined control sequence")
        );
        assert!(exit.describe_failure().contains("退出码 1"));
    }

    #[test]
    fn test_timeout_is_not_success() {
        let exit = ExitResult {
            timed_out: true,
            ..Default::default()
        };
        assert!(!exit.success());
        assert!(exit.describe_failure().contains("timeout"));
    }

    #[tokio::test]
    #[ignore] // 需要本机安装 tectonic
    async fn test_locate_real_compiler() {
        let _ = tracing_subscriber::fmt::try_init();
        let runner = TectonicRunner::locate("tectonic", Duration::from_secs(60)).await;
        assert!(runner.is_some());
    }
}
