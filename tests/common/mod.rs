//! 集成测试共用的桩实现
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use diagram_question_gen::error::GenerationError;
use diagram_question_gen::infrastructure::{CompilerRunner, ExitResult, RasterError, RasterResult, Rasterizer, ScratchDir};
use diagram_question_gen::services::{CompilerSettings, DiagramCompiler, TextGenerator};

/// 编译器桩：
/// - 前 `fail_first` 次调用返回非零退出码
/// - `empty_artifact` 时写出零字节的产物
/// - 文档中的 `% delay NN` 会让本次调用等待 NN 毫秒
#[derive(Default)]
pub struct StubRunner {
    pub calls: AtomicUsize,
    pub fail_first: usize,
    pub empty_artifact: bool,
    /// 完成顺序（记录 delay 值）
    pub finished: Mutex<Vec<u64>>,
}

impl StubRunner {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn delay_marker(document: &str) -> u64 {
    document
        .lines()
        .find_map(|line| line.trim().strip_prefix("% delay "))
        .and_then(|ms| ms.trim().parse().ok())
        .unwrap_or(0)
}

#[async_trait]
impl CompilerRunner for StubRunner {
    async fn run_compiler(&self, document: &Path) -> std::io::Result<ExitResult> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let text = tokio::fs::read_to_string(document).await?;

        let delay = delay_marker(&text);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.finished.lock().unwrap().push(delay);

        if call < self.fail_first {
            return Ok(ExitResult::failed(1, "! Undefined control sequence.\nError: stub failure"));
        }

        let bytes: &[u8] = if self.empty_artifact { b"" } else { b"%PDF-1.5 stub" };
        tokio::fs::write(document.with_extension("pdf"), bytes).await?;
        Ok(ExitResult::ok())
    }
}

/// 光栅化桩：
/// - 前 `fail_first` 次调用返回错误
/// - `stall_first` 时第一次调用先阻塞，再写出无效字节
/// - `sixteen_bit` 时写出 16 位色深的 PNG
/// - 其余情况写出一张 20x10 的 RGB PNG
#[derive(Default)]
pub struct StubRasterizer {
    pub calls: AtomicUsize,
    pub fail_first: usize,
    pub stall_first: Option<Duration>,
    pub sixteen_bit: bool,
}

impl StubRasterizer {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Rasterizer for StubRasterizer {
    fn rasterize(&self, _document: &Path, output: &Path, _scale: f32) -> Result<RasterResult, RasterError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let done = RasterResult {
            output_path: output.to_path_buf(),
            width: 20,
            height: 10,
            page_count: 1,
        };

        if call == 0 {
            if let Some(stall) = self.stall_first {
                std::thread::sleep(stall);
                std::fs::write(output, b"stale bytes").map_err(|e| RasterError::Save(e.to_string()))?;
                return Ok(done);
            }
        }
        if call < self.fail_first {
            return Err(RasterError::Render("stub raster failure".to_string()));
        }

        let saved = if self.sixteen_bit {
            image::ImageBuffer::<image::Rgb<u16>, Vec<u16>>::from_pixel(20, 10, image::Rgb([1000, 2000, 3000]))
                .save(output)
        } else {
            image::RgbImage::from_pixel(20, 10, image::Rgb([255, 255, 255])).save(output)
        };
        saved.map_err(|e| RasterError::Save(e.to_string()))?;
        Ok(done)
    }
}

/// 快速测试用的编译器参数
pub fn fast_settings(max_retries: u32, backoff_ms: u64) -> CompilerSettings {
    CompilerSettings {
        dpi: 72,
        max_retries,
        backoff_base: Duration::from_millis(backoff_ms),
        raster_timeout: Duration::from_secs(5),
        ..CompilerSettings::default()
    }
}

pub fn compiler(runner: Arc<StubRunner>, scratch: &Path, settings: CompilerSettings) -> DiagramCompiler {
    compiler_with(runner, Arc::new(StubRasterizer::default()), scratch, settings)
}

pub fn compiler_with(
    runner: Arc<StubRunner>,
    rasterizer: Arc<StubRasterizer>,
    scratch: &Path,
    settings: CompilerSettings,
) -> DiagramCompiler {
    DiagramCompiler::new(runner, rasterizer, Arc::new(ScratchDir::new(scratch).unwrap()), settings)
}

/// 列出目录下指定扩展名的文件
pub fn files_with_extension(dir: &Path, ext: &str) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|e| e == ext))
        .collect()
}

/// 文本生成桩：按 prompt 内容返回预先写好的响应
pub struct ScriptedGenerator {
    pub respond: Box<dyn Fn(&str) -> Result<String, GenerationError> + Send + Sync>,
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, _system: &str, prompt: &str) -> Result<String, GenerationError> {
        (self.respond)(prompt)
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}
