//! 图表编译器 - 业务能力层
//!
//! ## 职责
//!
//! 把一段绘图源码确定性地转换为 PNG 图片。所有失败都收进 `RenderResult`，
//! 调用方永远拿到结果而不是错误，单张图失败不会中断整批。
//!
//! ## 五个阶段
//!
//! 1. **源码清洗**：长度、括号平衡、禁用指令（不可重试）
//! 2. **文档嵌入**：套进固定模板，写入草稿目录的唯一文件，写后校验非空
//! 3. **外部编译**：子进程 + 超时；非零退出、超时、产物缺失或为空都会重试
//! 4. **光栅化**：第一页按 `dpi / 72` 缩放（有上限），独立于阶段 3 重试
//! 5. **输出校验**：重新打开图片，检查尺寸、大小、格式和色彩模式
//!
//! 结束后清理草稿文件，除非开启了保留中间产物。

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::{ColorType, ImageFormat, ImageReader};
use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::Config;
use crate::infrastructure::{CompilerRunner, RasterResult, Rasterizer, ScratchDir};
use crate::services::retry::{linear_backoff, retry, AttemptError, RetryFailure};
use crate::services::sanitizer::{sanitize, SanitizedSource};

/// 光栅化基准分辨率
pub const BASE_DPI: f32 = 72.0;
/// 缩放上限，防止畸形文档占用过多内存
pub const MAX_SCALE: f32 = 10.0;
/// 输出图片大小上限
pub const MAX_OUTPUT_BYTES: u64 = 10 * 1024 * 1024;

const DOCUMENT_TEMPLATE: &str = r"\documentclass[tikz,border=2pt,12pt]{standalone}
\usepackage{amsmath}
\usepackage{amssymb}
\usetikzlibrary{arrows.meta,positioning,shapes.geometric,calc}
\begin{document}
\begin{tikzpicture}%OPTIONS%
%BODY%
\end{tikzpicture}
\end{document}
";

/// 编译阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompileStage {
    Sanitize,
    Embed,
    Compile,
    Rasterize,
    Validate,
}

impl std::fmt::Display for CompileStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CompileStage::Sanitize => "sanitize",
            CompileStage::Embed => "embed",
            CompileStage::Compile => "compile",
            CompileStage::Rasterize => "rasterize",
            CompileStage::Validate => "validate",
        };
        f.write_str(name)
    }
}

/// 编译器参数
#[derive(Debug, Clone)]
pub struct CompilerSettings {
    pub dpi: u32,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub raster_timeout: Duration,
    pub keep_intermediate: bool,
    pub max_scale: f32,
    pub max_output_bytes: u64,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            dpi: 300,
            max_retries: 3,
            backoff_base: Duration::from_millis(100),
            raster_timeout: Duration::from_secs(30),
            keep_intermediate: false,
            max_scale: MAX_SCALE,
            max_output_bytes: MAX_OUTPUT_BYTES,
        }
    }
}

impl CompilerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            dpi: config.dpi,
            max_retries: config.max_retries,
            backoff_base: Duration::from_millis(config.retry_backoff_ms),
            raster_timeout: Duration::from_secs(config.raster_timeout_secs),
            keep_intermediate: config.keep_intermediate,
            ..Self::default()
        }
    }

    pub fn scale(&self) -> f32 {
        (self.dpi as f32 / BASE_DPI).min(self.max_scale)
    }
}

/// 单次编译的结果
#[derive(Debug, Clone)]
pub struct RenderResult {
    pub success: bool,
    pub image_path: PathBuf,
    /// 保留下来的中间产物（未开启保留时为空）
    pub intermediate_paths: Vec<PathBuf>,
    pub elapsed: Duration,
    pub errors: Vec<String>,
    pub failed_stage: Option<CompileStage>,
}

impl RenderResult {
    fn failed(image_path: &Path, stage: CompileStage, errors: Vec<String>, started: Instant) -> Self {
        Self {
            success: false,
            image_path: image_path.to_path_buf(),
            intermediate_paths: Vec::new(),
            elapsed: started.elapsed(),
            errors,
            failed_stage: Some(stage),
        }
    }

    /// 拼接后的错误描述
    pub fn error_message(&self) -> Option<String> {
        (!self.errors.is_empty()).then(|| self.errors.join("; "))
    }
}

/// 把清洗后的源码嵌入文档模板
pub fn embed_document(source: &SanitizedSource) -> String {
    DOCUMENT_TEMPLATE
        .replace("%OPTIONS%", source.options.as_deref().unwrap_or(""))
        .replace("%BODY%", &source.body)
}

/// 阶段 5：重新打开图片并校验
pub fn validate_output(path: &Path, max_bytes: u64) -> Result<(u32, u32), String> {
    let size = std::fs::metadata(path)
        .map_err(|e| format!("无法读取输出文件: {}", e))?
        .len();
    if size == 0 {
        return Err("输出文件为空 (empty image)".to_string());
    }
    if size > max_bytes {
        return Err(format!("输出文件过大: {} > {} 字节", size, max_bytes));
    }

    let reader = ImageReader::open(path)
        .map_err(|e| format!("无法打开输出图片: {}", e))?
        .with_guessed_format()
        .map_err(|e| format!("无法识别图片格式: {}", e))?;
    if reader.format() != Some(ImageFormat::Png) {
        return Err(format!("图片格式不符: {:?}", reader.format()));
    }
    let image = reader.decode().map_err(|e| format!("图片解码失败: {}", e))?;
    if image.width() == 0 || image.height() == 0 {
        return Err(format!("图片尺寸为零: {}x{}", image.width(), image.height()));
    }
    match image.color() {
        ColorType::L8 | ColorType::Rgb8 | ColorType::Rgba8 => Ok((image.width(), image.height())),
        other => Err(format!("色彩模式不符: {:?}", other)),
    }
}

fn prefixed(stage: CompileStage, failure: RetryFailure) -> Vec<String> {
    failure
        .errors
        .into_iter()
        .map(|e| format!("[{}] {}", stage, e))
        .collect()
}

/// 图表编译器
#[derive(Clone)]
pub struct DiagramCompiler {
    runner: Arc<dyn CompilerRunner>,
    rasterizer: Arc<dyn Rasterizer>,
    scratch: Arc<ScratchDir>,
    settings: CompilerSettings,
}

impl DiagramCompiler {
    pub fn new(
        runner: Arc<dyn CompilerRunner>,
        rasterizer: Arc<dyn Rasterizer>,
        scratch: Arc<ScratchDir>,
        settings: CompilerSettings,
    ) -> Self {
        Self {
            runner,
            rasterizer,
            scratch,
            settings,
        }
    }

    pub fn settings(&self) -> &CompilerSettings {
        &self.settings
    }

    /// 编译一段绘图源码到 `output_image_path`
    pub async fn compile(&self, diagram_source: &str, output_image_path: &Path) -> RenderResult {
        let started = Instant::now();
        let max_attempts = self.settings.max_retries;
        let backoff = linear_backoff(self.settings.backoff_base);

        // ========== 阶段 1: 源码清洗 ==========
        let sanitized = match sanitize(diagram_source) {
            Ok(s) => s,
            Err(e) => {
                debug!("源码清洗未通过: {}", e);
                return RenderResult::failed(
                    output_image_path,
                    CompileStage::Sanitize,
                    vec![format!("[{}] {}", CompileStage::Sanitize, e)],
                    started,
                );
            }
        };
        let document = embed_document(&sanitized);

        // ========== 阶段 2: 文档嵌入 ==========
        let scratch = self.scratch.clone();
        let embedded = retry(
            |attempt| {
                let scratch = scratch.clone();
                let document = document.clone();
                async move {
                    let stem = scratch.unique_stem("diagram", attempt);
                    let tex_name = format!("{}.tex", stem);
                    let tex_path = scratch.file_path(&tex_name);
                    tokio::fs::write(&tex_path, document.as_bytes())
                        .await
                        .map_err(|e| AttemptError::retryable(format!("写入 {} 失败: {}", tex_name, e)))?;
                    let written = tokio::fs::metadata(&tex_path).await.map(|m| m.len()).unwrap_or(0);
                    if written == 0 {
                        let _ = scratch.remove(&tex_name);
                        return Err(AttemptError::retryable(format!("写入后文件为空: {}", tex_name)));
                    }
                    Ok(stem)
                }
            },
            max_attempts,
            &backoff,
        )
        .await;

        let stem = match embedded {
            Ok(stem) => stem,
            Err(failure) => {
                return RenderResult::failed(
                    output_image_path,
                    CompileStage::Embed,
                    prefixed(CompileStage::Embed, failure),
                    started,
                );
            }
        };
        let tex_name = format!("{}.tex", stem);
        let pdf_name = format!("{}.pdf", stem);
        let tex_path = self.scratch.file_path(&tex_name);
        let pdf_path = self.scratch.file_path(&pdf_name);

        let result = self
            .compile_embedded(&tex_path, &pdf_path, output_image_path, started, &backoff)
            .await;

        // ========== 清理 ==========
        if self.settings.keep_intermediate {
            debug!("保留中间产物: {}", tex_path.display());
            let mut result = result;
            result.intermediate_paths = [tex_path, pdf_path].into_iter().filter(|p| p.exists()).collect();
            return result;
        }
        self.scratch.remove_all([tex_name.as_str(), pdf_name.as_str()]);
        result
    }

    /// 阶段 3-5
    async fn compile_embedded(
        &self,
        tex_path: &Path,
        pdf_path: &Path,
        output_image_path: &Path,
        started: Instant,
        backoff: &(impl Fn(u32) -> Duration + Send + Sync),
    ) -> RenderResult {
        let max_attempts = self.settings.max_retries;

        // ========== 阶段 3: 外部编译 ==========
        let compiled = retry(
            move |_| {
                let runner = self.runner.clone();
                async move {
                    match tokio::fs::remove_file(pdf_path).await {
                        Ok(()) => {}
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(e) => warn!("⚠️ 删除旧的编译产物失败: {}", e),
                    }

                    let exit = runner
                        .run_compiler(tex_path)
                        .await
                        .map_err(|e| AttemptError::retryable(format!("无法启动编译器: {}", e)))?;
                    if !exit.success() {
                        return Err(AttemptError::retryable(exit.describe_failure()));
                    }

                    match tokio::fs::metadata(pdf_path).await {
                        Err(_) => Err(AttemptError::retryable("编译产物缺失 (compiled artifact missing)")),
                        Ok(meta) if meta.len() == 0 => Err(AttemptError::retryable("编译产物为空 (empty artifact)")),
                        Ok(_) => Ok(()),
                    }
                }
            },
            max_attempts,
            backoff,
        )
        .await;

        if let Err(failure) = compiled {
            warn!("❌ 编译失败，已尝试 {} 次", failure.attempts);
            return RenderResult::failed(
                output_image_path,
                CompileStage::Compile,
                prefixed(CompileStage::Compile, failure),
                started,
            );
        }

        // ========== 阶段 4: 光栅化 ==========
        if let Some(parent) = output_image_path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return RenderResult::failed(
                    output_image_path,
                    CompileStage::Rasterize,
                    vec![format!("[{}] 无法创建输出目录 {}: {}", CompileStage::Rasterize, parent.display(), e)],
                    started,
                );
            }
        }

        let scale = self.settings.scale();
        let raster_timeout = self.settings.raster_timeout;
        // 每次尝试写到草稿目录中的独立文件，成功后再移动到最终位置；
        // 超时的渲染线程不会覆盖后续尝试的输出
        let rasterized = retry(
            move |attempt| {
                let rasterizer = self.rasterizer.clone();
                let scratch = self.scratch.clone();
                let pdf = pdf_path.to_path_buf();
                let output = output_image_path.to_path_buf();
                async move {
                    let attempt_name = format!("{}.png", scratch.unique_stem("raster", attempt));
                    let attempt_path = scratch.file_path(&attempt_name);
                    let outcome = match rasterize_once(rasterizer, pdf, attempt_path.clone(), scale, raster_timeout).await {
                        Ok(raster) => move_into_place(&attempt_path, &output).await.map(|()| RasterResult {
                            output_path: output.clone(),
                            ..raster
                        }),
                        Err(e) => Err(e),
                    };
                    if outcome.is_err() {
                        let _ = scratch.remove(&attempt_name);
                    }
                    outcome
                }
            },
            max_attempts,
            backoff,
        )
        .await;

        let raster = match rasterized {
            Ok(raster) => raster,
            Err(failure) => {
                return RenderResult::failed(
                    output_image_path,
                    CompileStage::Rasterize,
                    prefixed(CompileStage::Rasterize, failure),
                    started,
                );
            }
        };
        debug!(
            "光栅化完成: {}x{}, 共 {} 页",
            raster.width, raster.height, raster.page_count
        );

        // ========== 阶段 5: 输出校验 ==========
        let image_path = output_image_path.to_path_buf();
        let max_bytes = self.settings.max_output_bytes;
        let validated = tokio::task::spawn_blocking(move || validate_output(&image_path, max_bytes))
            .await
            .unwrap_or_else(|e| Err(format!("校验任务异常: {}", e)));

        if let Err(reason) = validated {
            if let Err(e) = std::fs::remove_file(output_image_path) {
                warn!("⚠️ 删除无效图片失败: {}", e);
            }
            return RenderResult::failed(
                output_image_path,
                CompileStage::Validate,
                vec![format!("[{}] {}", CompileStage::Validate, reason)],
                started,
            );
        }

        RenderResult {
            success: true,
            image_path: output_image_path.to_path_buf(),
            intermediate_paths: Vec::new(),
            elapsed: started.elapsed(),
            errors: Vec::new(),
            failed_stage: None,
        }
    }
}

/// 把草稿目录中的图片移动到输出位置；跨文件系统时退回复制
async fn move_into_place(from: &Path, to: &Path) -> Result<(), AttemptError> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(from, to)
        .await
        .map_err(|e| AttemptError::retryable(format!("无法写出图片 {}: {}", to.display(), e)))?;
    if let Err(e) = tokio::fs::remove_file(from).await {
        warn!("⚠️ 删除临时图片失败: {}", e);
    }
    Ok(())
}

/// 单次光栅化：放到阻塞线程池里执行，并加超时
async fn rasterize_once(
    rasterizer: Arc<dyn Rasterizer>,
    pdf: PathBuf,
    output: PathBuf,
    scale: f32,
    raster_timeout: Duration,
) -> Result<RasterResult, AttemptError> {
    let check_path = output.clone();
    let task = tokio::task::spawn_blocking(move || rasterizer.rasterize(&pdf, &output, scale));
    let raster = match timeout(raster_timeout, task).await {
        Err(_) => return Err(AttemptError::retryable("光栅化超时 (timeout)")),
        Ok(Err(join)) => return Err(AttemptError::retryable(format!("光栅化任务异常: {}", join))),
        Ok(Ok(Err(e))) => return Err(AttemptError::retryable(e.to_string())),
        Ok(Ok(Ok(raster))) => raster,
    };

    if raster.width == 0 || raster.height == 0 {
        return Err(AttemptError::retryable(format!(
            "光栅化尺寸为零: {}x{}",
            raster.width, raster.height
        )));
    }
    let written = tokio::fs::metadata(&check_path).await.map(|m| m.len()).unwrap_or(0);
    if written == 0 {
        return Err(AttemptError::retryable("光栅化输出文件为空 (empty image)"));
    }
    Ok(raster)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embed_document_places_options_and_body() {
        let source = SanitizedSource {
            options: Some("[scale=2]".to_string()),
            body: r"\draw (0,0) -- (1,1);".to_string(),
        };
        let document = embed_document(&source);
        assert!(document.contains("\\begin{tikzpicture}[scale=2]\n\\draw (0,0) -- (1,1);\n\\end{tikzpicture}"));
        assert!(document.starts_with(r"\documentclass[tikz,border=2pt,12pt]{standalone}"));
    }

    #[test]
    fn test_scale_is_capped() {
        let mut settings = CompilerSettings::default();
        assert!((settings.scale() - 300.0 / 72.0).abs() < 1e-4);
        settings.dpi = 7200;
        assert_eq!(settings.scale(), MAX_SCALE);
    }

    #[test]
    fn test_validate_output_accepts_rgb_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ok.png");
        image::RgbImage::from_pixel(4, 3, image::Rgb([255, 255, 255])).save(&path).unwrap();
        assert_eq!(validate_output(&path, MAX_OUTPUT_BYTES), Ok((4, 3)));
    }

    #[test]
    fn test_validate_output_rejects_non_png_and_oversize() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.png");
        std::fs::write(&path, b"not an image at all").unwrap();
        assert!(validate_output(&path, MAX_OUTPUT_BYTES).is_err());

        let png = dir.path().join("big.png");
        image::GrayImage::from_pixel(8, 8, image::Luma([0])).save(&png).unwrap();
        let err = validate_output(&png, 10).unwrap_err();
        assert!(err.contains("过大"));
    }

    #[test]
    fn test_validate_output_rejects_16bit_color() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deep.png");
        let image: image::ImageBuffer<image::Rgb<u16>, Vec<u16>> =
            image::ImageBuffer::from_pixel(2, 2, image::Rgb([1000, 2000, 3000]));
        image.save(&path).unwrap();
        let err = validate_output(&path, MAX_OUTPUT_BYTES).unwrap_err();
        assert!(err.contains("色彩模式"));
    }
}
