//! 光栅化
//!
//! 打开编译产物，选择第一页，按给定比例渲染为 PNG。
//! 实现是同步的，由调用方放进 `spawn_blocking` 并加超时。

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use image::{ImageFormat, RgbaImage};
use pdfium_render::prelude::*;
use thiserror::Error;
use tracing::debug;

/// 光栅化结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterResult {
    pub output_path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub page_count: usize,
}

#[derive(Debug, Error)]
pub enum RasterError {
    #[error("无法加载光栅化库: {0}")]
    Library(String),
    #[error("无法打开编译产物: {0}")]
    Open(String),
    #[error("编译产物没有页面")]
    NoPages,
    #[error("渲染失败: {0}")]
    Render(String),
    #[error("写出图片失败: {0}")]
    Save(String),
}

/// 光栅化能力
pub trait Rasterizer: Send + Sync {
    /// 把 `document` 的第一页按 `scale` 渲染并写到 `output`
    fn rasterize(&self, document: &Path, output: &Path, scale: f32) -> Result<RasterResult, RasterError>;
}

/// 基于 pdfium 的实现
///
/// pdfium 的初始化和销毁作用于整个进程，所以只绑定一次：第一次光栅化时加载动态库，
/// 之后所有工作线程共享同一个实例，渲染在锁内串行执行。
#[derive(Default)]
pub struct PdfiumRasterizer {
    library_dir: Option<PathBuf>,
    pdfium: Mutex<Option<Pdfium>>,
}

impl PdfiumRasterizer {
    pub fn new(library_dir: Option<PathBuf>) -> Self {
        Self {
            library_dir,
            pdfium: Mutex::new(None),
        }
    }

    fn bind(&self) -> Result<Pdfium, RasterError> {
        let bindings = match &self.library_dir {
            Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| RasterError::Library(e.to_string()))?;
        debug!("pdfium 已加载");
        Ok(Pdfium::new(bindings))
    }
}

impl Rasterizer for PdfiumRasterizer {
    fn rasterize(&self, document: &Path, output: &Path, scale: f32) -> Result<RasterResult, RasterError> {
        let mut guard = self
            .pdfium
            .lock()
            .map_err(|_| RasterError::Library("pdfium 实例锁已损坏".to_string()))?;
        if guard.is_none() {
            *guard = Some(self.bind()?);
        }
        let Some(pdfium) = guard.as_ref() else {
            return Err(RasterError::Library("pdfium 未绑定".to_string()));
        };

        let pdf = pdfium
            .load_pdf_from_file(document, None)
            .map_err(|e| RasterError::Open(e.to_string()))?;

        let page_count = pdf.pages().len() as usize;
        if page_count == 0 {
            return Err(RasterError::NoPages);
        }
        let page = pdf.pages().get(0).map_err(|e| RasterError::Open(e.to_string()))?;

        let config = PdfRenderConfig::new().scale_page_by_factor(scale);
        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| RasterError::Render(e.to_string()))?;

        let width = bitmap.width() as u32;
        let height = bitmap.height() as u32;
        debug!("页面渲染为 {}x{} (scale {:.2})", width, height, scale);

        let image = RgbaImage::from_raw(width, height, bitmap.as_rgba_bytes())
            .ok_or_else(|| RasterError::Render(format!("位图尺寸与数据不符: {}x{}", width, height)))?;
        image
            .save_with_format(output, ImageFormat::Png)
            .map_err(|e| RasterError::Save(e.to_string()))?;

        Ok(RasterResult {
            output_path: output.to_path_buf(),
            width,
            height,
            page_count,
        })
    }
}
