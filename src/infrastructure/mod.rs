//! 基础设施层
//!
//! 持有稀缺的外部资源，只暴露能力：
//! - `CompilerRunner` - 外部编译器子进程
//! - `Rasterizer` - 光栅化库
//! - `ScratchDir` - 共享草稿目录

pub mod compiler_runner;
pub mod rasterizer;
pub mod scratch;

pub use compiler_runner::{CompilerRunner, ExitResult, TectonicRunner};
pub use rasterizer::{PdfiumRasterizer, RasterError, RasterResult, Rasterizer};
pub use scratch::ScratchDir;
