/// 日志工具模块
///
/// 提供日志初始化和格式化输出的辅助函数
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::models::{OutputManifest, PatternOutput};

/// 初始化全局日志订阅器
///
/// 优先使用 `RUST_LOG`，否则默认 `info`（详细模式下为 `debug`）。重复调用是安全的。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(topic: &str, config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 图表题目生成");
    info!("📚 主题: {}", topic);
    info!(
        "📊 渲染方式: {}",
        if config.parallel_rendering {
            format!("并行 (宽度 {})", config.max_workers)
        } else {
            "顺序".to_string()
        }
    );
    info!("🖼️ 分辨率: {} DPI", config.dpi);
    info!("📁 输出目录: {}", config.output_dir.display());
    info!("{}", "=".repeat(60));
}

/// 记录模式开始信息
pub fn log_pattern_start(index: usize, total: usize, pattern_id: u32, name: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📦 开始处理第 {}/{} 个模式", index, total);
    info!("[模式 {}] {}", pattern_id, name);
    info!("{}", "=".repeat(60));
}

/// 记录模式完成信息
pub fn log_pattern_complete(output: &PatternOutput) {
    info!("\n{}", "─".repeat(60));
    match &output.error {
        Some(e) => info!("[模式 {}] ❌ 未完成: {}", output.pattern_id, e),
        None => info!(
            "[模式 {}] ✓ 完成: 渲染成功 {}/{}",
            output.pattern_id,
            output.rendered_count(),
            output.entries.len()
        ),
    }
    info!("{}", "─".repeat(60));
}

/// 打印最终统计信息
pub fn print_final_stats(manifest: &OutputManifest) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("🧩 模式: {}", manifest.total_patterns);
    info!("📝 题目: {}", manifest.total_questions);
    info!("✅ 渲染成功: {}/{}", manifest.total_rendered, manifest.total_questions);
    info!("❌ 渲染失败: {}", manifest.total_failed);
    info!("{}", "=".repeat(60));
    info!("\n产物已保存至: {}", manifest.output_dir.display());
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
