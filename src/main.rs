use anyhow::{bail, Context, Result};
use tracing::info;

use diagram_question_gen::utils::logging;
use diagram_question_gen::{App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let Some(topic) = args.next() else {
        bail!("用法: diagram_question_gen <主题> [config.toml]");
    };

    // 加载配置
    let config = match args.next() {
        Some(path) => Config::from_toml_file(&path).with_context(|| format!("无法加载配置: {}", path))?,
        None => Config::from_env(),
    };

    // 初始化日志
    logging::init(config.verbose_logging);

    // 初始化并运行应用
    let app = App::initialize(config).await?;
    let cancel = app.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("⏹ 收到中断信号，停止派发新的渲染任务");
            cancel.cancel();
        }
    });

    let manifest = app.run(&topic).await?;
    info!(
        "✓ 完成: {} 道题目，{} 张图表",
        manifest.total_questions, manifest.total_rendered
    );

    Ok(())
}
