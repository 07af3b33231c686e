use anyhow::Result;

use report_drafter::models::section::{count_instructed, walk};
use report_drafter::utils::logging;
use report_drafter::{load_source_folder, load_template, Config, ReportEngine};

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logging::init();

    // 加载配置
    let config = Config::from_env();
    logging::log_startup(config.max_concurrent_sections);

    // 加载章节模板与参考资料
    let sections = load_template(&config.template_path).await?;
    let sources = load_source_folder(&config.source_folder).await?;
    let total_sections = walk(&sections).count();
    let instructed = count_instructed(&sections);

    // 发起报告准备，跑到挂起点
    let engine = ReportEngine::new(config.clone());
    let draft = engine
        .prepare("cli", sections, sources, None, None)
        .await?;
    tracing::info!("📝 初稿完成 ({} 字符)", draft.chars().count());

    // 命令行模式不做交互修订，空问题直接定稿
    let document = engine.resume_revision("cli", "", "").await?;

    tokio::fs::write(&config.output_path, &document).await?;
    tracing::info!("💾 报告已写入 {}", config.output_path);

    logging::print_final_stats(instructed, total_sections - instructed, total_sections);
    Ok(())
}
