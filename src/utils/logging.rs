//! 日志工具模块
//!
//! 提供日志初始化与格式化输出的辅助函数

use tracing::info;

/// 初始化 tracing 日志
///
/// 已初始化过时静默返回，方便测试里重复调用。
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}

/// 记录程序启动信息
///
/// # 参数
/// - `max_concurrent`: 最大并发章节数
pub fn log_startup(max_concurrent: usize) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 报告生成模式");
    info!("📊 章节最大并发数: {}", max_concurrent);
    info!("{}", "=".repeat(60));
}

/// 打印最终统计信息
///
/// # 参数
/// - `drafted`: 成功起草的章节数
/// - `empty`: 结构占位（无指令）章节数
/// - `total`: 章节总数
pub fn print_final_stats(drafted: usize, empty: usize, total: usize) {
    info!("\n{}", "=".repeat(60));
    info!("📊 报告生成完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 已起草: {}/{}", drafted, total);
    info!("▫️ 结构占位: {}", empty);
    info!("{}", "=".repeat(60));
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
