//! 日志初始化

use tracing_subscriber::EnvFilter;

/// 使用默认级别 info 初始化日志
pub fn init() {
    init_with_verbose(false);
}

/// 初始化日志，`RUST_LOG` 优先于 `verbose`
///
/// 重复调用是安全的（测试中会多次调用）
pub fn init_with_verbose(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 截断长文本用于日志显示
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
