//! 章节处理上下文
//!
//! 封装"我正在为哪个会话起草第几个章节"这一信息

use std::fmt::Display;

/// 章节处理上下文
///
/// 包含处理单个章节所需的全部上下文信息
#[derive(Debug, Clone)]
pub struct SectionCtx {
    /// 会话 ID
    pub session_id: String,

    /// 章节在待起草队列中的索引（从 1 开始，仅用于日志显示）
    pub section_index: usize,

    /// 章节显示标题
    pub section_title: String,
}

impl SectionCtx {
    /// 创建新的章节上下文
    pub fn new(session_id: String, section_index: usize, section_title: String) -> Self {
        Self {
            session_id,
            section_index,
            section_title,
        }
    }
}

impl Display for SectionCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[会话#{} 章节#{} \"{}\"]",
            self.session_id, self.section_index, self.section_title
        )
    }
}
