//! 业务能力层 - 单项能力的定义与实现
//!
//! ## 职责
//! 每个服务封装一种"对单个输入做一件事"的能力：
//! - `llm_service`: 统一的文本生成入口（trait + OpenAI 兼容实现）
//! - `extractor`: 按章节从来源文本抽取结构化事实
//! - `style_extractor`: 从示例文档提取写作风格画像
//! - `document_parser`: 按标题启发式解析自由文本的章节结构
//! - `response_normalizer`: 从 LLM 响应中恢复 JSON
//!
//! 服务不做批量调度，也不持有会话状态；那是 workflow / orchestrator 的事。

pub mod document_parser;
pub mod extractor;
pub mod llm_service;
pub mod response_normalizer;
pub mod style_extractor;

pub use document_parser::{is_heading, parse_document_structure, parse_example_sections};
pub use extractor::ExtractorService;
pub use llm_service::{LlmService, TextGenerator};
pub use style_extractor::{format_style_guidance, StyleExtractorService};
