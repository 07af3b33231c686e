//! 工作流状态模型
//!
//! 两条工作流各有一份状态：报告准备（带挂起/恢复）与定向改写（线性）。
//! 准备工作流的挂起检查点必须可序列化，按会话 ID 存取。

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::section::SectionMap;

/// 单份资料的抽取结果：章节标题 -> 事实表
pub type SourceExtraction = IndexMap<String, serde_json::Map<String, Value>>;

/// 报告准备工作流的状态
///
/// 每次生成请求构造一份，各阶段就地修改，到达终态或进程结束时丢弃。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreparationState {
    /// 章节树
    pub sections: SectionMap,
    /// 参考资料全文：资料标识 -> 文本
    pub source_texts: IndexMap<String, String>,
    /// 抽取结果：资料标识 -> (章节标题 -> 事实表)
    pub source_extractions: IndexMap<String, SourceExtraction>,
    /// 风格画像（从范例文档抽取，可缺省）
    pub style_profile: Option<Value>,
    /// 范例文档全文（提供时触发风格抽取分支）
    pub example_document_text: Option<String>,
    /// 修订问题（恢复会话时由调用方提供，非空触发修订分支）
    pub revision_question: Option<String>,
    /// 当前正在修订的整篇文档文本
    pub revision: String,
}

impl PreparationState {
    pub fn new(
        sections: SectionMap,
        source_texts: IndexMap<String, String>,
        example_document_text: Option<String>,
    ) -> Self {
        Self {
            sections,
            source_texts,
            source_extractions: IndexMap::new(),
            style_profile: None,
            example_document_text,
            revision_question: None,
            revision: String::new(),
        }
    }
}

/// 准备工作流的阶段
///
/// 显式的有限状态机表示：挂起点不依赖语言层的暂停机制，
/// 而是把 `{stage, state}` 作为检查点落到会话表里，凭外部输入恢复。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrepStage {
    /// 按资料抽取结构化事实
    Extract,
    /// 从范例文档抽取风格画像（条件分支）
    StyleExtract,
    /// 并行起草各章节
    Draft,
    /// 挂起，等待外部修订输入
    AwaitingRevision,
    /// 应用整篇修订
    Editing,
    /// 终态
    Done,
}

/// 挂起检查点
///
/// 会话表中按会话 ID 存放，恢复时凭它继续推进状态机。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub stage: PrepStage,
    pub state: PreparationState,
}

/// 一条定向改写请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionChange {
    /// 要改写的章节名（模糊匹配解析到实际章节）
    pub section_name: String,
    /// 用户的改写方向
    pub user_direction: String,
}

/// 解析出的文档章节
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedSection {
    /// 显示标题
    pub title: String,
    /// 章节正文
    pub content: String,
}

/// 定向改写统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditStats {
    pub total_sections: usize,
    pub modified: usize,
    pub unchanged: usize,
}

/// 定向改写工作流的状态
///
/// 每次改写请求构造一份；终态携带统计与被改写的章节集合。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetedEditState {
    /// 被改写的范例文档全文
    pub example_document_text: String,
    /// 参考资料：资料标识 -> 文本
    pub reference_texts: IndexMap<String, String>,
    /// 改写请求列表（保序）
    pub section_changes: Vec<SectionChange>,
    /// 输出文件路径
    pub output_path: String,
    /// 解析出的章节：归一化键 -> {标题, 正文}
    pub example_sections: IndexMap<String, ParsedSection>,
    /// 被改写的章节子集：归一化键 -> 新 {标题, 正文}
    pub modified_sections: IndexMap<String, ParsedSection>,
    /// 统计
    pub stats: EditStats,
}

impl TargetedEditState {
    pub fn new(
        example_document_text: String,
        reference_texts: IndexMap<String, String>,
        section_changes: Vec<SectionChange>,
        output_path: String,
    ) -> Self {
        Self {
            example_document_text,
            reference_texts,
            section_changes,
            output_path,
            example_sections: IndexMap::new(),
            modified_sections: IndexMap::new(),
            stats: EditStats::default(),
        }
    }
}

/// 单个章节改写任务（临时对象，随任务生灭）
///
/// 任务产出由调用方按请求顺序合并回 `modified_sections`，
/// 任务本身不持有工作流状态。
#[derive(Debug, Clone)]
pub struct SectionEditJob {
    /// 章节显示标题
    pub section_title: String,
    /// 改写前的正文
    pub original_content: String,
    /// 用户的改写方向
    pub user_direction: String,
    /// 整篇文档上下文（供提示词截断使用）
    pub full_document_context: String,
    /// 检索限定的资料标识
    pub allowed_sources: Vec<String>,
}
