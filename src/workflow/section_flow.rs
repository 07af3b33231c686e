//! 章节起草流程 - 流程层
//!
//! 核心职责：定义"一个章节"从指令到成稿的完整流程
//!
//! 流程顺序：
//! 1. LLM 生成检索查询
//! 2. 在该章节声明的来源范围内做相似度检索
//! 3. LLM 按指令 + 事实 + 风格画像起草正文

use anyhow::Result;
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use crate::infrastructure::{Snippet, VectorStore};
use crate::models::section::SectionInstruction;
use crate::services::response_normalizer::strip_terminate;
use crate::services::TextGenerator;
use crate::workflow::section_ctx::SectionCtx;
use std::sync::Arc;

/// 每个章节正文结尾要求模型输出的结束标记
pub const END_OF_SECTION_MARKER: &str = "=== END OF SECTION ===";

/// 单个章节的起草任务
///
/// 由编排层在展开章节树时构造，流程层只消费不回写。
#[derive(Debug, Clone)]
pub struct SectionDraftJob {
    /// 章节显示标题
    pub title: String,
    /// 取材来源标识，空串表示不限来源
    pub source: String,
    /// 写作指令
    pub instructions: SectionInstruction,
    /// 该章节可引用的事实（来自抽取阶段，可能为空）
    pub facts: serde_json::Map<String, JsonValue>,
    /// 扁平化后的风格指引，没有示例文档时为 None
    pub style_guidance: Option<String>,
}

/// 章节起草流程
///
/// - 编排单个章节的检索与起草
/// - 不持有语料资源（store 由编排层传入）
/// - 只依赖业务能力（services）
pub struct SectionFlow {
    generator: Arc<dyn TextGenerator>,
    verbose_logging: bool,
}

impl SectionFlow {
    pub fn new(generator: Arc<dyn TextGenerator>, verbose_logging: bool) -> Self {
        Self {
            generator,
            verbose_logging,
        }
    }

    /// 执行完整的单章节起草流程
    pub async fn run(
        &self,
        store: &VectorStore,
        job: &SectionDraftJob,
        ctx: &SectionCtx,
    ) -> Result<String> {
        // ========== 步骤 1: 生成检索查询 ==========
        info!("{} 🔍 生成检索查询...", ctx);
        let query = self.formulate_query(job).await?;
        if self.verbose_logging {
            info!("{} 检索查询: {}", ctx, query);
        }

        // ========== 步骤 2: 范围内检索 ==========
        let scope_ids: Vec<String> = if job.source.trim().is_empty() {
            Vec::new()
        } else {
            vec![job.source.clone()]
        };
        let scope = store.scope(&scope_ids);
        let snippets = store.search(&scope, &query).await?;
        if snippets.is_empty() {
            warn!("{} ⚠️ 未检索到相关片段，仅凭事实与指令起草", ctx);
        } else {
            info!("{} ✓ 检索到 {} 个相关片段", ctx, snippets.len());
        }

        // ========== 步骤 3: 起草正文 ==========
        let prompt = build_draft_prompt(job, &snippets);
        let response = self.generator.generate(&prompt, None).await?;
        let content = clean_draft(&response);

        if content.is_empty() {
            warn!("{} ⚠️ 起草结果为空", ctx);
        } else {
            info!("{} ✓ 起草完成 ({} 字符)", ctx, content.chars().count());
        }
        Ok(content)
    }

    /// 让模型把章节指令转成一条简短的检索查询
    async fn formulate_query(&self, job: &SectionDraftJob) -> Result<String> {
        let prompt = format!(
            "You are preparing to write the report section \"{}\".\n\
Section objective: {}\n\n\
Formulate ONE short search query (a phrase, not a sentence) that would retrieve the \
most relevant passages from the reference documents for this section. \
Respond with the query only.",
            job.title, job.instructions.objective
        );
        let response = self.generator.generate(&prompt, None).await?;
        let query = strip_terminate(&response).trim().trim_matches('"').to_string();
        // 模型偶尔返回空串或整段解释，兜底用章节目标本身当查询
        if query.is_empty() || query.chars().count() > 200 {
            Ok(job.instructions.objective.clone())
        } else {
            Ok(query)
        }
    }
}

/// 拼装起草提示词
fn build_draft_prompt(job: &SectionDraftJob, snippets: &[Snippet]) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!(
        "You are a professional report writer. Write the section \"{}\" of a business report.\n\n",
        job.title
    ));

    prompt.push_str(&format!("Objective: {}\n", job.instructions.objective));
    if let Some(tone) = &job.instructions.tone {
        prompt.push_str(&format!("Tone: {tone}\n"));
    }
    if let Some(length) = &job.instructions.length {
        prompt.push_str(&format!("Length: {length}\n"));
    }
    if let Some(format_hint) = &job.instructions.format {
        prompt.push_str(&format!("Format: {format_hint}\n"));
    }

    if !job.facts.is_empty() {
        let facts_json = serde_json::to_string_pretty(&JsonValue::Object(job.facts.clone()))
            .unwrap_or_default();
        prompt.push_str(&format!(
            "\nKey facts extracted for this section (use them, do not contradict them):\n{facts_json}\n"
        ));
    }

    if !snippets.is_empty() {
        prompt.push_str("\nRelevant reference passages:\n");
        for (i, s) in snippets.iter().enumerate() {
            prompt.push_str(&format!("[{}] (from {})\n{}\n\n", i + 1, s.source, s.text));
        }
    }

    if let Some(guidance) = &job.style_guidance {
        prompt.push_str(&format!(
            "\nMatch the following writing style:\n{guidance}\n"
        ));
    }

    prompt.push_str(&format!(
        "\nWrite the section body only. Do not repeat the section title as a heading. \
End your output with the line {END_OF_SECTION_MARKER} followed by the word TERMINATE."
    ));
    prompt
}

/// 去掉结束标记与 TERMINATE，返回纯正文
fn clean_draft(response: &str) -> String {
    let text = strip_terminate(response);
    let text = match text.find(END_OF_SECTION_MARKER) {
        Some(pos) => &text[..pos],
        None => text,
    };
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clean_draft_strips_marker_and_terminate() {
        let raw = format!("Body text here.\n{END_OF_SECTION_MARKER}\nTERMINATE");
        assert_eq!(clean_draft(&raw), "Body text here.");
    }

    #[test]
    fn test_clean_draft_without_marker() {
        assert_eq!(clean_draft("Just the body. TERMINATE"), "Just the body.");
    }

    #[test]
    fn test_build_draft_prompt_includes_facts_and_style() {
        let mut facts = serde_json::Map::new();
        facts.insert("Company Name".into(), json!("Acme"));
        let job = SectionDraftJob {
            title: "Executive Summary".into(),
            source: "overview".into(),
            instructions: SectionInstruction {
                objective: "Summarize the proposal".into(),
                tone: Some("formal".into()),
                length: None,
                format: None,
            },
            facts,
            style_guidance: Some("Tone: formal".into()),
        };
        let prompt = build_draft_prompt(&job, &[]);
        assert!(prompt.contains("Executive Summary"));
        assert!(prompt.contains("Acme"));
        assert!(prompt.contains("Match the following writing style"));
        assert!(prompt.contains(END_OF_SECTION_MARKER));
    }
}
