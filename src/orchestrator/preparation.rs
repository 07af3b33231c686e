//! 报告准备工作流 - 编排层
//!
//! ## 职责
//!
//! 驱动"抽取 -> (风格画像) -> 并行起草 -> 挂起修订 -> 整篇修订"的
//! 显式状态机。每一步读写同一份 `PreparationState`，挂起点把
//! `{stage, state}` 检查点交还给调用方（ReportEngine）保存。
//!
//! ## 核心功能
//!
//! 1. **逐源抽取**：每份资料一次 LLM 调用，失败降级为空事实表
//! 2. **条件分支**：有范例文档才进入风格画像阶段
//! 3. **并发起草**：Semaphore 限流 + 按提交顺序合并，保证章节顺序稳定
//! 4. **挂起/恢复**：AwaitingRevision 不阻塞线程，凭检查点续跑

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::AppError;
use crate::infrastructure::VectorStore;
use crate::models::section::{
    apply_drafts, count_instructed, flatten_report, retitle_company_sections, walk,
};
use crate::models::state::{Checkpoint, PreparationState, PrepStage, SourceExtraction};
use crate::services::response_normalizer::strip_terminate;
use crate::services::{format_style_guidance, ExtractorService, StyleExtractorService, TextGenerator};
use crate::utils::text::normalize_title_for_lookup;
use crate::workflow::{SectionCtx, SectionDraftJob, SectionFlow};

/// 一次推进的产出
#[derive(Debug)]
pub enum PrepOutcome {
    /// 状态机停在挂起点，等待外部修订输入；检查点由调用方保存
    Suspended {
        content: String,
        checkpoint: Checkpoint,
    },
    /// 终态：修订结束，文档定稿
    Finished { content: String },
}

/// 报告准备工作流
///
/// 不持有语料资源（store 由调用方传入），不管理会话表。
pub struct PreparationGraph {
    generator: Arc<dyn TextGenerator>,
    extractor: ExtractorService,
    style_extractor: StyleExtractorService,
    section_flow: Arc<SectionFlow>,
    max_concurrent_sections: usize,
}

impl PreparationGraph {
    pub fn new(generator: Arc<dyn TextGenerator>, config: &Config) -> Self {
        Self {
            extractor: ExtractorService::new(generator.clone()),
            style_extractor: StyleExtractorService::new(generator.clone()),
            section_flow: Arc::new(SectionFlow::new(generator.clone(), config.verbose_logging)),
            generator,
            max_concurrent_sections: config.max_concurrent_sections,
        }
    }

    /// 从检查点推进状态机，直到挂起或终止
    pub async fn run(
        &self,
        session_id: &str,
        store: &Arc<VectorStore>,
        checkpoint: Checkpoint,
    ) -> Result<PrepOutcome> {
        let Checkpoint {
            mut stage,
            mut state,
        } = checkpoint;

        loop {
            match stage {
                PrepStage::Extract => {
                    self.run_extract(&mut state).await?;
                    stage = if has_example(&state) {
                        PrepStage::StyleExtract
                    } else {
                        PrepStage::Draft
                    };
                }
                PrepStage::StyleExtract => {
                    let example = state
                        .example_document_text
                        .clone()
                        .unwrap_or_default();
                    state.style_profile =
                        Some(self.style_extractor.extract_style(&example).await?);
                    stage = PrepStage::Draft;
                }
                PrepStage::Draft => {
                    self.run_draft(session_id, store, &mut state).await?;
                    state.revision = flatten_report(&state.sections);
                    stage = PrepStage::AwaitingRevision;
                }
                PrepStage::AwaitingRevision => {
                    info!("📋 会话 {} 挂起，等待修订输入", session_id);
                    let content = state.revision.clone();
                    return Ok(PrepOutcome::Suspended {
                        content,
                        checkpoint: Checkpoint {
                            stage: PrepStage::AwaitingRevision,
                            state,
                        },
                    });
                }
                PrepStage::Editing => {
                    let question = state.revision_question.take().unwrap_or_default();
                    self.run_editing(session_id, &mut state, &question).await?;
                    stage = PrepStage::AwaitingRevision;
                }
                PrepStage::Done => {
                    info!("✓ 会话 {} 修订结束，文档定稿", session_id);
                    return Ok(PrepOutcome::Finished {
                        content: state.revision,
                    });
                }
            }
        }
    }

    /// 阶段: 逐源抽取事实
    async fn run_extract(&self, state: &mut PreparationState) -> Result<()> {
        info!("📑 开始抽取，共 {} 份资料", state.source_texts.len());
        let source_texts = state.source_texts.clone();
        for (source_id, text) in &source_texts {
            let extraction = self
                .extractor
                .extract_source(source_id, text, &state.sections)
                .await?;
            state.source_extractions.insert(source_id.clone(), extraction);
        }

        // 抽到公司名后改写 "Why Company A" 类章节标题
        let merged: Vec<SourceExtraction> =
            state.source_extractions.values().cloned().collect();
        if let Some(company) = ExtractorService::get_company_name(&merged) {
            if retitle_company_sections(&mut state.sections, &company) {
                info!("✓ 识别到公司名 \"{}\"，相关章节标题已改写", company);
            }
        }
        Ok(())
    }

    /// 阶段: 并行起草全部带指令的章节
    async fn run_draft(
        &self,
        session_id: &str,
        store: &Arc<VectorStore>,
        state: &mut PreparationState,
    ) -> Result<()> {
        let jobs = build_draft_jobs(state);
        let total = jobs.len();
        debug_assert_eq!(total, count_instructed(&state.sections));
        if total == 0 {
            warn!("⚠️ 模板里没有任何带指令的章节，起草阶段为空");
            return Ok(());
        }
        info!(
            "🚀 开始并行起草 {} 个章节 (并发上限 {})",
            total, self.max_concurrent_sections
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_sections));
        let mut handles = Vec::with_capacity(total);

        for (idx, job) in jobs.into_iter().enumerate() {
            let permit = semaphore.clone().acquire_owned().await?;
            let flow = self.section_flow.clone();
            let store = store.clone();
            let ctx = SectionCtx::new(session_id.to_string(), idx + 1, job.title.clone());
            let title = job.title.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                match flow.run(&store, &job, &ctx).await {
                    Ok(content) => Ok(content),
                    Err(e) => {
                        error!("{} ❌ 起草失败: {}", ctx, e);
                        Err(e)
                    }
                }
            });
            handles.push((title, handle));
        }

        // 按提交顺序合并结果，保证回填位置与遍历顺序一致
        let mut contents = Vec::with_capacity(total);
        let mut failed_sections = Vec::new();
        for (title, handle) in handles {
            match handle.await {
                Ok(Ok(content)) => contents.push(content),
                Ok(Err(_)) => failed_sections.push(title),
                Err(e) => {
                    error!("章节 \"{}\" 任务执行失败: {}", title, e);
                    failed_sections.push(title);
                }
            }
        }

        if !failed_sections.is_empty() {
            return Err(AppError::section_tasks_failed(failed_sections).into());
        }

        apply_drafts(&mut state.sections, contents);
        info!("✓ {} 个章节全部起草完成", total);
        Ok(())
    }

    /// 阶段: 按用户问题修订整篇文档
    async fn run_editing(
        &self,
        session_id: &str,
        state: &mut PreparationState,
        question: &str,
    ) -> Result<()> {
        info!("✏️ 会话 {} 应用整篇修订", session_id);
        let prompt = format!(
            "You are revising a complete report draft according to the user's request.\n\n\
User request: {}\n\n\
Current document:\n{}\n\n\
Respond with the complete revised document text only (no commentary), \
then the word TERMINATE.",
            question, state.revision
        );
        let response = self.generator.generate(&prompt, None).await?;
        let revised = strip_terminate(&response).trim();
        if revised.is_empty() {
            warn!("⚠️ 修订结果为空，保留上一版文档");
        } else {
            state.revision = revised.to_string();
        }
        Ok(())
    }
}

fn has_example(state: &PreparationState) -> bool {
    state
        .example_document_text
        .as_deref()
        .is_some_and(|t| !t.trim().is_empty())
}

/// 展开章节树，为每个带指令的节点构造起草任务
///
/// 任务顺序与前序遍历一致，`apply_drafts` 依赖这一顺序回填。
fn build_draft_jobs(state: &PreparationState) -> Vec<SectionDraftJob> {
    let style_guidance = state.style_profile.as_ref().map(format_style_guidance);

    walk(&state.sections)
        .filter_map(|node| {
            let instructions = node.instructions.clone()?;
            Some(SectionDraftJob {
                title: node.title.clone(),
                source: node.source.clone(),
                instructions,
                facts: facts_for_section(state, &node.title),
                style_guidance: style_guidance.clone(),
            })
        })
        .collect()
}

/// 汇总所有来源里属于该章节的事实
///
/// 标题经 `normalize_title_for_lookup` 归一后匹配，改名后的
/// "Why <公司名>" 章节仍能命中抽取时的 "Why Company A" 键。
fn facts_for_section(
    state: &PreparationState,
    title: &str,
) -> serde_json::Map<String, serde_json::Value> {
    let wanted = normalize_title_for_lookup(title);
    let mut merged = serde_json::Map::new();
    for extraction in state.source_extractions.values() {
        for (key, facts) in extraction {
            if normalize_title_for_lookup(key) == wanted {
                merged.extend(facts.clone());
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::section::{SectionInstruction, SectionMap, SectionNode};
    use indexmap::IndexMap;
    use serde_json::json;

    fn instructed(title: &str, source: &str) -> SectionNode {
        SectionNode {
            title: title.to_string(),
            source: source.to_string(),
            instructions: Some(SectionInstruction {
                objective: format!("write {}", title),
                tone: None,
                length: None,
                format: None,
            }),
            subsections: IndexMap::new(),
            content: String::new(),
        }
    }

    fn state_fixture() -> PreparationState {
        let mut sections = SectionMap::new();
        sections.insert("intro".into(), instructed("Introduction", "a"));
        sections.insert("why_company_a".into(), instructed("Why Acme", "a"));
        let mut texts = IndexMap::new();
        texts.insert("a".to_string(), "source text".to_string());
        PreparationState::new(sections, texts, None)
    }

    #[test]
    fn test_build_draft_jobs_preserves_order() {
        let state = state_fixture();
        let jobs = build_draft_jobs(&state);
        let titles: Vec<&str> = jobs.iter().map(|j| j.title.as_str()).collect();
        assert_eq!(titles, vec!["Introduction", "Why Acme"]);
    }

    #[test]
    fn test_facts_for_section_matches_renamed_title() {
        let mut state = state_fixture();
        let mut extraction = SourceExtraction::new();
        let mut facts = serde_json::Map::new();
        facts.insert("Key Point".into(), json!("support"));
        extraction.insert("Why Company A".into(), facts);
        state.source_extractions.insert("a".into(), extraction);

        // 章节已改名为 "Why Acme"，仍应命中 "Why Company A" 的事实
        let found = facts_for_section(&state, "Why Acme");
        assert_eq!(found["Key Point"], "support");
    }

    #[test]
    fn test_has_example() {
        let mut state = state_fixture();
        assert!(!has_example(&state));
        state.example_document_text = Some("   ".into());
        assert!(!has_example(&state));
        state.example_document_text = Some("Example doc".into());
        assert!(has_example(&state));
    }
}
