//! 定向改写工作流 - 编排层
//!
//! ## 职责
//!
//! 驱动"解析范例 -> 并行改写指定章节 -> 重组整篇"的线性流程。
//! 未被指名的章节原文逐字节保留，改写只影响命中的章节。
//!
//! ## 核心功能
//!
//! 1. **范例解析**：标题启发式切分 + 显示标题还原
//! 2. **模糊定位**：用户给的章节名按归一化子串匹配，命不中则告警跳过
//! 3. **并发改写**：Semaphore 限流 + 按请求顺序合并
//! 4. **重组**：按解析顺序拼回整篇，统计改动情况

use std::sync::Arc;

use anyhow::Result;
use indexmap::IndexMap;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::AppError;
use crate::infrastructure::VectorStore;
use crate::models::state::{ParsedSection, SectionChange, SectionEditJob, TargetedEditState};
use crate::services::{parse_example_sections, TextGenerator};
use crate::utils::text::normalize_section_name;
use crate::workflow::{SectionCtx, SectionEditFlow};

/// 定向改写工作流
pub struct TargetedEditingFlow {
    edit_flow: Arc<SectionEditFlow>,
    max_concurrent_sections: usize,
}

impl TargetedEditingFlow {
    pub fn new(generator: Arc<dyn TextGenerator>, config: &Config) -> Self {
        Self {
            edit_flow: Arc::new(SectionEditFlow::new(generator, config.verbose_logging)),
            max_concurrent_sections: config.max_concurrent_sections,
        }
    }

    /// 执行完整的定向改写流程，返回终态
    pub async fn run(
        &self,
        session_id: &str,
        store: &Arc<VectorStore>,
        mut state: TargetedEditState,
    ) -> Result<TargetedEditState> {
        // ========== 阶段 1: 解析范例文档 ==========
        state.example_sections = parse_example_sections(&state.example_document_text);
        state.stats.total_sections = state.example_sections.len();
        info!(
            "📄 范例文档解析出 {} 个章节",
            state.example_sections.len()
        );

        // ========== 阶段 2: 定位改写目标 ==========
        let mut resolved: Vec<(String, SectionChange)> = Vec::new();
        for change in &state.section_changes {
            match resolve_section_key(&state.example_sections, &change.section_name) {
                Some(key) => resolved.push((key, change.clone())),
                None => warn!(
                    "⚠️ 章节 \"{}\" 在范例文档中找不到对应内容，跳过该条改写",
                    change.section_name
                ),
            }
        }

        // ========== 阶段 3: 并行改写 ==========
        let allowed_sources: Vec<String> = state.reference_texts.keys().cloned().collect();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_sections));
        let mut handles = Vec::with_capacity(resolved.len());

        for (idx, (key, change)) in resolved.into_iter().enumerate() {
            let section = &state.example_sections[&key];
            let job = SectionEditJob {
                section_title: section.title.clone(),
                original_content: section.content.clone(),
                user_direction: change.user_direction.clone(),
                full_document_context: state.example_document_text.clone(),
                allowed_sources: allowed_sources.clone(),
            };
            let permit = semaphore.clone().acquire_owned().await?;
            let flow = self.edit_flow.clone();
            let store = store.clone();
            let ctx = SectionCtx::new(session_id.to_string(), idx + 1, job.section_title.clone());

            let handle = tokio::spawn(async move {
                let _permit = permit;
                match flow.run(&store, &job, &ctx).await {
                    Ok(outcome) => Ok(outcome),
                    Err(e) => {
                        error!("{} ❌ 改写失败: {}", ctx, e);
                        Err(e)
                    }
                }
            });
            handles.push((key, handle));
        }

        // 按请求顺序合并。生成输出不可用在流程层已回退为原文；
        // 走到这里的 Err 是上游能力本身抛错，必须上抛，
        // 绝不能伪装成"未改动"与"未命中"混为一谈
        let mut failed_sections = Vec::new();
        for (key, handle) in handles {
            match handle.await {
                Ok(Ok(outcome)) if outcome.modified => {
                    state.modified_sections.insert(
                        key,
                        ParsedSection {
                            title: outcome.title,
                            content: outcome.content,
                        },
                    );
                }
                Ok(Ok(_)) => {
                    info!("章节 \"{}\" 未发生实际改动", key);
                }
                Ok(Err(_)) => {
                    failed_sections.push(state.example_sections[&key].title.clone());
                }
                Err(e) => {
                    error!("章节 \"{}\" 任务执行失败: {}", key, e);
                    failed_sections.push(state.example_sections[&key].title.clone());
                }
            }
        }

        if !failed_sections.is_empty() {
            return Err(AppError::section_tasks_failed(failed_sections).into());
        }

        // ========== 阶段 4: 重组 ==========
        state.stats.modified = state.modified_sections.len();
        state.stats.unchanged = state.stats.total_sections - state.stats.modified;
        info!(
            "📊 定向改写完成: 共 {} 章节, 改写 {}, 保留 {}",
            state.stats.total_sections, state.stats.modified, state.stats.unchanged
        );
        Ok(state)
    }
}

/// 按归一化名称在解析出的章节里定位目标
///
/// 先精确匹配，再做双向子串匹配；多个候选时按文档顺序取第一个。
pub fn resolve_section_key(
    sections: &IndexMap<String, ParsedSection>,
    requested: &str,
) -> Option<String> {
    let wanted = normalize_section_name(requested);
    if wanted.is_empty() {
        return None;
    }
    if sections.contains_key(&wanted) {
        return Some(wanted);
    }
    sections
        .keys()
        .find(|key| key.contains(&wanted) || wanted.contains(key.as_str()))
        .cloned()
}

/// 把章节按解析顺序拼回整篇文档
///
/// 被改写的章节替换为新内容，其余章节原文逐字节保留。
pub fn assemble_document(state: &TargetedEditState) -> String {
    state
        .example_sections
        .iter()
        .map(|(key, section)| {
            let current = state.modified_sections.get(key).unwrap_or(section);
            if current.content.trim().is_empty() {
                current.title.clone()
            } else {
                format!("{}\n\n{}", current.title, current.content)
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sections_fixture() -> IndexMap<String, ParsedSection> {
        let mut map = IndexMap::new();
        map.insert(
            "executive_summary".to_string(),
            ParsedSection {
                title: "Executive Summary".to_string(),
                content: "summary body".to_string(),
            },
        );
        map.insert(
            "scope_of_work".to_string(),
            ParsedSection {
                title: "Scope Of Work".to_string(),
                content: "scope body".to_string(),
            },
        );
        map
    }

    #[test]
    fn test_resolve_exact_and_fuzzy() {
        let sections = sections_fixture();
        assert_eq!(
            resolve_section_key(&sections, "Executive Summary"),
            Some("executive_summary".to_string())
        );
        // 子串匹配：用户只说 "scope"
        assert_eq!(
            resolve_section_key(&sections, "scope"),
            Some("scope_of_work".to_string())
        );
        // 反向子串：用户说得比实际标题更长
        assert_eq!(
            resolve_section_key(&sections, "The Scope of Work Section"),
            Some("scope_of_work".to_string())
        );
        assert_eq!(resolve_section_key(&sections, "missing part"), None);
        assert_eq!(resolve_section_key(&sections, "  "), None);
    }

    #[test]
    fn test_assemble_document_replaces_only_modified() {
        let mut state = TargetedEditState::new(
            String::new(),
            IndexMap::new(),
            Vec::new(),
            String::new(),
        );
        state.example_sections = sections_fixture();
        state.modified_sections.insert(
            "scope_of_work".to_string(),
            ParsedSection {
                title: "Scope Of Work".to_string(),
                content: "revised scope".to_string(),
            },
        );
        let doc = assemble_document(&state);
        assert!(doc.contains("Executive Summary\n\nsummary body"));
        assert!(doc.contains("Scope Of Work\n\nrevised scope"));
        assert!(!doc.contains("scope body"));
    }
}
