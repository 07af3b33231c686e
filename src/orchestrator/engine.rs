//! 报告引擎 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个库的入口，持有全部稀缺能力并管理会话生命周期。
//!
//! ## 核心功能
//!
//! 1. **能力装配**：构造 LLM 客户端与向量化端点（或接受注入的替身）
//! 2. **会话管理**：挂起的准备工作流按会话 ID 存取检查点
//! 3. **请求级语料**：每次请求新建 VectorStore，请求之间不共享语料
//! 4. **向下委托**：准备流程交 PreparationGraph，改写交 TargetedEditingFlow

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use indexmap::IndexMap;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::{Config, RagParameters, RagPreset};
use crate::error::AppError;
use crate::infrastructure::{Embedder, HttpEmbedder, VectorStore};
use crate::models::section::{validate_sections, SectionMap};
use crate::models::state::{
    Checkpoint, EditStats, PreparationState, PrepStage, SectionChange, TargetedEditState,
};
use crate::orchestrator::preparation::{PrepOutcome, PreparationGraph};
use crate::orchestrator::targeted_editing::{assemble_document, TargetedEditingFlow};
use crate::services::{LlmService, TextGenerator};

/// 报告引擎
///
/// 唯一持有生成与向量化能力的模块；
/// 流程层与服务层只通过注入的 trait 使用这些能力。
pub struct ReportEngine {
    config: Config,
    embedder: Arc<dyn Embedder>,
    preparation: PreparationGraph,
    targeted: TargetedEditingFlow,
    /// 挂起的准备会话：会话 ID -> 检查点
    sessions: Mutex<HashMap<String, Checkpoint>>,
}

impl ReportEngine {
    /// 按配置构造引擎（真实 LLM + 真实向量化端点）
    pub fn new(config: Config) -> Self {
        let generator: Arc<dyn TextGenerator> = Arc::new(LlmService::new(&config));
        let embedder: Arc<dyn Embedder> = Arc::new(HttpEmbedder::new(&config));
        Self::with_capabilities(config, generator, embedder)
    }

    /// 注入自定义能力构造引擎（测试替身走这里）
    pub fn with_capabilities(
        config: Config,
        generator: Arc<dyn TextGenerator>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            preparation: PreparationGraph::new(generator.clone(), &config),
            targeted: TargetedEditingFlow::new(generator, &config),
            embedder,
            sessions: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// 发起一次报告准备，跑到挂起点并返回当前整篇文本
    ///
    /// 返回后会话处于 AwaitingRevision，凭 `resume_revision` 续跑。
    pub async fn prepare(
        &self,
        session_id: &str,
        sections: SectionMap,
        source_texts: IndexMap<String, String>,
        example_document_text: Option<String>,
        rag: Option<RagParameters>,
    ) -> Result<String> {
        validate_sections(&sections)?;

        let store = self.build_store(rag, &source_texts).await?;
        let state = PreparationState::new(sections, source_texts, example_document_text);
        let checkpoint = Checkpoint {
            stage: PrepStage::Extract,
            state,
        };

        info!("🚀 会话 {} 开始报告准备", session_id);
        match self.preparation.run(session_id, &store, checkpoint).await? {
            PrepOutcome::Suspended {
                content,
                checkpoint,
            } => {
                self.sessions
                    .lock()
                    .await
                    .insert(session_id.to_string(), checkpoint);
                Ok(content)
            }
            PrepOutcome::Finished { content } => Ok(content),
        }
    }

    /// 恢复挂起的会话
    ///
    /// - `content` 非空白：调用方在外部改过的整篇文本，覆盖会话里的当前版
    /// - `question` 为空白：视为"修订结束"，会话删除，返回定稿
    /// - 否则执行一轮整篇修订，会话回到挂起点，返回修订后的文本
    pub async fn resume_revision(
        &self,
        session_id: &str,
        question: &str,
        content: &str,
    ) -> Result<String> {
        let mut checkpoint = self
            .sessions
            .lock()
            .await
            .remove(session_id)
            .ok_or_else(|| AppError::session_not_found(session_id))?;

        if !content.trim().is_empty() {
            checkpoint.state.revision = content.to_string();
        }

        if question.trim().is_empty() {
            info!("✓ 会话 {} 修订结束，定稿交付", session_id);
            return Ok(checkpoint.state.revision);
        }

        checkpoint.state.revision_question = Some(question.to_string());
        checkpoint.stage = PrepStage::Editing;

        // 修订阶段只改写整篇文本，不做检索，空语料即可
        let params = RagPreset::get_preset(&self.config.rag_preset);
        let store = Arc::new(VectorStore::new(params, self.embedder.clone()));

        match self.preparation.run(session_id, &store, checkpoint).await? {
            PrepOutcome::Suspended {
                content,
                checkpoint,
            } => {
                self.sessions
                    .lock()
                    .await
                    .insert(session_id.to_string(), checkpoint);
                Ok(content)
            }
            PrepOutcome::Finished { content } => Ok(content),
        }
    }

    /// 执行一次定向改写，返回重组后的整篇文档与统计
    ///
    /// `output_path` 非空时同时把文档写到该文件。
    pub async fn targeted_edit(
        &self,
        session_id: &str,
        example_document_text: String,
        reference_texts: IndexMap<String, String>,
        section_changes: Vec<SectionChange>,
        output_path: String,
        rag: Option<RagParameters>,
    ) -> Result<(String, EditStats)> {
        let store = self.build_store(rag, &reference_texts).await?;
        let state = TargetedEditState::new(
            example_document_text,
            reference_texts,
            section_changes,
            output_path,
        );

        info!("🚀 会话 {} 开始定向改写", session_id);
        let state = self.targeted.run(session_id, &store, state).await?;
        let document = assemble_document(&state);

        if !state.output_path.trim().is_empty() {
            tokio::fs::write(&state.output_path, &document).await?;
            info!("💾 改写结果已写入 {}", state.output_path);
        }
        Ok((document, state.stats))
    }

    /// 当前挂起的会话数（观测用）
    pub async fn pending_sessions(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// 新建请求级语料库并装载资料
    async fn build_store(
        &self,
        rag: Option<RagParameters>,
        sources: &IndexMap<String, String>,
    ) -> Result<Arc<VectorStore>> {
        let params = rag.unwrap_or_else(|| RagPreset::get_preset(&self.config.rag_preset));
        let mut store = VectorStore::new(params, self.embedder.clone());
        if sources.is_empty() {
            warn!("⚠️ 没有任何参考资料，检索将始终为空");
        } else {
            store.load(sources).await?;
        }
        Ok(Arc::new(store))
    }
}
