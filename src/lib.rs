//! # Report Drafter
//!
//! 一个基于检索增强生成的报告起草与修订库
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（向量语料），只暴露能力
//! - `Embedder` / `HttpEmbedder` - 文本向量化能力
//! - `VectorStore` - 请求级语料库，分块 / 入库 / 范围检索
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个输入
//! - `LlmService` - 文本生成能力（OpenAI 兼容接口）
//! - `ExtractorService` - 逐源事实抽取能力
//! - `StyleExtractorService` - 写作风格画像能力
//! - `document_parser` - 标题启发式的文档结构解析
//! - `response_normalizer` - 生成输出的 JSON 恢复
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个章节"的完整处理流程
//! - `SectionCtx` - 上下文封装（session_id + 章节索引）
//! - `SectionFlow` - 起草流程（查询 → 检索 → 起草）
//! - `SectionEditFlow` - 改写流程（结构分析 → 检索 → 改写 → 漂移检查）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/engine` - 报告引擎，装配能力并管理挂起会话
//! - `orchestrator/preparation` - 报告准备状态机，含挂起/恢复
//! - `orchestrator/targeted_editing` - 定向改写流程，并发改写与重组
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::{Config, RagParameters, RagPreset};
pub use error::{AppError, AppResult};
pub use infrastructure::{Embedder, HttpEmbedder, Snippet, SourceScope, VectorStore};
pub use models::section::{SectionInstruction, SectionMap, SectionNode};
pub use models::state::{EditStats, PrepStage, SectionChange};
pub use models::{load_source_folder, load_template};
pub use orchestrator::{PrepOutcome, ReportEngine};
pub use services::{LlmService, TextGenerator};
pub use workflow::{SectionCtx, SectionEditFlow, SectionFlow};
