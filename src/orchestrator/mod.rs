//! 编排层 - 批量调度与资源管理
//!
//! ## 职责
//!
//! 顶层编排：装配能力、管理会话、并发调度章节级任务。
//! - `engine`: 库入口，持有 LLM 客户端与向量化端点，管理挂起会话
//! - `preparation`: 报告准备状态机（抽取 / 风格 / 起草 / 修订）
//! - `targeted_editing`: 定向改写线性流程（解析 / 改写 / 重组）
//!
//! 单个章节的细节由 workflow 层处理，这里只做展开与合并。

pub mod engine;
pub mod preparation;
pub mod targeted_editing;

pub use engine::ReportEngine;
pub use preparation::{PrepOutcome, PreparationGraph};
pub use targeted_editing::{assemble_document, TargetedEditingFlow};
