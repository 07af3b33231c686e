//! 基础设施层（Infrastructure Layer）
//!
//! ## 职责
//!
//! 本层持有检索语料这一共享资源，只向上暴露能力：
//!
//! - `VectorStore` - 语料的唯一所有者，提供分块、入库、限定范围的相似度检索
//! - `Embedder` - 向量化能力的抽象接口，生产实现走 OpenAI 兼容端点
//!
//! ## 生命周期
//!
//! 语料按请求建库：每个独立的生成 / 改写请求由编排层新建一个
//! `VectorStore` 实例并显式传递，请求之间互不可见。
//! 同一实例被多个并发请求共享属未定义行为，不做支持。

pub mod embedder;
pub mod vector_store;

pub use embedder::{Embedder, HttpEmbedder};
pub use vector_store::{Snippet, SourceScope, VectorStore};
