//! 向量化能力
//!
//! 向量化是外部黑盒能力，这里只定义接口与一个走 OpenAI 兼容
//! `/embeddings` 端点的生产实现。测试注入确定性的假实现。

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::config::Config;
use crate::error::{AppError, RetrievalError};

/// 向量化能力接口
///
/// 实现必须支持并发调用且不共享可变状态。
#[async_trait]
pub trait Embedder: Send + Sync {
    /// 把一批文本映射为同维向量，顺序与输入一致
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// OpenAI 兼容端点的向量化实现
pub struct HttpEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model_name: String,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingEntry>,
}

#[derive(Deserialize)]
struct EmbeddingEntry {
    index: usize,
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    /// 创建新的向量化客户端
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.llm_api_base_url.trim_end_matches('/').to_string(),
            api_key: config.llm_api_key.clone(),
            model_name: config.embedding_model_name.clone(),
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let endpoint = format!("{}/embeddings", self.base_url);
        debug!("向量化 {} 条文本，模型: {}", texts.len(), self.model_name);

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "model": self.model_name,
                "input": texts,
            }))
            .send()
            .await
            .map_err(|e| {
                AppError::Retrieval(RetrievalError::EmbeddingFailed {
                    endpoint: endpoint.clone(),
                    source: Box::new(e),
                })
            })?
            .error_for_status()
            .map_err(|e| {
                AppError::Retrieval(RetrievalError::EmbeddingFailed {
                    endpoint: endpoint.clone(),
                    source: Box::new(e),
                })
            })?;

        let mut parsed: EmbeddingResponse = response.json().await.map_err(|e| {
            AppError::Retrieval(RetrievalError::EmbeddingFailed {
                endpoint: endpoint.clone(),
                source: Box::new(e),
            })
        })?;

        if parsed.data.len() != texts.len() {
            return Err(AppError::Retrieval(RetrievalError::EmbeddingCountMismatch {
                expected: texts.len(),
                got: parsed.data.len(),
            })
            .into());
        }

        // 服务端按 index 标注顺序，排序后取向量
        parsed.data.sort_by_key(|e| e.index);
        Ok(parsed.data.into_iter().map(|e| e.embedding).collect())
    }
}
