//! 请求级向量库
//!
//! 持有按资料标识打标的文本分块及其向量。分块采用带重叠的滑动窗口，
//! 跨越窗口边界的信息不会因切割丢失。检索先按范围过滤、再按余弦
//! 相似度排序，低于分数下限的片段被丢弃，最多返回 top_k 条。

use anyhow::Result;
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::RagParameters;
use crate::infrastructure::embedder::Embedder;

/// 单次向量化请求携带的分块数量上限
const EMBED_BATCH_SIZE: usize = 64;

/// 一条带向量的文本分块
#[derive(Debug, Clone)]
struct Chunk {
    source: String,
    text: String,
    embedding: Vec<f32>,
}

/// 检索范围：限定到一个或多个资料，或不限
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceScope {
    /// 整个语料
    All,
    /// 单一资料，精确匹配
    One(String),
    /// 多个资料，包含过滤
    Many(Vec<String>),
}

impl SourceScope {
    /// 按资料标识列表构造范围
    pub fn from_ids(ids: &[String]) -> Self {
        let mut ids: Vec<String> = ids
            .iter()
            .filter(|s| !s.trim().is_empty())
            .cloned()
            .collect();
        match ids.len() {
            0 => SourceScope::All,
            1 => SourceScope::One(ids.remove(0)),
            _ => SourceScope::Many(ids),
        }
    }

    fn matches(&self, source: &str) -> bool {
        match self {
            SourceScope::All => true,
            SourceScope::One(id) => source == id,
            SourceScope::Many(ids) => ids.iter().any(|id| id == source),
        }
    }
}

/// 一条检索结果
#[derive(Debug, Clone)]
pub struct Snippet {
    pub source: String,
    pub text: String,
    pub score: f32,
}

/// 请求级向量库
///
/// 每个独立请求新建一个实例，装载该请求的资料后只读使用。
pub struct VectorStore {
    params: RagParameters,
    embedder: Arc<dyn Embedder>,
    chunks: Vec<Chunk>,
}

impl VectorStore {
    /// 创建空库
    pub fn new(params: RagParameters, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            params,
            embedder,
            chunks: Vec::new(),
        }
    }

    /// 分块并入库一组资料
    ///
    /// # 参数
    /// - `sources`: 资料标识 -> 全文
    ///
    /// # 返回
    /// 返回入库的分块总数
    pub async fn load(&mut self, sources: &IndexMap<String, String>) -> Result<usize> {
        let overlap = self.params.overlap_chars();
        let mut pending_texts = Vec::new();
        let mut pending_sources = Vec::new();

        for (id, text) in sources {
            let windows = chunk_text(text, self.params.chunk_size, overlap);
            debug!("资料 {} 切出 {} 个分块", id, windows.len());
            for w in windows {
                pending_texts.push(w);
                pending_sources.push(id.clone());
            }
        }

        // 分批向量化，避免单次请求过大
        let mut embeddings = Vec::with_capacity(pending_texts.len());
        for batch in pending_texts.chunks(EMBED_BATCH_SIZE) {
            embeddings.extend(self.embedder.embed(batch).await?);
        }

        for ((text, source), embedding) in pending_texts
            .into_iter()
            .zip(pending_sources)
            .zip(embeddings)
        {
            self.chunks.push(Chunk {
                source,
                text,
                embedding,
            });
        }

        info!(
            "✓ 语料入库完成: {} 份资料, {} 个分块 (chunk_size={}, overlap={}字符)",
            sources.len(),
            self.chunks.len(),
            self.params.chunk_size,
            overlap
        );
        Ok(self.chunks.len())
    }

    /// 按资料标识构造检索范围
    pub fn scope(&self, source_ids: &[String]) -> SourceScope {
        SourceScope::from_ids(source_ids)
    }

    /// 在给定范围内做相似度检索
    ///
    /// 结果按相似度降序，过滤掉低于分数下限的片段，最多 top_k 条。
    pub async fn search(&self, scope: &SourceScope, query: &str) -> Result<Vec<Snippet>> {
        if self.chunks.is_empty() {
            return Ok(Vec::new());
        }

        let query_embedding = self
            .embedder
            .embed(std::slice::from_ref(&query.to_string()))
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();

        let mut scored: Vec<Snippet> = self
            .chunks
            .iter()
            .filter(|c| scope.matches(&c.source))
            .map(|c| Snippet {
                source: c.source.clone(),
                text: c.text.clone(),
                score: cosine_similarity(&query_embedding, &c.embedding),
            })
            .filter(|s| s.score >= self.params.similarity_threshold)
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(self.params.top_k);

        debug!(
            "检索 '{}' 命中 {} 条 (范围: {:?})",
            crate::utils::logging::truncate_text(query, 40),
            scored.len(),
            scope
        );
        Ok(scored)
    }

    /// 清空整个语料
    ///
    /// 顺序复用同一实例的调用方必须在装载新请求的资料前清空，
    /// 防止跨请求串料。
    pub fn clear(&mut self) {
        self.chunks.clear();
    }

    /// 当前分块数量
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// 带重叠的滑动窗口分块（按字符）
fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }
    if chars.len() <= chunk_size {
        return vec![text.to_string()];
    }

    // 步长至少为 1，防止 overlap == chunk_size 时原地踏步
    let step = chunk_size.saturating_sub(overlap).max(1);
    let mut windows = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        windows.push(chars[start..end].iter().collect::<String>());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    windows
}

/// 余弦相似度，零向量按 0 处理
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// 确定性的假向量化器：向量由文本里出现的关键词决定
    struct KeywordEmbedder;

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let t = t.to_lowercase();
                    vec![
                        if t.contains("pricing") { 1.0 } else { 0.0 },
                        if t.contains("timeline") { 1.0 } else { 0.0 },
                        if t.contains("risk") { 1.0 } else { 0.0 },
                        0.1,
                    ]
                })
                .collect())
        }
    }

    fn params() -> RagParameters {
        RagParameters::new(0.5, 5, 256, 10).unwrap()
    }

    #[test]
    fn test_chunk_text_overlap_windows() {
        let text: String = std::iter::repeat('x').take(1000).collect();
        let windows = chunk_text(&text, 512, 76);
        // 步长 436: [0,512) [436,948) [872,1000)
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0].chars().count(), 512);
        assert_eq!(windows[1].chars().count(), 512);
        assert_eq!(windows[2].chars().count(), 128);
    }

    #[test]
    fn test_chunk_text_short_input_single_window() {
        let windows = chunk_text("short", 512, 76);
        assert_eq!(windows, vec!["short".to_string()]);
    }

    #[tokio::test]
    async fn test_scope_filtering_and_threshold() {
        let mut store = VectorStore::new(params(), Arc::new(KeywordEmbedder));
        let mut sources = IndexMap::new();
        sources.insert("a.txt".to_string(), "pricing details here".to_string());
        sources.insert("b.txt".to_string(), "timeline details here".to_string());
        store.load(&sources).await.unwrap();
        assert_eq!(store.len(), 2);

        // 单资料范围：精确过滤
        let scope = store.scope(&["a.txt".to_string()]);
        let hits = store.search(&scope, "pricing question").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source, "a.txt");

        // 不限范围但分数下限过滤掉不相关资料
        let hits = store.search(&SourceScope::All, "pricing question").await.unwrap();
        assert!(hits.iter().all(|s| s.score >= 0.5));
        assert_eq!(hits[0].source, "a.txt");
    }

    #[tokio::test]
    async fn test_clear_empties_corpus() {
        let mut store = VectorStore::new(params(), Arc::new(KeywordEmbedder));
        let mut sources = IndexMap::new();
        sources.insert("a.txt".to_string(), "risk register".to_string());
        store.load(&sources).await.unwrap();
        store.clear();
        assert!(store.is_empty());
        let hits = store.search(&SourceScope::All, "risk").await.unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_scope_from_ids() {
        assert_eq!(SourceScope::from_ids(&[]), SourceScope::All);
        assert_eq!(
            SourceScope::from_ids(&["".to_string()]),
            SourceScope::All,
            "空串表示不限来源"
        );
        assert_eq!(
            SourceScope::from_ids(&["a".to_string()]),
            SourceScope::One("a".to_string())
        );
        assert!(matches!(
            SourceScope::from_ids(&["a".to_string(), "b".to_string()]),
            SourceScope::Many(_)
        ));
    }
}
