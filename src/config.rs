//! 程序配置文件

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 同时起草 / 改写的章节数量上限
    pub max_concurrent_sections: usize,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 模板文件路径（演示程序用）
    pub template_path: String,
    /// 参考资料目录（演示程序用，读取其中的 .txt 文件）
    pub source_folder: String,
    /// 报告输出路径（演示程序用）
    pub output_path: String,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    // --- 向量化配置 ---
    pub embedding_model_name: String,
    // --- RAG 配置 ---
    pub rag_preset: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_sections: 8,
            verbose_logging: false,
            template_path: "templates/proposal_template.json".to_string(),
            source_folder: "sources".to_string(),
            output_path: "outputs/report.txt".to_string(),
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4.1".to_string(),
            embedding_model_name: "text-embedding-3-small".to_string(),
            rag_preset: "default".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            max_concurrent_sections: std::env::var("MAX_CONCURRENT_SECTIONS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_concurrent_sections),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.verbose_logging),
            template_path: std::env::var("TEMPLATE_PATH").unwrap_or(default.template_path),
            source_folder: std::env::var("SOURCE_FOLDER").unwrap_or(default.source_folder),
            output_path: std::env::var("OUTPUT_PATH").unwrap_or(default.output_path),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
            embedding_model_name: std::env::var("EMBEDDING_MODEL_NAME").unwrap_or(default.embedding_model_name),
            rag_preset: std::env::var("RAG_PRESET").unwrap_or(default.rag_preset),
        }
    }
}

/// 检索参数
///
/// 所有字段在构造时校验，越界直接返回 `ConfigError::OutOfRange`。
/// `chunk_size` 只允许 {256, 512, 1024}，区间内的其他值就近吸附。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RagParameters {
    /// 相似度下限，低于该分数的片段被过滤（0.0-1.0）
    pub similarity_threshold: f32,
    /// 检索返回的片段数量上限（1-50）
    pub top_k: usize,
    /// 文本分块大小，按字符计（{256, 512, 1024}）
    pub chunk_size: usize,
    /// 相邻分块的重叠百分比（0-50）
    pub overlap: usize,
}

/// chunk_size 的离散合法值
const CHUNK_SIZES: [usize; 3] = [256, 512, 1024];

impl RagParameters {
    /// 构造并校验检索参数
    pub fn new(
        similarity_threshold: f32,
        top_k: usize,
        chunk_size: usize,
        overlap: usize,
    ) -> AppResult<Self> {
        if !(0.0..=1.0).contains(&similarity_threshold) {
            return Err(AppError::out_of_range(
                "similarity_threshold",
                similarity_threshold,
                0.0,
                1.0,
            ));
        }
        if !(1..=50).contains(&top_k) {
            return Err(AppError::out_of_range("top_k", top_k, 1, 50));
        }
        if !(100..=2000).contains(&chunk_size) {
            return Err(AppError::out_of_range("chunk_size", chunk_size, 100, 2000));
        }
        if overlap > 50 {
            return Err(AppError::out_of_range("overlap", overlap, 0, 50));
        }
        Ok(Self {
            similarity_threshold,
            top_k,
            chunk_size: snap_chunk_size(chunk_size),
            overlap,
        })
    }

    /// 重叠百分比换算成绝对字符数（向下取整）
    pub fn overlap_chars(&self) -> usize {
        self.chunk_size * self.overlap / 100
    }
}

impl Default for RagParameters {
    fn default() -> Self {
        RagPreset::get_preset("default")
    }
}

/// 区间内但不是离散合法值的 chunk_size 就近吸附
fn snap_chunk_size(value: usize) -> usize {
    if CHUNK_SIZES.contains(&value) {
        return value;
    }
    *CHUNK_SIZES
        .iter()
        .min_by_key(|c| c.abs_diff(value))
        .unwrap_or(&512)
}

/// RAG 预设
///
/// 按场景命名的一组参数组合，未知名称回落到 default。
pub struct RagPreset;

impl RagPreset {
    fn default_preset() -> RagParameters {
        RagParameters {
            similarity_threshold: 0.6,
            top_k: 5,
            chunk_size: 512,
            overlap: 15,
        }
    }

    fn high_precision() -> RagParameters {
        RagParameters {
            similarity_threshold: 0.8,
            top_k: 3,
            chunk_size: 256,
            overlap: 10,
        }
    }

    fn comprehensive() -> RagParameters {
        RagParameters {
            similarity_threshold: 0.5,
            top_k: 10,
            chunk_size: 1024,
            overlap: 20,
        }
    }

    fn fast() -> RagParameters {
        RagParameters {
            similarity_threshold: 0.7,
            top_k: 3,
            chunk_size: 256,
            overlap: 10,
        }
    }

    /// 按名称取预设，未知名称返回 default
    pub fn get_preset(name: &str) -> RagParameters {
        match name.to_lowercase().as_str() {
            "high_precision" => Self::high_precision(),
            "comprehensive" => Self::comprehensive(),
            "fast" => Self::fast(),
            _ => Self::default_preset(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_high_precision() {
        let p = RagPreset::get_preset("high_precision");
        assert_eq!(p.similarity_threshold, 0.8);
        assert_eq!(p.top_k, 3);
        assert_eq!(p.chunk_size, 256);
        assert_eq!(p.overlap, 10);
    }

    #[test]
    fn test_preset_unknown_falls_back_to_default() {
        let p = RagPreset::get_preset("no_such_preset");
        assert_eq!(p, RagPreset::get_preset("default"));
        assert_eq!(p.chunk_size, 512);
    }

    #[test]
    fn test_chunk_size_snaps_to_nearest() {
        // 区间内的非离散值就近吸附
        let p = RagParameters::new(0.6, 5, 300, 15).unwrap();
        assert_eq!(p.chunk_size, 256);
        let p = RagParameters::new(0.6, 5, 900, 15).unwrap();
        assert_eq!(p.chunk_size, 1024);
        // 离散合法值保持不变
        let p = RagParameters::new(0.6, 5, 512, 15).unwrap();
        assert_eq!(p.chunk_size, 512);
    }

    #[test]
    fn test_out_of_range_rejected_with_field_name() {
        let err = RagParameters::new(1.5, 5, 512, 15).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("similarity_threshold"), "错误应指明字段: {}", msg);
        assert!(msg.contains('1') && msg.contains('0'), "错误应指明区间: {}", msg);

        let err = RagParameters::new(0.6, 0, 512, 15).unwrap_err();
        assert!(err.to_string().contains("top_k"));

        let err = RagParameters::new(0.6, 5, 64, 15).unwrap_err();
        assert!(err.to_string().contains("chunk_size"));

        let err = RagParameters::new(0.6, 5, 512, 80).unwrap_err();
        assert!(err.to_string().contains("overlap"));
    }

    #[test]
    fn test_overlap_chars() {
        let p = RagParameters::new(0.6, 5, 512, 15).unwrap();
        assert_eq!(p.overlap_chars(), 76);
        let p = RagParameters::new(0.6, 5, 1024, 25).unwrap();
        assert_eq!(p.overlap_chars(), 256);
    }
}
