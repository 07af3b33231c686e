use std::fmt;

/// 应用程序错误类型
#[derive(Debug)]
pub enum AppError {
    /// 配置错误（RAG 参数越界等）
    Config(ConfigError),
    /// 章节结构错误（模板不合法）
    Structure(StructureError),
    /// LLM 服务错误
    Llm(LlmError),
    /// 检索 / 向量化错误
    Retrieval(RetrievalError),
    /// 会话错误（挂起 / 恢复）
    Session(SessionError),
    /// 其他错误（用于包装第三方库错误）
    Other(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(e) => write!(f, "配置错误: {}", e),
            AppError::Structure(e) => write!(f, "章节结构错误: {}", e),
            AppError::Llm(e) => write!(f, "LLM错误: {}", e),
            AppError::Retrieval(e) => write!(f, "检索错误: {}", e),
            AppError::Session(e) => write!(f, "会话错误: {}", e),
            AppError::Other(msg) => write!(f, "错误: {}", msg),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(e) => Some(e),
            AppError::Structure(e) => Some(e),
            AppError::Llm(e) => Some(e),
            AppError::Retrieval(e) => Some(e),
            AppError::Session(e) => Some(e),
            AppError::Other(_) => None,
        }
    }
}

/// 配置错误
///
/// RAG 参数在构造时校验，越界立即拒绝，错误信息必须指明字段与合法区间。
#[derive(Debug)]
pub enum ConfigError {
    /// 数值参数越界
    OutOfRange {
        field: &'static str,
        value: String,
        min: String,
        max: String,
    },
    /// 环境变量解析失败
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::OutOfRange {
                field,
                value,
                min,
                max,
            } => {
                write!(
                    f,
                    "参数 {} 越界: 值 {} 不在合法区间 [{}, {}] 内",
                    field, value, min, max
                )
            }
            ConfigError::EnvVarParseFailed {
                var_name,
                value,
                expected_type,
            } => {
                write!(
                    f,
                    "环境变量 {} 解析失败: 值 '{}' 无法转换为 {}",
                    var_name, value, expected_type
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// 章节结构错误
///
/// 模板在构造章节树时校验，不合法的结构直接拒绝，绝不静默修复。
#[derive(Debug)]
pub enum StructureError {
    /// 章节标题为空
    EmptyTitle { key: String },
    /// 嵌套层级超限（防御损坏或恶意构造的模板）
    DepthExceeded { key: String, limit: usize },
}

impl fmt::Display for StructureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructureError::EmptyTitle { key } => {
                write!(f, "章节 '{}' 的标题为空", key)
            }
            StructureError::DepthExceeded { key, limit } => {
                write!(f, "章节 '{}' 嵌套层级超过上限 {}", key, limit)
            }
        }
    }
}

impl std::error::Error for StructureError {}

/// LLM 服务错误
#[derive(Debug)]
pub enum LlmError {
    /// API 调用失败
    ApiCallFailed {
        model: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 返回内容为空
    EmptyContent { model: String },
    /// 并行批次中部分章节任务彻底失败
    ///
    /// 与"章节未找到被跳过"严格区分：这里是上游生成能力本身抛错。
    SectionTasksFailed { sections: Vec<String> },
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmError::ApiCallFailed { model, source } => {
                write!(f, "LLM API调用失败 (模型: {}): {}", model, source)
            }
            LlmError::EmptyContent { model } => {
                write!(f, "LLM返回内容为空 (模型: {})", model)
            }
            LlmError::SectionTasksFailed { sections } => {
                write!(f, "以下章节的生成任务失败: {}", sections.join(", "))
            }
        }
    }
}

impl std::error::Error for LlmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LlmError::ApiCallFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 检索 / 向量化错误
#[derive(Debug)]
pub enum RetrievalError {
    /// 向量化请求失败
    EmbeddingFailed {
        endpoint: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 向量化返回数量与输入不一致
    EmbeddingCountMismatch { expected: usize, got: usize },
}

impl fmt::Display for RetrievalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetrievalError::EmbeddingFailed { endpoint, source } => {
                write!(f, "向量化请求失败 ({}): {}", endpoint, source)
            }
            RetrievalError::EmbeddingCountMismatch { expected, got } => {
                write!(f, "向量化返回数量不一致: 期望 {}, 实际 {}", expected, got)
            }
        }
    }
}

impl std::error::Error for RetrievalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RetrievalError::EmbeddingFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 会话错误
#[derive(Debug)]
pub enum SessionError {
    /// 会话不存在（或已终止）
    NotFound { session_id: String },
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::NotFound { session_id } => {
                write!(f, "会话 {} 不存在或已终止", session_id)
            }
        }
    }
}

impl std::error::Error for SessionError {}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建参数越界错误
    pub fn out_of_range(
        field: &'static str,
        value: impl fmt::Display,
        min: impl fmt::Display,
        max: impl fmt::Display,
    ) -> Self {
        AppError::Config(ConfigError::OutOfRange {
            field,
            value: value.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        })
    }

    /// 创建LLM API调用错误
    pub fn llm_api_failed(
        model: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Llm(LlmError::ApiCallFailed {
            model: model.into(),
            source: Box::new(source),
        })
    }

    /// 创建批次任务失败错误
    pub fn section_tasks_failed(sections: Vec<String>) -> Self {
        AppError::Llm(LlmError::SectionTasksFailed { sections })
    }

    /// 创建会话不存在错误
    pub fn session_not_found(session_id: impl Into<String>) -> Self {
        AppError::Session(SessionError::NotFound {
            session_id: session_id.into(),
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
