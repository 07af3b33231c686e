//! 模板与资料加载器
//!
//! 报告结构以 JSON 模板描述：键 -> {title, source, instructions, subsections}。
//! 加载后立即做结构校验，坏模板在入口处拒绝。

use anyhow::{Context, Result};
use indexmap::IndexMap;
use std::path::Path;
use tracing::{info, warn};

use crate::models::section::{validate_sections, SectionMap};
use crate::utils::text::clean_extracted_text;

/// 从 JSON 模板文件加载章节树
///
/// # 参数
/// - `path`: 模板文件路径
///
/// # 返回
/// 返回校验通过的章节树
pub async fn load_template(path: impl AsRef<Path>) -> Result<SectionMap> {
    let path = path.as_ref();
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("无法读取模板文件: {}", path.display()))?;

    let sections: SectionMap = serde_json::from_str(&raw)
        .with_context(|| format!("模板 JSON 解析失败: {}", path.display()))?;

    validate_sections(&sections)?;

    info!("✓ 模板加载完成: {} 个顶层章节", sections.len());
    Ok(sections)
}

/// 读取目录下的全部 .txt 参考资料
///
/// 文件名作为资料标识，内容统一清洗后返回。目录里混入的其他文件会被跳过。
pub async fn load_source_folder(folder: impl AsRef<Path>) -> Result<IndexMap<String, String>> {
    let folder = folder.as_ref();
    let mut entries = tokio::fs::read_dir(folder)
        .await
        .with_context(|| format!("无法读取资料目录: {}", folder.display()))?;

    let mut sources = IndexMap::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("txt") {
            continue;
        }
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n.to_string(),
            None => continue,
        };
        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => {
                let text = clean_extracted_text(&raw);
                info!("✓ 已读取资料 {} ({} 字符)", name, text.chars().count());
                sources.insert(name, text);
            }
            Err(e) => {
                warn!("⚠️ 读取资料 {} 失败，跳过: {}", name, e);
            }
        }
    }

    // 文件系统枚举顺序不稳定，按名称排序保证可复现
    sources.sort_keys();
    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_template_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("template.json");
        let template = r#"{
            "executive_summary": {
                "title": "Executive Summary",
                "source": "company.txt",
                "instructions": {
                    "objective": "Summarize the proposal",
                    "tone": "formal"
                }
            },
            "approach": {
                "title": "Approach",
                "subsections": {
                    "methodology": {
                        "title": "Methodology",
                        "source": "rfp.txt",
                        "instructions": { "objective": "Describe the methodology" }
                    }
                }
            }
        }"#;
        tokio::fs::write(&path, template).await.unwrap();

        let sections = load_template(&path).await.unwrap();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections["executive_summary"].title, "Executive Summary");
        assert!(sections["approach"].instructions.is_none(), "缺省指令应为结构占位");
        assert_eq!(
            sections["approach"].subsections["methodology"].source,
            "rfp.txt"
        );
    }

    #[tokio::test]
    async fn test_load_template_rejects_empty_title() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        tokio::fs::write(&path, r#"{ "s": { "title": "  " } }"#)
            .await
            .unwrap();
        assert!(load_template(&path).await.is_err());
    }

    #[tokio::test]
    async fn test_load_source_folder_reads_only_txt() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("b.txt"), "beta content")
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("a.txt"), "alpha content")
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("ignore.pdf"), "binary")
            .await
            .unwrap();

        let sources = load_source_folder(dir.path()).await.unwrap();
        let names: Vec<&String> = sources.keys().collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
    }
}
