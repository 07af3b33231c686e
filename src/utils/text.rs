//! 文本规整工具
//!
//! 提供章节标题归一化与提取文本清洗的纯函数。
//! 这里不做任何生成调用，保证确定性、可单测。

use regex::Regex;
use std::sync::OnceLock;

/// "Why ..." 类章节在数据查找时统一映射到的规范键
pub const COMPANY_JUSTIFICATION_KEY: &str = "Why Company A";

fn numbering_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+(\.\d+)*\.?\s*").expect("编号前缀正则不合法"))
}

fn non_word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\s-]").expect("非词字符正则不合法"))
}

fn separator_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[-\s]+").expect("分隔符正则不合法"))
}

/// 章节名归一化为 snake_case 键
///
/// 例："1.2 Methodology" -> "methodology"，"Executive Summary" -> "executive_summary"。
/// 幂等：对已归一化的键再次调用结果不变。
pub fn normalize_section_name(name: &str) -> String {
    let name = numbering_prefix_re().replace(name.trim(), "");
    let name = name.to_lowercase();
    let name = non_word_re().replace_all(&name, "");
    let name = separator_re().replace_all(&name, "_");
    name.trim_matches('_').to_string()
}

/// snake_case 键还原为 Title Case 显示标题
///
/// 例："executive_summary" -> "Executive Summary"
pub fn denormalize_section_name(key: &str) -> String {
    key.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// 数据查找用的标题归一化
///
/// 抽取阶段产出的事实按章节标题建键。章节改名后（如得知公司名后
/// "Why Company A" 改为 "Why Acme"）仍需命中原键，因此所有
/// "Why ..." 开头的标题统一映射到规范键。
pub fn normalize_title_for_lookup(title: &str) -> String {
    let lower = title.trim().to_lowercase();
    if lower.starts_with("why ") {
        return COMPANY_JUSTIFICATION_KEY.to_string();
    }
    title.to_string()
}

/// 清洗提取文本
///
/// - 统一常见 unicode 标点（弯引号、长短破折号、省略号）
/// - 合并被断开的行，多余空行压成单个换行
/// - 压缩连续空白
pub fn clean_extracted_text(text: &str) -> String {
    static PARA_BREAK: OnceLock<Regex> = OnceLock::new();
    static SPACES: OnceLock<Regex> = OnceLock::new();

    let mut text = text.to_string();
    for (old, new) in [
        ('\u{2019}', "'"),
        ('\u{2018}', "'"),
        ('\u{201c}', "\""),
        ('\u{201d}', "\""),
        ('\u{2013}', "-"),
        ('\u{2026}', "..."),
    ] {
        text = text.replace(old, new);
    }
    text = text.replace('\u{2014}', "--");

    // 空行是段落边界；段落内的孤立换行视为断行，并回空格
    let para_break = PARA_BREAK.get_or_init(|| Regex::new(r"\n{2,}").expect("空行正则不合法"));
    let spaces = SPACES.get_or_init(|| Regex::new(r"\s+").expect("空白正则不合法"));
    para_break
        .split(&text)
        .map(|p| spaces.replace_all(p.trim(), " ").into_owned())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_numbering() {
        assert_eq!(normalize_section_name("1.1 Scope of Work"), "scope_of_work");
        assert_eq!(normalize_section_name("1.2 Methodology"), "methodology");
        assert_eq!(normalize_section_name("3. Risk Assessment"), "risk_assessment");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for title in ["Executive Summary", "1.1 Scope of Work", "Why Acme?", "main_content"] {
            let once = normalize_section_name(title);
            assert_eq!(normalize_section_name(&once), once, "归一化应幂等: {}", title);
        }
    }

    #[test]
    fn test_denormalize() {
        assert_eq!(denormalize_section_name("executive_summary"), "Executive Summary");
        assert_eq!(denormalize_section_name("scope_of_work"), "Scope Of Work");
    }

    #[test]
    fn test_why_titles_map_to_canonical_key() {
        assert_eq!(normalize_title_for_lookup("Why Acme Corp"), COMPANY_JUSTIFICATION_KEY);
        assert_eq!(normalize_title_for_lookup("why us"), COMPANY_JUSTIFICATION_KEY);
        assert_eq!(normalize_title_for_lookup("Executive Summary"), "Executive Summary");
    }

    #[test]
    fn test_clean_extracted_text() {
        let raw = "It\u{2019}s  a \u{201c}test\u{201d}\nbroken line\n\n\nnext para";
        let cleaned = clean_extracted_text(raw);
        assert_eq!(cleaned, "It's a \"test\" broken line\nnext para");
    }
}
