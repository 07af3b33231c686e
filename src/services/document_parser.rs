//! 文档结构解析 - 业务能力层
//!
//! 按标题启发式把自由文本切成"章节名 -> 正文"的有序映射。
//! 纯函数、确定性，便于单测；启发式尽力而为，
//! 误判只会导致内容归档到错误的章节，绝不抛错。

use indexmap::IndexMap;
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::models::state::ParsedSection;
use crate::utils::text::{denormalize_section_name, normalize_section_name};

/// 检测不到任何标题时，整篇文本落入的保底键
pub const MAIN_CONTENT_KEY: &str = "main_content";

/// 疑问词开头的程序性标题（"How to ..."）
const QUESTION_WORDS: [&str; 6] = ["how", "what", "why", "when", "where", "who"];

/// 疑问式标题允许的常见虚词（含 and）
const FILLER_WORDS_LOOSE: [&str; 17] = [
    "the", "a", "an", "is", "are", "was", "were", "to", "of", "in", "on", "for", "with", "at",
    "by", "and", "or",
];

/// Title Case 标题允许的常见虚词
const FILLER_WORDS_STRICT: [&str; 15] = [
    "the", "a", "an", "is", "are", "was", "were", "to", "of", "in", "on", "for", "with", "at",
    "by",
];

fn numbered_heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+(\.\d+)*\.?\s+[A-Z]").expect("编号标题正则不合法"))
}

/// 判断一行是否是标题
///
/// 按优先级匹配：全大写、编号标题、疑问式标题、Title Case。
/// 超过 100 字符的行一律不是标题。
pub fn is_heading(line: &str) -> bool {
    let line = line.trim();
    if line.is_empty() {
        return false;
    }

    let char_count = line.chars().count();
    if char_count > 100 {
        return false;
    }

    let words: Vec<&str> = line.split_whitespace().collect();
    let word_count = words.len();

    // 规则 1: 全大写（长度适中）
    let has_alpha = line.chars().any(|c| c.is_alphabetic());
    if has_alpha
        && line.chars().filter(|c| c.is_alphabetic()).all(|c| c.is_uppercase())
        && char_count > 3
        && char_count < 80
    {
        return true;
    }

    // 规则 2: 编号标题（如 "1. Introduction"、"1.1 Background"）
    if numbered_heading_re().is_match(line) {
        return true;
    }

    let ends_like_sentence = line.ends_with(['.', ',', ';', '!', '?']);

    // 规则 3: 疑问词开头的程序性标题（先于大写比例判断，这类标题大写率常偏低）
    if (2..=12).contains(&word_count) && !ends_like_sentence {
        if let Some(first) = words.first() {
            if QUESTION_WORDS.contains(&first.to_lowercase().as_str()) {
                let filler = count_fillers(&words, &FILLER_WORDS_LOOSE);
                // 虚词不到一半就当标题
                if filler * 2 < word_count {
                    return true;
                }
            }
        }
    }

    // 规则 4: Title Case（2-12 词，半数以上大写开头，无句末标点）
    if (2..=12).contains(&word_count) && !ends_like_sentence {
        let capitalized = words
            .iter()
            .filter(|w| w.chars().next().is_some_and(|c| c.is_uppercase()))
            .count();
        if capitalized * 2 >= word_count {
            let filler = count_fillers(&words, &FILLER_WORDS_STRICT);
            if filler <= 2 {
                return true;
            }
        }
    }

    false
}

fn count_fillers(words: &[&str], fillers: &[&str]) -> usize {
    words
        .iter()
        .filter(|w| fillers.contains(&w.to_lowercase().as_str()))
        .count()
}

/// 把原始文本解析成"归一化键 -> 正文"的有序映射
///
/// 正文行归属最近的标题；第一处标题之前的文本丢弃。
/// 一个标题没检测出来时，等同于整篇是单章节 `main_content`。
pub fn parse_document_structure(text: &str) -> IndexMap<String, String> {
    let mut sections: IndexMap<String, String> = IndexMap::new();
    let mut current_heading: Option<String> = None;
    let mut current_content: Vec<&str> = Vec::new();

    let mut save =
        |heading: &Option<String>, content: &[&str], sections: &mut IndexMap<String, String>| {
            if let Some(h) = heading {
                let key = normalize_section_name(h);
                let body = content.join("\n").trim().to_string();
                debug!("保存章节 '{}' -> 键 '{}' ({} 字符)", h, key, body.len());
                sections.insert(key, body);
            }
        };

    for line in text.lines() {
        if is_heading(line) {
            save(&current_heading, &current_content, &mut sections);
            current_heading = Some(
                line.trim()
                    .trim_end_matches([':', '.'])
                    .trim()
                    .to_string(),
            );
            current_content.clear();
        } else if current_heading.is_some() {
            current_content.push(line);
        }
    }
    save(&current_heading, &current_content, &mut sections);

    if sections.is_empty() {
        warn!("⚠️ 未检测到任何标题，整篇文本归入 '{}'", MAIN_CONTENT_KEY);
        sections.insert(MAIN_CONTENT_KEY.to_string(), text.trim().to_string());
    }

    sections
}

/// 解析并附加显示标题
///
/// 显示标题由归一化键还原（Title Case），供改写与重组使用。
pub fn parse_example_sections(text: &str) -> IndexMap<String, ParsedSection> {
    parse_document_structure(text)
        .into_iter()
        .map(|(key, content)| {
            let title = denormalize_section_name(&key);
            (key, ParsedSection { title, content })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_caps_heading() {
        assert!(is_heading("EXECUTIVE SUMMARY"));
        assert!(!is_heading("AB")); // 过短
    }

    #[test]
    fn test_numbered_heading() {
        assert!(is_heading("1. Introduction"));
        assert!(is_heading("1.1 Background"));
        assert!(is_heading("2.3.1 Detailed Plan"));
        assert!(!is_heading("1.1 background info follows here.")); // 小写开头
    }

    #[test]
    fn test_question_heading() {
        assert!(is_heading("How to Deploy the Service"));
        assert!(is_heading("Why Acme"));
        // 虚词过半的普通疑问句不算
        assert!(!is_heading("what is the state of the art in the field"));
    }

    #[test]
    fn test_title_case_heading() {
        assert!(is_heading("Scope of Work"));
        assert!(is_heading("Risk Assessment"));
        assert!(!is_heading("This is a normal sentence that ends with punctuation."));
    }

    #[test]
    fn test_long_line_never_heading() {
        let long_line = "X".repeat(150);
        assert!(!is_heading(&long_line));
        let long_caps = "VERY LONG HEADING ".repeat(10);
        assert!(!is_heading(long_caps.trim()));
    }

    #[test]
    fn test_parse_document_structure() {
        let doc = "preamble to be discarded\n\
                   EXECUTIVE SUMMARY\n\
                   summary body line one.\n\
                   summary body line two.\n\
                   1.1 Scope of Work\n\
                   scope body.\n";
        let sections = parse_document_structure(doc);
        let keys: Vec<&String> = sections.keys().collect();
        assert_eq!(keys, vec!["executive_summary", "scope_of_work"]);
        assert!(sections["executive_summary"].contains("line one"));
        assert!(!sections["executive_summary"].contains("preamble"));
        assert_eq!(sections["scope_of_work"], "scope body.");
    }

    #[test]
    fn test_parse_without_headings_falls_back() {
        let doc = "just a plain paragraph of text without any structure at all. it keeps going.";
        let sections = parse_document_structure(doc);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[MAIN_CONTENT_KEY], doc);
    }

    #[test]
    fn test_parse_example_sections_adds_display_titles() {
        let doc = "EXECUTIVE SUMMARY\nbody\n";
        let sections = parse_example_sections(doc);
        assert_eq!(sections["executive_summary"].title, "Executive Summary");
    }
}
