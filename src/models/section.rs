//! 报告章节树
//!
//! 章节树是所有权式的递归容器：每个节点独占其子节点，天然无环，
//! 因此遍历不会死循环。模板在构造时仍做结构校验（空标题、嵌套超限）。

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult, StructureError};

/// 章节嵌套层级上限
///
/// 正常模板只有两三层，超过该值视为损坏的输入。
const MAX_SECTION_DEPTH: usize = 16;

/// 章节写作指令
///
/// 绑定在章节节点上，定义该章节"写什么、怎么写"。
/// objective 必填，其余为可选的自由文本。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionInstruction {
    /// 写作目标
    pub objective: String,
    /// 语气（如 formal / casual）
    #[serde(default)]
    pub tone: Option<String>,
    /// 目标篇幅（如 "2 paragraphs"）
    #[serde(default)]
    pub length: Option<String>,
    /// 输出格式（如 bullet points / paragraphs）
    #[serde(default)]
    pub format: Option<String>,
}

/// 章节节点
///
/// - `source` 指定该章节内容取材的参考资料标识，空串表示"任意/合并"
/// - 没有 `instructions` 的节点是纯结构占位，起草后内容保持为空
/// - `subsections` 保序，遍历顺序即模板书写顺序
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionNode {
    /// 显示标题
    pub title: String,
    /// 取材来源标识（空串 = 不限来源）
    #[serde(default)]
    pub source: String,
    /// 写作指令，缺省表示结构占位
    #[serde(default)]
    pub instructions: Option<SectionInstruction>,
    /// 有序子章节
    #[serde(default)]
    pub subsections: IndexMap<String, SectionNode>,
    /// 起草 / 改写产出的内容，初始为空
    #[serde(default)]
    pub content: String,
}

/// 章节树的根映射
pub type SectionMap = IndexMap<String, SectionNode>;

/// 深度优先前序遍历迭代器
///
/// 父节点先于其任何子节点被访问，每个节点恰好访问一次。
pub struct SectionWalk<'a> {
    stack: Vec<&'a SectionNode>,
}

impl<'a> Iterator for SectionWalk<'a> {
    type Item = &'a SectionNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        // 逆序入栈，保证弹出顺序与书写顺序一致
        for (_, sub) in node.subsections.iter().rev() {
            self.stack.push(sub);
        }
        Some(node)
    }
}

/// 前序遍历整棵章节树
pub fn walk(sections: &SectionMap) -> SectionWalk<'_> {
    let mut stack: Vec<&SectionNode> = sections.values().collect();
    stack.reverse();
    SectionWalk { stack }
}

/// 校验章节树结构
///
/// 空标题、嵌套超限的模板直接拒绝，绝不静默修复。
pub fn validate_sections(sections: &SectionMap) -> AppResult<()> {
    fn check(key: &str, node: &SectionNode, depth: usize) -> AppResult<()> {
        if node.title.trim().is_empty() {
            return Err(AppError::Structure(StructureError::EmptyTitle {
                key: key.to_string(),
            }));
        }
        if depth > MAX_SECTION_DEPTH {
            return Err(AppError::Structure(StructureError::DepthExceeded {
                key: key.to_string(),
                limit: MAX_SECTION_DEPTH,
            }));
        }
        for (sub_key, sub) in &node.subsections {
            check(sub_key, sub, depth + 1)?;
        }
        Ok(())
    }
    for (key, node) in sections {
        check(key, node, 1)?;
    }
    Ok(())
}

/// 统计带指令（即需要起草）的节点数量
pub fn count_instructed(sections: &SectionMap) -> usize {
    walk(sections).filter(|n| n.instructions.is_some()).count()
}

/// 按遍历位置回填起草内容
///
/// `contents` 的顺序必须与 `walk` 中带指令节点的顺序一致——
/// 并行起草按提交顺序合并结果，正是为了维持这一对应关系。
pub fn apply_drafts(sections: &mut SectionMap, contents: Vec<String>) {
    fn fill(node: &mut SectionNode, contents: &mut std::vec::IntoIter<String>) {
        if node.instructions.is_some() {
            if let Some(c) = contents.next() {
                node.content = c;
            }
        }
        for (_, sub) in node.subsections.iter_mut() {
            fill(sub, contents);
        }
    }
    let mut iter = contents.into_iter();
    for (_, node) in sections.iter_mut() {
        fill(node, &mut iter);
    }
}

/// 得知主体公司名后，改写 "Why Company A" 类章节的显示标题
///
/// 返回是否发生了改名。改名后的数据查找仍通过
/// `normalize_title_for_lookup` 命中原先抽取的事实。
pub fn retitle_company_sections(sections: &mut SectionMap, company_name: &str) -> bool {
    fn retitle(map: &mut SectionMap, company_name: &str) -> bool {
        let mut changed = false;
        for (key, node) in map.iter_mut() {
            if key == "why_company_a" {
                node.title = format!("Why {}", company_name);
                changed = true;
            }
            changed |= retitle(&mut node.subsections, company_name);
        }
        changed
    }
    retitle(sections, company_name)
}

/// 把章节树拼成整篇文档文本
///
/// 标题与内容之间空一行，章节之间空一行。结构占位节点只输出标题。
pub fn flatten_report(sections: &SectionMap) -> String {
    let mut parts = Vec::new();
    for node in walk(sections) {
        if node.content.trim().is_empty() {
            parts.push(node.title.clone());
        } else {
            parts.push(format!("{}\n\n{}", node.title, node.content.trim()));
        }
    }
    parts.join("\n\n")
}
