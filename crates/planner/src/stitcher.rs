//! Joins surviving modules into one text block.

use promptweave_core::module::ModuleCandidate;
use regex_lite::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::selection::BaseSelector;

static MARKDOWN_HEADING: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^#{1,6}\s+").ok());
static CAPS_HEADING: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-ZÁÂÃÀÉÊÍÓÔÕÚÜÇ0-9][^\n]{0,80}$").ok());

/// `TONE_MODULATION.txt` → `TONE MODULATION`.
pub fn title_from_name(name: &str) -> String {
    let stem = name
        .strip_suffix(".txt")
        .or_else(|| name.strip_suffix(".TXT"))
        .unwrap_or(name);
    stem.replace('_', " ")
}

fn is_heading(line: &str) -> bool {
    let matches = |re: &LazyLock<Option<Regex>>| re.as_ref().is_some_and(|r| r.is_match(line));
    matches(&MARKDOWN_HEADING) || matches(&CAPS_HEADING)
}

/// Drop repeated heading lines and any block repeated verbatim. The body
/// under a repeated heading is kept. First occurrence wins.
pub fn dedupe_by_section(text: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut seen_titles: HashSet<String> = HashSet::new();
    let mut seen_blocks: HashSet<String> = HashSet::new();
    let mut block: Vec<&str> = Vec::new();
    let mut repeated_heading = false;

    let mut flush = |block: &mut Vec<&str>, repeated_heading: bool| {
        let joined = block.join("\n").trim().to_string();
        if !joined.is_empty() && seen_blocks.insert(joined.clone()) {
            let kept = if repeated_heading {
                block[1..].join("\n").trim().to_string()
            } else {
                joined
            };
            if !kept.is_empty() {
                out.push(kept);
            }
        }
        block.clear();
    };

    for line in text.lines() {
        if is_heading(line) {
            flush(&mut block, repeated_heading);
            let title = line.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase();
            repeated_heading = !seen_titles.insert(title);
        }
        block.push(line);
    }
    flush(&mut block, repeated_heading);
    out.join("\n\n")
}

/// Order, title and join the modules for an openness `level`.
///
/// Identity modules are dropped at levels 2 and 3, where identity is
/// carried by the caller's system header instead.
pub fn stitch(modules: &[ModuleCandidate], level: u8, selector: &BaseSelector) -> String {
    let identity = selector.identity_modules();
    let kept: Vec<&ModuleCandidate> = modules
        .iter()
        .filter(|m| level < 2 || !identity.contains(&m.name))
        .filter(|m| !m.text.trim().is_empty())
        .collect();

    let priority = selector.stitch_priority(level);
    let mut ordered: Vec<&ModuleCandidate> = priority
        .iter()
        .filter_map(|p| kept.iter().copied().find(|m| &m.name == p))
        .collect();
    ordered.extend(kept.iter().copied().filter(|m| !priority.contains(&m.name)));

    let joined = ordered
        .iter()
        .map(|m| format!("{}\n\n{}", title_from_name(&m.name), m.text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n");
    dedupe_by_section(&joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptweave_config::SelectionMatrixConfig;
    use promptweave_core::module::FrontMatter;

    fn module(name: &str, text: &str) -> ModuleCandidate {
        ModuleCandidate {
            name: name.into(),
            text: text.into(),
            token_count: 1,
            meta: FrontMatter::default(),
        }
    }

    fn selector() -> BaseSelector {
        BaseSelector::new(SelectionMatrixConfig::default()).unwrap()
    }

    #[test]
    fn titles_strip_extension() {
        assert_eq!(title_from_name("TONE_MODULATION.txt"), "TONE MODULATION");
        assert_eq!(title_from_name("notes"), "notes");
    }

    #[test]
    fn repeated_heading_keeps_distinct_body() {
        let out = dedupe_by_section("Rules\nalways cite sources\n\nRules\nnever use emojis");
        assert_eq!(out, "Rules\nalways cite sources\n\nnever use emojis");
    }

    #[test]
    fn repeated_sentence_does_not_swallow_following_lines() {
        let text = "A\n\nBe brief.\nuse short sentences\n\nB\n\nBe brief.\nreply in portuguese";
        let out = dedupe_by_section(text);
        assert!(out.contains("use short sentences"));
        assert!(out.contains("reply in portuguese"));
        assert_eq!(out.matches("Be brief.").count(), 1);
    }

    #[test]
    fn markdown_heading_repeat_keeps_section_body() {
        let text = "## Rules\nbe brief\n\n## Style\nplain\n\n## rules\nbe verbose";
        let out = dedupe_by_section(text);
        assert!(out.contains("be brief"));
        assert!(out.contains("be verbose"));
        assert_eq!(out.to_lowercase().matches("## rules").count(), 1);
    }

    #[test]
    fn repeated_block_kept_once() {
        let text = "## A\nsame body\n\n## B\nother\n\n## A\nsame body";
        let out = dedupe_by_section(text);
        assert_eq!(out.matches("same body").count(), 1);
    }

    #[test]
    fn stitch_priority_leads_and_identity_dropped() {
        let modules = vec![
            module("IDENTITY.txt", "who we are"),
            module("EXTRA.txt", "extra guidance"),
            module("SENSITIVE_CLOSING.txt", "close gently"),
            module("TONE_MODULATION.txt", "mind the tone"),
        ];
        let out = stitch(&modules, 2, &selector());
        assert!(!out.contains("who we are"));
        let tone = out.find("TONE MODULATION").unwrap();
        let closing = out.find("SENSITIVE CLOSING").unwrap();
        let extra = out.find("EXTRA").unwrap();
        assert!(tone < closing && closing < extra);
    }

    #[test]
    fn level_one_keeps_identity() {
        let modules = vec![module("IDENTITY.txt", "who we are")];
        assert!(stitch(&modules, 1, &selector()).contains("who we are"));
    }

    #[test]
    fn empty_modules_are_skipped() {
        let modules = vec![module("EMPTY.txt", "   "), module("BODY.txt", "content")];
        let out = stitch(&modules, 1, &selector());
        assert!(!out.contains("EMPTY"));
        assert_eq!(out, "BODY\n\ncontent");
    }
}
