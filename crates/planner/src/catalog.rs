//! Module catalog: loads module text, parses front matter, and applies the
//! per-module metadata gates against the decision snapshot.
//!
//! Front matter is an optional header at the top of a module:
//!
//! ```text
//! ---
//! minIntensity: 7
//! opennessIn:
//!  - 2
//!  - 3
//! injectAs: footer
//! ---
//! Module body...
//! ```

use promptweave_core::decision::DecSnapshot;
use promptweave_core::error::StoreError;
use promptweave_core::module::{FrontMatter, ModuleCandidate, ModuleSource};
use promptweave_core::token::estimate_tokens;
use regex_lite::{Captures, Regex};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, LazyLock};
use thiserror::Error;
use tracing::{debug, warn};

use crate::trace::{ModuleTraceEntry, TraceSource};

const DELIMITER: &str = "---";

static DEC_PLACEHOLDER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\{\{\s*DEC\.([a-zA-Z0-9_]+)\s*\}\}").ok());

#[derive(Debug, Error, PartialEq)]
pub enum FrontMatterError {
    #[error("line {line}: expected `key: value` or `- item`")]
    InvalidLine { line: usize },

    #[error("invalid value for `{key}`: {value}")]
    InvalidValue { key: String, value: String },
}

// ── Front matter ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum RawValue {
    Scalar(String),
    List(Vec<String>),
}

impl RawValue {
    fn items(&self) -> Vec<String> {
        match self {
            RawValue::List(items) => items.clone(),
            RawValue::Scalar(s) => s
                .trim_start_matches('[')
                .trim_end_matches(']')
                .split(',')
                .map(|item| unquote(item).to_string())
                .filter(|item| !item.is_empty())
                .collect(),
        }
    }

    fn scalar(&self) -> String {
        match self {
            RawValue::Scalar(s) => unquote(s).to_string(),
            RawValue::List(items) => items.join(","),
        }
    }
}

fn unquote(s: &str) -> &str {
    s.trim().trim_matches(|c| c == '"' || c == '\'')
}

/// Split `raw` into header entries and body. Text without a complete
/// header is all body.
fn split_header(raw: &str) -> (Option<Vec<&str>>, &str) {
    let trimmed = raw.trim_start();
    let mut lines = trimmed.split_inclusive('\n');
    match lines.next() {
        Some(first) if first.trim() == DELIMITER => {}
        _ => return (None, raw),
    }
    let mut offset = trimmed.len() - lines.clone().map(str::len).sum::<usize>();
    let mut header = Vec::new();
    for line in lines {
        offset += line.len();
        if line.trim() == DELIMITER {
            return (Some(header), &trimmed[offset..]);
        }
        header.push(line.trim_end_matches(['\n', '\r']));
    }
    (None, raw)
}

fn parse_entries(lines: &[&str]) -> Result<Vec<(String, RawValue)>, FrontMatterError> {
    let mut entries: Vec<(String, RawValue)> = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if let Some(item) = trimmed.strip_prefix('-') {
            match entries.last_mut() {
                Some((_, RawValue::List(items))) => {
                    items.push(unquote(item).to_string());
                    continue;
                }
                _ => return Err(FrontMatterError::InvalidLine { line: idx + 1 }),
            }
        }
        let Some((key, value)) = trimmed.split_once(':') else {
            return Err(FrontMatterError::InvalidLine { line: idx + 1 });
        };
        let value = value.trim();
        let value = if value.is_empty() {
            RawValue::List(Vec::new())
        } else {
            RawValue::Scalar(value.to_string())
        };
        entries.push((key.trim().to_string(), value));
    }
    Ok(entries)
}

fn invalid(key: &str, value: impl Into<String>) -> FrontMatterError {
    FrontMatterError::InvalidValue {
        key: key.to_string(),
        value: value.into(),
    }
}

fn parse_intensity(key: &str, value: &RawValue) -> Result<u8, FrontMatterError> {
    let raw = value.scalar();
    raw.parse::<u8>()
        .ok()
        .filter(|v| *v <= 10)
        .ok_or_else(|| invalid(key, raw))
}

fn parse_bool(key: &str, value: &RawValue) -> Result<bool, FrontMatterError> {
    let raw = value.scalar();
    match raw.to_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(invalid(key, raw)),
    }
}

/// Parse a module's front matter. Returns the metadata and the body with
/// the header removed. Unknown keys are logged and ignored.
pub fn parse_front_matter(name: &str, raw: &str) -> Result<(FrontMatter, String), FrontMatterError> {
    let (header, body) = split_header(raw);
    let Some(header) = header else {
        return Ok((FrontMatter::default(), raw.trim().to_string()));
    };

    let mut meta = FrontMatter::default();
    for (key, value) in parse_entries(&header)? {
        match key.as_str() {
            "minIntensity" => meta.min_intensity = Some(parse_intensity(&key, &value)?),
            "maxIntensity" => meta.max_intensity = Some(parse_intensity(&key, &value)?),
            "opennessIn" => {
                for item in value.items() {
                    let level = item
                        .parse::<u8>()
                        .ok()
                        .filter(|l| (1..=3).contains(l))
                        .ok_or_else(|| invalid(&key, item.clone()))?;
                    meta.openness_in.insert(level);
                }
            }
            "requireVulnerability" => meta.require_vulnerability = parse_bool(&key, &value)?,
            "flagsAny" => meta.flags_any = value.items(),
            "order" => {
                let raw = value.scalar();
                meta.order = Some(raw.parse::<i64>().map_err(|_| invalid(&key, raw))?);
            }
            "dedupeKey" => {
                let raw = value.scalar();
                meta.dedupe_key = (!raw.is_empty()).then_some(raw);
            }
            "injectAs" => {
                let raw = value.scalar();
                meta.inject_as = (!raw.is_empty() && raw != "null").then_some(raw);
            }
            other => warn!(module = name, key = other, "Ignoring unknown front matter key"),
        }
    }
    Ok((meta, body.trim().to_string()))
}

// ── Catalog ───────────────────────────────────────────────────────────────

/// Loads named modules from a [`ModuleSource`] into typed candidates.
pub struct ModuleCatalog {
    source: Arc<dyn ModuleSource>,
    strict_missing: bool,
}

impl ModuleCatalog {
    pub fn new(source: Arc<dyn ModuleSource>, strict_missing: bool) -> Self {
        Self {
            source,
            strict_missing,
        }
    }

    pub fn source(&self) -> &Arc<dyn ModuleSource> {
        &self.source
    }

    /// Load `names` in order.
    ///
    /// Missing or unreadable modules are skipped (their text degrades to
    /// empty) unless strict mode is on, in which case the first one aborts
    /// the load. A malformed header keeps the module with empty metadata.
    pub async fn load(&self, names: &[String]) -> Result<Vec<ModuleCandidate>, StoreError> {
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            let raw = match self.source.read(name).await {
                Ok(Some(text)) if !text.trim().is_empty() => text,
                Ok(_) => {
                    if self.strict_missing {
                        return Err(StoreError::Strict(name.clone()));
                    }
                    debug!(module = %name, "Module missing, using empty text");
                    continue;
                }
                Err(e) => {
                    if self.strict_missing {
                        return Err(e);
                    }
                    warn!(module = %name, error = %e, "Module unreadable, using empty text");
                    continue;
                }
            };

            let (meta, text) = match parse_front_matter(name, &raw) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(module = %name, error = %e, "Malformed front matter, ignoring metadata");
                    let (_, body) = split_header(&raw);
                    (FrontMatter::default(), body.trim().to_string())
                }
            };
            if text.is_empty() {
                debug!(module = %name, "Module body empty, skipping");
                continue;
            }
            let token_count = self.source.token_count(name, &text);
            out.push(ModuleCandidate {
                name: name.clone(),
                text,
                token_count,
                meta,
            });
        }
        Ok(out)
    }
}

// ── Metadata gates ────────────────────────────────────────────────────────

/// Candidates split by injection target, plus the gate trace.
#[derive(Debug, Default)]
pub struct MetadataSelection {
    pub regular: Vec<ModuleCandidate>,
    pub footers: Vec<ModuleCandidate>,
    pub trace: Vec<ModuleTraceEntry>,
}

impl MetadataSelection {
    pub fn ordered_names(&self) -> Vec<String> {
        self.regular
            .iter()
            .chain(&self.footers)
            .map(|c| c.name.clone())
            .collect()
    }
}

fn flag_is_set(dec: &DecSnapshot, flag: &str) -> bool {
    match flag.trim().to_lowercase().as_str() {
        "" => false,
        "hastechblock" | "has_tech_block" => dec.has_tech_block,
        "savememory" | "save_memory" => dec.save_memory,
        "isvulnerable" | "is_vulnerable" | "vulnerable" | "vulneravel" => dec.is_vulnerable,
        "usememories" => dec.flag("use_memories"),
        "patternsynthesis" => dec.flag("pattern_synthesis"),
        _ => dec.flag(flag),
    }
}

/// Evaluate one module's front matter. Returns the failure reasons (empty
/// when the module passes) and the intensity threshold involved, if any.
pub fn evaluate_front_matter(meta: &FrontMatter, dec: &DecSnapshot) -> (Vec<String>, Option<u8>) {
    let mut reasons = Vec::new();
    let mut threshold = None;

    if let Some(min) = meta.min_intensity.filter(|min| dec.intensity < *min) {
        reasons.push(format!("minIntensity:{min}"));
        threshold = Some(min);
    }
    if let Some(max) = meta.max_intensity.filter(|max| dec.intensity > *max) {
        reasons.push(format!("maxIntensity:{max}"));
        threshold = Some(max);
    }
    if !meta.openness_in.is_empty() && !meta.openness_in.contains(&dec.openness.level()) {
        let allowed: Vec<String> = meta.openness_in.iter().map(u8::to_string).collect();
        reasons.push(format!("opennessIn:{}", allowed.join("/")));
    }
    if meta.require_vulnerability && !dec.is_vulnerable {
        reasons.push("requireVulnerability".into());
    }
    if !meta.flags_any.is_empty() && !meta.flags_any.iter().any(|f| flag_is_set(dec, f)) {
        reasons.push(format!("flagsAny:{}", meta.flags_any.join(",")));
    }
    (reasons, threshold)
}

/// Replace `{{DEC.key}}` placeholders with snapshot values. Arrays are
/// joined with `, `; unknown keys render empty.
pub fn interpolate(text: &str, dec: &DecSnapshot) -> String {
    let Some(re) = DEC_PLACEHOLDER.as_ref() else {
        return text.to_string();
    };
    if !text.contains("{{") {
        return text.to_string();
    }
    let fields: BTreeMap<String, Value> = match serde_json::to_value(dec) {
        Ok(Value::Object(map)) => map.into_iter().collect(),
        _ => BTreeMap::new(),
    };
    re.replace_all(text, |caps: &Captures<'_>| {
        let key = snake_case(&caps[1]);
        let key = if key == "viva_steps" { "steps".to_string() } else { key };
        fields.get(&key).map(render_value).unwrap_or_default()
    })
    .into_owned()
}

fn snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for c in key.chars() {
        if c.is_ascii_uppercase() {
            out.push('_');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Null | Value::Object(_) => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(render_value)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
    }
}

/// Apply front-matter gates, ordering, dedupe keys and footer routing.
///
/// Passing modules sort by `order` (falling back to their position in
/// `base_order`), then position, then name. The first module claiming a
/// dedupe key wins.
pub fn apply_metadata(
    dec: &DecSnapshot,
    base_order: &[String],
    candidates: Vec<ModuleCandidate>,
) -> MetadataSelection {
    let index: HashMap<&str, usize> = base_order
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();

    let mut trace = Vec::new();
    let mut passing: Vec<(i64, usize, ModuleCandidate)> = Vec::new();
    for mut candidate in candidates {
        let (reasons, threshold) = evaluate_front_matter(&candidate.meta, dec);
        let passes = reasons.is_empty();
        let reason = if passes { "pass".to_string() } else { reasons.join("|") };
        let mut entry = ModuleTraceEntry::new(&candidate.name, TraceSource::FrontMatter, passes, reason);
        if let Some(threshold) = threshold {
            entry = entry.with_threshold(threshold);
        }
        trace.push(entry);
        if !passes {
            debug!(module = %candidate.name, "Front matter gate failed");
            continue;
        }

        let rendered = interpolate(&candidate.text, dec);
        if rendered != candidate.text {
            candidate.token_count = estimate_tokens(&rendered);
            candidate.text = rendered;
        }
        let base_index = index.get(candidate.name.as_str()).copied().unwrap_or(usize::MAX);
        let order = candidate
            .meta
            .order
            .unwrap_or_else(|| i64::try_from(base_index).unwrap_or(i64::MAX));
        passing.push((order, base_index, candidate));
    }
    passing.sort_by(|a, b| {
        a.0.cmp(&b.0)
            .then(a.1.cmp(&b.1))
            .then_with(|| a.2.name.cmp(&b.2.name))
    });

    let mut claimed: HashSet<String> = HashSet::new();
    let mut selection = MetadataSelection::default();
    for (_, _, candidate) in passing {
        if let Some(key) = candidate.meta.dedupe_key.as_deref().map(str::to_lowercase) {
            if !claimed.insert(key.clone()) {
                trace.retain(|e| e.id != candidate.name);
                trace.push(ModuleTraceEntry::new(
                    &candidate.name,
                    TraceSource::Dedupe,
                    false,
                    format!("dedupe:{key}"),
                ));
                continue;
            }
        }
        if candidate.meta.is_footer() {
            selection.footers.push(candidate);
        } else {
            selection.regular.push(candidate);
        }
    }
    selection.trace = trace;
    selection
}
