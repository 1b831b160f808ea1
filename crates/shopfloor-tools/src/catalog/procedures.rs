//! Procedures (SOP) tools: listing, lookup and keyword search.
//!
//! SOPs are markdown documents stored in `sop/procedures.json`, one record
//! per file name with its document-control metadata and full content.

use std::cmp::Ordering;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use shopfloor_core::{Error, Result};
use shopfloor_store::document::SOPS;
use shopfloor_store::{DataStore, NotFound};

use crate::registry::ToolDescriptor;
use crate::schema::ParamSpec;

/// Characters of context on each side of an excerpt match.
const CONTEXT_CHARS: usize = 150;
/// Content excerpts extracted per SOP.
const MAX_CONTENT_EXCERPTS: usize = 3;
/// Excerpts (title plus content) reported per SOP.
const MAX_EXCERPTS: usize = 5;
/// Matches that saturate the relevance score.
const SATURATION_MATCHES: f64 = 10.0;
/// Relevance boost when the title matches.
const TITLE_BOOST: f64 = 0.3;

const METADATA_FIELDS: [&str; 8] = [
    "name",
    "title",
    "document_id",
    "version",
    "effective_date",
    "review_date",
    "owner",
    "approved_by",
];

/// Procedures tool table.
pub fn tools() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::new(
            "list_sops",
            "List every SOP with its document-control metadata, sorted by file name",
            vec![],
            list_sops,
        ),
        ToolDescriptor::new(
            "get_sop_by_name",
            "Get one SOP by file name (\".md\" is appended when missing)",
            vec![ParamSpec::string("name", "SOP file name").required()],
            get_sop_by_name,
        ),
        ToolDescriptor::new(
            "get_sop_by_id",
            "Get one SOP by its document control ID (case-insensitive)",
            vec![ParamSpec::string("document_id", "Document ID, e.g. SOP-PROC-001").required()],
            get_sop_by_id,
        ),
        ToolDescriptor::new(
            "search_sops",
            "Search SOP titles and content for a keyword, ranked by relevance",
            vec![
                ParamSpec::string("keyword", "Search term").required(),
                ParamSpec::string("search_in", "Where to search")
                    .one_of(&["all", "title", "content"])
                    .default_value(json!("all")),
            ],
            search_sops,
        ),
    ]
}

#[derive(Debug, Deserialize)]
struct NoArgs {}

#[derive(Debug, Deserialize)]
struct NameArgs {
    name: String,
}

#[derive(Debug, Deserialize)]
struct IdArgs {
    document_id: String,
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    keyword: String,
    search_in: String,
}

// ============================================================================
// Handlers
// ============================================================================

async fn list_sops(store: Arc<DataStore>, _args: NoArgs) -> Result<Value> {
    let mut listed: Vec<Value> = store.all(&SOPS).await?.iter().map(summary).collect();
    listed.sort_by(|a, b| text(a, "name").cmp(text(b, "name")));
    Ok(Value::Array(listed))
}

async fn get_sop_by_name(store: Arc<DataStore>, args: NameArgs) -> Result<Value> {
    let name = if args.name.ends_with(".md") {
        args.name
    } else {
        format!("{}.md", args.name)
    };

    let sops = store.all(&SOPS).await?;
    match sops.iter().find(|s| text(s, "name") == name) {
        Some(sop) => full(sop),
        None => {
            log::debug!("SOP not found: {name}");
            let mut available: Vec<&str> = sops.iter().map(|s| text(s, "name")).collect();
            available.sort_unstable();
            Ok(NotFound::new(SOPS.entity, name)
                .with_context("available_sops", json!(available))
                .to_value())
        }
    }
}

async fn get_sop_by_id(store: Arc<DataStore>, args: IdArgs) -> Result<Value> {
    let wanted = args.document_id.to_uppercase();
    let sops = store.all(&SOPS).await?;
    match sops.iter().find(|s| text(s, "document_id").to_uppercase() == wanted) {
        Some(sop) => full(sop),
        None => {
            let available: Vec<&str> = sops
                .iter()
                .map(|s| text(s, "document_id"))
                .filter(|id| !id.is_empty())
                .collect();
            Ok(NotFound::new(SOPS.entity, args.document_id)
                .with_context("available_ids", json!(available))
                .to_value())
        }
    }
}

async fn search_sops(store: Arc<DataStore>, args: SearchArgs) -> Result<Value> {
    if args.keyword.trim().is_empty() {
        return Ok(json!([]));
    }
    let scope = Scope::parse(&args.search_in)?;
    let sops = store.all(&SOPS).await?;

    let mut hits = Vec::new();
    for sop in &sops {
        if let Some(hit) = search_one(sop, &args.keyword, scope)? {
            hits.push(hit);
        }
    }
    hits.sort_by(|a, b| {
        b.relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap_or(Ordering::Equal)
    });
    Ok(serde_json::to_value(hits)?)
}

// ============================================================================
// Record views
// ============================================================================

fn text<'a>(sop: &'a Value, field: &str) -> &'a str {
    sop.get(field).and_then(Value::as_str).unwrap_or("")
}

fn word_count(content: &str) -> usize {
    content.split_whitespace().count()
}

fn summary(sop: &Value) -> Value {
    let mut out = serde_json::Map::new();
    for field in METADATA_FIELDS {
        out.insert(field.to_string(), json!(text(sop, field)));
    }
    out.insert("word_count".into(), json!(word_count(text(sop, "content"))));
    Value::Object(out)
}

fn full(sop: &Value) -> Result<Value> {
    let content = text(sop, "content");
    let mut out = summary(sop);
    out["found"] = json!(true);
    out["sections"] = serde_json::to_value(outline(content)?)?;
    out["content"] = json!(content);
    Ok(out)
}

#[derive(Debug, Serialize)]
struct Section {
    number: String,
    title: String,
    subsections: Vec<String>,
}

fn cached_regex(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Result<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok())
        .as_ref()
        .ok_or_else(|| Error::operation(format!("invalid built-in pattern {pattern}")))
}

fn section_regex() -> Result<&'static Regex> {
    static CELL: OnceLock<Option<Regex>> = OnceLock::new();
    cached_regex(&CELL, r"(?m)^##\s+(\d+\.?\s*)?(.+)$")
}

fn subsection_regex() -> Result<&'static Regex> {
    static CELL: OnceLock<Option<Regex>> = OnceLock::new();
    cached_regex(&CELL, r"(?m)^###\s+(\d+)\.(\d+)\s+(.+)$")
}

fn heading_regex() -> Result<&'static Regex> {
    static CELL: OnceLock<Option<Regex>> = OnceLock::new();
    cached_regex(&CELL, r"(?m)^#{1,3}\s+(.+)$")
}

/// Numbered `##` sections with their `###` subsections.
fn outline(content: &str) -> Result<Vec<Section>> {
    let subsections: Vec<(String, String)> = subsection_regex()?
        .captures_iter(content)
        .map(|c| (c[1].to_string(), format!("{}.{} {}", &c[1], &c[2], c[3].trim())))
        .collect();

    Ok(section_regex()?
        .captures_iter(content)
        .map(|c| {
            let number = c
                .get(1)
                .map(|m| m.as_str().trim().trim_end_matches('.').to_string())
                .unwrap_or_default();
            let subsections = if number.is_empty() {
                Vec::new()
            } else {
                subsections
                    .iter()
                    .filter(|(parent, _)| *parent == number)
                    .map(|(_, label)| label.clone())
                    .collect()
            };
            Section {
                title: c[2].trim().to_string(),
                number,
                subsections,
            }
        })
        .collect())
}

// ============================================================================
// Search
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Scope {
    All,
    Title,
    Content,
}

impl Scope {
    fn parse(s: &str) -> Result<Self> {
        match s {
            "all" => Ok(Self::All),
            "title" => Ok(Self::Title),
            "content" => Ok(Self::Content),
            other => Err(Error::validation(format!("unknown search scope '{other}'"))),
        }
    }

    fn title(self) -> bool {
        matches!(self, Self::All | Self::Title)
    }

    fn content(self) -> bool {
        matches!(self, Self::All | Self::Content)
    }
}

#[derive(Debug, Serialize)]
struct SearchHit {
    name: String,
    title: String,
    document_id: String,
    relevance_score: f64,
    total_matches: usize,
    excerpts: Vec<Excerpt>,
}

#[derive(Debug, Serialize)]
struct Excerpt {
    section: String,
    text: String,
    match_count: usize,
}

/// Lower-cases char by char so positions line up with the original text.
fn fold(s: &str) -> Vec<char> {
    s.chars()
        .map(|c| c.to_lowercase().next().unwrap_or(c))
        .collect()
}

/// Start positions of every (possibly overlapping) occurrence.
fn positions(haystack: &[char], needle: &[char]) -> Vec<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return Vec::new();
    }
    haystack
        .windows(needle.len())
        .enumerate()
        .filter(|(_, w)| *w == needle)
        .map(|(i, _)| i)
        .collect()
}

/// Number of non-overlapping occurrences.
fn count(haystack: &[char], needle: &[char]) -> usize {
    let mut total = 0;
    let mut next_free = 0;
    for pos in positions(haystack, needle) {
        if pos >= next_free {
            total += 1;
            next_free = pos + needle.len();
        }
    }
    total
}

fn search_one(sop: &Value, keyword: &str, scope: Scope) -> Result<Option<SearchHit>> {
    let needle = fold(keyword);
    let title = text(sop, "title");
    let content = text(sop, "content");

    let mut excerpts = Vec::new();
    let mut total = 0;
    let mut title_matches = 0;

    if scope.title() {
        title_matches = count(&fold(title), &needle);
        if title_matches > 0 {
            excerpts.push(Excerpt {
                section: "Title".into(),
                text: title.to_string(),
                match_count: title_matches,
            });
            total += title_matches;
        }
    }

    if scope.content() {
        let chars: Vec<char> = content.chars().collect();
        let folded = fold(content);
        let content_matches = count(&folded, &needle);
        if content_matches > 0 {
            excerpts.extend(content_excerpts(content, &chars, &folded, &needle)?);
            total += content_matches;
        }
    }

    if total == 0 {
        return Ok(None);
    }

    let mut relevance = (total as f64 / SATURATION_MATCHES).min(1.0);
    if title_matches > 0 {
        relevance = (relevance + TITLE_BOOST).min(1.0);
    }
    excerpts.truncate(MAX_EXCERPTS);

    Ok(Some(SearchHit {
        name: text(sop, "name").to_string(),
        title: title.to_string(),
        document_id: text(sop, "document_id").to_string(),
        relevance_score: (relevance * 100.0).round() / 100.0,
        total_matches: total,
        excerpts,
    }))
}

fn content_excerpts(
    content: &str,
    chars: &[char],
    folded: &[char],
    needle: &[char],
) -> Result<Vec<Excerpt>> {
    let headings: Vec<(usize, String)> = heading_regex()?
        .captures_iter(content)
        .filter_map(|c| {
            let start = c.get(0)?.start();
            Some((content[..start].chars().count(), c[1].trim().to_string()))
        })
        .collect();

    let mut used: Vec<(usize, usize)> = Vec::new();
    let mut out = Vec::new();

    for pos in positions(folded, needle)
        .into_iter()
        .take(MAX_CONTENT_EXCERPTS * 2)
    {
        let start = pos.saturating_sub(CONTEXT_CHARS);
        let end = (pos + needle.len() + CONTEXT_CHARS).min(chars.len());
        let overlaps = used.iter().any(|&(s, e)| !(end <= s || start >= e));
        if overlaps || out.len() >= MAX_CONTENT_EXCERPTS {
            continue;
        }

        let window: String = chars[start..end].iter().collect();
        let window = window.trim();
        let match_count = count(&fold(window), needle);
        let text = if start > 0 || end < chars.len() {
            format!("...{window}...")
        } else {
            window.to_string()
        };
        let section = headings
            .iter()
            .rev()
            .find(|(at, _)| *at < pos)
            .map(|(_, title)| title.clone())
            .unwrap_or_else(|| "Content".to_string());

        out.push(Excerpt {
            section,
            text,
            match_count,
        });
        used.push((start, end));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::registry;
    use crate::registry::ToolRegistry;
    use shopfloor_core::{ErrorKind, ServerDomain};
    use shopfloor_store::fixtures::fixture_dir;
    use tempfile::TempDir;

    fn setup() -> (TempDir, ToolRegistry) {
        let dir = fixture_dir().unwrap();
        let store = Arc::new(DataStore::new(dir.path().to_path_buf()));
        (dir, registry(ServerDomain::Procedures, store).unwrap())
    }

    #[test]
    fn test_count_is_non_overlapping() {
        assert_eq!(count(&fold("aaaa"), &fold("aa")), 2);
        assert_eq!(positions(&fold("aaaa"), &fold("aa")), vec![0, 1, 2]);
        assert_eq!(count(&fold("Press PRESS press"), &fold("press")), 3);
    }

    #[test]
    fn test_outline() {
        let content = "# T\n\n## 1. Purpose\n\n## 2. Procedure\n\n### 2.1 Shutdown\n\n### 2.2 Isolation\n";
        let sections = outline(content).unwrap();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[1].number, "2");
        assert_eq!(sections[1].title, "Procedure");
        assert_eq!(sections[1].subsections, vec!["2.1 Shutdown", "2.2 Isolation"]);
    }

    #[tokio::test]
    async fn test_list_sops_sorted_with_word_counts() {
        let (_dir, reg) = setup();
        let env = reg.invoke("list_sops", Value::Null).await;
        let list = env.data().unwrap().as_array().unwrap().clone();
        assert_eq!(list.len(), 3);
        let names: Vec<&str> = list.iter().map(|s| s["name"].as_str().unwrap()).collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
        assert!(list.iter().all(|s| s["word_count"].as_u64().unwrap() > 0));
        assert!(list[0].get("content").is_none());
    }

    #[tokio::test]
    async fn test_get_by_name_appends_extension() {
        let (_dir, reg) = setup();
        let env = reg
            .invoke("get_sop_by_name", json!({"name": "emergency-procurement-sop"}))
            .await;
        let sop = env.data().unwrap();
        assert_eq!(sop["document_id"], json!("SOP-PROC-001"));
        assert!(sop["content"].as_str().unwrap().contains("Emergency"));
        assert!(!sop["sections"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_by_name_not_found_lists_available() {
        let (_dir, reg) = setup();
        let env = reg.invoke("get_sop_by_name", json!({"name": "missing"})).await;
        let data = env.data().unwrap();
        assert_eq!(data["found"], json!(false));
        assert_eq!(data["id"], json!("missing.md"));
        assert_eq!(data["available_sops"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_get_by_id_case_insensitive() {
        let (_dir, reg) = setup();
        let env = reg.invoke("get_sop_by_id", json!({"document_id": "sop-safe-004"})).await;
        assert_eq!(env.data().unwrap()["name"], json!("gearbox-press-lockout-sop.md"));

        let missing = reg.invoke("get_sop_by_id", json!({"document_id": "SOP-X"})).await;
        assert_eq!(missing.data().unwrap()["available_ids"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_search_blank_keyword_is_empty() {
        let (_dir, reg) = setup();
        let env = reg.invoke("search_sops", json!({"keyword": "   "})).await;
        assert_eq!(env.data().unwrap(), &json!([]));
    }

    #[tokio::test]
    async fn test_search_ranks_title_matches_first() {
        let (_dir, reg) = setup();
        let env = reg.invoke("search_sops", json!({"keyword": "press"})).await;
        let hits = env.data().unwrap().as_array().unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0]["name"], json!("gearbox-press-lockout-sop.md"));
        assert_eq!(hits[0]["excerpts"][0]["section"], json!("Title"));
        let scores: Vec<f64> = hits.iter().map(|h| h["relevance_score"].as_f64().unwrap()).collect();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
        assert!(scores.iter().all(|s| *s <= 1.0));
    }

    #[tokio::test]
    async fn test_search_excerpts_labelled_by_heading() {
        let (_dir, reg) = setup();
        let env = reg
            .invoke("search_sops", json!({"keyword": "raking light", "search_in": "content"}))
            .await;
        let hits = env.data().unwrap().as_array().unwrap();
        assert_eq!(hits.len(), 1);
        let excerpt = &hits[0]["excerpts"][0];
        assert_eq!(excerpt["section"], json!("2.1 Visual check"));
        assert_eq!(excerpt["match_count"], json!(1));
        assert!(excerpt["text"].as_str().unwrap().starts_with("..."));
        assert!(hits[0]["excerpts"].as_array().unwrap().len() <= MAX_EXCERPTS);
    }

    #[tokio::test]
    async fn test_search_scope_validated() {
        let (_dir, reg) = setup();
        let env = reg
            .invoke("search_sops", json!({"keyword": "press", "search_in": "body"}))
            .await;
        assert_eq!(env.error().unwrap().kind, ErrorKind::ValidationError);
    }
}
