//! Projection of the active deltas into a delimited section of the target
//! document.
//!
//! The section is always regenerated in full. Only the bytes between the
//! start and end markers are replaced; when the markers are absent a new
//! section is appended at the end of the document. Everything outside the
//! markers is preserved byte for byte.

use crate::config::SyncConfig;
use crate::delta::Delta;
use crate::error::{PlaybookError, Result};
use crate::io;
use crate::store::{ranked_for_display, DeltaRepository};
use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const START_MARKER: &str = "<!-- ACE-LEARNED-PATTERNS-START -->";
pub const END_MARKER: &str = "<!-- ACE-LEARNED-PATTERNS-END -->";
pub const SECTION_HEADING: &str = "## Learned Patterns";

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Collapse whitespace to single spaces and neutralize comment delimiters so
/// free text can't end the line's trailing id comment early.
fn one_line(text: &str) -> String {
    let mut out = text.split_whitespace().collect::<Vec<_>>().join(" ");
    while out.contains("<!--") || out.contains("-->") {
        out = out.replace("<!--", "<!-").replace("-->", "->");
    }
    out
}

/// Truncate to `max` characters, marking the cut with `...`.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    if max < 4 {
        return text.chars().take(max).collect();
    }
    let head: String = text.chars().take(max - 3).collect();
    format!("{}...", head.trim_end())
}

/// One delta as a single markdown list item.
pub fn render_line(delta: &Delta, cfg: &SyncConfig) -> String {
    let label = format!("[{}] {}", delta.category, one_line(&delta.condition));
    let problem = truncate(&one_line(&delta.problem), cfg.problem_max_chars);
    let content = truncate(&one_line(&delta.content), cfg.content_max_chars);
    let text = match (problem.is_empty(), content.is_empty()) {
        (false, false) => format!("{problem} → {content}"),
        (false, true) => problem,
        (true, false) => content,
        (true, true) => String::from("(no description)"),
    };
    format!(
        "- **{label}**: {text} [{}%] <!-- delta:{} -->",
        delta.percent(),
        delta.id
    )
}

/// Rendered lines in display order (confidence descending).
pub fn render_lines(deltas: &[Delta], cfg: &SyncConfig) -> Vec<String> {
    ranked_for_display(deltas)
        .into_iter()
        .map(|d| render_line(d, cfg))
        .collect()
}

/// Section content strictly between the markers.
pub fn render_body(lines: &[String], synced_on: NaiveDate) -> String {
    let mut body = String::new();
    body.push('\n');
    body.push_str(SECTION_HEADING);
    body.push_str("\n\n");
    body.push_str(&format!(
        "_Last synced: {} ({} active)_\n\n",
        synced_on.format("%Y-%m-%d"),
        lines.len()
    ));
    for line in lines {
        body.push_str(line);
        body.push('\n');
    }
    body
}

// ---------------------------------------------------------------------------
// Locating and parsing the section
// ---------------------------------------------------------------------------

/// Byte offsets of a section: `start..end` covers both markers,
/// `inner_start..inner_end` is the body between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionSpan {
    pub start: usize,
    pub inner_start: usize,
    pub inner_end: usize,
    pub end: usize,
}

pub fn locate_section(doc: &str, path: &Path) -> Result<Option<SectionSpan>> {
    let malformed = |reason: &str| PlaybookError::MalformedSection {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };
    let starts = doc.matches(START_MARKER).count();
    let ends = doc.matches(END_MARKER).count();
    match (starts, ends) {
        (0, 0) => return Ok(None),
        (1, 1) => {}
        (0, _) => return Err(malformed("end marker without start marker")),
        (_, 0) => return Err(malformed("start marker without end marker")),
        _ => return Err(malformed("more than one pattern section")),
    }
    let start = doc.find(START_MARKER).ok_or_else(|| malformed("start marker missing"))?;
    let inner_start = start + START_MARKER.len();
    let inner_end = doc[inner_start..]
        .find(END_MARKER)
        .map(|off| inner_start + off)
        .ok_or_else(|| malformed("end marker appears before start marker"))?;
    Ok(Some(SectionSpan {
        start,
        inner_start,
        inner_end,
        end: inner_end + END_MARKER.len(),
    }))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedEntry {
    pub id: String,
    pub percent: u32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ParsedSection {
    pub entries: Vec<RenderedEntry>,
    pub last_synced: Option<NaiveDate>,
    /// Text after "Last synced:" when it isn't a valid date.
    pub unparsed_date: Option<String>,
}

static LINE_RE: OnceLock<Regex> = OnceLock::new();
static SYNCED_RE: OnceLock<Regex> = OnceLock::new();

fn line_re() -> &'static Regex {
    LINE_RE.get_or_init(|| {
        Regex::new(r"^- \*\*.*\[(\d{1,3})%\] <!-- delta:(\S+) -->$").unwrap()
    })
}

fn synced_re() -> &'static Regex {
    SYNCED_RE.get_or_init(|| Regex::new(r"Last synced:\s*([^\s_()]+)").unwrap())
}

/// Pull rendered entries and the sync date out of a section body.
pub fn parse_body(body: &str) -> ParsedSection {
    let mut parsed = ParsedSection::default();
    for line in body.lines() {
        let line = line.trim_end();
        if let Some(caps) = line_re().captures(line) {
            parsed.entries.push(RenderedEntry {
                id: caps[2].to_string(),
                percent: caps[1].parse().unwrap_or(0),
            });
        } else if parsed.last_synced.is_none() && parsed.unparsed_date.is_none() {
            if let Some(caps) = synced_re().captures(line) {
                match NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d") {
                    Ok(date) => parsed.last_synced = Some(date),
                    Err(_) => parsed.unparsed_date = Some(caps[1].to_string()),
                }
            }
        }
    }
    parsed
}

/// Parse the section of `doc`, `None` when the markers are absent.
pub fn parse_section(doc: &str, path: &Path) -> Result<Option<ParsedSection>> {
    Ok(locate_section(doc, path)?.map(|span| parse_body(&doc[span.inner_start..span.inner_end])))
}

// ---------------------------------------------------------------------------
// Document edits (pure)
// ---------------------------------------------------------------------------

/// Replace the section body, or append a new section when none exists.
pub fn upsert_section(doc: &str, body: &str, path: &Path) -> Result<String> {
    match locate_section(doc, path)? {
        Some(span) => {
            let mut out = String::with_capacity(doc.len() + body.len());
            out.push_str(&doc[..span.inner_start]);
            out.push_str(body);
            out.push_str(&doc[span.inner_end..]);
            Ok(out)
        }
        None => {
            let mut out = String::with_capacity(doc.len() + body.len() + 128);
            out.push_str(doc);
            if !doc.is_empty() {
                if !doc.ends_with('\n') {
                    out.push('\n');
                }
                out.push('\n');
            }
            out.push_str(START_MARKER);
            out.push_str(body);
            out.push_str(END_MARKER);
            out.push('\n');
            Ok(out)
        }
    }
}

/// Delete the section and its markers. `None` when there is no section.
///
/// Undoes `upsert_section`'s append exactly: the newline after the end
/// marker goes with it, and so does the blank separator line when the
/// section was the last thing in the document.
pub fn strip_section(doc: &str, path: &Path) -> Result<Option<String>> {
    let Some(span) = locate_section(doc, path)? else {
        return Ok(None);
    };
    let mut prefix = &doc[..span.start];
    let mut suffix = &doc[span.end..];
    if let Some(rest) = suffix.strip_prefix('\n') {
        suffix = rest;
    }
    if suffix.is_empty() && prefix.ends_with("\n\n") {
        prefix = &prefix[..prefix.len() - 1];
    }
    Ok(Some(format!("{prefix}{suffix}")))
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    /// No active deltas; the document was not read or touched.
    NoOp,
    /// Rendered document is identical to what is on disk.
    Unchanged,
    /// A new section was appended.
    Created,
    /// The existing section was replaced.
    Updated,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub action: SyncAction,
    pub dry_run: bool,
    pub active: usize,
    pub target: PathBuf,
    pub lines: Vec<String>,
}

impl SyncOutcome {
    pub fn changed(&self) -> bool {
        matches!(self.action, SyncAction::Created | SyncAction::Updated)
    }
}

/// Regenerate the target's section from the active deltas.
///
/// Dry runs go through the same rendering and report the same action but
/// never write.
pub fn sync<R: DeltaRepository>(
    store: &R,
    target: &Path,
    cfg: &SyncConfig,
    today: NaiveDate,
    dry_run: bool,
) -> Result<SyncOutcome> {
    let deltas = store.load_all();
    if deltas.is_empty() {
        tracing::debug!(target = %target.display(), "no active deltas; leaving target untouched");
        return Ok(SyncOutcome {
            action: SyncAction::NoOp,
            dry_run,
            active: 0,
            target: target.to_path_buf(),
            lines: Vec::new(),
        });
    }

    let doc = io::read_optional(target)?
        .ok_or_else(|| PlaybookError::TargetMissing(target.to_path_buf()))?;

    let lines = render_lines(&deltas, cfg);
    let body = render_body(&lines, today);
    let had_section = locate_section(&doc, target)?.is_some();
    let updated = upsert_section(&doc, &body, target)?;

    let action = if updated == doc {
        SyncAction::Unchanged
    } else if had_section {
        SyncAction::Updated
    } else {
        SyncAction::Created
    };

    if !dry_run && action != SyncAction::Unchanged {
        io::atomic_write(target, updated.as_bytes())?;
        tracing::info!(target = %target.display(), active = deltas.len(), ?action, "synced patterns");
    }

    Ok(SyncOutcome {
        action,
        dry_run,
        active: deltas.len(),
        target: target.to_path_buf(),
        lines,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct RemoveOutcome {
    pub removed: bool,
    pub dry_run: bool,
    pub target: PathBuf,
}

/// Delete the section (markers included) from the target document.
pub fn remove(target: &Path, dry_run: bool) -> Result<RemoveOutcome> {
    let doc = io::read_optional(target)?
        .ok_or_else(|| PlaybookError::TargetMissing(target.to_path_buf()))?;
    let stripped = strip_section(&doc, target)?;
    let removed = stripped.is_some();
    if let (Some(updated), false) = (stripped, dry_run) {
        io::atomic_write(target, updated.as_bytes())?;
        tracing::info!(target = %target.display(), "removed pattern section");
    }
    Ok(RemoveOutcome {
        removed,
        dry_run,
        target: target.to_path_buf(),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub active: usize,
    pub target: PathBuf,
    pub target_exists: bool,
    pub section_present: bool,
    pub rendered: usize,
    pub last_synced: Option<NaiveDate>,
}

pub fn status<R: DeltaRepository>(store: &R, target: &Path) -> Result<SyncStatus> {
    let active = store.load_all().len();
    let doc = io::read_optional(target)?;
    let parsed = match doc.as_deref() {
        Some(doc) => parse_section(doc, target)?,
        None => None,
    };
    Ok(SyncStatus {
        active,
        target: target.to_path_buf(),
        target_exists: doc.is_some(),
        section_present: parsed.is_some(),
        rendered: parsed.as_ref().map_or(0, |p| p.entries.len()),
        last_synced: parsed.and_then(|p| p.last_synced),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
