//! Pulls course sections out of a schedule page.
//!
//! Two page shapes are understood. Banner's dynamic schedule prints each
//! section as a title row (`<th><a>Title - CRN - SUBJ NUM - SEC</a></th>`)
//! followed by a detail row holding labelled lines and a nested meeting
//! table. Simpler listings are a single table with a header row naming the
//! course and title columns. Units are located by those signatures, never
//! by position, and visited in document order.

use std::fmt::Display;

use ::scraper::{ElementRef, Html, Node, Selector};
use regex::Regex;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::{
    decode::{decode, DecodeError, DecodePolicy, Encoding},
    text::{camel_case, clean},
    Course, Diagnostics, Extraction, RawData,
};

const SUBJECT_HEADERS: &[&str] = &["subject", "subj", "dept", "department"];
const NUMBER_HEADERS: &[&str] = &["course", "course number", "course no.", "course #", "number", "crse", "no."];
const TITLE_HEADERS: &[&str] = &["title", "course title", "name", "course name"];

const CATALOG_LINK_TEXT: &str = "View Catalog Entry";

/// Upper bound on `colspan` so a hostile attribute can't blow up a row
const MAX_COLSPAN: usize = 64;

/// Decodes `bytes` and extracts every course section on the page.
///
/// The only failure is a document that can't be decoded under `encoding`
/// and `policy`; malformed markup just yields fewer courses.
pub fn extract_bytes(bytes: &[u8], encoding: Encoding, policy: DecodePolicy) -> Result<Extraction, DecodeError> {
    let text = decode(bytes, encoding, policy)?;
    Ok(extract_courses(&text))
}

/// Extracts every course section from an already decoded page, in document
/// order, with ids counting up from 1.
pub fn extract_courses(html: &str) -> Extraction {
    let document = Html::parse_document(html);
    let selectors = Selectors::new();
    let patterns = Patterns::new();
    let listings = find_listings(&document, &selectors);

    let mut courses: Vec<Course> = Vec::new();
    let mut diagnostics = Diagnostics::default();

    for row in document.select(&selectors.row) {
        // rows of a recognized listing are read by column even when a cell holds a link
        let candidate = match listing_for(row, &listings) {
            Some(listing) if listing.header.id() == row.id() => continue,
            Some(listing) => listing.candidate(row),
            None => match section_anchor(row, &selectors) {
                Some(anchor) => section_candidate(row, anchor, &selectors, &patterns),
                None => continue,
            },
        };
        // blank headings and spacer rows aren't sections at all
        let Some(candidate) = candidate else {
            continue;
        };

        diagnostics.total_rows_seen += 1;
        match candidate.validate() {
            Ok((subject, course_number, name)) => {
                diagnostics.rows_accepted += 1;
                courses.push(Course {
                    id: diagnostics.rows_accepted as u64,
                    subject,
                    course_number,
                    name,
                    raw_data: candidate.raw_data,
                });
            }
            Err(reason) => {
                diagnostics.rows_rejected += 1;
                debug!(heading = %candidate.heading, %reason, "skipping malformed row");
            }
        }
    }

    debug!(
        seen = diagnostics.total_rows_seen,
        accepted = diagnostics.rows_accepted,
        rejected = diagnostics.rows_rejected,
        "finished extracting courses"
    );
    Extraction { courses, diagnostics }
}

struct Selectors {
    row: Selector,
    anchor: Selector,
    table: Selector,
}

impl Selectors {
    fn new() -> Self {
        Selectors {
            row: Selector::parse("tr").expect("row selector should parse"),
            anchor: Selector::parse("a").expect("anchor selector should parse"),
            table: Selector::parse("table").expect("table selector should parse"),
        }
    }
}

struct Patterns {
    /// `Title - CRN - SUBJ NUM - SEC`; the title may itself contain ` - `
    banner_heading: Regex,
    labelled: Regex,
    campus: Regex,
    schedule_type: Regex,
    credits: Regex,
}

impl Patterns {
    fn new() -> Self {
        Patterns {
            banner_heading: Regex::new(
                r"^(?P<title>.*?)\s*-\s+(?P<crn>\d+)\s+-\s+(?P<subject>\S+)\s+(?P<number>\S+)\s+-\s+(?P<section>\S+)$",
            )
            .expect("heading regex should parse"),
            labelled: Regex::new(r"^(?P<label>[A-Za-z][A-Za-z /]*?)\s*:\s*(?P<value>.+)$")
                .expect("label regex should parse"),
            campus: Regex::new(r"^(?P<campus>.+) Campus$").expect("campus regex should parse"),
            schedule_type: Regex::new(r"^(?P<kind>.+) Schedule Type$").expect("schedule type regex should parse"),
            credits: Regex::new(r"(?i)^(?P<credits>\d+(?:\.\d+)?(?:\s+(?:to|or)\s+\d+(?:\.\d+)?)?)\s+credits$")
                .expect("credits regex should parse"),
        }
    }
}

/// A structural unit that looked like a section, before validation
struct Candidate {
    heading: String,
    subject: String,
    number: String,
    title: String,
    raw_data: RawData,
}

#[derive(Debug)]
enum MalformedRow {
    MissingSubject,
    BadSubject(String),
    BadCourseNumber(String),
    EmptyTitle,
}

impl Display for MalformedRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MalformedRow::MissingSubject => write!(f, "no subject code"),
            MalformedRow::BadSubject(s) => write!(f, "{s:?} is not a subject code"),
            MalformedRow::BadCourseNumber(n) => write!(f, "{n:?} is not a positive course number"),
            MalformedRow::EmptyTitle => write!(f, "title is empty"),
        }
    }
}

impl Candidate {
    fn validate(&self) -> Result<(String, u32, String), MalformedRow> {
        let subject = self.subject.trim();
        if subject.is_empty() {
            return Err(MalformedRow::MissingSubject);
        }
        let starts_with_letter = subject.starts_with(|c: char| c.is_ascii_uppercase());
        let is_code = subject
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
        if !starts_with_letter || !is_code || subject.len() > 8 {
            return Err(MalformedRow::BadSubject(subject.to_string()));
        }

        let number = self.number.trim();
        let course_number = number
            .bytes()
            .all(|b| b.is_ascii_digit())
            .then(|| number.parse::<u32>().ok())
            .flatten()
            .filter(|&n| n > 0)
            .ok_or_else(|| MalformedRow::BadCourseNumber(number.to_string()))?;

        let title = clean(&self.title);
        if title.is_empty() {
            return Err(MalformedRow::EmptyTitle);
        }

        Ok((subject.to_string(), course_number, title))
    }
}

fn element_text(el: ElementRef) -> String {
    clean(&el.text().collect::<String>())
}

fn child_elements<'a>(el: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    el.children().filter_map(ElementRef::wrap)
}

fn nearest_table(el: ElementRef) -> Option<ElementRef> {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| a.value().name() == "table")
}

/// Rows belonging to `table` itself, not to tables nested in its cells
fn own_rows<'a>(table: ElementRef<'a>, selectors: &'a Selectors) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    table
        .select(&selectors.row)
        .filter(move |row| nearest_table(*row).is_some_and(|t| t.id() == table.id()))
}

/// Cell texts of a row with merged cells repeated across their span
fn row_cells(row: ElementRef) -> Vec<String> {
    let mut cells = Vec::new();
    for cell in child_elements(row).filter(|c| matches!(c.value().name(), "td" | "th")) {
        let span = cell
            .value()
            .attr("colspan")
            .and_then(|s| s.trim().parse::<usize>().ok())
            .unwrap_or(1)
            .clamp(1, MAX_COLSPAN);
        let text = element_text(cell);
        cells.extend(std::iter::repeat(text).take(span));
    }
    cells
}

fn is_header_row(row: ElementRef) -> bool {
    let mut cells = child_elements(row)
        .filter(|c| matches!(c.value().name(), "td" | "th"))
        .peekable();
    cells.peek().is_some() && cells.all(|c| c.value().name() == "th")
}

// ---- Banner section blocks ----

fn section_anchor<'a>(row: ElementRef<'a>, selectors: &Selectors) -> Option<ElementRef<'a>> {
    child_elements(row)
        .filter(|c| c.value().name() == "th")
        .find_map(|th| th.select(&selectors.anchor).next())
}

fn section_candidate(
    row: ElementRef,
    anchor: ElementRef,
    selectors: &Selectors,
    patterns: &Patterns,
) -> Option<Candidate> {
    let heading = element_text(anchor);
    if heading.is_empty() {
        return None;
    }

    let mut raw_data = RawData::new();
    let (subject, number, title) = match patterns.banner_heading.captures(&heading) {
        Some(caps) => {
            let crn = &caps["crn"];
            raw_data.insert(
                "crn".to_string(),
                crn.parse::<u64>().map_or_else(|_| Value::from(crn), Value::from),
            );
            raw_data.insert("section".to_string(), Value::from(&caps["section"]));
            (
                caps["subject"].to_string(),
                caps["number"].to_string(),
                caps["title"].to_string(),
            )
        }
        None => split_plain_heading(&heading),
    };

    let detail = row
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .next()
        .filter(|next| next.value().name() == "tr" && section_anchor(*next, selectors).is_none());
    if let Some(detail) = detail {
        read_section_detail(detail, selectors, patterns, &mut raw_data);
    }

    Some(Candidate {
        heading,
        subject,
        number,
        title,
        raw_data,
    })
}

/// `SUBJ NUM Title...`, with any separator between number and title dropped
fn split_plain_heading(heading: &str) -> (String, String, String) {
    let mut tokens = heading.splitn(3, ' ');
    let subject = tokens.next().unwrap_or_default();
    let number = tokens.next().unwrap_or_default();
    let title = tokens
        .next()
        .unwrap_or_default()
        .trim_start_matches(|c: char| matches!(c, '-' | ':' | '–' | '—') || c.is_whitespace());
    (subject.to_string(), number.to_string(), title.to_string())
}

fn read_section_detail(detail: ElementRef, selectors: &Selectors, patterns: &Patterns, raw_data: &mut RawData) {
    let Some(cell) = child_elements(detail).find(|c| c.value().name() == "td") else {
        return;
    };

    for line in cell_lines(cell) {
        if let Some(caps) = patterns.labelled.captures(&line) {
            let key = camel_case(&caps["label"]);
            if !key.is_empty() {
                raw_data.insert(key, Value::from(&caps["value"]));
            }
        } else if let Some(caps) = patterns.campus.captures(&line) {
            raw_data.insert("campus".to_string(), Value::from(&caps["campus"]));
        } else if let Some(caps) = patterns.schedule_type.captures(&line) {
            raw_data.insert("scheduleType".to_string(), Value::from(&caps["kind"]));
        } else if let Some(caps) = patterns.credits.captures(&line) {
            raw_data.insert("credits".to_string(), Value::from(&caps["credits"]));
        }
    }

    let catalog = cell
        .select(&selectors.anchor)
        .find(|a| element_text(*a) == CATALOG_LINK_TEXT)
        .and_then(|a| a.value().attr("href"));
    if let Some(href) = catalog {
        raw_data.insert("catalogEntry".to_string(), Value::from(href));
    }

    if let Some(table) = cell.select(&selectors.table).next() {
        let meetings = meeting_rows(table, selectors);
        let instructors = collect_instructors(&meetings);
        if !meetings.is_empty() {
            raw_data.insert(
                "meetings".to_string(),
                Value::Array(meetings.into_iter().map(Value::Object).collect()),
            );
        }
        if !instructors.is_empty() {
            raw_data.insert("instructors".to_string(), Value::Array(instructors));
        }
    }
}

/// Text of a detail cell split at line-breaking elements, skipping nested
/// tables which are read separately
fn cell_lines(cell: ElementRef) -> Vec<String> {
    fn walk(el: ElementRef, lines: &mut Vec<String>) {
        for child in el.children() {
            match child.value() {
                Node::Text(text) => {
                    if let Some(line) = lines.last_mut() {
                        line.push_str(text);
                    }
                }
                Node::Element(e) => {
                    let Some(child) = ElementRef::wrap(child) else {
                        continue;
                    };
                    match e.name() {
                        "table" => {}
                        "br" | "p" | "div" | "tr" | "li" => {
                            lines.push(String::new());
                            walk(child, lines);
                            lines.push(String::new());
                        }
                        _ => walk(child, lines),
                    }
                }
                _ => {}
            }
        }
    }

    let mut lines = vec![String::new()];
    walk(cell, &mut lines);
    lines
        .iter()
        .map(|line| clean(line))
        .filter(|line| !line.is_empty())
        .collect()
}

/// The meeting table's data rows keyed by camelCased column header
fn meeting_rows(table: ElementRef, selectors: &Selectors) -> Vec<Map<String, Value>> {
    let mut rows = own_rows(table, selectors);
    let Some(header) = rows.next().filter(|r| is_header_row(*r)) else {
        return Vec::new();
    };
    let headers: Vec<String> = row_cells(header).iter().map(|h| camel_case(h)).collect();

    rows.map(row_cells)
        .filter(|cells| cells.iter().any(|c| !c.is_empty()))
        .map(|cells| {
            headers
                .iter()
                .zip(cells)
                .filter(|(key, _)| !key.is_empty())
                .map(|(key, value)| (key.clone(), Value::from(value)))
                .collect()
        })
        .collect()
}

/// Instructors across all meetings, first seen first. `(P)` marks the
/// primary instructor and a placeholder `TBA` is dropped once anyone real
/// is listed.
fn collect_instructors(meetings: &[Map<String, Value>]) -> Vec<Value> {
    let mut found: Vec<(String, bool)> = Vec::new();
    let listed = meetings
        .iter()
        .filter_map(|m| m.get("instructors").and_then(Value::as_str))
        .flat_map(|s| s.split(','));
    for entry in listed {
        let primary = entry.contains("(P)");
        let name = entry.split('(').next().unwrap_or_default().trim();
        if name.is_empty() {
            continue;
        }
        match found.iter_mut().find(|(n, _)| n == name) {
            Some((_, p)) => *p |= primary,
            None => found.push((name.to_string(), primary)),
        }
    }
    if found.iter().any(|(n, _)| n != "TBA") {
        found.retain(|(n, _)| n != "TBA");
    }
    found
        .into_iter()
        .map(|(name, primary)| json!({ "name": name, "primary": primary }))
        .collect()
}

// ---- headered listing tables ----

struct Listing<'a> {
    table: ElementRef<'a>,
    header: ElementRef<'a>,
    headers: Vec<String>,
    subject: Option<usize>,
    number: usize,
    title: usize,
}

fn find_listings<'a>(document: &'a Html, selectors: &'a Selectors) -> Vec<Listing<'a>> {
    document
        .select(&selectors.table)
        .filter_map(|table| {
            let header = own_rows(table, selectors).next().filter(|r| is_header_row(*r))?;
            let headers = row_cells(header);
            let column = |aliases: &[&str]| {
                headers
                    .iter()
                    .position(|h| aliases.contains(&h.to_lowercase().as_str()))
            };
            let number = column(NUMBER_HEADERS)?;
            let title = column(TITLE_HEADERS)?;
            let subject = column(SUBJECT_HEADERS);
            Some(Listing {
                table,
                header,
                headers,
                subject,
                number,
                title,
            })
        })
        .collect()
}

fn listing_for<'l, 'a>(row: ElementRef<'a>, listings: &'l [Listing<'a>]) -> Option<&'l Listing<'a>> {
    let table = nearest_table(row)?;
    listings.iter().find(|l| l.table.id() == table.id())
}

impl Listing<'_> {
    fn candidate(&self, row: ElementRef) -> Option<Candidate> {
        let cells = row_cells(row);
        if cells.iter().all(|c| c.is_empty()) {
            return None;
        }
        let cell = |i: usize| cells.get(i).map(String::as_str).unwrap_or_default();

        let (subject, number) = match self.subject {
            Some(s) => (cell(s).to_string(), cell(self.number).to_string()),
            None => {
                let mut tokens = cell(self.number).split_whitespace();
                match (tokens.next(), tokens.next(), tokens.next()) {
                    (Some(subject), Some(number), None) => (subject.to_string(), number.to_string()),
                    _ => (String::new(), cell(self.number).to_string()),
                }
            }
        };

        let keys = [self.subject, Some(self.number), Some(self.title)];
        let raw_data = self
            .headers
            .iter()
            .enumerate()
            .filter(|(i, _)| !keys.contains(&Some(*i)))
            .filter_map(|(i, header)| {
                let key = camel_case(header);
                let value = cell(i);
                (!key.is_empty() && !value.is_empty()).then(|| (key, Value::from(value)))
            })
            .collect();

        Some(Candidate {
            heading: cells.join(" | "),
            subject,
            number,
            title: cell(self.title).to_string(),
            raw_data,
        })
    }
}
