//! Markdown table extraction.
//!
//! Finds the first pipe table in a generated document and turns it into a
//! header plus data rows. Extraction never fails: text without a usable table
//! degrades to [`Extraction::NotFound`] or an empty [`ExtractedTable`].

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::error::PlannerError;

/// One parsed row: the trimmed cell texts in column order.
pub type TableRow = Vec<String>;

/// Compiled once; the pattern is a valid literal so init cannot fail at runtime.
static SEPARATOR_RE: OnceLock<Regex> = OnceLock::new();

/// A Markdown header/body separator such as `|---|:---:|`: every cell is a
/// run of hyphens with optional alignment colons. The leading pipe is
/// required, matching the rows `parse_table` reads; a bare `---` is a
/// horizontal rule.
fn separator_re() -> &'static Regex {
    SEPARATOR_RE.get_or_init(|| {
        Regex::new(r"^\|\s*:?-+:?\s*(\|\s*:?-+:?\s*)*\|?$").expect("valid literal regex")
    })
}

/// How the start of a table is recognised.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Locator {
    /// A pipe-prefixed line with at least two pipes, directly followed by a
    /// separator line. Independent of the header's wording or language.
    #[default]
    Structural,
    /// Any line containing a pipe and the given token (e.g. `Día`).
    HeaderMarker(String),
}

impl Locator {
    pub fn locate(&self, lines: &[&str]) -> Option<usize> {
        match self {
            Locator::Structural => lines.windows(2).position(|pair| {
                is_header_candidate(pair[0]) && separator_re().is_match(pair[1].trim())
            }),
            Locator::HeaderMarker(token) => lines
                .iter()
                .position(|line| line.contains('|') && line.contains(token.as_str())),
        }
    }
}

/// What to do with a data row whose cell count differs from the header's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowPolicy {
    /// Pad short rows with empty cells, truncate long ones.
    #[default]
    Repair,
    /// Leave the row out of the table.
    Drop,
}

impl fmt::Display for RowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowPolicy::Repair => f.write_str("repair"),
            RowPolicy::Drop => f.write_str("drop"),
        }
    }
}

impl FromStr for RowPolicy {
    type Err = PlannerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "repair" => Ok(RowPolicy::Repair),
            "drop" => Ok(RowPolicy::Drop),
            _ => Err(PlannerError::InvalidValue {
                field: "row_policy",
                value: s.to_owned(),
                expected: "\"repair\" or \"drop\"",
            }),
        }
    }
}

/// A header row plus data rows. Every data row has exactly as many cells as
/// the header.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExtractedTable {
    header: TableRow,
    rows: Vec<TableRow>,
    degraded_rows: usize,
}

impl ExtractedTable {
    /// The table with no header and no rows.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn rows(&self) -> &[TableRow] {
        &self.rows
    }

    pub fn column_count(&self) -> usize {
        self.header.len()
    }

    pub fn is_empty(&self) -> bool {
        self.header.is_empty()
    }

    /// Number of data rows that were padded, truncated or dropped.
    pub fn degraded_rows(&self) -> usize {
        self.degraded_rows
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded_rows > 0
    }
}

/// Result of running the extractor over one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// No line in the document qualifies as a table header.
    NotFound,
    /// A table start was found; the table may still be empty when fewer than
    /// two rows survived parsing.
    Found(ExtractedTable),
}

impl Extraction {
    pub fn table(&self) -> Option<&ExtractedTable> {
        match self {
            Extraction::NotFound => None,
            Extraction::Found(table) => Some(table),
        }
    }

    /// The extracted table, or the empty table when none was found.
    pub fn into_table(self) -> ExtractedTable {
        match self {
            Extraction::NotFound => ExtractedTable::empty(),
            Extraction::Found(table) => table,
        }
    }

    /// True when there is at least a header to export.
    pub fn has_data(&self) -> bool {
        self.table().is_some_and(|t| !t.is_empty())
    }
}

/// Locate-then-parse pipeline with its two policies bundled.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableExtractor {
    locator: Locator,
    policy: RowPolicy,
}

impl TableExtractor {
    pub fn new(locator: Locator, policy: RowPolicy) -> Self {
        Self { locator, policy }
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    pub fn policy(&self) -> RowPolicy {
        self.policy
    }

    pub fn extract(&self, document: &str) -> Extraction {
        let lines: Vec<&str> = document.lines().collect();

        let Some(start) = self.locator.locate(&lines) else {
            debug!(line_count = lines.len(), "no table found in document");
            return Extraction::NotFound;
        };

        let table = parse_table(&lines, start, self.policy);
        debug!(
            start_line = start,
            columns = table.column_count(),
            rows = table.rows().len(),
            degraded_rows = table.degraded_rows(),
            "table extracted"
        );
        Extraction::Found(table)
    }
}

/// Index of the first table header using structural detection.
pub fn locate_table_start(lines: &[&str]) -> Option<usize> {
    Locator::Structural.locate(lines)
}

/// Parse the contiguous pipe-prefixed block starting at `start`.
///
/// Separator lines are skipped, the first remaining row becomes the header
/// and the scan ends at the first line not starting with `|` (a blank line
/// included). Fewer than two rows yields the empty table.
pub fn parse_table(lines: &[&str], start: usize, policy: RowPolicy) -> ExtractedTable {
    let mut retained: Vec<TableRow> = Vec::new();

    for line in lines.iter().skip(start) {
        let trimmed = line.trim();
        if !trimmed.starts_with('|') {
            break;
        }
        if is_separator_row(trimmed) {
            continue;
        }
        retained.push(split_cells(trimmed));
    }

    if retained.len() < 2 {
        return ExtractedTable::empty();
    }

    let mut retained = retained.into_iter();
    let Some(header) = retained.next() else {
        return ExtractedTable::empty();
    };
    let width = header.len();

    let mut rows = Vec::new();
    let mut degraded_rows = 0;
    for (i, mut row) in retained.enumerate() {
        if row.len() == width {
            rows.push(row);
            continue;
        }

        degraded_rows += 1;
        warn!(
            row = i + 1,
            cells = row.len(),
            columns = width,
            policy = %policy,
            "table row does not match header width"
        );
        if policy == RowPolicy::Repair {
            row.resize(width, String::new());
            rows.push(row);
        }
    }

    ExtractedTable {
        header,
        rows,
        degraded_rows,
    }
}

fn is_header_candidate(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('|') && trimmed.matches('|').count() >= 2 && !is_separator_row(trimmed)
}

/// Only pipes, hyphens, alignment colons and whitespace.
fn is_separator_row(trimmed: &str) -> bool {
    trimmed
        .chars()
        .all(|c| matches!(c, '|' | '-' | ':') || c.is_whitespace())
}

/// Split a trimmed, pipe-prefixed line into cells. `\|` is a literal pipe
/// inside a cell.
fn split_cells(trimmed: &str) -> TableRow {
    let mut fragments: Vec<String> = vec![String::new()];
    let mut chars = trimmed.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'|') => {
                chars.next();
                push_char(&mut fragments, '|');
            }
            '|' => fragments.push(String::new()),
            other => push_char(&mut fragments, other),
        }
    }

    // Leading pipe always yields an empty first fragment; a trailing pipe
    // yields an empty last one.
    fragments.remove(0);
    if fragments.len() > 1 && fragments.last().is_some_and(|f| f.is_empty()) {
        fragments.pop();
    }

    fragments.iter().map(|f| f.trim().to_owned()).collect()
}

fn push_char(fragments: &mut [String], c: char) {
    if let Some(last) = fragments.last_mut() {
        last.push(c);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(doc: &str) -> Vec<&str> {
        doc.lines().collect()
    }

    fn cells(values: &[&str]) -> TableRow {
        values.iter().map(|v| (*v).to_owned()).collect()
    }

    const PLAN: &str = "\
Aquí tienes tu plan:

| Día | Tarea | Horario |
|-----|-------|---------|
| Lunes | Cálculo | 08:00-10:00 |
| Martes | Física | 09:00-11:00 |

**Comentario Crítico:** prioriza Cálculo.
";

    #[test]
    fn structural_locator_finds_header_before_separator() {
        assert_eq!(locate_table_start(&lines(PLAN)), Some(2));
    }

    #[test]
    fn structural_locator_ignores_header_wording() {
        let doc = "intro\n| Jour | Tâche |\n|---|---|\n| Lundi | Maths |";
        assert_eq!(locate_table_start(&lines(doc)), Some(1));
    }

    #[test]
    fn structural_locator_requires_separator_line() {
        let doc = "| a | b |\n| 1 | 2 |\n";
        assert_eq!(locate_table_start(&lines(doc)), None);
    }

    #[test]
    fn horizontal_rule_is_not_a_separator() {
        let doc = "| nota importante |\n---\n\n| Día | Tarea |\n|---|---|\n| Lunes | Cálculo |\n";
        assert_eq!(locate_table_start(&lines(doc)), Some(3));

        let extraction = TableExtractor::default().extract(doc);
        let table = extraction.table().expect("later table found");
        assert_eq!(table.header(), cells(&["Día", "Tarea"]).as_slice());
        assert_eq!(table.rows(), &[cells(&["Lunes", "Cálculo"])]);
    }

    #[test]
    fn structural_locator_accepts_alignment_colons() {
        let doc = "| a | b |\n|:--|--:|\n| 1 | 2 |";
        assert_eq!(locate_table_start(&lines(doc)), Some(0));
    }

    #[test]
    fn structural_locator_not_found_in_prose() {
        let doc = "hello world, no tables here";
        assert_eq!(locate_table_start(&lines(doc)), None);
        assert_eq!(locate_table_start(&[]), None);
    }

    #[test]
    fn marker_locator_matches_literal_token() {
        let locator = Locator::HeaderMarker("Día".into());
        assert_eq!(locator.locate(&lines(PLAN)), Some(2));

        let locator = Locator::HeaderMarker("Day".into());
        assert_eq!(locator.locate(&lines(PLAN)), None);
    }

    #[test]
    fn marker_locator_requires_a_pipe() {
        let locator = Locator::HeaderMarker("Día".into());
        let doc = "Día a día\n| Día | Tarea |\n|---|---|\n| Lunes | X |";
        assert_eq!(locator.locate(&lines(doc)), Some(1));
    }

    #[test]
    fn parse_table_splits_header_and_rows() {
        let table = parse_table(&lines(PLAN), 2, RowPolicy::Repair);

        assert_eq!(table.header(), cells(&["Día", "Tarea", "Horario"]).as_slice());
        assert_eq!(
            table.rows(),
            &[
                cells(&["Lunes", "Cálculo", "08:00-10:00"]),
                cells(&["Martes", "Física", "09:00-11:00"]),
            ]
        );
        assert!(!table.is_degraded());
    }

    #[test]
    fn separator_rows_are_never_data() {
        let doc = "| A | B |\n|---|---|\n| 1 | 2 |\n| --- | --- |\n| 3 | 4 |";
        let table = parse_table(&lines(doc), 0, RowPolicy::Repair);

        assert_eq!(table.rows(), &[cells(&["1", "2"]), cells(&["3", "4"])]);
    }

    #[test]
    fn cells_are_trimmed() {
        let doc = "|   foo   |\tbar |\n|---|---|\n|  1|2  |";
        let table = parse_table(&lines(doc), 0, RowPolicy::Repair);

        assert_eq!(table.header(), cells(&["foo", "bar"]).as_slice());
        assert_eq!(table.rows(), &[cells(&["1", "2"])]);
    }

    #[test]
    fn row_without_trailing_pipe_is_accepted() {
        let doc = "| A | B\n|---|---\n| 1 | 2";
        let table = parse_table(&lines(doc), 0, RowPolicy::Repair);

        assert_eq!(table.header(), cells(&["A", "B"]).as_slice());
        assert_eq!(table.rows(), &[cells(&["1", "2"])]);
    }

    #[test]
    fn empty_interior_cells_are_kept() {
        let doc = "| A | B | C |\n|---|---|---|\n| 1 |  | 3 |";
        let table = parse_table(&lines(doc), 0, RowPolicy::Repair);

        assert_eq!(table.rows(), &[cells(&["1", "", "3"])]);
        assert!(!table.is_degraded());
    }

    #[test]
    fn escaped_pipe_stays_inside_cell() {
        let doc = "| A | B |\n|---|---|\n| x \\| y | 2 |";
        let table = parse_table(&lines(doc), 0, RowPolicy::Repair);

        assert_eq!(table.rows(), &[cells(&["x | y", "2"])]);
    }

    #[test]
    fn scan_stops_at_blank_line() {
        let doc = "| A |\n|---|\n| 1 |\n\n| 2 |";
        let table = parse_table(&lines(doc), 0, RowPolicy::Repair);

        assert_eq!(table.rows(), &[cells(&["1"])]);
    }

    #[test]
    fn scan_stops_at_prose_after_table() {
        let table = parse_table(&lines(PLAN), 2, RowPolicy::Repair);
        assert_eq!(table.rows().len(), 2);
    }

    #[test]
    fn header_only_yields_empty_table() {
        let doc = "| A | B |\n|---|---|\n\nno rows";
        let table = parse_table(&lines(doc), 0, RowPolicy::Repair);

        assert!(table.is_empty());
        assert_eq!(table.column_count(), 0);
        assert!(table.rows().is_empty());
    }

    #[test]
    fn start_past_end_yields_empty_table() {
        let table = parse_table(&lines("| A |"), 10, RowPolicy::Repair);
        assert!(table.is_empty());
    }

    #[test]
    fn repair_pads_short_and_truncates_long_rows() {
        let doc = "| A | B | C |\n|---|---|---|\n| 1 |\n| 1 | 2 | 3 | 4 |\n| x | y | z |";
        let table = parse_table(&lines(doc), 0, RowPolicy::Repair);

        assert_eq!(
            table.rows(),
            &[
                cells(&["1", "", ""]),
                cells(&["1", "2", "3"]),
                cells(&["x", "y", "z"]),
            ]
        );
        assert_eq!(table.degraded_rows(), 2);
        assert!(table.is_degraded());
    }

    #[test]
    fn drop_policy_discards_mismatched_rows() {
        let doc = "| A | B | C |\n|---|---|---|\n| 1 |\n| 1 | 2 | 3 | 4 |\n| x | y | z |";
        let table = parse_table(&lines(doc), 0, RowPolicy::Drop);

        assert_eq!(table.rows(), &[cells(&["x", "y", "z"])]);
        assert_eq!(table.degraded_rows(), 2);
    }

    #[test]
    fn drop_policy_can_leave_header_only() {
        let doc = "| A | B |\n|---|---|\n| 1 |";
        let table = parse_table(&lines(doc), 0, RowPolicy::Drop);

        assert!(!table.is_empty());
        assert!(table.rows().is_empty());
        assert_eq!(table.degraded_rows(), 1);
    }

    #[test]
    fn extractor_reports_not_found() {
        let extraction = TableExtractor::default().extract("hello world, no tables here");
        assert_eq!(extraction, Extraction::NotFound);
        assert!(!extraction.has_data());
        assert!(extraction.into_table().is_empty());
    }

    #[test]
    fn extractor_takes_only_first_table() {
        let doc = format!("{PLAN}\n| X | Y |\n|---|---|\n| 9 | 9 |\n");
        let table = TableExtractor::default().extract(&doc).into_table();

        assert_eq!(table.header(), cells(&["Día", "Tarea", "Horario"]).as_slice());
        assert_eq!(table.rows().len(), 2);
    }

    #[test]
    fn extractor_handles_crlf() {
        let doc = "| A | B |\r\n|---|---|\r\n| 1 | 2 |\r\n";
        let table = TableExtractor::default().extract(doc).into_table();

        assert_eq!(table.header(), cells(&["A", "B"]).as_slice());
        assert_eq!(table.rows(), &[cells(&["1", "2"])]);
    }

    #[test]
    fn marker_extractor_matches_reference_behaviour() {
        let extractor =
            TableExtractor::new(Locator::HeaderMarker("Día".into()), RowPolicy::Repair);
        let table = extractor.extract(PLAN).into_table();
        assert_eq!(table.rows().len(), 2);
    }

    #[test]
    fn row_policy_parses_and_displays() {
        assert_eq!("Repair".parse::<RowPolicy>().unwrap(), RowPolicy::Repair);
        assert_eq!("drop".parse::<RowPolicy>().unwrap(), RowPolicy::Drop);
        assert_eq!(RowPolicy::Drop.to_string(), "drop");
        assert!("pad".parse::<RowPolicy>().is_err());
    }
}
