// 📋 Table Extractor - rendered report markup → numeric table
//
// The report is a wide table: first column holds the indicator label, every
// further column is one year. Rows are kept in document order because the
// normalizer addresses them by position.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::text::normalize_ws;

static TABLE: Lazy<Selector> = Lazy::new(|| Selector::parse("table").expect("static selector"));
static HEAD_ROW: Lazy<Selector> =
    Lazy::new(|| Selector::parse("thead tr").expect("static selector"));
static BODY_ROW: Lazy<Selector> =
    Lazy::new(|| Selector::parse("tbody tr, tfoot tr").expect("static selector"));
static CELL: Lazy<Selector> = Lazy::new(|| Selector::parse("th, td").expect("static selector"));

// ============================================================================
// NUMBER LOCALE
// ============================================================================

/// Thousands/decimal separators of the report. Turkish formatting by default
/// (`1.234,5`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumberLocale {
    pub thousands: char,
    pub decimal: char,
}

impl Default for NumberLocale {
    fn default() -> Self {
        NumberLocale {
            thousands: '.',
            decimal: ',',
        }
    }
}

impl NumberLocale {
    /// Parse one cell. Anything unparseable is absent, never an error.
    pub fn parse(&self, raw: &str) -> Option<f64> {
        let trimmed = raw.trim();
        let trimmed = trimmed.strip_suffix('%').unwrap_or(trimmed);

        let cleaned: String = trimmed
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '\u{a0}' && *c != self.thousands)
            .map(|c| match c {
                c if c == self.decimal => '.',
                '−' => '-',
                c => c,
            })
            .collect();

        if cleaned.is_empty() || cleaned == "-" {
            return None;
        }

        match cleaned.parse::<f64>() {
            Ok(v) if v.is_finite() => Some(v),
            _ => {
                debug!(cell = raw, "unparseable cell treated as absent");
                None
            }
        }
    }
}

// ============================================================================
// RAW REPORT TABLE
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub label: String,
    /// One slot per year column.
    pub values: Vec<Option<f64>>,
}

/// Rows × year-labelled columns, each cell a number or absent.
#[derive(Debug, Clone, PartialEq)]
pub struct RawReportTable {
    pub years: Vec<String>,
    pub rows: Vec<ReportRow>,
}

impl RawReportTable {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn year_index(&self, year: &str) -> Option<usize> {
        self.years.iter().position(|y| y == year)
    }

    /// `None` when the row or column does not exist, `Some(None)` for an absent cell.
    pub fn cell(&self, row: usize, year_idx: usize) -> Option<Option<f64>> {
        self.rows
            .get(row)
            .and_then(|r| r.values.get(year_idx).copied())
    }
}

// ============================================================================
// EXTRACTOR
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct TableExtractor {
    locale: NumberLocale,
}

impl TableExtractor {
    pub fn new(locale: NumberLocale) -> Self {
        TableExtractor { locale }
    }

    /// Parse the first table found in `markup`.
    ///
    /// Returns `None` when there is no table or it has no data rows.
    pub fn extract(&self, markup: &str) -> Option<RawReportTable> {
        let fragment = Html::parse_fragment(markup);
        let table = fragment.select(&TABLE).next()?;

        let mut header: Option<Vec<String>> = table
            .select(&HEAD_ROW)
            .last()
            .map(|row| cell_texts(&row));

        let mut body: Vec<ElementRef> = table.select(&BODY_ROW).collect();

        // Without a <thead>, leading all-<th> rows are the header.
        if header.is_none() {
            let leading = body.iter().take_while(|row| is_header_row(row)).count();
            if leading > 0 {
                header = Some(cell_texts(&body[leading - 1]));
                body.drain(..leading);
            }
        }

        if body.is_empty() {
            return None;
        }

        let raw_rows: Vec<Vec<String>> = body.iter().map(cell_texts).collect();
        let width = raw_rows
            .iter()
            .map(|r| r.len())
            .chain(header.iter().map(|h| h.len()))
            .max()
            .unwrap_or(0);

        if width < 2 {
            return None;
        }

        let years: Vec<String> = match header {
            Some(h) => (1..width)
                .map(|i| h.get(i).cloned().unwrap_or_else(|| i.to_string()))
                .collect(),
            None => (1..width).map(|i| i.to_string()).collect(),
        };

        let rows = raw_rows
            .into_iter()
            .map(|cells| {
                let label = cells.first().cloned().unwrap_or_default();
                let values = (1..width)
                    .map(|i| cells.get(i).and_then(|c| self.locale.parse(c)))
                    .collect();
                ReportRow { label, values }
            })
            .collect();

        Some(RawReportTable { years, rows })
    }
}

fn cell_texts(row: &ElementRef) -> Vec<String> {
    row.select(&CELL)
        .map(|cell| normalize_ws(&cell.text().collect::<String>()))
        .collect()
}

fn is_header_row(row: &ElementRef) -> bool {
    let mut cells = row.select(&CELL).peekable();
    cells.peek().is_some() && cells.all(|c| c.value().name() == "th")
}
