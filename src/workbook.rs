// 📒 Workbooks - one CSV sheet per year
//
// A workbook is a directory; each sheet is `<year>.csv`. The raw and
// mean-normalized workbooks feed the external statistical step, whose
// output workbook (same layout, score columns) is read back at ingest.

use csv::{ReaderBuilder, WriterBuilder};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::dataset::ScorePair;
use crate::error::PipelineResult;
use crate::normalizer::{FieldKey, NormalizedRecord};
use crate::pipeline::YearCollection;
use crate::table::NumberLocale;

pub const NAME_COLUMN: &str = "Uni";

/// `Uni, y1..y13, x1..x5`
pub fn header() -> Vec<&'static str> {
    std::iter::once(NAME_COLUMN)
        .chain(FieldKey::indicators().map(|k| k.as_str()))
        .collect()
}

// ============================================================================
// WRITING
// ============================================================================

/// Values as extracted.
pub fn write_raw(dir: &Path, collection: &YearCollection) -> PipelineResult<Vec<PathBuf>> {
    write_workbook(dir, collection, |records| {
        records.iter().map(record_values).collect()
    })
}

/// Each column divided by its mean within the sheet.
pub fn write_normalized(dir: &Path, collection: &YearCollection) -> PipelineResult<Vec<PathBuf>> {
    write_workbook(dir, collection, |records| {
        let means = column_means(records);
        records
            .iter()
            .map(|r| {
                record_values(r)
                    .into_iter()
                    .zip(&means)
                    .map(|(value, mean)| match (value, mean) {
                        (Some(v), Some(m)) if *m != 0.0 => Some(v / m),
                        _ => None,
                    })
                    .collect()
            })
            .collect()
    })
}

/// Mean over present values per indicator column. Empty column → absent.
pub fn column_means(records: &[NormalizedRecord]) -> Vec<Option<f64>> {
    FieldKey::indicators()
        .map(|key| {
            let present: Vec<f64> = records.iter().filter_map(|r| r.get(key)).collect();
            if present.is_empty() {
                None
            } else {
                Some(present.iter().sum::<f64>() / present.len() as f64)
            }
        })
        .collect()
}

fn record_values(record: &NormalizedRecord) -> Vec<Option<f64>> {
    FieldKey::indicators().map(|k| record.get(k)).collect()
}

fn write_workbook<F>(dir: &Path, collection: &YearCollection, values: F) -> PipelineResult<Vec<PathBuf>>
where
    F: Fn(&[NormalizedRecord]) -> Vec<Vec<Option<f64>>>,
{
    fs::create_dir_all(dir)?;
    clear_sheets(dir)?;

    let mut written = Vec::new();
    for (year, records) in collection.iter() {
        if records.is_empty() {
            debug!(year = %year, "empty sheet skipped");
            continue;
        }

        let path = dir.join(format!("{}.csv", sheet_file_stem(year)));
        let mut writer = WriterBuilder::new().from_path(&path)?;
        writer.write_record(header())?;

        for (record, row) in records.iter().zip(values(records)) {
            let mut out = Vec::with_capacity(row.len() + 1);
            out.push(record.entity_name.clone());
            out.extend(row.into_iter().map(format_cell));
            writer.write_record(&out)?;
        }
        writer.flush()?;
        written.push(path);
    }

    info!(dir = %dir.display(), sheets = written.len(), "workbook written");
    Ok(written)
}

/// Previous run's year sheets must not survive into this one. Other files stay.
fn clear_sheets(dir: &Path) -> PipelineResult<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if sheet_year(&path).is_some() {
            debug!(path = %path.display(), "removing stale sheet");
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Year of a `<digits>.csv` sheet.
fn sheet_year(path: &Path) -> Option<i32> {
    if !path.extension().is_some_and(|e| e == "csv") {
        return None;
    }
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))
        .and_then(|s| s.parse::<i32>().ok())
}

fn sheet_file_stem(year: &str) -> String {
    year.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

fn format_cell(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => v.to_string(),
        _ => String::new(),
    }
}

// ============================================================================
// READING (processed workbook)
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreRow {
    pub name: String,
    pub scores: ScorePair,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreSheet {
    pub year: i32,
    pub rows: Vec<ScoreRow>,
}

/// Every `<digits>.csv` sheet, ascending by year. Other files are ignored.
pub fn read_score_sheets(dir: &Path) -> PipelineResult<Vec<ScoreSheet>> {
    let mut sheets = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(year) = sheet_year(&path) else {
            debug!(path = %path.display(), "not a year sheet");
            continue;
        };

        sheets.push(read_score_sheet(&path, year)?);
    }
    sheets.sort_by_key(|s| s.year);
    Ok(sheets)
}

fn read_score_sheet(path: &Path, year: i32) -> PipelineResult<ScoreSheet> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    let find = |word: &str| {
        headers
            .iter()
            .position(|h| h.contains(word) && h.contains("Skor"))
    };
    let ortalama_col = find("Ortalama");
    let medyan_col = find("Medyan");
    debug!(year, ?ortalama_col, ?medyan_col, "score columns");

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let name = record.get(0).unwrap_or("").trim().to_string();
        let cell = |col: Option<usize>| col.and_then(|c| record.get(c)).and_then(parse_score);
        rows.push(ScoreRow {
            name,
            scores: ScorePair {
                ortalama: cell(ortalama_col),
                medyan: cell(medyan_col),
            },
        });
    }

    Ok(ScoreSheet { year, rows })
}

/// Plain `0.81`, or Turkish `0,81`. `NA`, blanks and junk are absent.
fn parse_score(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Some(v),
        Ok(_) => None,
        Err(_) => NumberLocale::default().parse(raw),
    }
}
