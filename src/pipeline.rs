// 🚜 Aggregation pipeline - discover, retrieve, normalize, write, ingest
//
// A run is sequential against one shared session. Entity failures are logged
// and skipped; workbooks are written only once the whole loop has finished.

use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, info_span, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::dataset::CanonicalDataset;
use crate::discovery::{Entity, EntityDiscoverer};
use crate::error::PipelineResult;
use crate::normalizer::{NormalizedRecord, RecordNormalizer};
use crate::retrieval::{EntityRetriever, RetrievalState};
use crate::session::PortalSession;
use crate::table::TableExtractor;
use crate::workbook;

// ============================================================================
// YEAR COLLECTION
// ============================================================================

/// Records grouped by year label, in the order they were retrieved.
#[derive(Debug, Clone, Default)]
pub struct YearCollection {
    sheets: BTreeMap<String, Vec<NormalizedRecord>>,
}

impl YearCollection {
    pub fn push(&mut self, record: NormalizedRecord) {
        self.sheets
            .entry(record.year.clone())
            .or_default()
            .push(record);
    }

    pub fn records(&self, year: &str) -> Option<&[NormalizedRecord]> {
        self.sheets.get(year).map(Vec::as_slice)
    }

    pub fn years(&self) -> impl Iterator<Item = &str> {
        self.sheets.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[NormalizedRecord])> {
        self.sheets
            .iter()
            .map(|(year, records)| (year.as_str(), records.as_slice()))
    }

    /// Total records across all years.
    pub fn len(&self) -> usize {
        self.sheets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Counters for the end-of-run summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub entities: usize,
    pub extracted: usize,
    pub failed: usize,
    pub skipped_years: usize,
}

// ============================================================================
// PIPELINE
// ============================================================================

pub struct AggregationPipeline {
    config: Config,
    discoverer: EntityDiscoverer,
    retriever: EntityRetriever,
    normalizer: RecordNormalizer,
}

impl AggregationPipeline {
    pub fn new(config: Config) -> Self {
        let discoverer = EntityDiscoverer::new(config.portal.clone(), config.timing.clone());
        let retriever = EntityRetriever::new(
            config.portal.clone(),
            config.timing.clone(),
            TableExtractor::new(config.locale),
        );
        let normalizer = RecordNormalizer::new(config.rows.clone());

        AggregationPipeline {
            config,
            discoverer,
            retriever,
            normalizer,
        }
    }

    pub fn discover(&self, session: &dyn PortalSession) -> PipelineResult<Vec<Entity>> {
        self.discoverer.discover(session)
    }

    /// Retrieve and normalize every entity, in order.
    pub fn run(&self, session: &dyn PortalSession, entities: &[Entity]) -> YearCollection {
        self.run_with_summary(session, entities).0
    }

    pub fn run_with_summary(
        &self,
        session: &dyn PortalSession,
        entities: &[Entity],
    ) -> (YearCollection, RunSummary) {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", %run_id);
        let _guard = span.enter();

        let total = entities.len();
        let mut collection = YearCollection::default();
        let mut summary = RunSummary {
            entities: total,
            ..Default::default()
        };

        info!(total, "starting retrieval");

        for (i, entity) in entities.iter().enumerate() {
            if i > 0 {
                session.pause(self.config.timing.inter_entity_delay());
            }
            info!(progress = %format!("{}/{}", i + 1, total), entity = %entity.name, "processing university");

            match self.retriever.retrieve(session, entity) {
                RetrievalState::Extracted(table) => {
                    summary.extracted += 1;
                    for year in &table.years {
                        match self.normalizer.normalize(&table, &entity.name, year) {
                            Ok(record) => collection.push(record),
                            Err(e) => {
                                summary.skipped_years += 1;
                                warn!(entity = %entity.name, year = %year, error = %e, "year skipped");
                            }
                        }
                    }
                }
                RetrievalState::Failed(e) => {
                    summary.failed += 1;
                    warn!(entity = %entity.name, error = %e, "university skipped");
                }
                other => {
                    summary.failed += 1;
                    warn!(entity = %entity.name, state = other.name(), "retrieval stopped early");
                }
            }
        }

        info!(
            extracted = summary.extracted,
            failed = summary.failed,
            records = collection.len(),
            "retrieval finished"
        );
        (collection, summary)
    }

    /// Raw and mean-normalized workbooks.
    pub fn write_workbooks(&self, collection: &YearCollection) -> PipelineResult<()> {
        let output = &self.config.output;
        workbook::write_raw(&output.raw_workbook, collection)?;
        workbook::write_normalized(&output.normalized_workbook, collection)?;
        Ok(())
    }

    /// Canonical dataset from the configured processed workbook.
    pub fn ingest_processed(&self) -> PipelineResult<CanonicalDataset> {
        ingest(&self.config.output.processed_workbook)
    }

    pub fn publish(&self, dataset: &CanonicalDataset) -> PipelineResult<()> {
        dataset.write_to(&self.config.output.dataset)?;
        info!(
            path = %self.config.output.dataset.display(),
            universities = dataset.universities.len(),
            "dataset written"
        );
        Ok(())
    }
}

// ============================================================================
// INGEST
// ============================================================================

/// Rebuild the canonical dataset from every year sheet of a processed workbook.
///
/// Sheets are visited in ascending year order; rows with a blank name are skipped.
pub fn ingest(processed_dir: &Path) -> PipelineResult<CanonicalDataset> {
    let sheets = workbook::read_score_sheets(processed_dir)?;
    let mut dataset = CanonicalDataset::default();

    for sheet in sheets {
        dataset.add_year(sheet.year);
        let mut kept = 0;
        for row in &sheet.rows {
            if dataset.upsert(&row.name, sheet.year, row.scores) {
                kept += 1;
            }
        }
        info!(year = sheet.year, rows = kept, "sheet ingested");
    }

    dataset.last_updated = Some(chrono::Local::now().format("%Y-%m-%d").to_string());
    Ok(dataset)
}

/// Launch Chrome, discover, retrieve, write workbooks. The browser is closed
/// before the workbooks are written.
#[cfg(feature = "browser")]
pub fn scrape(config: &Config) -> PipelineResult<YearCollection> {
    use crate::error::PipelineError;
    use crate::session::ChromeSession;

    let pipeline = AggregationPipeline::new(config.clone());
    let collection = {
        let session = ChromeSession::launch(&config.portal)
            .map_err(|e| PipelineError::Browser(format!("{:#}", e)))?;
        let entities = pipeline.discover(&session)?;
        pipeline.run(&session, &entities)
    };
    pipeline.write_workbooks(&collection)?;
    Ok(collection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimingConfig;
    use crate::normalizer::FieldKey;
    use crate::session::fixture::FixtureSession;
    use crate::session::Candidate;
    use std::fs;
    use std::time::Duration;

    /// 90-row report for one year: row 58 (y3) = 40, row 5 (t1) = 2, the rest 1.
    fn report_markup(year: &str) -> String {
        let mut html = format!(
            "<table class=\"table\"><thead><tr><th>Gösterge</th><th>{}</th></tr></thead><tbody>",
            year
        );
        for row in 0..90 {
            let value = match row {
                58 => "40",
                5 => "2",
                _ => "1",
            };
            html.push_str(&format!("<tr><td>r{}</td><td>{}</td></tr>", row, value));
        }
        html.push_str("</tbody></table>");
        html
    }

    fn test_config(data: &Path) -> Config {
        let mut config = Config {
            timing: TimingConfig::immediate(),
            ..Default::default()
        };
        config.output.raw_workbook = data.join("hamveri");
        config.output.normalized_workbook = data.join("hamveri_translog");
        config.output.processed_workbook = data.join("sfa_skorlar");
        config.output.dataset = data.join("data.json");
        config
    }

    fn portal_session() -> FixtureSession {
        let mut session = FixtureSession {
            page_before_click: "<html></html>".to_string(),
            page_after_click: r#"<script>var s = {"items": [{"yoksisId": 1, "name": "X Üniversitesi", "sno": 1}, {"yoksisId": 2, "name": "Y Üniversitesi", "sno": 2}]};</script>"#.to_string(),
            ..Default::default()
        };
        session.candidates.insert(
            "div[onclick*='university']".to_string(),
            vec![Candidate {
                text: "Üniversite Seç".to_string(),
                onclick: Some("university()".to_string()),
                class: None,
            }],
        );
        let x = "div[data-university-id='1']".to_string();
        session.present.push(x.clone());
        session.tables.insert(x, report_markup("2024"));
        // Y is listed but never renders: retrieval fails for it alone
        session
    }

    #[test]
    fn test_year_collection_groups_by_year() {
        let mut c = YearCollection::default();
        assert!(c.is_empty());
        for (name, year) in [("A", "2024"), ("B", "2023"), ("C", "2024")] {
            c.push(NormalizedRecord {
                entity_name: name.to_string(),
                year: year.to_string(),
                fields: Default::default(),
            });
        }
        assert_eq!(c.len(), 3);
        assert_eq!(c.years().collect::<Vec<_>>(), vec!["2023", "2024"]);
        let names: Vec<&str> = c
            .records("2024")
            .unwrap()
            .iter()
            .map(|r| r.entity_name.as_str())
            .collect();
        assert_eq!(names, vec!["A", "C"]);
        assert!(c.records("1999").is_none());
    }

    #[test]
    fn test_run_skips_failing_entity() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = AggregationPipeline::new(test_config(dir.path()));
        let session = portal_session();

        let entities = pipeline.discover(&session).unwrap();
        assert_eq!(entities.len(), 2);

        let (collection, summary) = pipeline.run_with_summary(&session, &entities);
        assert_eq!(
            summary,
            RunSummary {
                entities: 2,
                extracted: 1,
                failed: 1,
                skipped_years: 0
            }
        );

        let records = collection.records("2024").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].entity_name, "X Üniversitesi");
        assert_eq!(records[0].get(FieldKey::Y3), Some(20.0));
        assert_eq!(records[0].fields.len(), 18);
    }

    #[test]
    fn test_short_report_skips_year() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = AggregationPipeline::new(test_config(dir.path()));
        let mut session = portal_session();
        session.tables.insert(
            "div[data-university-id='1']".to_string(),
            "<table class=\"table\"><thead><tr><th></th><th>2024</th></tr></thead>\
             <tbody><tr><td>a</td><td>1</td></tr></tbody></table>"
                .to_string(),
        );

        let entities = pipeline.discover(&session).unwrap();
        let (collection, summary) = pipeline.run_with_summary(&session, &entities);
        assert!(collection.is_empty());
        assert_eq!(summary.skipped_years, 1);
    }

    #[test]
    fn test_inter_entity_delay_between_entities_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.timing.click_settle_ms = 4;
        config.timing.inter_entity_delay_ms = 777;
        let pipeline = AggregationPipeline::new(config);
        let session = portal_session();

        let entities: Vec<Entity> = (1..=3)
            .map(|i| Entity {
                id: i.to_string(),
                name: format!("Uni {}", i),
                sequence_number: i,
            })
            .collect();
        pipeline.run(&session, &entities);

        let pauses = session.pauses.borrow();
        let delay = Duration::from_millis(777);
        assert_eq!(pauses.first(), Some(&Duration::from_millis(4)));
        assert_eq!(pauses.iter().filter(|d| **d == delay).count(), 2);
    }

    #[test]
    fn test_zero_t1_skips_year() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = AggregationPipeline::new(test_config(dir.path()));
        let mut session = portal_session();
        session.tables.insert(
            "div[data-university-id='1']".to_string(),
            report_markup("2024").replace("<td>r5</td><td>2</td>", "<td>r5</td><td>0</td>"),
        );

        let entities = pipeline.discover(&session).unwrap();
        let (collection, summary) = pipeline.run_with_summary(&session, &entities);
        assert!(collection.records("2024").is_none());
        assert_eq!(summary.extracted, 1);
        assert_eq!(summary.skipped_years, 1);
    }

    #[test]
    fn test_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let pipeline = AggregationPipeline::new(config.clone());
        let session = portal_session();

        let entities = pipeline.discover(&session).unwrap();
        let collection = pipeline.run(&session, &entities);
        pipeline.write_workbooks(&collection).unwrap();

        let raw = fs::read_to_string(config.output.raw_workbook.join("2024.csv")).unwrap();
        let row: Vec<&str> = raw.lines().nth(1).unwrap().split(',').collect();
        assert_eq!(row[0], "X Üniversitesi");
        assert_eq!(row[3], "20");

        // single-row sheet: every present value divided by itself
        let norm =
            fs::read_to_string(config.output.normalized_workbook.join("2024.csv")).unwrap();
        let row: Vec<&str> = norm.lines().nth(1).unwrap().split(',').collect();
        assert_eq!(row[3], "1");

        // stand-in for the statistical step
        fs::create_dir_all(&config.output.processed_workbook).unwrap();
        fs::write(
            config.output.processed_workbook.join("2024.csv"),
            "Uni,Ortalama Skor,Medyan Skor\nX Üniversitesi,0.91,0.9\n",
        )
        .unwrap();

        let dataset = pipeline.ingest_processed().unwrap();
        assert_eq!(dataset.years, vec![2024]);
        assert_eq!(dataset.universities.len(), 1);
        assert_eq!(dataset.universities[0].slug, "x-universitesi");
        assert_eq!(dataset.universities[0].scores["2024"].ortalama, Some(0.91));
        assert!(dataset.last_updated.is_some());

        pipeline.publish(&dataset).unwrap();
        let text = fs::read_to_string(&config.output.dataset).unwrap();
        let back = CanonicalDataset::from_json(&text).unwrap();
        assert_eq!(back, dataset);
    }

    #[test]
    fn test_ingest_keeps_empty_sheet_years() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("2022.csv"), "Uni,Ortalama Skor\n").unwrap();
        fs::write(
            dir.path().join("2023.csv"),
            "Uni,Ortalama Skor\nA Üniversitesi,0.5\n , 0.9\n",
        )
        .unwrap();

        let dataset = ingest(dir.path()).unwrap();
        assert_eq!(dataset.years, vec![2022, 2023]);
        assert_eq!(dataset.universities.len(), 1);
    }

    #[test]
    fn test_ingest_missing_dir_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ingest(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, crate::error::PipelineError::Io(_)));
    }
}
