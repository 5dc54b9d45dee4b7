// 🏛️ Canonical dataset - the JSON artifact the read API serves
//
// Rebuilt wholesale on every pipeline run. Universities are keyed by a slug
// derived from the display name; names collapsing to the same slug share one
// entry and their score maps merge.

use fancy_regex::Regex;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::PipelineResult;
use crate::text::fold_turkish;

static NON_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s-]").expect("static slug pattern"));
static SEPARATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[-\s]+").expect("static slug pattern"));

// ============================================================================
// SLUG
// ============================================================================

/// URL-safe identifier: Turkish letters folded to ASCII, non-word characters
/// dropped, lowercased, whitespace/hyphen runs collapsed to one hyphen.
///
/// `slugify(slugify(x)) == slugify(x)`.
pub fn slugify(name: &str) -> String {
    let folded: String = name.trim().chars().map(fold_turkish).collect();
    let cleaned = NON_WORD.replace_all(&folded, "");
    let lowered = cleaned.to_lowercase();
    SEPARATORS.replace_all(&lowered, "-").into_owned()
}

// ============================================================================
// MODEL
// ============================================================================

/// Mean / median efficiency score for one year. Absent stays `null`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScorePair {
    pub ortalama: Option<f64>,
    pub medyan: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct University {
    pub slug: String,
    pub name: String,
    /// Year string → scores.
    #[serde(default)]
    pub scores: BTreeMap<String, ScorePair>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalDataset {
    #[serde(default)]
    pub years: Vec<i32>,
    #[serde(default)]
    pub universities: Vec<University>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

// ============================================================================
// RESPONSE SHAPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetInfo {
    pub last_updated: Option<String>,
    pub years: Vec<i32>,
    pub university_count: usize,
    pub latest_year: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankingEntry {
    pub slug: String,
    pub name: String,
    pub ortalama: f64,
    pub medyan: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearScore {
    pub year: i32,
    pub ortalama: Option<f64>,
    pub medyan: Option<f64>,
}

// ============================================================================
// BUILDING
// ============================================================================

impl CanonicalDataset {
    /// Record `scores` for `name` in `year`, creating or merging by slug.
    ///
    /// Returns `false` for a blank name (the row is skipped).
    pub fn upsert(&mut self, name: &str, year: i32, scores: ScorePair) -> bool {
        let name = name.trim();
        if name.is_empty() {
            return false;
        }

        let slug = slugify(name);
        let index = match self.universities.iter().position(|u| u.slug == slug) {
            Some(i) => i,
            None => {
                self.universities.push(University {
                    slug,
                    name: name.to_string(),
                    scores: BTreeMap::new(),
                });
                self.universities.len() - 1
            }
        };

        self.universities[index]
            .scores
            .insert(year.to_string(), scores);

        self.add_year(year);
        true
    }

    /// Keep `years` sorted and distinct.
    pub fn add_year(&mut self, year: i32) {
        if let Err(pos) = self.years.binary_search(&year) {
            self.years.insert(pos, year);
        }
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Pretty-printed UTF-8 JSON, written via a temp file and rename.
    pub fn write_to(&self, path: &Path) -> PipelineResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub fn latest_year(&self) -> Option<i32> {
        self.years.iter().copied().max()
    }

    pub fn has_year(&self, year: i32) -> bool {
        self.years.contains(&year)
    }

    pub fn info(&self) -> DatasetInfo {
        DatasetInfo {
            last_updated: self.last_updated.clone(),
            years: self.years.clone(),
            university_count: self.universities.len(),
            latest_year: self.latest_year(),
        }
    }

    pub fn find(&self, slug: &str) -> Option<&University> {
        self.universities.iter().find(|u| u.slug == slug)
    }

    /// Entities with an `ortalama` for `year`, highest first. Ties keep dataset order.
    pub fn ranking(&self, year: i32) -> Vec<RankingEntry> {
        let key = year.to_string();
        let mut ranking: Vec<RankingEntry> = self
            .universities
            .iter()
            .filter_map(|u| {
                let scores = u.scores.get(&key)?;
                Some(RankingEntry {
                    slug: u.slug.clone(),
                    name: u.name.clone(),
                    ortalama: scores.ortalama?,
                    medyan: scores.medyan,
                })
            })
            .collect();

        ranking.sort_by(|a, b| b.ortalama.partial_cmp(&a.ortalama).unwrap_or(Ordering::Equal));
        ranking
    }

    /// Case-insensitive substring match on the display name.
    pub fn search(&self, query: &str) -> Vec<&University> {
        let needle = crate::text::fold_lower(query);
        self.universities
            .iter()
            .filter(|u| crate::text::fold_lower(&u.name).contains(&needle))
            .collect()
    }

    /// Known years ascending, limited to years the university has an entry for.
    pub fn series(&self, university: &University) -> Vec<YearScore> {
        let mut years = self.years.clone();
        years.sort_unstable();
        years
            .into_iter()
            .filter_map(|year| {
                let scores = university.scores.get(&year.to_string())?;
                Some(YearScore {
                    year,
                    ortalama: scores.ortalama,
                    medyan: scores.medyan,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(ortalama: Option<f64>, medyan: Option<f64>) -> ScorePair {
        ScorePair { ortalama, medyan }
    }

    fn sample() -> CanonicalDataset {
        let mut ds = CanonicalDataset::default();
        ds.upsert("Ankara Üniversitesi", 2023, pair(Some(0.71), Some(0.70)));
        ds.upsert("Ege Üniversitesi", 2023, pair(Some(0.88), None));
        ds.upsert("Gazi Üniversitesi", 2023, pair(None, Some(0.5)));
        ds.upsert("Ankara Üniversitesi", 2024, pair(Some(0.75), Some(0.74)));
        ds.upsert("Hacettepe Üniversitesi", 2023, pair(Some(0.71), None));
        ds.last_updated = Some("2024-10-26".to_string());
        ds
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("X Üniversitesi"), "x-universitesi");
        assert_eq!(slugify("  Orta Doğu Teknik  Üniversitesi "), "orta-dogu-teknik-universitesi");
        assert_eq!(slugify("İzmir Yüksek Teknoloji Enstitüsü"), "izmir-yuksek-teknoloji-enstitusu");
        assert_eq!(slugify("Koç Üniversitesi (Vakıf)"), "koc-universitesi-vakif");
        assert_eq!(slugify("A -- B"), "a-b");
    }

    #[test]
    fn test_slugify_idempotent() {
        for name in [
            "X Üniversitesi",
            "ŞIRNAK ÜNİVERSİTESİ",
            "Sağlık Bilimleri Üniversitesi - İstanbul",
            "-a b-",
            "Çukurova  Üniv.",
        ] {
            let once = slugify(name);
            assert_eq!(slugify(&once), once, "not idempotent for {:?}", name);
        }
    }

    #[test]
    fn test_colliding_slugs_merge_scores() {
        let mut ds = CanonicalDataset::default();
        ds.upsert("Koç Üniversitesi", 2022, pair(Some(0.9), None));
        ds.upsert("Koc Universitesi", 2023, pair(Some(0.8), None));

        assert_eq!(ds.universities.len(), 1);
        let uni = &ds.universities[0];
        assert_eq!(uni.name, "Koç Üniversitesi");
        assert_eq!(uni.scores.len(), 2);
        assert_eq!(ds.years, vec![2022, 2023]);
    }

    #[test]
    fn test_blank_name_skipped() {
        let mut ds = CanonicalDataset::default();
        assert!(!ds.upsert("   ", 2024, ScorePair::default()));
        assert!(ds.universities.is_empty());
        assert!(ds.years.is_empty());
    }

    #[test]
    fn test_ranking_excludes_absent_and_sorts_descending() {
        let ds = sample();
        let ranking = ds.ranking(2023);

        let slugs: Vec<&str> = ranking.iter().map(|r| r.slug.as_str()).collect();
        assert_eq!(
            slugs,
            ["ege-universitesi", "ankara-universitesi", "hacettepe-universitesi"]
        );
        assert!(ranking.windows(2).all(|w| w[0].ortalama >= w[1].ortalama));
        assert!(ds.ranking(1999).is_empty());
    }

    #[test]
    fn test_info_search_series() {
        let ds = sample();
        let info = ds.info();
        assert_eq!(info.years, vec![2023, 2024]);
        assert_eq!(info.latest_year, Some(2024));
        assert_eq!(info.university_count, 4);

        let hits = ds.search("ANKARA");
        assert_eq!(hits.len(), 1);
        assert_eq!(ds.search("üniversitesi").len(), 4);

        let ankara = ds.find("ankara-universitesi").unwrap();
        let series = ds.series(ankara);
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].year, 2023);
        assert_eq!(series[1].ortalama, Some(0.75));

        let ege = ds.find("ege-universitesi").unwrap();
        assert_eq!(ds.series(ege).len(), 1);
    }

    #[test]
    fn test_json_shape() {
        let ds = sample();
        let value = serde_json::to_value(&ds).unwrap();

        assert_eq!(value["years"], serde_json::json!([2023, 2024]));
        assert_eq!(value["lastUpdated"], "2024-10-26");
        let ege = &value["universities"][1];
        assert_eq!(ege["slug"], "ege-universitesi");
        assert_eq!(ege["scores"]["2023"]["medyan"], serde_json::Value::Null);

        let back = CanonicalDataset::from_json(&value.to_string()).unwrap();
        assert_eq!(back, ds);
    }

    #[test]
    fn test_write_to() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("data.json");
        sample().write_to(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("Ankara Üniversitesi"));
        assert_eq!(CanonicalDataset::from_json(&text).unwrap(), sample());
    }
}
