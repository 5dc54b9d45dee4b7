// 🔎 Entity Discoverer - enumerate universities without a listing endpoint
//
// Two phases:
// 1. Activate the "university selector" control (ordered selector probing).
// 2. Read the entity list back out of the page (ordered DiscoveryStrategy chain).

use anyhow::Result;
use fancy_regex::Regex;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{ActivationKeywords, PortalConfig, TimingConfig};
use crate::error::{PipelineError, PipelineResult};
use crate::session::{Candidate, PortalSession};
use crate::text::{contains_ci, strip_tags};

/// `{ ... "items": [ ... ] ... }` with no nested object outside the array.
static ITEMS_PAYLOAD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)\{[^{}]*"items"[^{}]*\[[^\]]*\][^{}]*\}"#).expect("static payload pattern")
});

// ============================================================================
// ENTITY
// ============================================================================

/// One reportable university. Identity is `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    pub sequence_number: i64,
}

impl Entity {
    /// Ids from the markup fallback are positional and change between runs.
    pub fn has_synthetic_id(&self) -> bool {
        self.id.starts_with(SYNTHETIC_ID_PREFIX)
    }
}

const SYNTHETIC_ID_PREFIX: &str = "html_";

// ============================================================================
// STRATEGIES
// ============================================================================

/// One way of reading the entity list out of the activated page.
pub trait DiscoveryStrategy {
    fn name(&self) -> &str;

    /// `Ok(None)` when this strategy found nothing.
    fn try_discover(&self, session: &dyn PortalSession) -> Result<Option<Vec<Entity>>>;
}

/// Finds an embedded JSON payload with an `items` array in the page markup.
pub struct EmbeddedJsonStrategy;

impl EmbeddedJsonStrategy {
    pub fn parse_markup(markup: &str) -> Vec<Entity> {
        for found in ITEMS_PAYLOAD.find_iter(markup) {
            let Ok(found) = found else { continue };

            let payload: Value = match serde_json::from_str(found.as_str()) {
                Ok(v) => v,
                Err(e) => {
                    debug!(error = %e, "candidate payload is not JSON");
                    continue;
                }
            };

            if let Some(items) = payload.get("items").and_then(Value::as_array) {
                info!(count = items.len(), "embedded university payload found");
                return items.iter().map(entity_from_item).collect();
            }
        }
        Vec::new()
    }
}

fn entity_from_item(item: &Value) -> Entity {
    let id = match item.get("yoksisId") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    Entity {
        id,
        name: item
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        sequence_number: item.get("sno").and_then(Value::as_i64).unwrap_or(0),
    }
}

impl DiscoveryStrategy for EmbeddedJsonStrategy {
    fn name(&self) -> &str {
        "embedded-json"
    }

    fn try_discover(&self, session: &dyn PortalSession) -> Result<Option<Vec<Entity>>> {
        let entities = Self::parse_markup(&session.page_source()?);
        Ok((!entities.is_empty()).then_some(entities))
    }
}

/// Scans raw markup line by line for lines naming a university.
pub struct MarkupLineStrategy {
    keyword: String,
    min_len: usize,
    max_len: usize,
}

impl MarkupLineStrategy {
    pub fn new(keyword: impl Into<String>) -> Self {
        MarkupLineStrategy {
            keyword: keyword.into(),
            min_len: 10,
            max_len: 100,
        }
    }

    pub fn parse_markup(&self, markup: &str) -> Vec<Entity> {
        let mut entities: Vec<Entity> = Vec::new();
        for line in markup.lines() {
            if !contains_ci(line, &self.keyword) || line.chars().count() <= self.min_len {
                continue;
            }
            let clean = strip_tags(line);
            let len = clean.chars().count();
            if len > self.min_len && len < self.max_len {
                let position = entities.len();
                entities.push(Entity {
                    id: format!("{}{}", SYNTHETIC_ID_PREFIX, position),
                    name: clean,
                    sequence_number: position as i64 + 1,
                });
            }
        }
        entities
    }
}

impl DiscoveryStrategy for MarkupLineStrategy {
    fn name(&self) -> &str {
        "markup-lines"
    }

    fn try_discover(&self, session: &dyn PortalSession) -> Result<Option<Vec<Entity>>> {
        let entities = self.parse_markup(&session.page_source()?);
        if !entities.is_empty() {
            warn!(
                count = entities.len(),
                "using markup fallback, entity ids are synthetic"
            );
        }
        Ok((!entities.is_empty()).then_some(entities))
    }
}

// ============================================================================
// DISCOVERER
// ============================================================================

pub struct EntityDiscoverer {
    portal: PortalConfig,
    timing: TimingConfig,
    strategies: Vec<Box<dyn DiscoveryStrategy>>,
}

impl EntityDiscoverer {
    /// Default strategy chain: embedded JSON first, markup lines second.
    pub fn new(portal: PortalConfig, timing: TimingConfig) -> Self {
        let strategies: Vec<Box<dyn DiscoveryStrategy>> = vec![
            Box::new(EmbeddedJsonStrategy),
            Box::new(MarkupLineStrategy::new(portal.markup_keyword.clone())),
        ];
        Self::with_strategies(portal, timing, strategies)
    }

    pub fn with_strategies(
        portal: PortalConfig,
        timing: TimingConfig,
        strategies: Vec<Box<dyn DiscoveryStrategy>>,
    ) -> Self {
        EntityDiscoverer {
            portal,
            timing,
            strategies,
        }
    }

    pub fn discover(&self, session: &dyn PortalSession) -> PipelineResult<Vec<Entity>> {
        info!(url = %self.portal.url, "discovering universities");
        session
            .navigate(&self.portal.url)
            .map_err(|e| PipelineError::Discovery(format!("portal unreachable: {:#}", e)))?;
        session.pause(self.timing.settle());

        let (selector, index) = self.find_activator(session)?.ok_or_else(|| {
            PipelineError::Discovery("university selector control not found".to_string())
        })?;

        info!(selector = %selector, index, "activating university selector");
        session
            .click(&selector, index)
            .map_err(|e| PipelineError::Discovery(format!("activation failed: {:#}", e)))?;
        session.pause(self.timing.activation_wait());

        for strategy in &self.strategies {
            match strategy.try_discover(session) {
                Ok(Some(entities)) => {
                    info!(strategy = strategy.name(), count = entities.len(), "universities discovered");
                    return Ok(entities);
                }
                Ok(None) => debug!(strategy = strategy.name(), "strategy found nothing"),
                Err(e) => warn!(strategy = strategy.name(), error = %e, "strategy failed"),
            }
        }

        Err(PipelineError::Discovery(
            "no strategy yielded any university".to_string(),
        ))
    }

    /// First selector (in priority order) with a candidate that looks like the control.
    fn find_activator(&self, session: &dyn PortalSession) -> PipelineResult<Option<(String, usize)>> {
        for selector in &self.portal.activation_selectors {
            let candidates = session
                .candidates(selector, self.portal.max_candidates)
                .map_err(|e| PipelineError::Discovery(format!("{:#}", e)))?;
            debug!(selector = %selector, count = candidates.len(), "probing selector");

            if let Some(index) = candidates
                .iter()
                .position(|c| is_activator(c, &self.portal.activation_keywords))
            {
                return Ok(Some((selector.clone(), index)));
            }
        }
        Ok(None)
    }
}

/// Keyword match on visible text, onclick handler, or class attribute.
pub fn is_activator(candidate: &Candidate, keywords: &ActivationKeywords) -> bool {
    let any = |haystack: &str, words: &[String]| words.iter().any(|w| contains_ci(haystack, w));

    any(&candidate.text, &keywords.text)
        || candidate
            .onclick
            .as_deref()
            .is_some_and(|h| any(h, &keywords.onclick))
        || candidate
            .class
            .as_deref()
            .is_some_and(|h| any(h, &keywords.class))
}
