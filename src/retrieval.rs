// 🔁 Per-entity retrieval state machine
//
//   Idle → Selecting → WaitingForTable → Extracted
//              └──────────────┴──────────→ Failed
//
// Failed is terminal for the entity only; the orchestrator moves on.

use tracing::debug;

use crate::config::{PortalConfig, TimingConfig};
use crate::discovery::Entity;
use crate::error::PipelineError;
use crate::session::PortalSession;
use crate::table::{RawReportTable, TableExtractor};

#[derive(Debug)]
pub enum RetrievalState {
    Idle,
    Selecting,
    WaitingForTable,
    Extracted(RawReportTable),
    Failed(PipelineError),
}

impl RetrievalState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RetrievalState::Extracted(_) | RetrievalState::Failed(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            RetrievalState::Idle => "idle",
            RetrievalState::Selecting => "selecting",
            RetrievalState::WaitingForTable => "waiting-for-table",
            RetrievalState::Extracted(_) => "extracted",
            RetrievalState::Failed(_) => "failed",
        }
    }
}

pub struct EntityRetriever {
    portal: PortalConfig,
    timing: TimingConfig,
    extractor: TableExtractor,
}

impl EntityRetriever {
    pub fn new(portal: PortalConfig, timing: TimingConfig, extractor: TableExtractor) -> Self {
        EntityRetriever {
            portal,
            timing,
            extractor,
        }
    }

    /// Drive the state machine to a terminal state.
    pub fn retrieve(&self, session: &dyn PortalSession, entity: &Entity) -> RetrievalState {
        let mut state = RetrievalState::Idle;
        while !state.is_terminal() {
            let next = self.step(session, entity, state);
            debug!(entity = %entity.name, state = next.name(), "retrieval transition");
            state = next;
        }
        state
    }

    fn step(
        &self,
        session: &dyn PortalSession,
        entity: &Entity,
        state: RetrievalState,
    ) -> RetrievalState {
        match state {
            RetrievalState::Idle => RetrievalState::Selecting,
            RetrievalState::Selecting => self.select(session, entity),
            RetrievalState::WaitingForTable => self.await_table(session, entity),
            terminal => terminal,
        }
    }

    fn select(&self, session: &dyn PortalSession, entity: &Entity) -> RetrievalState {
        let selector = self.portal.entity_selector_for(&entity.id);
        let not_found = || {
            RetrievalState::Failed(PipelineError::ElementNotFound {
                entity: entity.name.clone(),
                selector: selector.clone(),
            })
        };

        match session.wait_for(&selector, self.timing.element_wait()) {
            Ok(true) => {}
            Ok(false) => return not_found(),
            Err(e) => return RetrievalState::Failed(PipelineError::Browser(format!("{:#}", e))),
        }

        if let Err(e) = session.click(&selector, 0) {
            debug!(entity = %entity.name, error = %e, "click failed");
            return not_found();
        }

        session.pause(self.timing.click_settle());
        RetrievalState::WaitingForTable
    }

    fn await_table(&self, session: &dyn PortalSession, entity: &Entity) -> RetrievalState {
        let timeout = self.timing.table_wait();
        let timed_out = || {
            RetrievalState::Failed(PipelineError::TableTimeout {
                entity: entity.name.clone(),
                timeout,
            })
        };

        let selector = &self.portal.table_selector;
        match session.wait_for(selector, timeout) {
            Ok(true) => {}
            Ok(false) => return timed_out(),
            Err(e) => return RetrievalState::Failed(PipelineError::Browser(format!("{:#}", e))),
        }

        let markup = match session.outer_html(selector) {
            Ok(Some(markup)) => markup,
            Ok(None) => return timed_out(),
            Err(e) => return RetrievalState::Failed(PipelineError::Browser(format!("{:#}", e))),
        };

        match self.extractor.extract(&markup) {
            Some(table) => RetrievalState::Extracted(table),
            None => RetrievalState::Failed(PipelineError::EmptyTable {
                entity: entity.name.clone(),
            }),
        }
    }
}
