use serde::Serialize;

use crate::transform::university::UniversityRow;

/// What the presentation layer should show, derived from the primitive flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum ViewState {
    Idle,
    Loading,
    Empty,
    Failure(String),
}

/// Read-only copy of the controller state published to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchSnapshot {
    pub query: String,
    pub debounced_query: String,
    pub rows: Vec<UniversityRow>,
    pub has_more: bool,
    pub is_loading_initial: bool,
    pub is_loading_more: bool,
    pub view_state: ViewState,
}

#[derive(Debug, Clone)]
pub(crate) struct SearchState {
    pub query: String,
    pub debounced_query: String,
    pub rows: Vec<UniversityRow>,
    pub page: u32,
    pub has_more: bool,
    pub is_loading_initial: bool,
    pub is_loading_more: bool,
    pub failure: Option<String>,
    pub settled: bool,
}

impl Default for SearchState {
    fn default() -> Self {
        Self {
            query: String::new(),
            debounced_query: String::new(),
            rows: Vec::new(),
            page: 1,
            has_more: true,
            is_loading_initial: false,
            is_loading_more: false,
            failure: None,
            settled: false,
        }
    }
}

impl SearchState {
    pub fn view_state(&self) -> ViewState {
        if self.is_loading_initial {
            ViewState::Loading
        } else if let Some(message) = &self.failure {
            ViewState::Failure(message.clone())
        } else if self.settled && self.rows.is_empty() {
            ViewState::Empty
        } else {
            ViewState::Idle
        }
    }

    pub fn can_load_more(&self) -> bool {
        self.has_more && !self.is_loading_initial && !self.is_loading_more
    }

    pub fn snapshot(&self) -> SearchSnapshot {
        SearchSnapshot {
            query: self.query.clone(),
            debounced_query: self.debounced_query.clone(),
            rows: self.rows.clone(),
            has_more: self.has_more,
            is_loading_initial: self.is_loading_initial,
            is_loading_more: self.is_loading_more,
            view_state: self.view_state(),
        }
    }
}
