#![allow(dead_code)]
//! Inbox search and facet filtering.
//!
//! Pure functions over a borrowed document slice. [`InboxSession`] holds the
//! per-screen state (query, facets, view mode) and derives the rendered view.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::schema::{Document, DocumentStats, DocumentStatus, FacetParseError, Language};

/// Upload-date window. Carried in the filter model but not yet evaluated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DateRange {
    Today,
    Week,
    Month,
    #[default]
    All,
}

impl DateRange {
    pub const ALL: [DateRange; 4] = [Self::Today, Self::Week, Self::Month, Self::All];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Today => "today",
            Self::Week => "week",
            Self::Month => "month",
            Self::All => "all",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Today => "Today",
            Self::Week => "This Week",
            Self::Month => "This Month",
            Self::All => "All Time",
        }
    }
}

impl FromStr for DateRange {
    type Err = FacetParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "today" => Ok(Self::Today),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            "all" => Ok(Self::All),
            _ => Err(FacetParseError::new("date_range", s)),
        }
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single typed facet change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "facet", rename_all = "snake_case")]
pub enum FacetToggle {
    Status { value: DocumentStatus, included: bool },
    Language { value: Language, included: bool },
    DateRange { value: DateRange },
}

/// Active facet selection for the inbox.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchFilters {
    pub status: BTreeSet<DocumentStatus>,
    pub language: BTreeSet<Language>,
    pub date_range: DateRange,
}

impl SearchFilters {
    /// Parse comma-separated facet lists as sent by the inbox client.
    pub fn from_params(
        status: Option<&str>,
        language: Option<&str>,
        date_range: Option<&str>,
    ) -> Result<Self, FacetParseError> {
        let mut filters = Self::default();
        for value in split_list(status) {
            filters.toggle(FacetToggle::Status {
                value: value.parse()?,
                included: true,
            });
        }
        for value in split_list(language) {
            filters.toggle(FacetToggle::Language {
                value: value.parse()?,
                included: true,
            });
        }
        if let Some(range) = date_range.map(str::trim).filter(|r| !r.is_empty()) {
            filters.toggle(FacetToggle::DateRange {
                value: range.parse()?,
            });
        }
        Ok(filters)
    }

    /// Apply one facet change. Redundant toggles are no-ops.
    pub fn toggle(&mut self, toggle: FacetToggle) {
        match toggle {
            FacetToggle::Status { value, included } => {
                set_membership(&mut self.status, value, included)
            }
            FacetToggle::Language { value, included } => {
                set_membership(&mut self.language, value, included)
            }
            FacetToggle::DateRange { value } => self.date_range = value,
        }
    }

    pub fn clear_all(&mut self) {
        *self = Self::default();
    }

    pub fn active_filter_count(&self) -> usize {
        let date = usize::from(self.date_range != DateRange::All);
        self.status.len() + self.language.len() + date
    }

    pub fn is_default(&self) -> bool {
        self.active_filter_count() == 0
    }

    /// Removable tags for every active facet value, in status, language, date order.
    pub fn active_tags(&self) -> Vec<FilterTag> {
        let mut tags = Vec::with_capacity(self.active_filter_count());
        tags.extend(self.status.iter().map(|&value| FilterTag {
            value: value.as_str(),
            label: value.label(),
            remove: FacetToggle::Status {
                value,
                included: false,
            },
        }));
        tags.extend(self.language.iter().map(|&value| FilterTag {
            value: value.as_str(),
            label: value.label(),
            remove: FacetToggle::Language {
                value,
                included: false,
            },
        }));
        if self.date_range != DateRange::All {
            tags.push(FilterTag {
                value: self.date_range.as_str(),
                label: self.date_range.label(),
                remove: FacetToggle::DateRange {
                    value: DateRange::All,
                },
            });
        }
        tags
    }

    fn matches(&self, doc: &Document) -> bool {
        (self.status.is_empty() || self.status.contains(&doc.status))
            && (self.language.is_empty() || self.language.contains(&doc.language))
            && date_range_matches(self.date_range, doc)
    }
}

/// A badge describing one active facet value and how to clear it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FilterTag {
    pub value: &'static str,
    pub label: &'static str,
    pub remove: FacetToggle,
}

/// Filter `documents` by title query and facets, preserving input order.
pub fn apply<'a>(documents: &'a [Document], query: &str, filters: &SearchFilters) -> Vec<&'a Document> {
    let needle = query.to_lowercase();
    documents
        .iter()
        .filter(|doc| needle.is_empty() || doc.title.to_lowercase().contains(&needle))
        .filter(|doc| filters.matches(doc))
        .collect()
}

// Upload dates are display strings ("2 hours ago") with no reference clock,
// so every range admits every document until documents carry a timestamp.
fn date_range_matches(_range: DateRange, _doc: &Document) -> bool {
    true
}

fn set_membership<T: Ord>(set: &mut BTreeSet<T>, value: T, included: bool) {
    if included {
        set.insert(value);
    } else {
        set.remove(&value);
    }
}

fn split_list(raw: Option<&str>) -> impl Iterator<Item = &str> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Grid or list layout of the inbox results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    #[default]
    Grid,
    List,
}

impl FromStr for ViewMode {
    type Err = FacetParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "grid" => Ok(Self::Grid),
            "list" => Ok(Self::List),
            _ => Err(FacetParseError::new("view", s)),
        }
    }
}

/// Session-scoped state of the inbox screen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboxSession {
    query: String,
    filters: SearchFilters,
    view_mode: ViewMode,
}

impl InboxSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(query: impl Into<String>, filters: SearchFilters, view_mode: ViewMode) -> Self {
        Self {
            query: query.into(),
            filters,
            view_mode,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn filters(&self) -> &SearchFilters {
        &self.filters
    }

    pub fn view_mode(&self) -> ViewMode {
        self.view_mode
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
    }

    pub fn toggle(&mut self, toggle: FacetToggle) {
        self.filters.toggle(toggle);
    }

    pub fn clear_filters(&mut self) {
        self.filters.clear_all();
    }

    pub fn set_view_mode(&mut self, mode: ViewMode) {
        self.view_mode = mode;
    }

    /// The empty-state reset: drops the query and all facets, keeps the layout.
    pub fn clear_search_and_filters(&mut self) {
        self.query.clear();
        self.filters.clear_all();
    }

    pub fn view<'a>(&self, documents: &'a [Document]) -> InboxView<'a> {
        let matched = apply(documents, &self.query, &self.filters);
        let active_filter_count = self.filters.active_filter_count();
        InboxView {
            showing: matched.len(),
            total: documents.len(),
            stats: DocumentStats::from_documents(documents),
            active_filter_count,
            show_clear_filters: active_filter_count > 0,
            tags: self.filters.active_tags(),
            is_empty_result: matched.is_empty(),
            view_mode: self.view_mode,
            documents: matched,
        }
    }
}

/// Everything the inbox screen renders for one session state.
#[derive(Debug, Clone, Serialize)]
pub struct InboxView<'a> {
    pub documents: Vec<&'a Document>,
    pub showing: usize,
    pub total: usize,
    pub stats: DocumentStats,
    pub active_filter_count: usize,
    pub show_clear_filters: bool,
    pub tags: Vec<FilterTag>,
    pub is_empty_result: bool,
    pub view_mode: ViewMode,
}
