//! Hierarchy nodes and their ancestor references

use crate::state::{CrawlStatus, Level};
use url::Url;

/// Keys of a node's ancestors, one slot per level
///
/// Denormalized so that any level can be filtered by any ancestor without joins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParentRefs {
    pub region: Option<String>,
    pub sub_region: Option<String>,
    pub postal_area: Option<String>,
    pub street: Option<String>,
}

impl ParentRefs {
    /// Returns the referenced key for an ancestor level
    pub fn get(&self, level: Level) -> Option<&str> {
        match level {
            Level::Region => self.region.as_deref(),
            Level::SubRegion => self.sub_region.as_deref(),
            Level::PostalArea => self.postal_area.as_deref(),
            Level::Street => self.street.as_deref(),
            Level::Listing => None,
        }
    }

    /// Sets the key for an ancestor level. Listings are never ancestors.
    pub fn set(&mut self, level: Level, key: Option<String>) {
        match level {
            Level::Region => self.region = key,
            Level::SubRegion => self.sub_region = key,
            Level::PostalArea => self.postal_area = key,
            Level::Street => self.street = key,
            Level::Listing => {}
        }
    }

    /// Copies this chain and appends `key` at `level`
    pub fn extended(&self, level: Level, key: &str) -> Self {
        let mut refs = self.clone();
        refs.set(level, Some(key.to_string()));
        refs
    }

    /// Ancestor keys from the top of the hierarchy down
    pub fn chain(&self) -> Vec<&str> {
        Level::parent_levels()
            .into_iter()
            .filter_map(|level| self.get(level))
            .collect()
    }
}

/// One node of the hierarchy
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    /// Canonical href of the node's page, stable across runs
    pub id: String,
    pub level: Level,
    /// Short slug derived from `id`; children reference this
    pub key: String,
    pub parents: ParentRefs,
    pub name: String,
    pub status: CrawlStatus,
    /// Number of children written; set only once the node is finished
    pub child_count: Option<u32>,
    /// Status of the listing detail pass (listings only)
    pub detail_status: Option<CrawlStatus>,
    /// Structured listing attributes written by the detail pass
    pub detail: Option<serde_json::Value>,
}

impl Entity {
    /// Creates a top-level region node
    pub fn region(id: impl Into<String>, name: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            key: derive_key(&id),
            id,
            level: Level::Region,
            parents: ParentRefs::default(),
            name: name.into(),
            status: CrawlStatus::Todo,
            child_count: None,
            detail_status: None,
            detail: None,
        }
    }

    /// Creates a `Todo` node one level below `parent`
    ///
    /// Returns None when `parent` is a listing, which has no children.
    pub fn child_of(parent: &Entity, id: impl Into<String>, name: impl Into<String>) -> Option<Self> {
        let level = parent.level.child()?;
        let id = id.into();
        Some(Self {
            key: derive_key(&id),
            id,
            level,
            parents: parent.parents.extended(parent.level, &parent.key),
            name: name.into(),
            status: CrawlStatus::Todo,
            child_count: None,
            detail_status: (level == Level::Listing).then_some(CrawlStatus::Todo),
            detail: None,
        })
    }

    /// Region key this node belongs to (its own key for regions)
    pub fn region_key(&self) -> Option<&str> {
        match self.level {
            Level::Region => Some(&self.key),
            _ => self.parents.region.as_deref(),
        }
    }

    /// Absolute URL of the node's page on the site
    pub fn url(&self, base_url: &Url) -> Result<Url, url::ParseError> {
        base_url.join(&self.id)
    }

    /// Marks the node finished with the number of children written
    pub fn finish(&mut self, child_count: u32) {
        self.status = CrawlStatus::Finished;
        self.child_count = Some(child_count);
    }

    /// Records a non-finishing outcome
    ///
    /// `child_count` is cleared so it stays set only on finished nodes.
    pub fn mark(&mut self, status: CrawlStatus) {
        debug_assert!(!status.is_finished(), "use finish() for finished nodes");
        self.status = status;
        self.child_count = None;
    }
}

/// Derives a node key from its canonical href
///
/// The key is the last non-empty path segment, so `/browse/homes/md/` gives `md`.
pub fn derive_key(id: &str) -> String {
    let path = id.split(['?', '#']).next().unwrap_or(id);
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Equality filter pinning a selection to ancestor keys
///
/// A term at the selected level itself matches the node's own key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeFilter {
    refs: ParentRefs,
}

impl ScopeFilter {
    /// A filter that matches everything
    pub fn all() -> Self {
        Self::default()
    }

    /// A filter pinned to one region
    pub fn region(key: impl Into<String>) -> Self {
        Self::default().with(Level::Region, key)
    }

    /// Adds an equality term for `level`
    pub fn with(mut self, level: Level, key: impl Into<String>) -> Self {
        self.refs.set(level, Some(key.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.refs == ParentRefs::default()
    }

    /// The region this filter is pinned to, if any
    pub fn region_key(&self) -> Option<&str> {
        self.refs.region.as_deref()
    }

    /// Returns the `(level, key)` terms of the filter, shallowest first
    pub fn terms(&self) -> Vec<(Level, &str)> {
        Level::parent_levels()
            .into_iter()
            .filter_map(|level| self.refs.get(level).map(|key| (level, key)))
            .collect()
    }

    /// Checks whether an entity satisfies every term
    pub fn matches(&self, entity: &Entity) -> bool {
        self.terms().into_iter().all(|(level, key)| {
            if level == entity.level {
                entity.key == key
            } else {
                entity.parents.get(level) == Some(key)
            }
        })
    }
}
