//! Lazily resolved parent reference

use std::sync::{Arc, Mutex, PoisonError};

use crate::backend::FileAdapter;
use crate::error::Result;

/// Cached parent of an adapter
#[derive(Clone, Default)]
pub enum ParentState {
    /// Not looked up yet
    #[default]
    Unresolved,
    Present(Arc<dyn FileAdapter>),
    /// Looked up, the file has no parent (root)
    Absent,
}

impl ParentState {
    pub fn from_option(parent: Option<Arc<dyn FileAdapter>>) -> Self {
        parent.map_or(Self::Absent, Self::Present)
    }

    /// `None` while unresolved, otherwise the cached answer
    pub fn resolved(&self) -> Option<Option<Arc<dyn FileAdapter>>> {
        match self {
            Self::Unresolved => None,
            Self::Present(parent) => Some(Some(parent.clone())),
            Self::Absent => Some(None),
        }
    }
}

/// Parent cache populated at most once, unless explicitly overwritten
#[derive(Default)]
pub struct ParentCache {
    state: Mutex<ParentState>,
}

impl ParentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ParentState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set(&self, parent: Option<Arc<dyn FileAdapter>>) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) =
            ParentState::from_option(parent);
    }

    /// Return the cached parent, running `resolve` only when unresolved
    ///
    /// A failed resolution leaves the cache unresolved.
    pub fn get_or_resolve<F>(&self, resolve: F) -> Result<Option<Arc<dyn FileAdapter>>>
    where
        F: FnOnce() -> Result<Option<Arc<dyn FileAdapter>>>,
    {
        if let Some(cached) = self.state().resolved() {
            return Ok(cached);
        }
        let parent = resolve()?;
        self.set(parent.clone());
        Ok(parent)
    }
}

impl std::fmt::Debug for ParentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unresolved => f.write_str("Unresolved"),
            Self::Present(parent) => write!(f, "Present({})", parent.absolute_path()),
            Self::Absent => f.write_str("Absent"),
        }
    }
}
