//! Execution engine for strata
//!
//! The engine orchestrates:
//! 1. Loading - pick a variant and build its resource graph
//! 2. Planning - diff declared attributes against recorded state
//! 3. Executing - converge with parallel waves and report per node

pub mod differ;
pub mod executor;

use crate::config::{self, Variant};
use crate::provider::LocalProvider;
use crate::state::FileStateStore;
use anyhow::Result;
use declarative::Graph;
use std::path::Path;

pub use executor::{ApplyOptions, apply, destroy};

/// Everything a command needs to operate on one variant
pub struct Session {
    pub variant: Variant,
    pub graph: Graph,
    pub store: FileStateStore,
    pub provider: LocalProvider,
}

impl Session {
    /// Load a variant and validate its graph
    pub fn open(variant: Option<&str>, file: Option<&Path>) -> Result<Self> {
        let variant = config::select(variant, file)?;
        Self::from_variant(variant)
    }

    pub fn from_variant(variant: Variant) -> Result<Self> {
        let graph = variant.config.graph()?;
        let store = FileStateStore::new(variant.state_dir()?);
        let provider = LocalProvider::new(&variant.name);
        log::info!(
            "Variant '{}' ({}): {} nodes, {} edges, state in {}",
            variant.name,
            variant.path.display(),
            graph.len(),
            graph.edges().len(),
            store.dir().display()
        );
        Ok(Self {
            variant,
            graph,
            store,
            provider,
        })
    }
}
