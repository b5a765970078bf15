// src/core/lists.rs

use crate::core::error::Result;
use crate::core::models::{ListKind, ListsSnapshot};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct ListState {
    allow: BTreeSet<String>,
    block: BTreeSet<String>,
}

impl ListState {
    fn set(&self, kind: ListKind) -> &BTreeSet<String> {
        match kind {
            ListKind::Allow => &self.allow,
            ListKind::Block => &self.block,
        }
    }

    fn set_mut(&mut self, kind: ListKind) -> &mut BTreeSet<String> {
        match kind {
            ListKind::Allow => &mut self.allow,
            ListKind::Block => &mut self.block,
        }
    }
}

/// Allow/block membership lists backed by two flat files.
///
/// Entries are lowercase and deduplicated, and never expire. Every mutation
/// holds one lock across the in-memory update and the file rewrite, so
/// concurrent evaluations of the same unseen domain cannot duplicate it.
#[derive(Debug)]
pub struct ListStore {
    dir: PathBuf,
    state: Mutex<ListState>,
}

fn canonical(domain: &str) -> String {
    domain.trim().trim_end_matches('.').to_ascii_lowercase()
}

impl ListStore {
    /// Opens (creating if needed) the list directory and loads both lists.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        let state = ListState {
            allow: read_list(&dir.join(ListKind::Allow.file_name())).await?,
            block: read_list(&dir.join(ListKind::Block.file_name())).await?,
        };
        info!(allow = state.allow.len(), block = state.block.len(), dir = %dir.display(), "Lists loaded.");
        Ok(Self { dir, state: Mutex::new(state) })
    }

    /// Fast-path lookup. A domain present on both lists resolves to `Block`.
    pub async fn is_listed(&self, domain: &str) -> Option<ListKind> {
        let domain = canonical(domain);
        let state = self.state.lock().await;
        match (state.allow.contains(&domain), state.block.contains(&domain)) {
            (true, true) => {
                warn!(domain = %domain, "Domain is on both lists; blocklist wins.");
                Some(ListKind::Block)
            }
            (_, true) => Some(ListKind::Block),
            (true, false) => Some(ListKind::Allow),
            (false, false) => None,
        }
    }

    /// Adds a domain; returns `false` when it was already present.
    ///
    /// The other list is left untouched.
    pub async fn add(&self, kind: ListKind, domain: &str) -> Result<bool> {
        let domain = canonical(domain);
        if domain.is_empty() {
            return Ok(false);
        }
        let mut state = self.state.lock().await;
        if !state.set_mut(kind).insert(domain.clone()) {
            return Ok(false);
        }
        if let Err(e) = self.persist(kind, state.set(kind)).await {
            state.set_mut(kind).remove(&domain);
            return Err(e);
        }
        debug!(list = %kind, domain = %domain, "Domain added to list.");
        Ok(true)
    }

    /// Removes a domain; returns `false` when it was not present.
    pub async fn remove(&self, kind: ListKind, domain: &str) -> Result<bool> {
        let domain = canonical(domain);
        let mut state = self.state.lock().await;
        if !state.set_mut(kind).remove(&domain) {
            return Ok(false);
        }
        if let Err(e) = self.persist(kind, state.set(kind)).await {
            state.set_mut(kind).insert(domain);
            return Err(e);
        }
        debug!(list = %kind, domain = %domain, "Domain removed from list.");
        Ok(true)
    }

    /// Empties a list and returns how many entries it held.
    pub async fn clear(&self, kind: ListKind) -> Result<usize> {
        let mut state = self.state.lock().await;
        self.persist(kind, &BTreeSet::new()).await?;
        let removed = std::mem::take(state.set_mut(kind)).len();
        info!(list = %kind, removed, "List cleared.");
        Ok(removed)
    }

    pub async fn entries(&self, kind: ListKind) -> Vec<String> {
        self.state.lock().await.set(kind).iter().cloned().collect()
    }

    pub async fn snapshot(&self) -> ListsSnapshot {
        let state = self.state.lock().await;
        ListsSnapshot {
            allowlist: state.allow.iter().cloned().collect(),
            blocklist: state.block.iter().cloned().collect(),
            allow_count: state.allow.len(),
            block_count: state.block.len(),
        }
    }

    /// Domains that appear on both lists and need an administrator's decision.
    pub async fn conflicts(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state.allow.intersection(&state.block).cloned().collect()
    }

    async fn persist(&self, kind: ListKind, entries: &BTreeSet<String>) -> Result<()> {
        let path = self.dir.join(kind.file_name());
        let tmp = path.with_extension("txt.tmp");
        let mut body = String::with_capacity(entries.len() * 16);
        for entry in entries {
            body.push_str(entry);
            body.push('\n');
        }
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

async fn read_list(path: &Path) -> Result<BTreeSet<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(text.lines().map(canonical).filter(|d| !d.is_empty()).collect()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeSet::new()),
        Err(e) => Err(e.into()),
    }
}
