//! In-process coordination service with session-bound ephemeral nodes.
//!
//! Gives the registry layer real session semantics without an external
//! daemon: a cleanly closed session withdraws its ephemeral nodes
//! immediately, while a session whose owner dies silently is reclaimed
//! after the session timeout.

use super::{
    coordination::{Coordination, CoordinationSession},
    RegistryConfig,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
    time::Duration,
};
use tracing::debug;

/// A shared in-memory node tree. Clones see the same tree.
#[derive(Clone, Default)]
pub struct MemoryCoordination {
    state: Arc<Mutex<State>>,
}

#[derive(Default)]
struct State {
    nodes: BTreeMap<String, Node>,
    next_session: u64,
}

struct Node {
    payload: Vec<u8>,
    owner: Option<u64>,
    next_sequence: u64,
}

impl MemoryCoordination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session as a concrete [`MemorySession`], which additionally
    /// exposes [`MemorySession::kill`] for simulating an unclean death.
    pub fn open_session(&self, config: &RegistryConfig) -> MemorySession {
        let session = {
            let mut state = self.lock();
            state.next_session += 1;
            state.next_session
        };
        debug!(session, "coordination session opened");
        MemorySession {
            coordination: self.clone(),
            session,
            session_timeout: config.session_timeout,
            ended: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn purge_session(&self, session: u64) {
        let mut state = self.lock();
        state.nodes.retain(|_, node| node.owner != Some(session));
    }
}

#[async_trait]
impl Coordination for MemoryCoordination {
    async fn connect(&self, config: &RegistryConfig) -> Result<Box<dyn CoordinationSession>> {
        Ok(Box::new(self.open_session(config)))
    }
}

pub struct MemorySession {
    coordination: MemoryCoordination,
    session: u64,
    session_timeout: Duration,
    ended: AtomicBool,
}

impl MemorySession {
    /// Simulate the owning process dying without closing the session: its
    /// ephemeral nodes are reclaimed once the session timeout elapses.
    pub fn kill(&self) {
        if self.ended.swap(true, Ordering::SeqCst) {
            return;
        }
        schedule_purge(
            self.coordination.clone(),
            self.session,
            self.session_timeout,
        );
    }
}

fn schedule_purge(coordination: MemoryCoordination, session: u64, after: Duration) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                tokio::time::sleep(after).await;
                coordination.purge_session(session);
                debug!(session, "expired session purged");
            });
        }
        // no runtime left to wait out the timeout on
        Err(_) => coordination.purge_session(session),
    }
}

#[async_trait]
impl CoordinationSession for MemorySession {
    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.coordination.lock().nodes.contains_key(path))
    }

    async fn create_persistent(&self, path: &str) -> Result<()> {
        let mut state = self.coordination.lock();
        state.nodes.entry(path.to_owned()).or_insert_with(|| Node {
            payload: Vec::new(),
            owner: None,
            next_sequence: 0,
        });
        Ok(())
    }

    async fn create_ephemeral_sequential(&self, prefix: &str, payload: &[u8]) -> Result<String> {
        let mut state = self.coordination.lock();
        let (parent, _) = prefix
            .rsplit_once('/')
            .ok_or_else(|| Error::RegistrySession(format!("prefix {prefix} has no parent")))?;
        let parent_node = state
            .nodes
            .get_mut(parent)
            .ok_or_else(|| Error::RegistrySession(format!("no parent node at {parent}")))?;
        let sequence = parent_node.next_sequence;
        parent_node.next_sequence += 1;
        let path = format!("{prefix}{sequence:010}");
        state.nodes.insert(
            path.clone(),
            Node {
                payload: payload.to_vec(),
                owner: Some(self.session),
                next_sequence: 0,
            },
        );
        Ok(path)
    }

    async fn get_children(&self, path: &str) -> Result<Vec<String>> {
        let state = self.coordination.lock();
        if !state.nodes.contains_key(path) {
            return Err(Error::RegistrySession(format!("no node at {path}")));
        }
        let prefix = format!("{path}/");
        Ok(state
            .nodes
            .keys()
            .filter_map(|candidate| candidate.strip_prefix(&prefix))
            .filter(|child| !child.contains('/'))
            .map(str::to_owned)
            .collect())
    }

    async fn read_data(&self, path: &str) -> Result<Vec<u8>> {
        self.coordination
            .lock()
            .nodes
            .get(path)
            .map(|node| node.payload.clone())
            .ok_or_else(|| Error::RegistrySession(format!("no node at {path}")))
    }

    async fn close(&self) -> Result<()> {
        if !self.ended.swap(true, Ordering::SeqCst) {
            self.coordination.purge_session(self.session);
            debug!(session = self.session, "coordination session closed");
        }
        Ok(())
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        // a dropped handle that never closed is a silent death
        if !self.ended.swap(true, Ordering::SeqCst) {
            schedule_purge(
                self.coordination.clone(),
                self.session,
                self.session_timeout,
            );
        }
    }
}
