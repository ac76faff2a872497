// # Install Locks
//
// Per-domain mutual exclusion for provisioning runs.
//
// A domain is held from before the idempotency gate until the run ends, so
// two requests for the same domain can never both pass the
// directory-existence check. The lock lives in memory only: it does not
// survive a restart and does not coordinate separate processes.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::domain::DomainName;

/// Set of domains with a run in flight
///
/// Clones share the same set.
#[derive(Debug, Clone, Default)]
pub struct InstallLocks {
    inner: Arc<Mutex<HashSet<DomainName>>>,
}

impl InstallLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a domain
    ///
    /// Returns `None` if another run already holds it. The claim is released
    /// when the returned guard is dropped.
    pub fn try_acquire(&self, domain: &DomainName) -> Option<DomainGuard> {
        let mut held = lock(&self.inner);
        if !held.insert(domain.clone()) {
            return None;
        }
        Some(DomainGuard {
            domain: domain.clone(),
            inner: Arc::clone(&self.inner),
        })
    }

    /// Check whether a run holds `domain`
    pub fn is_held(&self, domain: &DomainName) -> bool {
        lock(&self.inner).contains(domain)
    }

    /// Number of domains currently held
    pub fn len(&self) -> usize {
        lock(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner).is_empty()
    }
}

/// Releases its domain on drop
#[derive(Debug)]
pub struct DomainGuard {
    domain: DomainName,
    inner: Arc<Mutex<HashSet<DomainName>>>,
}

impl DomainGuard {
    pub fn domain(&self) -> &DomainName {
        &self.domain
    }
}

impl Drop for DomainGuard {
    fn drop(&mut self) {
        lock(&self.inner).remove(&self.domain);
    }
}

// The set stays consistent even if a holder panicked mid-insert.
fn lock(inner: &Mutex<HashSet<DomainName>>) -> MutexGuard<'_, HashSet<DomainName>> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
