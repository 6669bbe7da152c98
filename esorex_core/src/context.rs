//! Per-run state threaded through the resolver and the runner.

use crate::logging::{DomainGuard, MessengerHandle};
use crate::params::SourceAnnotations;

/// State owned by one program run: the messenger and the table recording
/// where every parameter value came from.
#[derive(Debug, Default)]
pub struct RunContext {
    pub messenger: MessengerHandle,
    pub sources: SourceAnnotations,
}

impl RunContext {
    pub fn new(messenger: MessengerHandle) -> Self {
        Self {
            messenger,
            sources: SourceAnnotations::new(),
        }
    }

    /// Switch the log domain until the guard is dropped
    pub fn domain_guard(&self, domain: &str) -> DomainGuard {
        self.messenger.domain_guard(domain)
    }
}
