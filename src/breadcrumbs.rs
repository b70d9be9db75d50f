//! The bounded ring of recent breadcrumbs.

use std::sync::{Mutex, PoisonError};

use crate::clientoptions::CollectorOptions;
use crate::protocol::Breadcrumb;

/// Bounded FIFO of recent user and system events.
///
/// Every capture adapter appends here as a side effect, and a snapshot of
/// the ring is embedded into each record at enrichment time. When the ring
/// exceeds the configured capacity the oldest breadcrumbs are discarded
/// first.
pub(crate) struct BreadcrumbRing {
    buffer: Mutex<im::Vector<Breadcrumb>>,
}

impl BreadcrumbRing {
    pub(crate) fn new() -> Self {
        BreadcrumbRing {
            buffer: Mutex::new(im::Vector::new()),
        }
    }

    /// Runs `before_breadcrumb` and appends, trimming the front past
    /// capacity. A `None` from the callback drops the breadcrumb silently.
    pub(crate) fn add(&self, breadcrumb: Breadcrumb, options: &CollectorOptions) {
        let breadcrumb = match &options.before_breadcrumb {
            Some(callback) => callback(breadcrumb),
            None => Some(breadcrumb),
        };
        if let Some(breadcrumb) = breadcrumb {
            let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
            buffer.push_back(breadcrumb);
            while buffer.len() > options.max_breadcrumbs {
                buffer.pop_front();
            }
        }
    }

    /// A shallow copy of the ring, oldest first.
    pub(crate) fn snapshot(&self) -> Vec<Breadcrumb> {
        let buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        buffer.iter().cloned().collect()
    }
}
