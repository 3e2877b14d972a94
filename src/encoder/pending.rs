//! Outstanding deferred extra type serializations.
//!
//! Each entry owns the future returned by a serializer and the sub-buffer
//! reserved for its components. Entries complete in any order; the
//! reservation keeps the output order fixed.

use futures::future::{FutureExt, LocalBoxFuture};
use futures::stream::{FuturesUnordered, StreamExt};

use crate::chunk_buffer::BufferId;
use crate::value::Value;

/// A resolved serialization, ready to be written into its reservation.
pub(super) struct Completed {
    pub(super) slot: BufferId,
    pub(super) type_id: u16,
    pub(super) components: Vec<Value>,
}

#[derive(Default)]
pub(super) struct PendingQueue {
    futures: FuturesUnordered<LocalBoxFuture<'static, Completed>>,
    /// Anzahl jemals gestarteter Eintraege (nur fuer Logging).
    started: usize,
}

impl PendingQueue {
    pub(super) fn push(
        &mut self,
        slot: BufferId,
        type_id: u16,
        future: LocalBoxFuture<'static, Vec<Value>>,
    ) {
        self.started += 1;
        self.futures.push(
            future
                .map(move |components| Completed {
                    slot,
                    type_id,
                    components,
                })
                .boxed_local(),
        );
    }

    /// Outstanding entries.
    pub(super) fn len(&self) -> usize {
        self.futures.len()
    }

    pub(super) fn is_empty(&self) -> bool {
        self.futures.is_empty()
    }

    pub(super) fn started(&self) -> usize {
        self.started
    }

    /// Waits for the next entry to resolve; `None` when nothing is outstanding.
    pub(super) async fn next(&mut self) -> Option<Completed> {
        self.futures.next().await
    }
}
