//! Per-request inbound queues keyed by a message id.

use std::collections::{HashSet, VecDeque};

use tokio::sync::mpsc;

use crate::error::NcpError;
use crate::field::Field;
use crate::identifier::Identifier;

pub(crate) type FieldResult = Result<Field, NcpError>;

/// A small buffered wrapper around an `mpsc::Receiver` that lets callers peek
/// for a field matching a predicate while leaving non-matching fields queued
/// for the next call, in arrival order.
pub(crate) struct FieldQueue {
    rx: mpsc::Receiver<FieldResult>,
    buffered: VecDeque<FieldResult>,
}

impl FieldQueue {
    pub(crate) fn new(rx: mpsc::Receiver<FieldResult>) -> Self {
        Self { rx, buffered: VecDeque::new() }
    }

    pub(crate) async fn recv(&mut self) -> FieldResult {
        if let Some(item) = self.buffered.pop_front() {
            return item;
        }
        self.rx.recv().await.unwrap_or(Err(NcpError::Closed))
    }

    pub(crate) async fn recv_matching(&mut self, predicate: impl Fn(&Field) -> bool) -> FieldResult {
        if let Some(pos) = self
            .buffered
            .iter()
            .position(|item| matches!(item, Ok(f) if predicate(f)))
        {
            return self.buffered.remove(pos).unwrap();
        }
        loop {
            let item = match self.rx.recv().await {
                Some(item) => item,
                None => return Err(NcpError::Closed),
            };
            match item {
                Ok(field) if predicate(&field) => return Ok(field),
                Ok(field) => self.buffered.push_back(Ok(field)),
                // Propagate faults immediately rather than queueing them forever.
                Err(e) => return Err(e),
            }
        }
    }
}

/// Handle bound to the outbound id(s) of a single `send`/`send_packet` call.
///
/// Receives exactly the inbound fields whose enclosing packet id is in this
/// Response's id set, in wire order. Never receives fields targeted at other
/// Responses or fields consumed by the connection's auto-filters.
pub struct Response {
    ids: HashSet<u32>,
    queue: FieldQueue,
}

impl Response {
    pub(crate) fn new(ids: HashSet<u32>, rx: mpsc::Receiver<FieldResult>) -> Self {
        Self { ids, queue: FieldQueue::new(rx) }
    }

    /// The set of outbound ids this Response was created to track.
    pub fn ids(&self) -> &HashSet<u32> {
        &self.ids
    }

    /// Await the next matching inbound field.
    pub async fn recv(&mut self) -> Result<Field, NcpError> {
        self.queue.recv().await
    }

    /// Await the next matching inbound field named `name`; other fields stay
    /// queued for later `recv`/`recv_field` calls.
    pub async fn recv_field(&mut self, name: Identifier) -> Result<Field, NcpError> {
        self.queue.recv_matching(|f| f.name() == name).await
    }

    /// Stop tracking new fields; queued fields already received remain
    /// available via `recv`, but further calls return [`NcpError::Closed`].
    pub fn close(&mut self) {
        self.queue.rx.close();
    }
}
