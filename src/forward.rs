use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::trace;
use rand::{thread_rng, Rng};

/// In-flight forwards are shared between the server task and its handle.
pub type ForwardTable = Arc<Mutex<ForwardTableInner>>;

/// What to do with the upstream answer to a forwarded question
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForwardEntry {
    /// Transaction id the client used
    pub requested_id: u16,
    pub requested_host_name: String,
    /// Whether the client talked to us over the encrypted channel
    pub encrypted: bool,
    /// `None` when the client was already answered and the upstream answer
    /// only feeds the cache
    pub client: Option<SocketAddr>,
}

#[derive(Debug)]
struct Slot {
    entry: ForwardEntry,
    created: Instant,
}

/// Maps locally assigned forward ids to the questions they were assigned
/// for, like a NAT maps ports.
///
/// Ids are handed out in increasing order, wrapping at `u16::MAX`, and
/// skip ids still in flight. Entries expire `timeout` after creation.
#[derive(Debug)]
pub struct ForwardTableInner {
    next_id: u16,
    timeout: Duration,
    by_id: HashMap<u16, Slot>,
    /// creation order, for expiry
    order: VecDeque<(Instant, u16)>,
}

impl ForwardTableInner {
    pub fn new(timeout: Duration) -> Self {
        ForwardTableInner::starting_at(thread_rng().gen(), timeout)
    }

    pub fn starting_at(first_id: u16, timeout: Duration) -> Self {
        ForwardTableInner {
            next_id: first_id,
            timeout,
            by_id: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Number of forwards awaiting an answer
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Stores `entry` and returns the forward id assigned to it
    pub fn insert(&mut self, entry: ForwardEntry) -> u16 {
        self.insert_at(entry, Instant::now())
    }

    pub fn insert_at(&mut self, entry: ForwardEntry, now: Instant) -> u16 {
        self.purge_expired(now);
        let id = self.allocate_id();
        trace!("forward id {} assigned to {:?}", id, entry);
        self.by_id.insert(
            id,
            Slot {
                entry,
                created: now,
            },
        );
        self.order.push_back((now, id));
        id
    }

    /// Removes and returns the entry for `id`, unless it's unknown or
    /// expired. An id is answered at most once.
    pub fn take(&mut self, id: u16) -> Option<ForwardEntry> {
        self.take_at(id, Instant::now())
    }

    pub fn take_at(&mut self, id: u16, now: Instant) -> Option<ForwardEntry> {
        let slot = self.by_id.remove(&id)?;
        if self.is_expired(&slot, now) {
            trace!("forward id {} expired", id);
            return None;
        }
        Some(slot.entry)
    }

    fn is_expired(&self, slot: &Slot, now: Instant) -> bool {
        now.saturating_duration_since(slot.created) >= self.timeout
    }

    fn purge_expired(&mut self, now: Instant) {
        while let Some(&(created, id)) = self.order.front() {
            if now.saturating_duration_since(created) < self.timeout {
                break;
            }
            self.order.pop_front();
            // the id may have been answered and handed out again since
            let expired = match self.by_id.get(&id) {
                Some(slot) => self.is_expired(slot, now),
                None => false,
            };
            if expired {
                trace!("dropping expired forward id {}", id);
                self.by_id.remove(&id);
            }
        }
    }

    fn allocate_id(&mut self) -> u16 {
        for _ in 0..=u16::MAX {
            let id = self.next_id;
            self.next_id = self.next_id.wrapping_add(1);
            if !self.by_id.contains_key(&id) {
                return id;
            }
        }
        // every id is in flight, the oldest one is overwritten
        while let Some((created, id)) = self.order.pop_front() {
            let oldest = self.by_id.get(&id).map_or(false, |slot| slot.created == created);
            if oldest {
                self.by_id.remove(&id);
                return id;
            }
        }
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        id
    }
}
