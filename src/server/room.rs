//! Room admission control
//!
//! A room owns its occupant count, its occupants' outboxes, and its waiting
//! queue behind a single lock. [`Room::admit`] and slot release are the only
//! entry points that touch that state, so "check capacity, then increment"
//! and "free a slot, then hand it to the next waiter" are each one
//! indivisible step.
//!
//! ## State Machine
//!
//! ```text
//!             admit (active < capacity)
//!   OPEN ───────────────────────────────► OPEN | FULL
//!   FULL ── admit ──► LOCKED reply, caller queued (or dropped if queue full)
//!   FULL ── release, waiter queued ──► FULL, slot moves to the head waiter
//!   FULL ── release, queue empty ──► OPEN
//! ```
//!
//! A freed slot never passes through OPEN while someone is waiting, so a
//! newcomer cannot overtake the queue.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::dictionary::Direction;
use crate::server::waiting_queue::WaitingQueue;

/// Lines buffered per occupant before relayed lines are dropped
pub const OUTBOX_CAPACITY: usize = 64;

/// Identifier of one client session
pub type SessionId = Uuid;

/// Outbound channel into a session's connection
pub type Outbox = mpsc::Sender<String>;

/// Who receives the translation of a chat line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    /// Back to the sender only
    #[default]
    Echo,
    /// To every other occupant of the room
    Peers,
}

impl FromStr for Delivery {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "echo" => Ok(Delivery::Echo),
            "peers" => Ok(Delivery::Peers),
            other => Err(format!("unknown delivery '{}', expected echo or peers", other)),
        }
    }
}

/// Why an occupant gave its slot back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseReason {
    /// Sent an exit command
    Exit,
    /// Peer closed the connection or a read failed
    Disconnect,
    /// Client reported an inactivity kick
    Kicked,
    /// Server shutdown
    Shutdown,
    /// Slot dropped without an explicit release
    Aborted,
}

impl fmt::Display for ReleaseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            ReleaseReason::Exit => "exit command",
            ReleaseReason::Disconnect => "disconnect",
            ReleaseReason::Kicked => "kicked",
            ReleaseReason::Shutdown => "shutdown",
            ReleaseReason::Aborted => "aborted",
        };
        f.write_str(reason)
    }
}

/// Point-in-time occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomStats {
    pub active: usize,
    pub capacity: usize,
    pub waiting: usize,
}

/// Pending client held in the waiting queue
#[derive(Debug)]
struct Waiter {
    session_id: SessionId,
    outbox: Outbox,
    slot: oneshot::Sender<RoomSlot>,
}

/// Handle kept by a queued session; resolves with the slot handed to it
#[derive(Debug)]
pub struct WaitTicket {
    session_id: SessionId,
    promoted: oneshot::Receiver<RoomSlot>,
}

impl WaitTicket {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Wait for a freed slot. Returns `None` if the room went away first.
    ///
    /// Cancel safe. Must not be polled again once it has returned.
    pub async fn promoted(&mut self) -> Option<RoomSlot> {
        (&mut self.promoted).await.ok()
    }
}

/// Result of [`Room::admit`]
#[derive(Debug)]
pub enum Admission {
    /// The caller holds a slot until the returned guard is released or dropped
    Accepted(RoomSlot),
    /// Room is full. `None` means the waiting queue was full too.
    Locked(Option<WaitTicket>),
}

#[derive(Debug)]
struct RoomState {
    active: usize,
    occupants: HashMap<SessionId, Outbox>,
    waiting: WaitingQueue<Waiter>,
}

/// An admission-and-relay context bound to one direction and one capacity
#[derive(Debug)]
pub struct Room {
    name: String,
    direction: Direction,
    capacity: usize,
    delivery: Delivery,
    state: Mutex<RoomState>,
}

impl Room {
    /// Create a room. A capacity of zero is raised to one.
    pub fn new(
        name: impl Into<String>,
        direction: Direction,
        capacity: usize,
        queue_capacity: usize,
        delivery: Delivery,
    ) -> Self {
        Self {
            name: name.into(),
            direction,
            capacity: capacity.max(1),
            delivery,
            state: Mutex::new(RoomState {
                active: 0,
                occupants: HashMap::new(),
                waiting: WaitingQueue::new(queue_capacity),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn delivery(&self) -> Delivery {
        self.delivery
    }

    fn state(&self) -> MutexGuard<'_, RoomState> {
        // State stays consistent across a panic: every critical section is a
        // handful of field updates with no early exits in between
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take a slot if one is free, otherwise queue the caller.
    pub fn admit(self: &Arc<Self>, session_id: SessionId, outbox: Outbox) -> Admission {
        let mut state = self.state();

        if state.active < self.capacity {
            state.active += 1;
            state.occupants.insert(session_id, outbox);
            info!(
                "Room '{}': admitted {} ({}/{})",
                self.name, session_id, state.active, self.capacity
            );
            return Admission::Accepted(RoomSlot {
                room: Arc::clone(self),
                session_id,
                released: false,
            });
        }

        if state.waiting.is_full() {
            state.waiting.retain(|waiter| !waiter.slot.is_closed());
        }

        let (slot, promoted) = oneshot::channel();
        let waiter = Waiter {
            session_id,
            outbox,
            slot,
        };
        match state.waiting.enqueue(waiter) {
            Ok(()) => {
                info!(
                    "Room '{}' is locked: queued {} ({} waiting)",
                    self.name,
                    session_id,
                    state.waiting.len()
                );
                Admission::Locked(Some(WaitTicket {
                    session_id,
                    promoted,
                }))
            }
            Err(_) => {
                warn!(
                    "Room '{}' is locked and its waiting queue is full: dropping {}",
                    self.name, session_id
                );
                Admission::Locked(None)
            }
        }
    }

    /// Free `session_id`'s slot and hand it straight to the longest-waiting
    /// live client, in one critical section. Only an empty queue lowers the
    /// occupant count.
    fn release_slot(
        self: &Arc<Self>,
        session_id: SessionId,
        reason: ReleaseReason,
    ) -> Option<SessionId> {
        let mut state = self.state();

        debug_assert!(state.active > 0, "release without a matching admit");
        state.occupants.remove(&session_id);
        info!("Room '{}': released {} ({})", self.name, session_id, reason);

        while let Some(waiter) = state.waiting.dequeue() {
            if waiter.slot.is_closed() {
                debug!(
                    "Room '{}': waiter {} already gone, skipping",
                    self.name, waiter.session_id
                );
                continue;
            }

            state.occupants.insert(waiter.session_id, waiter.outbox);
            let slot = RoomSlot {
                room: Arc::clone(self),
                session_id: waiter.session_id,
                released: false,
            };
            match waiter.slot.send(slot) {
                Ok(()) => {
                    info!(
                        "Room '{}': handed slot to waiter {} ({}/{})",
                        self.name, waiter.session_id, state.active, self.capacity
                    );
                    return Some(waiter.session_id);
                }
                Err(mut slot) => {
                    // Receiver went away after the check; the lock is held here
                    slot.released = true;
                    state.occupants.remove(&waiter.session_id);
                }
            }
        }

        state.active = state.active.saturating_sub(1);
        debug!("Room '{}': no waiters ({}/{})", self.name, state.active, self.capacity);
        None
    }

    /// Remove a departing waiter from the queue.
    ///
    /// If a slot was already handed to it, that slot is released again and
    /// moves on to the next waiter.
    pub fn withdraw(&self, mut ticket: WaitTicket) {
        let mut state = self.state();
        let queued = state.waiting.len();
        state
            .waiting
            .retain(|waiter| waiter.session_id != ticket.session_id);
        let withdrew = state.waiting.len() < queued;
        drop(state);

        if withdrew {
            debug!("Room '{}': waiter {} withdrew", self.name, ticket.session_id);
            return;
        }
        if let Ok(slot) = ticket.promoted.try_recv() {
            debug!(
                "Room '{}': waiter {} left holding a slot, passing it on",
                self.name, ticket.session_id
            );
            slot.release(ReleaseReason::Disconnect);
        }
    }

    /// Send `line` to every occupant except `from`. Returns how many received it.
    ///
    /// Never waits: an occupant whose outbox is full misses the line.
    pub fn relay_to_peers(&self, from: SessionId, line: &str) -> usize {
        let state = self.state();
        let mut delivered = 0;
        for (id, outbox) in state.occupants.iter().filter(|(id, _)| **id != from) {
            match outbox.try_send(line.to_string()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!("Room '{}': outbox of {} is full, dropping line", self.name, id)
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Room '{}': {} is closing, skipping", self.name, id)
                }
            }
        }
        delivered
    }

    pub fn snapshot(&self) -> RoomStats {
        let state = self.state();
        RoomStats {
            active: state.active,
            capacity: self.capacity,
            waiting: state.waiting.len(),
        }
    }
}

/// Occupancy token returned by a successful admit or handed to a waiter.
///
/// Dropping it releases the slot, so a session that ends abnormally still
/// frees its place in the room.
#[derive(Debug)]
pub struct RoomSlot {
    room: Arc<Room>,
    session_id: SessionId,
    released: bool,
}

impl RoomSlot {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Give the slot back. Returns the waiter it was handed to, if any.
    pub fn release(mut self, reason: ReleaseReason) -> Option<SessionId> {
        self.released = true;
        self.room.release_slot(self.session_id, reason)
    }

    /// Forced release after an inactivity kick; accounting is identical to
    /// [`release`](Self::release).
    pub fn eject(self) -> Option<SessionId> {
        self.release(ReleaseReason::Kicked)
    }
}

impl Drop for RoomSlot {
    fn drop(&mut self) {
        if !self.released {
            self.room.release_slot(self.session_id, ReleaseReason::Aborted);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room(capacity: usize, queue_capacity: usize) -> Arc<Room> {
        Arc::new(Room::new(
            "test",
            Direction::EnglishToItalian,
            capacity,
            queue_capacity,
            Delivery::Echo,
        ))
    }

    fn outbox() -> (Outbox, mpsc::Receiver<String>) {
        mpsc::channel(OUTBOX_CAPACITY)
    }

    #[tokio::test]
    async fn test_admit_until_full() {
        let room = room(2, 10);

        let a = room.admit(Uuid::new_v4(), outbox().0);
        let b = room.admit(Uuid::new_v4(), outbox().0);
        let c = room.admit(Uuid::new_v4(), outbox().0);

        assert!(matches!(a, Admission::Accepted(_)));
        assert!(matches!(b, Admission::Accepted(_)));
        assert!(matches!(c, Admission::Locked(Some(_))));
        assert_eq!(
            room.snapshot(),
            RoomStats {
                active: 2,
                capacity: 2,
                waiting: 1
            }
        );
    }

    #[tokio::test]
    async fn test_release_hands_slot_to_head_waiter() {
        let room = room(1, 10);

        let Admission::Accepted(slot) = room.admit(Uuid::new_v4(), outbox().0) else {
            panic!("first admit must succeed");
        };
        let Admission::Locked(Some(mut first)) = room.admit(Uuid::new_v4(), outbox().0) else {
            panic!("second admit must be locked");
        };
        let Admission::Locked(Some(mut second)) = room.admit(Uuid::new_v4(), outbox().0) else {
            panic!("third admit must be locked");
        };
        let first_id = first.session_id();

        assert_eq!(slot.release(ReleaseReason::Exit), Some(first_id));
        let handed = first.promoted().await.expect("head waiter gets the slot");
        assert_eq!(handed.session_id(), first_id);
        assert_eq!(room.snapshot().active, 1);
        assert_eq!(room.snapshot().waiting, 1);

        assert_eq!(handed.release(ReleaseReason::Exit), Some(second.session_id()));
        assert!(second.promoted().await.is_some());
    }

    #[tokio::test]
    async fn test_newcomer_cannot_overtake_promoted_waiter() {
        let room = room(1, 10);

        let Admission::Accepted(slot) = room.admit(Uuid::new_v4(), outbox().0) else {
            panic!("first admit must succeed");
        };
        let Admission::Locked(Some(mut waiter)) = room.admit(Uuid::new_v4(), outbox().0) else {
            panic!("expected queued");
        };

        slot.release(ReleaseReason::Exit);
        assert!(matches!(
            room.admit(Uuid::new_v4(), outbox().0),
            Admission::Locked(Some(_))
        ));
        assert!(waiter.promoted().await.is_some());
    }

    #[tokio::test]
    async fn test_promotion_skips_departed_waiters() {
        let room = room(1, 10);

        let Admission::Accepted(slot) = room.admit(Uuid::new_v4(), outbox().0) else {
            panic!("first admit must succeed");
        };
        let Admission::Locked(Some(gone)) = room.admit(Uuid::new_v4(), outbox().0) else {
            panic!("expected queued");
        };
        let Admission::Locked(Some(mut alive)) = room.admit(Uuid::new_v4(), outbox().0) else {
            panic!("expected queued");
        };
        drop(gone);

        assert_eq!(slot.eject(), Some(alive.session_id()));
        assert!(alive.promoted().await.is_some());
        assert_eq!(room.snapshot().waiting, 0);
    }

    #[tokio::test]
    async fn test_release_without_waiters_opens_room() {
        let room = room(1, 10);

        let Admission::Accepted(slot) = room.admit(Uuid::new_v4(), outbox().0) else {
            panic!("first admit must succeed");
        };
        let Admission::Locked(Some(gone)) = room.admit(Uuid::new_v4(), outbox().0) else {
            panic!("expected queued");
        };
        drop(gone);

        assert_eq!(slot.release(ReleaseReason::Disconnect), None);
        assert_eq!(room.snapshot().active, 0);
    }

    #[tokio::test]
    async fn test_full_queue_drops_waiter() {
        let room = room(1, 1);

        let _slot = room.admit(Uuid::new_v4(), outbox().0);
        let queued = room.admit(Uuid::new_v4(), outbox().0);
        let dropped = room.admit(Uuid::new_v4(), outbox().0);

        assert!(matches!(queued, Admission::Locked(Some(_))));
        assert!(matches!(dropped, Admission::Locked(None)));
        assert_eq!(room.snapshot().waiting, 1);
    }

    #[tokio::test]
    async fn test_full_queue_prunes_departed_waiters() {
        let room = room(1, 1);

        let _slot = room.admit(Uuid::new_v4(), outbox().0);
        let queued = room.admit(Uuid::new_v4(), outbox().0);
        drop(queued);

        assert!(matches!(
            room.admit(Uuid::new_v4(), outbox().0),
            Admission::Locked(Some(_))
        ));
    }

    #[tokio::test]
    async fn test_dropped_slot_is_released() {
        let room = room(1, 10);

        {
            let _slot = room.admit(Uuid::new_v4(), outbox().0);
            assert_eq!(room.snapshot().active, 1);
        }

        assert_eq!(room.snapshot().active, 0);
        assert!(matches!(
            room.admit(Uuid::new_v4(), outbox().0),
            Admission::Accepted(_)
        ));
    }

    #[tokio::test]
    async fn test_dropped_ticket_releases_handed_slot() {
        let room = room(1, 10);

        let Admission::Accepted(slot) = room.admit(Uuid::new_v4(), outbox().0) else {
            panic!("first admit must succeed");
        };
        let Admission::Locked(Some(ticket)) = room.admit(Uuid::new_v4(), outbox().0) else {
            panic!("expected queued");
        };

        assert!(slot.release(ReleaseReason::Exit).is_some());
        assert_eq!(room.snapshot().active, 1);
        drop(ticket);
        assert_eq!(room.snapshot().active, 0);
    }

    #[test]
    fn test_concurrent_admits_respect_capacity() {
        let room = room(1, 50);
        let barrier = Arc::new(std::sync::Barrier::new(2));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let room = Arc::clone(&room);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    match room.admit(Uuid::new_v4(), mpsc::channel(1).0) {
                        Admission::Accepted(slot) => {
                            std::mem::forget(slot);
                            true
                        }
                        Admission::Locked(_) => false,
                    }
                })
            })
            .collect();

        let accepted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&accepted| accepted)
            .count();

        assert_eq!(accepted, 1);
        assert_eq!(room.snapshot().active, 1);
    }

    #[test]
    fn test_release_churn_never_exceeds_capacity() {
        let room = room(2, 50);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let room = Arc::clone(&room);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        if let Admission::Accepted(slot) =
                            room.admit(Uuid::new_v4(), mpsc::channel(1).0)
                        {
                            assert!(room.snapshot().active <= 2);
                            slot.release(ReleaseReason::Exit);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(room.snapshot().active, 0);
    }

    #[tokio::test]
    async fn test_withdraw_removes_queued_waiter() {
        let room = room(1, 10);

        let _slot = room.admit(Uuid::new_v4(), outbox().0);
        let Admission::Locked(Some(ticket)) = room.admit(Uuid::new_v4(), outbox().0) else {
            panic!("expected queued");
        };
        assert_eq!(room.snapshot().waiting, 1);

        room.withdraw(ticket);
        assert_eq!(room.snapshot().waiting, 0);
    }

    #[tokio::test]
    async fn test_withdraw_after_promotion_passes_slot_on() {
        let room = room(1, 10);

        let Admission::Accepted(slot) = room.admit(Uuid::new_v4(), outbox().0) else {
            panic!("first admit must succeed");
        };
        let Admission::Locked(Some(leaving)) = room.admit(Uuid::new_v4(), outbox().0) else {
            panic!("expected queued");
        };
        let Admission::Locked(Some(mut next)) = room.admit(Uuid::new_v4(), outbox().0) else {
            panic!("expected queued");
        };

        assert_eq!(
            slot.release(ReleaseReason::Disconnect),
            Some(leaving.session_id())
        );
        room.withdraw(leaving);

        let handed = next.promoted().await.expect("slot moves to the next waiter");
        assert_eq!(handed.session_id(), next.session_id());
        assert_eq!(room.snapshot().active, 1);
        assert_eq!(room.snapshot().waiting, 0);
    }

    #[test]
    fn test_delivery_from_str() {
        assert_eq!("echo".parse::<Delivery>(), Ok(Delivery::Echo));
        assert_eq!("peers".parse::<Delivery>(), Ok(Delivery::Peers));
        assert!("broadcast".parse::<Delivery>().is_err());
    }

    fn peers_room() -> Arc<Room> {
        Arc::new(Room::new(
            "peers",
            Direction::ItalianToEnglish,
            2,
            10,
            Delivery::Peers,
        ))
    }

    #[tokio::test]
    async fn test_relay_to_peers() {
        let room = peers_room();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let (alice_tx, mut alice_rx) = outbox();
        let (bob_tx, mut bob_rx) = outbox();

        let _a = room.admit(alice, alice_tx);
        let _b = room.admit(bob, bob_tx);

        assert_eq!(room.relay_to_peers(alice, "alice: Hello"), 1);
        assert_eq!(bob_rx.recv().await.as_deref(), Some("alice: Hello"));
        assert!(alice_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stalled_peer_outbox_stays_bounded() {
        let room = peers_room();
        let alice = Uuid::new_v4();
        let (bob_tx, mut bob_rx) = outbox();

        let _a = room.admit(alice, outbox().0);
        let _b = room.admit(Uuid::new_v4(), bob_tx);

        let delivered: usize = (0..OUTBOX_CAPACITY + 10)
            .map(|i| room.relay_to_peers(alice, &format!("line {}", i)))
            .sum();
        assert_eq!(delivered, OUTBOX_CAPACITY);

        let mut buffered = 0;
        while bob_rx.try_recv().is_ok() {
            buffered += 1;
        }
        assert_eq!(buffered, OUTBOX_CAPACITY);

        // Draining makes room again
        assert_eq!(room.relay_to_peers(alice, "after"), 1);
    }
}
