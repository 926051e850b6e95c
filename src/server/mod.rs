//! Translating chat relay server
//!
//! Each configured room listens on its own address and translates every
//! chat line word by word in one direction before delivering it.
//!
//! ## Session Flow
//!
//! - **Handshake**: optional `PORT:<n>` line, then room admission
//! - **Locked**: room full, client is sent `LOCKED` and parked in the waiting queue
//!   until a departing occupant's slot is handed to it (`NOT LOCKED`)
//! - **Active**: each line is translated and echoed (or relayed to peers)
//! - **Closed**: exit command, `KICKED`, disconnect, or `SERVER_SHUTDOWN`

pub mod listener;
pub mod room;
mod session;
mod shutdown;
pub mod waiting_queue;

pub use listener::RelayServer;
pub use room::{
    Admission, Delivery, ReleaseReason, Room, RoomSlot, RoomStats, SessionId, WaitTicket,
};
pub use waiting_queue::WaitingQueue;
