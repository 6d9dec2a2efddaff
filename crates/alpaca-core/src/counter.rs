//! Atomic id counters and client identities.
//!
//! Counters are ordinary values handed around behind an `Arc`, not statics,
//! so independent clients (and independent tests) never share a sequence.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Monotonic `u32` sequence backed by a single atomic.
///
/// `next()` never blocks and never hands out the same value twice until the
/// counter wraps at `u32::MAX`.
#[derive(Debug)]
pub struct SequenceCounter {
    next: AtomicU32,
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceCounter {
    /// A counter whose first value is 1.
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// A counter whose first value is `first`.
    pub fn starting_at(first: u32) -> Self {
        Self {
            next: AtomicU32::new(first),
        }
    }

    /// Takes the next value.
    pub fn next(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// The value the next call to `next()` will return.
    pub fn peek(&self) -> u32 {
        self.next.load(Ordering::Relaxed)
    }
}

/// The identity a client presents to servers.
///
/// Carries the `ClientID` and the transaction counter that numbers every
/// call made under that id. Clones share the counter, so transaction ids stay
/// strictly increasing across all clones.
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    client_id: u32,
    transactions: Arc<SequenceCounter>,
}

impl ClientIdentity {
    /// Allocates a fresh identity from a client-id counter.
    pub fn allocate(client_ids: &SequenceCounter) -> Self {
        Self::with_id(client_ids.next())
    }

    /// An identity with a caller-chosen client id.
    pub fn with_id(client_id: u32) -> Self {
        Self {
            client_id,
            transactions: Arc::new(SequenceCounter::new()),
        }
    }

    pub fn client_id(&self) -> u32 {
        self.client_id
    }

    /// Consumes one transaction id.
    pub fn next_transaction_id(&self) -> u32 {
        self.transactions.next()
    }

    /// Number of transaction ids handed out so far.
    pub fn transactions_issued(&self) -> u32 {
        self.transactions.peek().wrapping_sub(1)
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client {}", self.client_id)
    }
}
