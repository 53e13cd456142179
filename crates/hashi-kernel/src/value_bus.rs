//! One-shot handle table for values that cannot cross the wire.
//!
//! Protocol messages must be serializable, but some display results are live
//! objects (rendered figures, canvases) that only make sense next to the
//! renderer. The kernel parks such a value here, embeds the returned handle in
//! the display payload, and the renderer redeems the handle at render time.
//!
//! ```text
//!   event binding              ValueBus                  renderer
//!   ┌──────────────┐  push   ┌───────────────┐   pop    ┌──────────────┐
//!   │ live-object  │ ──────▶ │ handle → value│ ◀─────── │ mounts value │
//!   │ display      │ ◀────── │ (one-shot)    │ ───────▶ │ for handle   │
//!   └──────────────┘ handle  └───────────────┘  value   └──────────────┘
//! ```
//!
//! Handles start at 1, strictly increase, and are never reused. A handle can
//! be redeemed once; misses (never pushed, already popped) return `None`.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

/// Opaque key for one parked value.
pub type Handle = u64;

/// Thread-safe one-shot value table. Share it as `Arc<ValueBus<T>>`.
#[derive(Debug)]
pub struct ValueBus<T> {
    entries: DashMap<Handle, T>,
    last: AtomicU64,
}

impl<T> Default for ValueBus<T> {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
            last: AtomicU64::new(0),
        }
    }
}

impl<T> ValueBus<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a value and return its handle. Never fails.
    pub fn push(&self, value: T) -> Handle {
        let handle = self.last.fetch_add(1, Ordering::Relaxed) + 1;
        self.entries.insert(handle, value);
        tracing::trace!(handle, "value parked on bus");
        handle
    }

    /// Remove and return the value for `handle`.
    pub fn pop(&self, handle: Handle) -> Option<T> {
        let value = self.entries.remove(&handle).map(|(_, v)| v);
        if value.is_none() {
            tracing::debug!(handle, "bus miss: handle unknown or already redeemed");
        }
        value
    }

    /// Number of values parked and not yet redeemed.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The most recently allocated handle (0 before the first push).
    pub fn last_handle(&self) -> Handle {
        self.last.load(Ordering::Relaxed)
    }
}
