//! Per-channel request deduplication.
//!
//! A request may carry a channel id. While a request on a channel is in
//! flight, further requests on the same channel are dropped. Every drop
//! increments a counter; once it exceeds the configured maximum the
//! channel is considered stuck, reset, and the request goes through.
//!
//! ```
//! use tame_ads::channel::{Admission, ChannelTable};
//!
//! let mut table = ChannelTable::new(2);
//! assert_eq!(table.admit(7), Admission::Accepted);
//! assert_eq!(table.admit(7), Admission::Dropped { drops: 1 });
//! assert_eq!(table.admit(7), Admission::Dropped { drops: 2 });
//! assert_eq!(table.admit(7), Admission::Accepted);
//!
//! table.acknowledge(7);
//! assert_eq!(table.admit(7), Admission::Accepted);
//! ```

use std::collections::HashMap;

/// Default number of drops before a channel is reset.
pub const DEFAULT_MAX_DROP_REQUESTS: u32 = 10;

/// State of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    /// No request in flight.
    #[default]
    Idle,
    /// A request is in flight; `drops` duplicates have been dropped since.
    Outstanding {
        /// Number of requests dropped while outstanding.
        drops: u32,
    },
}

/// Outcome of [`ChannelTable::admit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The request may be sent; the channel is now outstanding.
    Accepted,
    /// The request must not be sent.
    Dropped {
        /// Drop count after this request.
        drops: u32,
    },
}

/// Channel states of one client.
#[derive(Debug, Clone)]
pub struct ChannelTable {
    channels: HashMap<u32, ChannelState>,
    max_drops: u32,
}

impl ChannelTable {
    /// Creates an empty table.
    pub fn new(max_drops: u32) -> Self {
        Self {
            channels: HashMap::new(),
            max_drops,
        }
    }

    /// Decides whether a request on `channel` may be sent.
    ///
    /// An accepted request leaves the channel outstanding with a zero drop
    /// count.
    pub fn admit(&mut self, channel: u32) -> Admission {
        let state = self.channels.entry(channel).or_default();
        match *state {
            ChannelState::Outstanding { drops } if drops < self.max_drops => {
                let drops = drops + 1;
                *state = ChannelState::Outstanding { drops };
                Admission::Dropped { drops }
            }
            ChannelState::Outstanding { drops } => {
                tracing::warn!(channel, drops, "channel reset after too many dropped requests");
                *state = ChannelState::Outstanding { drops: 0 };
                Admission::Accepted
            }
            ChannelState::Idle => {
                *state = ChannelState::Outstanding { drops: 0 };
                Admission::Accepted
            }
        }
    }

    /// Returns `channel` to idle after a reply (data, ack or fault).
    ///
    /// Idle channels are not stored.
    pub fn acknowledge(&mut self, channel: u32) {
        self.channels.remove(&channel);
    }

    /// Returns the current state of `channel`.
    pub fn state(&self, channel: u32) -> ChannelState {
        self.channels.get(&channel).copied().unwrap_or_default()
    }

    /// Returns the configured drop limit.
    pub fn max_drops(&self) -> u32 {
        self.max_drops
    }
}

impl Default for ChannelTable {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DROP_REQUESTS)
    }
}
