//! Event types for coordination routing
//!
//! Events are classified by a bitflag value so one subscription mask can
//! match several categories at once. Masks combine with `|` and match with
//! `&` - a subscription receives an event iff the mask and event intersect.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// Bitflag event classifier.
///
/// One bit is reserved for synthetic timer events ([`EventType::TIMER`]);
/// timer fires may carry additional bits naming which logical timer produced
/// them, so a subscriber can tell timers apart while a mask of just `TIMER`
/// still receives every fire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventType(pub u32);

impl EventType {
    /// No bits set - matches nothing.
    pub const NONE: EventType = EventType(0);

    /// Set on every synthetic timer event.
    pub const TIMER: EventType = EventType(1 << 0);

    /// Content delivery: the client reported the workflow state file.
    pub const WORKFLOW_STATE: EventType = EventType(1 << 1);

    /// Content delivery: the client reported external change-tool output.
    pub const CHANGE_LIST: EventType = EventType(1 << 2);

    /// Identifies the change-cache refresh timer.
    pub const CHANGES_REFRESH: EventType = EventType(1 << 3);

    /// True if any bit is shared with `other`.
    pub fn intersects(self, other: EventType) -> bool {
        self.0 & other.0 != 0
    }

    /// True if every bit of `other` is set in `self`.
    pub fn contains(self, other: EventType) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if no bits are set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for EventType {
    type Output = EventType;

    fn bitor(self, rhs: EventType) -> EventType {
        EventType(self.0 | rhs.0)
    }
}

impl BitOrAssign for EventType {
    fn bitor_assign(&mut self, rhs: EventType) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for EventType {
    type Output = EventType;

    fn bitand(self, rhs: EventType) -> EventType {
        EventType(self.0 & rhs.0)
    }
}

impl fmt::Debug for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventType({})", self)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "NONE");
        }

        let names = [
            (EventType::TIMER, "TIMER"),
            (EventType::WORKFLOW_STATE, "WORKFLOW_STATE"),
            (EventType::CHANGE_LIST, "CHANGE_LIST"),
            (EventType::CHANGES_REFRESH, "CHANGES_REFRESH"),
        ];

        let mut remaining = self.0;
        let mut first = true;
        for (flag, name) in names {
            if self.contains(flag) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{}", name)?;
                remaining &= !flag.0;
                first = false;
            }
        }

        if remaining != 0 {
            if !first {
                write!(f, "|")?;
            }
            write!(f, "{:#x}", remaining)?;
        }

        Ok(())
    }
}
