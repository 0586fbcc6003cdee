//! ---
//! pb_section: "02-messaging-ipc-data-model"
//! pb_subsection: "module"
//! pb_type: "source"
//! pb_scope: "code"
//! pb_description: "Single-slot rendezvous between an acknowledged write and dispatch."
//! pb_version: "v0.0.0-prealpha"
//! pb_owner: "tbd"
//! ---
use poolbus_proto::RawMessage;

use crate::{BusError, Result};

/// How an acknowledged write ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckOutcome {
    /// The correlated response, as dispatched.
    Response(RawMessage),
    /// Every attempt went unanswered.
    TimedOut {
        /// Awaited response action.
        action: u8,
        /// Transmissions made, including the first.
        attempts: u32,
    },
}

impl AckOutcome {
    /// Turn a timeout into [`BusError::ResponseTimeout`].
    pub fn into_result(self) -> Result<RawMessage> {
        match self {
            AckOutcome::Response(message) => Ok(message),
            AckOutcome::TimedOut { action, attempts } => {
                Err(BusError::ResponseTimeout { action, attempts })
            }
        }
    }

    /// True when a response arrived.
    pub fn is_response(&self) -> bool {
        matches!(self, AckOutcome::Response(_))
    }
}

/// Pending-response marker shared by the waiter and the dispatch path.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) enum AckSlot {
    /// Nobody is waiting.
    #[default]
    Idle,
    /// A caller waits for this action.
    Waiting { action: u8 },
    /// Dispatch delivered the response; the waiter has not collected it yet.
    Matched(RawMessage),
    /// The link went away while a caller was waiting.
    Cancelled,
}

impl AckSlot {
    /// Offer a dispatched message; returns true when it completes the wait.
    pub(crate) fn offer(&mut self, message: &RawMessage) -> bool {
        match self {
            AckSlot::Waiting { action } if *action == message.action() => {
                *self = AckSlot::Matched(message.clone());
                true
            }
            _ => false,
        }
    }

    /// Abort a wait in progress; returns true when a waiter must be woken.
    pub(crate) fn cancel(&mut self) -> bool {
        if matches!(self, AckSlot::Waiting { .. }) {
            *self = AckSlot::Cancelled;
            true
        } else {
            false
        }
    }

    /// Collect a resolution, leaving the slot idle if one was present.
    pub(crate) fn resolve(&mut self) -> Option<Result<RawMessage>> {
        match std::mem::take(self) {
            AckSlot::Matched(message) => Some(Ok(message)),
            AckSlot::Cancelled => Some(Err(BusError::StreamClosed)),
            pending => {
                *self = pending;
                None
            }
        }
    }
}
