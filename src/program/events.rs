//! Session lifecycle events.
//!
//! Every ledger-visible transition is published on a broadcast channel.
//! Subscribers only see events sent after they subscribed; a subscriber that
//! falls behind by more than the channel capacity skips the oldest events.

use crate::ledger::{PartyId, Role, SessionId};
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

/// Events buffered per subscriber before the oldest are dropped.
pub const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Record written; `init_session` queued.
    Created {
        session: SessionId,
        first_party: PartyId,
    },
    /// Sealed zero state stored.
    Initialized { session: SessionId },
    /// First party's encrypted contacts were queued.
    ContactsSubmitted { session: SessionId },
    /// First party's contacts stored; the session is open for a joiner.
    FirstPartyAccepted { session: SessionId },
    /// Second party recorded; intersection about to be queued.
    MatchComputing {
        session: SessionId,
        second_party: PartyId,
    },
    /// Intersection stored; the session is matched.
    MatchComplete { session: SessionId },
    /// A join failed before the intersection ran; the slot is open again.
    JoinReleased {
        session: SessionId,
        second_party: PartyId,
    },
    /// Reveal of one party's result queued.
    Revealing { session: SessionId, role: Role },
    /// Reveal delivered.
    Revealed { session: SessionId, role: Role },
    /// Session abandoned by its first party.
    Cancelled { session: SessionId },
}

impl SessionEvent {
    pub fn session(&self) -> SessionId {
        match self {
            Self::Created { session, .. }
            | Self::Initialized { session }
            | Self::ContactsSubmitted { session }
            | Self::FirstPartyAccepted { session }
            | Self::MatchComputing { session, .. }
            | Self::MatchComplete { session }
            | Self::JoinReleased { session, .. }
            | Self::Revealing { session, .. }
            | Self::Revealed { session, .. }
            | Self::Cancelled { session } => *session,
        }
    }
}

/// Publishing side, owned by the session program.
pub(crate) struct EventSender {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventSender {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, event: SessionEvent) {
        // No subscribers is not an error.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> EventStream {
        EventStream {
            inner: BroadcastStream::new(self.sender.subscribe()),
        }
    }
}

/// Stream of session events. Ends when the session program is dropped.
pub struct EventStream {
    inner: BroadcastStream<SessionEvent>,
}

impl Stream for EventStream {
    type Item = SessionEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(event))) => return Poll::Ready(Some(event)),
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(skipped)))) => {
                    tracing::warn!(skipped, "Event subscriber lagged");
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
