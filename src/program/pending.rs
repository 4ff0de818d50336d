//! Pending computations and their waiters.
//!
//! A session with an exclusive pending computation is in the implicit
//! "awaiting callback" state: no other mutating operation may start until the
//! callback lands or the session is cancelled. Reveals are non-exclusive.

use super::error::ProgramError;
use crate::compute::{ComputationId, EncryptedConfirmation, EncryptedMatchResult, Instruction};
use crate::ledger::{SessionAddress, SessionId};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// What a verified callback delivered to the waiting party.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// Sealed zero state stored; the first party may submit.
    Initialized,
    /// First party's contacts stored.
    Submitted(EncryptedConfirmation),
    /// Intersection ran; the second party's view of it.
    Matched(Box<EncryptedMatchResult>),
    /// A party's view of an existing result.
    Revealed(Box<EncryptedMatchResult>),
}

type Waiter = oneshot::Sender<Result<CallbackOutcome, ProgramError>>;

pub(crate) struct PendingComputation {
    pub address: SessionAddress,
    pub session: SessionId,
    pub instruction: Instruction,
    pub queued_at: Instant,
    waiter: Option<Waiter>,
}

impl PendingComputation {
    fn exclusive(&self) -> bool {
        !matches!(self.instruction, Instruction::RevealMatches(_))
    }

    pub fn notify(mut self, result: Result<CallbackOutcome, ProgramError>) {
        if let Some(waiter) = self.waiter.take() {
            // Receiver may have timed out already.
            let _ = waiter.send(result);
        }
    }
}

/// Pending computations keyed by computation id.
#[derive(Default)]
pub(crate) struct PendingTable {
    entries: Mutex<HashMap<ComputationId, PendingComputation>>,
}

impl PendingTable {
    fn lock(&self) -> MutexGuard<'_, HashMap<ComputationId, PendingComputation>> {
        // A panic while holding this lock leaves only plain data behind.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim the session for `instruction`. Exclusive instructions fail if any
    /// exclusive computation is already pending for the session.
    pub fn reserve(
        &self,
        address: SessionAddress,
        session: SessionId,
        instruction: Instruction,
    ) -> Result<Reservation<'_>, ProgramError> {
        let mut entries = self.lock();
        let wants_exclusive = !matches!(instruction, Instruction::RevealMatches(_));
        if wants_exclusive
            && entries
                .values()
                .any(|p| p.address == address && p.exclusive())
        {
            return Err(ProgramError::ComputationPending(session));
        }

        let mut id = ComputationId::random();
        while entries.contains_key(&id) {
            id = ComputationId::random();
        }

        let (sender, receiver) = oneshot::channel();
        entries.insert(
            id,
            PendingComputation {
                address,
                session,
                instruction,
                queued_at: Instant::now(),
                waiter: Some(sender),
            },
        );

        Ok(Reservation {
            table: self,
            id,
            session,
            receiver: Some(receiver),
        })
    }

    /// Look at a pending entry without removing it.
    pub fn describe(&self, id: &ComputationId) -> Option<(SessionId, Instruction)> {
        self.lock().get(id).map(|p| (p.session, p.instruction))
    }

    pub fn take(&self, id: &ComputationId) -> Option<PendingComputation> {
        self.lock().remove(id)
    }

    /// Age of the oldest exclusive computation pending for a session.
    pub fn exclusive_age(&self, address: &SessionAddress) -> Option<Duration> {
        self.lock()
            .values()
            .filter(|p| &p.address == address && p.exclusive())
            .map(|p| p.queued_at.elapsed())
            .max()
    }

    /// Remove every computation pending for a session.
    pub fn drain_session(&self, address: &SessionAddress) -> Vec<PendingComputation> {
        let mut entries = self.lock();
        let ids: Vec<ComputationId> = entries
            .iter()
            .filter(|(_, p)| &p.address == address)
            .map(|(id, _)| *id)
            .collect();
        ids.iter().filter_map(|id| entries.remove(id)).collect()
    }

    /// Drop a reveal whose waiter gave up. Exclusive entries stay so a late
    /// callback can still advance the session.
    pub fn discard_reveal(&self, id: &ComputationId) -> bool {
        let mut entries = self.lock();
        match entries.get(id) {
            Some(p) if !p.exclusive() => entries.remove(id).is_some(),
            _ => false,
        }
    }

    /// Remove reveals outstanding longer than `max_age`. Returns how many
    /// were removed.
    pub fn sweep_reveals(&self, max_age: Duration) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, p| p.exclusive() || p.queued_at.elapsed() <= max_age);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }
}

/// A claimed pending slot. Released on drop unless turned into a ticket.
pub(crate) struct Reservation<'a> {
    table: &'a PendingTable,
    id: ComputationId,
    session: SessionId,
    receiver: Option<oneshot::Receiver<Result<CallbackOutcome, ProgramError>>>,
}

impl Reservation<'_> {
    pub fn id(&self) -> ComputationId {
        self.id
    }

    /// Keep the pending entry and hand the waiter to the caller.
    pub fn into_ticket(mut self) -> ComputationTicket {
        let receiver = self.receiver.take();
        ComputationTicket {
            id: self.id,
            session: self.session,
            receiver,
        }
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.receiver.is_some() {
            self.table.take(&self.id);
        }
    }
}

/// Handle for awaiting one computation's verified callback.
#[derive(Debug)]
pub struct ComputationTicket {
    id: ComputationId,
    session: SessionId,
    receiver: Option<oneshot::Receiver<Result<CallbackOutcome, ProgramError>>>,
}

impl ComputationTicket {
    pub fn id(&self) -> ComputationId {
        self.id
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Wait for the callback. A timeout is an error, never an empty result.
    pub async fn wait(mut self, timeout: Duration) -> Result<CallbackOutcome, ProgramError> {
        let receiver = self.receiver.take().ok_or(ProgramError::CallbackDropped)?;
        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ProgramError::CallbackDropped),
            Err(_) => Err(ProgramError::CallbackTimeout(timeout)),
        }
    }
}
