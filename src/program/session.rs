//! Session program
//!
//! Ledger-side orchestrator for discovery sessions. It owns the session
//! record state machine:
//!
//! ```text
//! create_session ──► AwaitingFirstParty ──submit_first_party──► AwaitingSecondParty
//!                          │                                          │
//!                          │                       submit_second_party_and_match
//!                          │                                          ▼
//!                          └─────────── cancel ──────────────► Computing ──callback──► Matched
//!                                         ▼
//!                                     Cancelled
//! ```
//!
//! Every operation claims the session's pending slot first, then checks
//! authority and status, then queues the computation. Ledger status advances
//! only when the matching signed callback verifies. The one step back is a
//! join whose intersection never ran: a failed queue or an aborted
//! computation returns the session to `AwaitingSecondParty` with the second
//! party cleared.
//!
//! Each transition is published as a [`SessionEvent`].

use super::error::ProgramError;
use super::events::{EventSender, EventStream, SessionEvent};
use super::pending::{CallbackOutcome, ComputationTicket, PendingComputation, PendingTable};
use crate::compute::{
    ComputationInput, ComputationOutput, ComputationRequest, ComputationResult, ComputeNetwork,
    Instruction, OutputStream, SignedOutput,
};
use crate::crypto::{ClusterPublicKey, EncryptedContactSet, EncryptedMarker};
use crate::ledger::{
    find_session_address, Ledger, LedgerError, PartyId, ProgramId, Role, SessionAddress,
    SessionId, SessionRecord, SessionStatus,
};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Default time a queued computation may stay outstanding before the first
/// party may cancel a computing session.
pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(30);

/// Session program settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramConfig {
    pub program_id: ProgramId,
    pub callback_timeout: Duration,
}

impl Default for ProgramConfig {
    fn default() -> Self {
        Self {
            program_id: ProgramId::default(),
            callback_timeout: DEFAULT_CALLBACK_TIMEOUT,
        }
    }
}

/// The session program. Clones share ledger, network and pending table.
pub struct SessionProgram<L, N> {
    inner: Arc<ProgramInner<L, N>>,
}

struct ProgramInner<L, N> {
    ledger: L,
    network: N,
    config: ProgramConfig,
    pending: PendingTable,
    events: EventSender,
}

impl<L, N> Clone for SessionProgram<L, N> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

fn not_found(session: SessionId) -> impl Fn(LedgerError) -> ProgramError {
    move |e| match e {
        LedgerError::NotFound(_) => ProgramError::SessionNotFound(session),
        other => ProgramError::Ledger(other),
    }
}

fn expect_status(record: &SessionRecord, expected: SessionStatus) -> Result<(), ProgramError> {
    if record.status != expected {
        return Err(ProgramError::InvalidStatus {
            expected,
            actual: record.status,
        });
    }
    Ok(())
}

fn expect_party(record: &SessionRecord, caller: &PartyId, role: Role) -> Result<(), ProgramError> {
    let recorded = record.party(role);
    if recorded.is_unset() || &recorded != caller {
        return Err(ProgramError::Unauthorized {
            caller: *caller,
            role,
        });
    }
    Ok(())
}

impl<L, N> SessionProgram<L, N>
where
    L: Ledger + 'static,
    N: ComputeNetwork + 'static,
{
    pub fn new(ledger: L, network: N, config: ProgramConfig) -> Self {
        Self {
            inner: Arc::new(ProgramInner {
                ledger,
                network,
                config,
                pending: PendingTable::default(),
                events: EventSender::new(),
            }),
        }
    }

    pub fn config(&self) -> &ProgramConfig {
        &self.inner.config
    }

    pub fn ledger(&self) -> &L {
        &self.inner.ledger
    }

    pub fn network(&self) -> &N {
        &self.inner.network
    }

    /// Lifecycle events published from now on.
    pub fn subscribe_events(&self) -> EventStream {
        self.inner.events.subscribe()
    }

    fn publish(&self, event: SessionEvent) {
        self.inner.events.publish(event);
    }

    /// Number of computations awaiting a callback.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Key parties encrypt their inputs to.
    pub async fn cluster_public_key(&self) -> Result<ClusterPublicKey, crate::crypto::CipherError> {
        self.inner.network.cluster_public_key().await
    }

    pub fn session_address(&self, session: &SessionId) -> Result<SessionAddress, ProgramError> {
        Ok(find_session_address(session, &self.inner.config.program_id)?.0)
    }

    pub async fn get_record(&self, session: &SessionId) -> Result<SessionRecord, ProgramError> {
        let address = self.session_address(session)?;
        self.inner
            .ledger
            .get_record(&address)
            .await
            .map_err(not_found(*session))
    }

    /// Create a session owned by `caller` and queue `init_session`.
    pub async fn create_session(
        &self,
        caller: PartyId,
        marker: EncryptedMarker,
    ) -> Result<(SessionId, ComputationTicket), ProgramError> {
        let session = SessionId::random();
        let (address, bump) = find_session_address(&session, &self.inner.config.program_id)?;

        let reservation =
            self.inner
                .pending
                .reserve(address, session, Instruction::InitSession)?;

        let record = SessionRecord::new(session, caller, bump);
        self.inner
            .ledger
            .create_record(&address, &record)
            .await
            .map_err(|e| match e {
                LedgerError::AlreadyExists(_) => ProgramError::SessionExists(session),
                other => ProgramError::Ledger(other),
            })?;
        self.publish(SessionEvent::Created {
            session,
            first_party: caller,
        });

        self.queue(
            reservation.id(),
            session,
            Instruction::InitSession,
            None,
            ComputationInput::Marker(marker),
        )
        .await?;

        tracing::info!(session = %session, first_party = %caller, "Session created");
        Ok((session, reservation.into_ticket()))
    }

    /// Queue the first party's encrypted contacts.
    pub async fn submit_first_party(
        &self,
        caller: PartyId,
        session: SessionId,
        payload: EncryptedContactSet,
    ) -> Result<ComputationTicket, ProgramError> {
        let address = self.session_address(&session)?;
        let reservation =
            self.inner
                .pending
                .reserve(address, session, Instruction::SubmitFirstParty)?;

        let record = self
            .inner
            .ledger
            .get_record(&address)
            .await
            .map_err(not_found(session))?;
        expect_party(&record, &caller, Role::First)?;
        expect_status(&record, SessionStatus::AwaitingFirstParty)?;
        let sealed = self
            .inner
            .ledger
            .get_sealed_state(&address)
            .await?
            .ok_or(ProgramError::NotInitialized)?;

        self.queue(
            reservation.id(),
            session,
            Instruction::SubmitFirstParty,
            Some(sealed),
            ComputationInput::Contacts(Box::new(payload)),
        )
        .await?;

        tracing::info!(session = %session, "First party contacts queued");
        self.publish(SessionEvent::ContactsSubmitted { session });
        Ok(reservation.into_ticket())
    }

    /// Join as second party and queue the intersection.
    pub async fn submit_second_party_and_match(
        &self,
        caller: PartyId,
        session: SessionId,
        payload: EncryptedContactSet,
    ) -> Result<ComputationTicket, ProgramError> {
        let address = self.session_address(&session)?;
        let reservation = self.inner.pending.reserve(
            address,
            session,
            Instruction::SubmitSecondPartyAndMatch,
        )?;

        let record = self
            .inner
            .ledger
            .get_record(&address)
            .await
            .map_err(not_found(session))?;
        if record.first_party == caller {
            return Err(ProgramError::SelfJoin);
        }
        if !record.second_party.is_unset() {
            return Err(ProgramError::SecondPartyClaimed);
        }
        expect_status(&record, SessionStatus::AwaitingSecondParty)?;
        let sealed = self
            .inner
            .ledger
            .get_sealed_state(&address)
            .await?
            .ok_or(ProgramError::NotInitialized)?;

        let computing = record
            .with_second_party(caller)
            .with_status(SessionStatus::Computing)
            .map_err(LedgerError::from)?;
        self.inner
            .ledger
            .update_record(&address, SessionStatus::AwaitingSecondParty, &computing, None)
            .await?;
        self.publish(SessionEvent::MatchComputing {
            session,
            second_party: caller,
        });

        let queued = self
            .queue(
                reservation.id(),
                session,
                Instruction::SubmitSecondPartyAndMatch,
                Some(sealed),
                ComputationInput::Contacts(Box::new(payload)),
            )
            .await;
        if let Err(e) = queued {
            self.release_join(&address, session).await;
            return Err(e);
        }

        tracing::info!(session = %session, second_party = %caller, "Intersection queued");
        Ok(reservation.into_ticket())
    }

    /// Queue a reveal of `role`'s match result. Read-only; repeatable.
    pub async fn reveal_matches(
        &self,
        caller: PartyId,
        session: SessionId,
        role: Role,
        marker: EncryptedMarker,
    ) -> Result<ComputationTicket, ProgramError> {
        let address = self.session_address(&session)?;
        let instruction = Instruction::RevealMatches(role);
        let swept = self
            .inner
            .pending
            .sweep_reveals(self.inner.config.callback_timeout);
        if swept > 0 {
            tracing::debug!(swept, "Stale reveals removed");
        }
        let reservation = self.inner.pending.reserve(address, session, instruction)?;

        let record = self
            .inner
            .ledger
            .get_record(&address)
            .await
            .map_err(not_found(session))?;
        expect_party(&record, &caller, role)?;
        expect_status(&record, SessionStatus::Matched)?;
        let sealed = self
            .inner
            .ledger
            .get_sealed_state(&address)
            .await?
            .ok_or(ProgramError::NotInitialized)?;

        self.queue(
            reservation.id(),
            session,
            instruction,
            Some(sealed),
            ComputationInput::Marker(marker),
        )
        .await?;

        tracing::debug!(session = %session, role = %role, "Reveal queued");
        self.publish(SessionEvent::Revealing { session, role });
        Ok(reservation.into_ticket())
    }

    /// Abandon a session. First party only.
    ///
    /// Allowed while awaiting either party, and while computing once the
    /// queued computation has been outstanding longer than the callback
    /// timeout (or was never delivered). Pending waiters are woken with
    /// `Cancelled`; late callbacks are rejected.
    pub async fn cancel_session(
        &self,
        caller: PartyId,
        session: SessionId,
    ) -> Result<SessionRecord, ProgramError> {
        let address = self.session_address(&session)?;
        let record = self
            .inner
            .ledger
            .get_record(&address)
            .await
            .map_err(not_found(session))?;
        expect_party(&record, &caller, Role::First)?;

        match record.status {
            SessionStatus::AwaitingFirstParty | SessionStatus::AwaitingSecondParty => {}
            SessionStatus::Computing => {
                let overdue = self
                    .inner
                    .pending
                    .exclusive_age(&address)
                    .map_or(true, |age| age > self.inner.config.callback_timeout);
                if !overdue {
                    return Err(ProgramError::NotCancellable(record.status));
                }
            }
            status => return Err(ProgramError::NotCancellable(status)),
        }

        let cancelled = record
            .with_status(SessionStatus::Cancelled)
            .map_err(LedgerError::from)?;
        self.inner
            .ledger
            .update_record(&address, record.status, &cancelled, None)
            .await?;

        for pending in self.inner.pending.drain_session(&address) {
            pending.notify(Err(ProgramError::Cancelled(session)));
        }

        tracing::info!(session = %session, from = %record.status, "Session cancelled");
        self.publish(SessionEvent::Cancelled { session });
        Ok(cancelled)
    }

    /// Return a computing session to `AwaitingSecondParty` after its join
    /// failed. Failure to do so is logged; the session then stays computing
    /// until cancelled.
    async fn release_join(&self, address: &SessionAddress, session: SessionId) {
        let ledger = &self.inner.ledger;
        let released = async {
            let record = ledger.get_record(address).await?;
            let released = record.release_second_party().map_err(LedgerError::from)?;
            ledger
                .update_record(address, SessionStatus::Computing, &released, None)
                .await?;
            Ok::<PartyId, LedgerError>(record.second_party)
        }
        .await;

        match released {
            Ok(second_party) => {
                tracing::info!(session = %session, second_party = %second_party, "Join released");
                self.publish(SessionEvent::JoinReleased {
                    session,
                    second_party,
                });
            }
            Err(e) => {
                tracing::warn!(session = %session, error = %e, "Failed to release join");
            }
        }
    }

    async fn queue(
        &self,
        id: crate::compute::ComputationId,
        session: SessionId,
        instruction: Instruction,
        sealed_state: Option<Vec<u8>>,
        input: ComputationInput,
    ) -> Result<(), ProgramError> {
        let request = ComputationRequest {
            id,
            session,
            instruction,
            sealed_state,
            input,
        };
        self.inner.network.queue_computation(request).await?;
        Ok(())
    }

    /// Verify a signed output and apply it.
    ///
    /// A bad signature or an output that does not match its pending
    /// computation leaves the pending entry in place. An aborted computation
    /// releases the entry and fails the waiter; an aborted intersection also
    /// reopens the session for another joiner.
    pub async fn handle_callback(
        &self,
        signed: SignedOutput,
    ) -> Result<CallbackOutcome, ProgramError> {
        let verifying_key = self.inner.network.cluster_verifying_key();
        let output = signed.verify(&verifying_key)?;

        let (session, instruction) = self
            .inner
            .pending
            .describe(&output.id)
            .ok_or(ProgramError::UnknownComputation(output.id))?;
        if session != output.session || instruction != output.instruction {
            tracing::warn!(computation = %output.id, "Callback does not match pending computation");
            return Err(ProgramError::OutputMismatch(format!(
                "expected {} for {}, got {} for {}",
                instruction, session, output.instruction, output.session
            )));
        }

        let pending = self
            .inner
            .pending
            .take(&output.id)
            .ok_or(ProgramError::UnknownComputation(output.id))?;

        let result = self.apply(&pending, output).await;
        match &result {
            Ok(_) => tracing::info!(session = %session, instruction = %instruction, "Callback applied"),
            Err(e) => tracing::warn!(session = %session, instruction = %instruction, error = %e, "Callback failed"),
        }
        pending.notify(result.clone());
        result
    }

    async fn apply(
        &self,
        pending: &PendingComputation,
        output: ComputationOutput,
    ) -> Result<CallbackOutcome, ProgramError> {
        let address = pending.address;
        let session = pending.session;
        let ledger = &self.inner.ledger;

        let sealed = match (&output.result, output.sealed_state) {
            (ComputationResult::Aborted { reason }, _) => {
                if output.instruction == Instruction::SubmitSecondPartyAndMatch {
                    self.release_join(&address, session).await;
                }
                return Err(crate::compute::ComputeError::Aborted(reason.clone()).into());
            }
            (_, sealed) => sealed,
        };

        let require_sealed = |sealed: Option<Vec<u8>>| {
            sealed.ok_or_else(|| ProgramError::OutputMismatch("missing sealed state".to_string()))
        };

        match (output.instruction, output.result) {
            (Instruction::InitSession, ComputationResult::Initialized) => {
                let sealed = require_sealed(sealed)?;
                let record = ledger.get_record(&address).await?;
                ledger
                    .update_record(&address, SessionStatus::AwaitingFirstParty, &record, Some(&sealed))
                    .await?;
                self.publish(SessionEvent::Initialized { session });
                Ok(CallbackOutcome::Initialized)
            }
            (Instruction::SubmitFirstParty, ComputationResult::Submitted(confirmation)) => {
                let sealed = require_sealed(sealed)?;
                let record = ledger.get_record(&address).await?;
                let next = record
                    .with_status(SessionStatus::AwaitingSecondParty)
                    .map_err(LedgerError::from)?;
                ledger
                    .update_record(&address, SessionStatus::AwaitingFirstParty, &next, Some(&sealed))
                    .await?;
                self.publish(SessionEvent::FirstPartyAccepted { session });
                Ok(CallbackOutcome::Submitted(confirmation))
            }
            (Instruction::SubmitSecondPartyAndMatch, ComputationResult::Matches(result)) => {
                let sealed = require_sealed(sealed)?;
                let record = ledger.get_record(&address).await?;
                let next = record
                    .with_status(SessionStatus::Matched)
                    .map_err(LedgerError::from)?;
                ledger
                    .update_record(&address, SessionStatus::Computing, &next, Some(&sealed))
                    .await?;
                self.publish(SessionEvent::MatchComplete { session });
                Ok(CallbackOutcome::Matched(result))
            }
            (Instruction::RevealMatches(role), ComputationResult::Matches(result)) => {
                self.publish(SessionEvent::Revealed { session, role });
                Ok(CallbackOutcome::Revealed(result))
            }
            (instruction, _) => Err(ProgramError::OutputMismatch(format!(
                "unexpected result kind for {}",
                instruction
            ))),
        }
    }

    /// Consume signed outputs until the stream ends.
    pub async fn run_callbacks(&self, mut stream: OutputStream) {
        while let Some(signed) = stream.next().await {
            if let Err(e) = self.handle_callback(signed).await {
                tracing::debug!(error = %e, "Callback rejected");
            }
        }
        tracing::debug!("Output stream closed");
    }

    /// Subscribe to the network's outputs and relay them on a background task.
    pub fn spawn_callback_relay(&self) -> Result<JoinHandle<()>, ProgramError> {
        let stream = self.inner.network.subscribe()?;
        let program = self.clone();
        Ok(tokio::spawn(async move { program.run_callbacks(stream).await }))
    }

    /// Wait on a ticket with the configured callback timeout.
    ///
    /// A reveal that times out is forgotten; its late callback is rejected as
    /// unknown. Other computations stay pending so a late callback can still
    /// advance the session.
    pub async fn await_ticket(
        &self,
        ticket: ComputationTicket,
    ) -> Result<CallbackOutcome, ProgramError> {
        let id = ticket.id();
        let result = ticket.wait(self.inner.config.callback_timeout).await;
        if matches!(result, Err(ProgramError::CallbackTimeout(_)))
            && self.inner.pending.discard_reveal(&id)
        {
            tracing::debug!(computation = %id, "Timed out reveal discarded");
        }
        result
    }
}
