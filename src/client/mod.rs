//! Party client
//!
//! Drives the pipeline for one party:
//!
//! ```text
//! raw contacts ─► fingerprint ─► fetch cluster key ─► encrypt ─► submit ─► await callback ─► decrypt ─► resolve
//! ```
//!
//! Stages run sequentially. Input errors surface before the network is
//! touched; a missing callback is a timeout error, never "no matches".

pub mod resolve;

pub use resolve::resolve_matches;

use crate::compute::{ComputeNetwork, MatchResult, SubmitConfirmation};
use crate::crypto::{encrypt_marker, encrypt_set, random_nonce, EncryptedContactSet, SharedCipher};
use crate::error::ProtocolError;
use crate::fingerprint::{ContactSet, Normalizer};
use crate::ledger::{Ledger, PartyId, Role, SessionId, SessionRecord};
use crate::program::{CallbackOutcome, ComputationTicket, SessionProgram};

/// A contact set fingerprinted and encrypted for submission.
///
/// Keeps the cipher so the party can open the cluster's answer.
#[derive(Debug)]
pub struct PreparedSubmission {
    pub contact_set: ContactSet,
    pub cipher: SharedCipher,
    pub payload: EncryptedContactSet,
}

/// One party's view of the protocol.
pub struct PartyClient<L, N> {
    identity: PartyId,
    program: SessionProgram<L, N>,
    normalizer: Normalizer,
}

impl<L, N> PartyClient<L, N>
where
    L: Ledger + 'static,
    N: ComputeNetwork + 'static,
{
    pub fn new(identity: PartyId, program: SessionProgram<L, N>, normalizer: Normalizer) -> Self {
        Self {
            identity,
            program,
            normalizer,
        }
    }

    pub fn identity(&self) -> PartyId {
        self.identity
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Wait for the callback of a queued computation.
    ///
    /// No callback within the configured timeout is an error, never an
    /// empty result.
    pub async fn await_computation(
        &self,
        ticket: ComputationTicket,
    ) -> Result<CallbackOutcome, ProtocolError> {
        let id = ticket.id();
        let outcome = self.program.await_ticket(ticket).await;
        if let Err(e) = &outcome {
            tracing::warn!(party = %self.identity, computation = %id, error = %e, "Computation failed");
        }
        Ok(outcome?)
    }

    async fn establish(&self) -> Result<SharedCipher, ProtocolError> {
        let key = self.program.cluster_public_key().await?;
        Ok(SharedCipher::establish(&key)?)
    }

    /// Fingerprint and encrypt raw contacts.
    pub async fn prepare<S: AsRef<str>>(
        &self,
        contacts: &[S],
    ) -> Result<PreparedSubmission, ProtocolError> {
        let contact_set = self.normalizer.contact_set(contacts)?;
        let cipher = self.establish().await?;
        let payload = encrypt_set(&cipher, &contact_set, random_nonce()?)?;
        tracing::debug!(
            party = %self.identity,
            contacts = contact_set.count(),
            "Contact set prepared"
        );
        Ok(PreparedSubmission {
            contact_set,
            cipher,
            payload,
        })
    }

    /// Open a new session as first party and wait until it is initialized.
    pub async fn create_session(&self) -> Result<SessionId, ProtocolError> {
        let cipher = self.establish().await?;
        let marker = encrypt_marker(&cipher, random_nonce()?)?;
        let (session, ticket) = self.program.create_session(self.identity, marker).await?;

        match self.await_computation(ticket).await? {
            CallbackOutcome::Initialized => Ok(session),
            other => Err(unexpected(&other)),
        }
    }

    /// Submit contacts as first party.
    pub async fn submit_first_party<S: AsRef<str>>(
        &self,
        session: SessionId,
        contacts: &[S],
    ) -> Result<SubmitConfirmation, ProtocolError> {
        let prepared = self.prepare(contacts).await?;
        let ticket = self
            .program
            .submit_first_party(self.identity, session, prepared.payload)
            .await?;

        match self.await_computation(ticket).await? {
            CallbackOutcome::Submitted(confirmation) => confirmation
                .open(&prepared.cipher)
                .map_err(ProtocolError::ResultUndecryptable),
            other => Err(unexpected(&other)),
        }
    }

    /// Join as second party, run the intersection and return this party's
    /// view of it.
    pub async fn join_and_match<S: AsRef<str>>(
        &self,
        session: SessionId,
        contacts: &[S],
    ) -> Result<MatchResult, ProtocolError> {
        let prepared = self.prepare(contacts).await?;
        let ticket = self
            .program
            .submit_second_party_and_match(self.identity, session, prepared.payload)
            .await?;

        match self.await_computation(ticket).await? {
            CallbackOutcome::Matched(result) => result
                .open(&prepared.cipher)
                .map_err(ProtocolError::ResultUndecryptable),
            other => Err(unexpected(&other)),
        }
    }

    /// Fetch this party's match result for a matched session.
    pub async fn reveal_matches(
        &self,
        session: SessionId,
        role: Role,
    ) -> Result<MatchResult, ProtocolError> {
        let cipher = self.establish().await?;
        let marker = encrypt_marker(&cipher, random_nonce()?)?;
        let ticket = self
            .program
            .reveal_matches(self.identity, session, role, marker)
            .await?;

        match self.await_computation(ticket).await? {
            CallbackOutcome::Revealed(result) => result
                .open(&cipher)
                .map_err(ProtocolError::ResultUndecryptable),
            other => Err(unexpected(&other)),
        }
    }

    /// Abandon a session this party created.
    pub async fn cancel(&self, session: SessionId) -> Result<SessionRecord, ProtocolError> {
        Ok(self.program.cancel_session(self.identity, session).await?)
    }

    /// Map a match result back to the given original identifiers.
    pub fn resolve<S: AsRef<str>>(&self, originals: &[S], result: &MatchResult) -> Vec<String> {
        resolve_matches(originals, result, &self.normalizer)
    }
}

fn unexpected(outcome: &CallbackOutcome) -> ProtocolError {
    let kind = match outcome {
        CallbackOutcome::Initialized => "initialized",
        CallbackOutcome::Submitted(_) => "submitted",
        CallbackOutcome::Matched(_) => "matched",
        CallbackOutcome::Revealed(_) => "revealed",
    };
    ProtocolError::UnexpectedOutcome(kind.to_string())
}
