//! In-process discovery session: memory ledger, local cluster, two parties.

use super::contacts::read_contacts;
use mutuals::client::PartyClient;
use mutuals::compute::LocalCluster;
use mutuals::config::MutualsConfig;
use mutuals::ledger::{MemoryLedger, PartyId, Role, SessionId};
use mutuals::program::SessionProgram;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Serialize)]
struct SimulationReport {
    session: String,
    match_count: u32,
    first_party: Vec<String>,
    second_party: Vec<String>,
}

/// Run a full session between two contacts files
pub async fn execute(
    config: &MutualsConfig,
    first: &Path,
    second: &Path,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let first_contacts = read_contacts(first)?;
    let second_contacts = read_contacts(second)?;

    let (session, report) = run(config, &first_contacts, &second_contacts).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Session {}", session);
    println!("{} contacts in common", report.match_count);
    println!();
    println!("First party ({}):", first.display());
    for contact in &report.first_party {
        println!("  {}", contact);
    }
    println!("Second party ({}):", second.display());
    for contact in &report.second_party {
        println!("  {}", contact);
    }
    Ok(())
}

async fn run(
    config: &MutualsConfig,
    first_contacts: &[String],
    second_contacts: &[String],
) -> Result<(SessionId, SimulationReport), Box<dyn std::error::Error>> {
    let normalizer = config.normalizer()?;
    let program = SessionProgram::new(
        MemoryLedger::new(),
        LocalCluster::new()?,
        config.program_config()?,
    );
    let relay = program.spawn_callback_relay()?;

    let first = PartyClient::new(PartyId::random(), program.clone(), normalizer.clone());
    let second = PartyClient::new(PartyId::random(), program.clone(), normalizer);

    let session = first.create_session().await?;
    tracing::info!(session = %session, "Session created");

    first.submit_first_party(session, first_contacts).await?;
    tracing::info!(session = %session, "First party submitted");

    let second_view = second.join_and_match(session, second_contacts).await?;
    let first_view = first.reveal_matches(session, Role::First).await?;
    tracing::info!(
        session = %session,
        matches = second_view.match_count,
        "Session matched"
    );

    relay.abort();

    let report = SimulationReport {
        session: session.to_string(),
        match_count: second_view.match_count,
        first_party: first.resolve(first_contacts, &first_view),
        second_party: second.resolve(second_contacts, &second_view),
    };
    Ok((session, report))
}
