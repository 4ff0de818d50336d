use mutuals::ledger::{find_session_address, ProgramId, SessionId};

/// Print the ledger address and bump for a session id
pub fn execute(session_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let session: SessionId = session_id
        .parse()
        .map_err(|e| format!("Invalid session id '{}': {}", session_id, e))?;
    let program_id = ProgramId::default();
    let (address, bump) = find_session_address(&session, &program_id)?;

    println!("session: {}", session);
    println!("program: {}", program_id);
    println!("address: {}", address);
    println!("bump:    {}", bump);
    Ok(())
}
