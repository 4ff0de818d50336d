use super::contacts::read_contacts;
use mutuals::config::MutualsConfig;
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Serialize)]
struct FingerprintRow {
    original: String,
    normalized: String,
    fingerprint: String,
    duplicate: bool,
}

#[derive(Debug, Serialize)]
struct FingerprintReport {
    country_code: String,
    count: u32,
    contacts: Vec<FingerprintRow>,
}

/// Normalize and fingerprint every identifier in a contacts file
pub fn execute(
    config: &MutualsConfig,
    input: &Path,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let contacts = read_contacts(input)?;
    let report = build_report(config, &contacts)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "{} contacts, {} distinct (country code +{})",
        report.contacts.len(),
        report.count,
        report.country_code
    );
    for row in &report.contacts {
        let marker = if row.duplicate { " (duplicate)" } else { "" };
        println!(
            "{}  {:<32}  {}{}",
            row.fingerprint, row.normalized, row.original, marker
        );
    }
    Ok(())
}

fn build_report(
    config: &MutualsConfig,
    contacts: &[String],
) -> Result<FingerprintReport, Box<dyn std::error::Error>> {
    let normalizer = config.normalizer()?;
    // Same checks a real submission runs.
    let set = normalizer.contact_set(contacts)?;

    let mut seen = HashSet::new();
    let rows = contacts
        .iter()
        .map(|original| {
            let normalized = normalizer.normalize(original);
            let fingerprint = normalizer.fingerprint(original);
            FingerprintRow {
                original: original.clone(),
                normalized,
                fingerprint: fingerprint.to_string(),
                duplicate: !seen.insert(fingerprint),
            }
        })
        .collect();

    tracing::debug!(contacts = contacts.len(), distinct = set.count(), "Fingerprinted contacts");

    Ok(FingerprintReport {
        country_code: normalizer.country_code().to_string(),
        count: set.count(),
        contacts: rows,
    })
}
