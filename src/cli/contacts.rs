use std::fs;
use std::path::Path;

/// Read a contacts file: one identifier per line, blank lines and lines
/// starting with '#' skipped, surrounding whitespace trimmed.
pub fn read_contacts(path: &Path) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let contents = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read contacts file '{}': {}", path.display(), e))?;
    Ok(parse_contacts(&contents))
}

fn parse_contacts(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}
