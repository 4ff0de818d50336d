/// Display version information
pub fn execute() {
    println!("mutuals {}", env!("CARGO_PKG_VERSION"));
    println!("Private contact discovery over an oblivious compute cluster");
    println!(
        "Capacity: {} contacts per party, {} comparisons per session",
        mutuals::fingerprint::MAX_CONTACTS,
        mutuals::compute::COMPARISONS
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_execute() {
        execute();
    }
}
