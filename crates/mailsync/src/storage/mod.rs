//! Storage traits and implementations
//!
//! This module defines the storage abstraction the sync engine consumes.
//! The remote IMAP implementation lives in [`crate::imap`].

mod memory;
mod sqlite;
mod traits;

pub use memory::{InMemoryMailStore, StoreOp};
pub use sqlite::SqliteMailStore;
pub use traits::MailStore;

/// Match a folder name against a LIST-style pattern.
///
/// `*` matches any run of characters, `%` matches any run that does not
/// cross the hierarchy delimiter.
pub(crate) fn folder_matches(pattern: &str, name: &str, delimiter: char) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();
    matches_from(&pattern, &name, delimiter)
}

fn matches_from(pattern: &[char], name: &[char], delimiter: char) -> bool {
    match pattern.split_first() {
        None => name.is_empty(),
        Some((&'*', rest)) => (0..=name.len()).any(|i| matches_from(rest, &name[i..], delimiter)),
        Some((&'%', rest)) => {
            let limit = name
                .iter()
                .position(|c| *c == delimiter)
                .unwrap_or(name.len());
            (0..=limit).any(|i| matches_from(rest, &name[i..], delimiter))
        }
        Some((c, rest)) => name
            .split_first()
            .is_some_and(|(n, name_rest)| n == c && matches_from(rest, name_rest, delimiter)),
    }
}

#[cfg(test)]
mod tests {
    use super::folder_matches;

    #[test]
    fn test_star_matches_everything() {
        assert!(folder_matches("*", "INBOX", '/'));
        assert!(folder_matches("*", "INBOX/Sub/Deep", '/'));
        assert!(folder_matches("*", "", '/'));
    }

    #[test]
    fn test_percent_stops_at_delimiter() {
        assert!(folder_matches("%", "INBOX", '/'));
        assert!(!folder_matches("%", "INBOX/Sub", '/'));
        assert!(folder_matches("INBOX/%", "INBOX/Sub", '/'));
    }

    #[test]
    fn test_literal_pattern() {
        assert!(folder_matches("Sent", "Sent", '/'));
        assert!(!folder_matches("Sent", "Sent Items", '/'));
        assert!(folder_matches("Sent*", "Sent Items", '/'));
    }
}
