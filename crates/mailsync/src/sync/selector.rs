//! Folder skip policy and source-to-target name mapping

use std::collections::HashSet;

use crate::models::FolderDescriptor;

/// Aggregate views that duplicate mail stored in other folders
pub const DEFAULT_SKIPPED_FOLDERS: &[&str] = &[
    "[Gmail]/All Mail",
    "[Gmail]/Sent Mail",
    "[Gmail]/Spam",
    "[Gmail]/Starred",
];

/// Decides which source folders are reconciled and where they land
///
/// The deny-list applies to every backend, not only IMAP. Names are
/// compared exactly (case-sensitive) after the `{server}` prefix is
/// stripped and the folder's delimiter is replaced with `/`.
#[derive(Debug, Clone)]
pub struct FolderSelector {
    /// Root-relative names, `/`-delimited
    skipped: HashSet<String>,
}

impl Default for FolderSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl FolderSelector {
    /// Selector with the default deny-list
    pub fn new() -> Self {
        Self {
            skipped: DEFAULT_SKIPPED_FOLDERS
                .iter()
                .map(|name| name.to_string())
                .collect(),
        }
    }

    /// Add folder names (root-relative, `/`-delimited) to the deny-list
    pub fn with_skipped<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.skipped.extend(
            names
                .into_iter()
                .map(|name| name.as_ref().trim_matches('/').to_string()),
        );
        self
    }

    pub fn should_skip(&self, folder: &FolderDescriptor) -> bool {
        if !folder.attributes.is_selectable() || folder.attributes.is_virtual() {
            return true;
        }

        let mut name = self.map_target_name(&folder.name);
        if let Some(delimiter) = folder.delimiter.as_deref().filter(|d| *d != "/" && !d.is_empty()) {
            name = name.replace(delimiter, "/");
        }
        self.skipped.contains(&name)
    }

    /// Strip a `{server}` root prefix, leaving the mailbox-relative name
    pub fn map_target_name(&self, source_name: &str) -> String {
        match source_name.split_once('}') {
            Some((_, relative)) if !relative.is_empty() => relative.to_string(),
            _ => source_name.to_string(),
        }
    }
}
