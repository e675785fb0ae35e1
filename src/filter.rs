//! Eligibility rules for remote objects
//!
//! Inclusion by key suffix (case-insensitive), exclusion by exact
//! basename. Exclusion always wins. Pure function of object + rules.

use serde::{Deserialize, Serialize};

use crate::types::RemoteObject;

/// Include/exclude filter configuration (the `filters:` section)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterRules {
    /// Key suffixes to include, e.g. ".csv". Empty means allow all.
    #[serde(default)]
    pub include_extensions: Vec<String>,
    /// Exact basenames to exclude regardless of extension
    #[serde(default)]
    pub exclude_files: Vec<String>,
}

impl FilterRules {
    /// Decide whether an object is eligible for download
    pub fn is_eligible(&self, object: &RemoteObject) -> bool {
        if self
            .exclude_files
            .iter()
            .any(|name| name == object.file_name())
        {
            return false;
        }

        if self.include_extensions.is_empty() {
            return true;
        }

        let key_lower = object.key.to_lowercase();
        self.include_extensions
            .iter()
            .any(|ext| key_lower.ends_with(&ext.to_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn object(key: &str) -> RemoteObject {
        RemoteObject {
            bucket: "b".into(),
            key: key.into(),
            size: 1,
            last_modified: Some(Utc::now()),
            etag: None,
        }
    }

    fn rules(include: &[&str], exclude: &[&str]) -> FilterRules {
        FilterRules {
            include_extensions: include.iter().map(|s| s.to_string()).collect(),
            exclude_files: exclude.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn empty_include_allows_all() {
        assert!(rules(&[], &[]).is_eligible(&object("raw/data.bin")));
    }

    #[test]
    fn extension_match_is_case_insensitive() {
        let r = rules(&[".csv"], &[]);
        assert!(r.is_eligible(&object("raw/data.CSV")));
        assert!(r.is_eligible(&object("raw/data.csv")));
        assert!(!r.is_eligible(&object("raw/data.json")));
    }

    #[test]
    fn exclusion_wins_over_inclusion() {
        let r = rules(&[".csv"], &["secrets.csv"]);
        assert!(!r.is_eligible(&object("raw/secrets.csv")));
        assert!(r.is_eligible(&object("raw/other.csv")));
    }

    #[test]
    fn exclusion_matches_basename_not_key() {
        let r = rules(&[], &["data.csv"]);
        assert!(!r.is_eligible(&object("deeply/nested/data.csv")));
        assert!(r.is_eligible(&object("data.csv.bak")));
    }

    #[test]
    fn no_extension_rejected_when_include_set() {
        let r = rules(&[".csv"], &[]);
        assert!(!r.is_eligible(&object("raw/README")));
    }
}
