use crate::executor::plan::ResourceChange;
use std::path::{Path, PathBuf};

/// Characters that cannot appear in a fragment file name
pub const ILLEGAL_FILENAME_CHARS: [char; 8] = [':', '[', ']', '"', '\'', '(', ')', '/'];

/// A managed object pending import
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Address in the terraform resource graph
    pub address: String,
    /// Backend-native import id: `<class_name>:<dn>`
    pub id: String,
    /// File name of the state fragment this candidate is imported into
    pub fragment_path: String,
}

impl Candidate {
    pub fn new(address: &str, class_name: &str, dn: &str, fragment_suffix: &str) -> Self {
        let id = format!("{}:{}", class_name, dn);
        let fragment_path = fragment_name(&id, fragment_suffix);

        Self {
            address: address.to_string(),
            id,
            fragment_path,
        }
    }

    /// Location of the fragment inside `working_dir`
    pub fn fragment_in(&self, working_dir: &Path) -> PathBuf {
        working_dir.join(&self.fragment_path)
    }
}

/// Fragment file name for an import id.
///
/// Distinct ids that sanitize to the same string share a fragment; the last
/// import to finish wins.
pub fn fragment_name(id: &str, suffix: &str) -> String {
    let sanitized: String = id
        .chars()
        .map(|c| if ILLEGAL_FILENAME_CHARS.contains(&c) { '_' } else { c })
        .collect();
    format!("{}{}", sanitized, suffix)
}

/// Filters plan resource changes down to importable candidates
pub struct ChangeExtractor {
    resource_type: String,
    fragment_suffix: String,
}

impl ChangeExtractor {
    pub fn new(resource_type: impl Into<String>, fragment_suffix: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            fragment_suffix: fragment_suffix.into(),
        }
    }

    /// Candidates for every planned create of the importable type, in plan order.
    ///
    /// Changes of other types or actions, and entries whose planned values lack
    /// string `dn` and `class_name` attributes, are skipped.
    pub fn extract(&self, changes: &[ResourceChange]) -> Vec<Candidate> {
        changes
            .iter()
            .filter(|change| change.resource_type == self.resource_type)
            .filter(|change| change.change.actions.is_create())
            .filter_map(|change| self.candidate_for(change))
            .collect()
    }

    fn candidate_for(&self, change: &ResourceChange) -> Option<Candidate> {
        let after = change.change.after.as_ref()?.as_object()?;
        let dn = after.get("dn")?.as_str()?;
        let class_name = after.get("class_name")?.as_str()?;

        Some(Candidate::new(
            &change.address,
            class_name,
            dn,
            &self.fragment_suffix,
        ))
    }
}
