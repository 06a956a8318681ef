//! Machine-readable plan as emitted by `terraform show -json`
//!
//! Only the parts the importer reads are modelled; unknown fields are ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A saved plan
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub format_version: Option<String>,

    #[serde(default)]
    pub terraform_version: Option<String>,

    /// Resource changes in plan order
    #[serde(default)]
    pub resource_changes: Vec<ResourceChange>,
}

/// One entry of `resource_changes`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceChange {
    /// Full resource address (e.g., "aci_rest_managed.tenant", "module.x.aci_rest_managed.y[0]")
    pub address: String,

    /// Resource type tag (e.g., "aci_rest_managed")
    #[serde(rename = "type")]
    pub resource_type: String,

    /// "managed" or "data"
    #[serde(default)]
    pub mode: Option<String>,

    pub change: Change,
}

/// The planned change of one resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Change {
    pub actions: Actions,

    /// Planned attribute values; `None` when the resource is deleted
    #[serde(default)]
    pub after: Option<Value>,
}

/// A single plan action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    NoOp,
    Create,
    Read,
    Update,
    Delete,
    /// Actions introduced by newer terraform releases
    #[serde(other)]
    Unknown,
}

/// The action set of a resource change
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Actions(pub Vec<Action>);

impl Actions {
    /// True for a plain create; a replacement (delete + create) is not a create
    pub fn is_create(&self) -> bool {
        self.0.as_slice() == [Action::Create]
    }
}

impl From<Vec<Action>> for Actions {
    fn from(actions: Vec<Action>) -> Self {
        Self(actions)
    }
}
