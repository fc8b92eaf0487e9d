//! CIMI domain models and the collection envelope.
//!
//! # Design
//! Every CIMI resource carries a `resourceURI` discriminator. Collection
//! members stay raw JSON until a typed list is requested; only members whose
//! tag names the requested type are decoded, so members of any other type
//! (modelled here or not, well-formed or not) never fail the envelope.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CimiError;

const SCHEMA: &str = "http://schemas.dmtf.org/cimi/1";

/// Collection name of machines.
pub const MODEL_MACHINES: &str = "machines";
/// Collection name of volumes.
pub const MODEL_VOLUMES: &str = "volumes";

/// A CIMI resource type addressable as `<base>/<MODEL>/<name>`.
pub trait CimiResource: Serialize + DeserializeOwned {
    /// Pluralized collection name used in URLs and as the envelope's member key.
    const MODEL: &'static str;

    /// `resourceURI` tag carried by members of this type.
    const RESOURCE_URI: &'static str;

    /// Identifier used in the resource's URL.
    fn name(&self) -> &str;
}

/// Lifecycle state of a machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MachineState {
    Creating,
    Starting,
    Started,
    Stopping,
    Stopped,
    Pausing,
    Paused,
    Suspending,
    Suspended,
    Capturing,
    Restoring,
    Deleting,
    Error,
    Failed,
    #[serde(other)]
    Unknown,
}

/// A virtual machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Machine {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<MachineState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<u32>,
    /// Memory in kibibytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<u64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

impl Machine {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            description: None,
            created: None,
            updated: None,
            state: None,
            cpu: None,
            memory: None,
            properties: BTreeMap::new(),
        }
    }
}

impl CimiResource for Machine {
    const MODEL: &'static str = MODEL_MACHINES;
    const RESOURCE_URI: &'static str = "http://schemas.dmtf.org/cimi/1/Machine";

    fn name(&self) -> &str {
        &self.name
    }
}

/// Reference to another resource by href.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Href {
    pub href: String,
}

impl Href {
    pub fn new(href: impl Into<String>) -> Self {
        Self { href: href.into() }
    }
}

/// Template a new machine is instantiated from: either an existing template
/// by `href`, or an inline config/image pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_config: Option<Href>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_image: Option<Href>,
}

/// Request payload for creating a machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineCreate {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
    pub machine_template: MachineTemplate,
}

impl MachineCreate {
    pub fn new(name: impl Into<String>, machine_template: MachineTemplate) -> Self {
        Self {
            name: name.into(),
            description: None,
            properties: BTreeMap::new(),
            machine_template,
        }
    }
}

/// A block storage volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Capacity in kibibytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootable: Option<bool>,
}

impl CimiResource for Volume {
    const MODEL: &'static str = MODEL_VOLUMES;
    const RESOURCE_URI: &'static str = "http://schemas.dmtf.org/cimi/1/Volume";

    fn name(&self) -> &str {
        &self.name
    }
}

/// Member key used by envelopes that do not name their model.
const GENERIC_MEMBERS: &str = "members";

/// Collection envelope returned by list operations.
///
/// Member arrays are kept under the key they arrived with (`machines`,
/// `volumes`, `members`, or any other model name).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Collection {
    #[serde(rename = "resourceURI", default)]
    pub resource_uri: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(flatten)]
    pub entries: BTreeMap<String, Value>,
}

impl Collection {
    /// Raw members listed under `model`, falling back to `members`.
    pub fn members(&self, model: &str) -> &[Value] {
        [model, GENERIC_MEMBERS]
            .into_iter()
            .find_map(|key| self.entries.get(key).and_then(Value::as_array))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Members tagged as a `T`, in envelope order.
    ///
    /// Only tagged members are decoded; a `T` that does not fit its own shape
    /// is a `Deserialization` error.
    pub fn members_of<T: CimiResource>(&self) -> Result<Vec<T>, CimiError> {
        self.members(T::MODEL)
            .iter()
            .filter(|member| resource_uri(member) == Some(T::RESOURCE_URI))
            .map(|member| {
                T::deserialize(member).map_err(|e| CimiError::Deserialization(e.to_string()))
            })
            .collect()
    }
}

fn resource_uri(member: &Value) -> Option<&str> {
    member.get("resourceURI").and_then(Value::as_str)
}

/// Operations a machine accepts through `<base>/machines/<name>/<action>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineAction {
    Start,
    Stop,
    Restart,
    Pause,
    Suspend,
}

impl MachineAction {
    /// Path segment of the action.
    pub fn as_str(self) -> &'static str {
        match self {
            MachineAction::Start => "start",
            MachineAction::Stop => "stop",
            MachineAction::Restart => "restart",
            MachineAction::Pause => "pause",
            MachineAction::Suspend => "suspend",
        }
    }

    /// Body POSTed to the action URL.
    pub fn to_action(self) -> Action {
        Action {
            resource_uri: format!("{SCHEMA}/Action"),
            action: format!("{SCHEMA}/action/{}", self.as_str()),
        }
    }
}

/// CIMI action invocation payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "resourceURI")]
    pub resource_uri: String,
    pub action: String,
}
