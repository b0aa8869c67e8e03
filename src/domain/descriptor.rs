use super::action::Action;
use super::display::DisplayNode;
use indexmap::IndexMap;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Validation {
    /// `regex` or `function`.
    pub validation_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDescription {
    pub property_type: String,
    pub is_optional: bool,
    pub is_key: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<Validation>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub validations: Vec<Validation>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub possible_values: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSource {
    pub href: String,
}

/// The resolved document for one identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub identity: IndexMap<String, String>,
    pub data_schema: IndexMap<String, PropertyDescription>,
    pub display_tree: Vec<DisplayNode>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub display_strings: IndexMap<String, String>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub data_sources: IndexMap<String, DataSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_action: Option<Action>,
}

impl Descriptor {
    pub fn identity_value(&self, key: &str) -> Option<&str> {
        self.identity.get(key).map(String::as_str)
    }
}
