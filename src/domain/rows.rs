//! Typed bodies of configuration rows, one per table.
//!
//! Tables whose rows are lists (sequences, dictionaries, error messages...) hold the
//! whole ordered list in a single body; consecutive source lines are grouped at load time.

use super::action::{ActionType, HttpMethod};
use super::scope::FlightCondition;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Root row: which sequences, strings, chains and companions make up one identity.
///
/// Keyed by `kind.identity.operation`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResourceRow {
    pub sequence_ids: Vec<String>,
    pub string_sequence_id: Option<String>,
    pub poll_chain: Option<String>,
    pub companions: Vec<String>,
    pub client_action: Option<ClientActionSpec>,
    pub data_sources: Vec<DataSourceRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientActionSpec {
    pub action_type: ActionType,
    pub target: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataSourceRef {
    pub name: String,
    pub href: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SequenceEntry {
    pub hint_id: String,
    pub flight: Option<FlightCondition>,
}

impl SequenceEntry {
    pub fn new(hint_id: impl Into<String>) -> Self {
        Self {
            hint_id: hint_id.into(),
            flight: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SequenceRow {
    pub entries: Vec<SequenceEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerType {
    Page,
    Group,
    TextGroup,
}

impl FromStr for ContainerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "page" => Ok(Self::Page),
            "group" | "container" => Ok(Self::Group),
            "textgroup" => Ok(Self::TextGroup),
            other => Err(format!("unknown container type \"{other}\"")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContainerRow {
    pub display_type: ContainerType,
    pub sequence_id: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafKind {
    Property,
    Button,
    Hyperlink,
    Text,
    Image,
    IFrame,
}

impl FromStr for LeafKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "property" => Ok(Self::Property),
            "button" => Ok(Self::Button),
            "hyperlink" => Ok(Self::Hyperlink),
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "iframe" => Ok(Self::IFrame),
            other => Err(format!("unknown display hint kind \"{other}\"")),
        }
    }
}

/// Leaf display hint definition.
#[derive(Debug, Clone, PartialEq)]
pub struct HintRow {
    pub kind: LeafKind,
    pub property_name: Option<String>,
    pub display_text: Option<String>,
    pub accessibility_name: Option<String>,
    pub is_hidden: bool,
    pub is_disabled: bool,
    pub action_type: Option<ActionType>,
    pub action_target: Option<String>,
    /// Dictionary supplying selectable options.
    pub options: Option<String>,
    pub source_url: Option<String>,
}

impl HintRow {
    pub fn new(kind: LeafKind) -> Self {
        Self {
            kind,
            property_name: None,
            display_text: None,
            accessibility_name: None,
            is_hidden: false,
            is_disabled: false,
            action_type: None,
            action_target: None,
            options: None,
            source_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMessage {
    pub error_code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ErrorMessageRow {
    pub messages: Vec<ErrorMessage>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DisplayTagRow {
    pub tags: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalField {
    /// Hint id of the field this one depends on.
    pub field: String,
    pub condition: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConditionalFieldRow {
    pub fields: Vec<ConditionalField>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct StringSequenceRow {
    pub string_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisplayStringRow {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidationSpec {
    pub regex: Option<String>,
    pub function: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyRow {
    pub name: String,
    pub data_type: String,
    pub is_optional: bool,
    pub is_key: bool,
    pub default_value: Option<String>,
    pub validation: Option<ValidationSpec>,
    /// Dictionary supplying possible values.
    pub possible_values: Option<String>,
}

impl PropertyRow {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_optional: false,
            is_key: false,
            default_value: None,
            validation: None,
            possible_values: None,
        }
    }
}

/// Data schema of one `kind.identity`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataDescriptionRow {
    pub properties: Vec<PropertyRow>,
}

/// Additional validations for one `kind.identity.property`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExtraValidationRow {
    pub validations: Vec<ValidationSpec>,
}

/// Keyed by `kind.identity.operation.family`.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitLinkRow {
    pub href: String,
    pub method: Option<HttpMethod>,
    pub api_version: Option<String>,
    pub correlation_id: bool,
    pub tracking_id: bool,
    pub error_code_expressions: Vec<String>,
}

/// Keyed by `chain#index`.
#[derive(Debug, Clone, PartialEq)]
pub struct PollStageRow {
    pub href: String,
    pub method: Option<HttpMethod>,
    pub payload: Option<serde_json::Value>,
    pub result_expression: String,
    /// Polling policy family (interval, attempts, timeout check).
    pub family: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PollResponse {
    pub status: String,
    pub action: ActionType,
}

/// Status to action map of one poll stage. Keyed by `chain#index`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PollResponseRow {
    pub responses: Vec<PollResponse>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverrideEffect {
    Hide,
    Show,
    Disable,
    Enable,
    /// Keeps only options present in the named dictionary.
    RestrictOptions(String),
}

impl OverrideEffect {
    pub fn parse(effect: &str, argument: Option<&str>) -> Result<Self, String> {
        match effect.trim().to_ascii_lowercase().as_str() {
            "hide" => Ok(Self::Hide),
            "show" => Ok(Self::Show),
            "disable" => Ok(Self::Disable),
            "enable" => Ok(Self::Enable),
            "restrictoptions" => argument
                .filter(|a| !a.trim().is_empty())
                .map(|a| Self::RestrictOptions(a.trim().to_string()))
                .ok_or_else(|| "restrictOptions needs a dictionary argument".to_string()),
            other => Err(format!("unknown override effect \"{other}\"")),
        }
    }
}

impl fmt::Display for OverrideEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverrideEffect::Hide => f.write_str("hide"),
            OverrideEffect::Show => f.write_str("show"),
            OverrideEffect::Disable => f.write_str("disable"),
            OverrideEffect::Enable => f.write_str("enable"),
            OverrideEffect::RestrictOptions(d) => write!(f, "restrictOptions({d})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverrideEntry {
    /// Hint id or property name.
    pub target: String,
    pub effect: OverrideEffect,
}

/// Tree mutations for one scenario. Keyed by scenario name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScenarioOverrideRow {
    pub entries: Vec<OverrideEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DictionaryEntry {
    pub key: String,
    pub display_text: String,
    /// Container or sequence expanded as the option's display content.
    pub content_hint_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DictionaryRow {
    pub entries: Vec<DictionaryEntry>,
}

impl DictionaryRow {
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.key.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_effect_parse() {
        assert_eq!(OverrideEffect::parse("Hide", None), Ok(OverrideEffect::Hide));
        assert_eq!(
            OverrideEffect::parse("restrictOptions", Some("smdMarkets")),
            Ok(OverrideEffect::RestrictOptions("smdMarkets".into()))
        );
        assert!(OverrideEffect::parse("restrictOptions", Some(" ")).is_err());
        assert!(OverrideEffect::parse("explode", None).is_err());
    }

    #[test]
    fn test_kind_names() {
        assert_eq!("IFrame".parse::<LeafKind>(), Ok(LeafKind::IFrame));
        assert_eq!("textGroup".parse::<ContainerType>(), Ok(ContainerType::TextGroup));
        assert!("widget".parse::<LeafKind>().is_err());
    }
}
