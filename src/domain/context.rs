use crate::error::DescriptorError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// The family of document being requested (address form, profile form, challenge...).
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(rename_all = "camelCase")]
pub enum DescriptionKind {
    Address,
    Profile,
    TaxId,
    PaymentMethod,
    Challenge,
    BillingGroup,
    Static,
}

impl DescriptionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DescriptionKind::Address => "address",
            DescriptionKind::Profile => "profile",
            DescriptionKind::TaxId => "taxId",
            DescriptionKind::PaymentMethod => "paymentMethod",
            DescriptionKind::Challenge => "challenge",
            DescriptionKind::BillingGroup => "billingGroup",
            DescriptionKind::Static => "static",
        }
    }
}

impl fmt::Display for DescriptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DescriptionKind {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "address" => Ok(Self::Address),
            "profile" => Ok(Self::Profile),
            "taxid" => Ok(Self::TaxId),
            "paymentmethod" => Ok(Self::PaymentMethod),
            "challenge" => Ok(Self::Challenge),
            "billinggroup" => Ok(Self::BillingGroup),
            "static" => Ok(Self::Static),
            _ => Err(DescriptorError::InvalidIdentity(format!(
                "unknown description kind \"{s}\""
            ))),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    Add,
    Update,
    Show,
    Delete,
    Replace,
    Select,
    SelectInstance,
    ValidateInstance,
    Search,
    Apply,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Add => "add",
            Operation::Update => "update",
            Operation::Show => "show",
            Operation::Delete => "delete",
            Operation::Replace => "replace",
            Operation::Select => "select",
            Operation::SelectInstance => "selectInstance",
            Operation::ValidateInstance => "validateInstance",
            Operation::Search => "search",
            Operation::Apply => "apply",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "add" => Ok(Self::Add),
            "update" => Ok(Self::Update),
            "show" => Ok(Self::Show),
            "delete" => Ok(Self::Delete),
            "replace" => Ok(Self::Replace),
            "select" => Ok(Self::Select),
            "selectinstance" => Ok(Self::SelectInstance),
            "validateinstance" => Ok(Self::ValidateInstance),
            "search" => Ok(Self::Search),
            "apply" => Ok(Self::Apply),
            _ => Err(DescriptorError::InvalidIdentity(format!(
                "unknown operation \"{s}\""
            ))),
        }
    }
}

/// A partner feature enabled through experience settings.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct FeatureConfig {
    /// Markets the feature is limited to. Empty means every market.
    pub applicable_markets: Vec<String>,
    pub customization: IndexMap<String, serde_json::Value>,
}

impl FeatureConfig {
    pub fn applies_to(&self, country: &str) -> bool {
        self.applicable_markets.is_empty()
            || self
                .applicable_markets
                .iter()
                .any(|m| m.eq_ignore_ascii_case(country))
    }

    /// Reads a customization entry holding a list of strings.
    pub fn string_list(&self, key: &str) -> Vec<String> {
        self.customization
            .get(key)
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Externally supplied partner settings: active template plus enabled features.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ExperienceSettings {
    pub template: Option<String>,
    pub features: IndexMap<String, FeatureConfig>,
}

/// Everything one resolution call needs to know about the caller.
///
/// Built once per call and never mutated; the builder methods consume and return `Self`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    pub country: String,
    pub description_kind: DescriptionKind,
    pub form_identity: String,
    pub language: String,
    pub partner_name: String,
    pub operation: Operation,
    #[serde(default)]
    pub scenario: Option<String>,
    #[serde(default)]
    pub exposed_flights: BTreeSet<String>,
    #[serde(default)]
    pub experience_settings: Option<ExperienceSettings>,
    /// Caller-supplied template values (session id, order id...) for hrefs and payloads.
    #[serde(default)]
    pub parameters: IndexMap<String, String>,
}

impl RequestContext {
    pub fn new(
        country: impl Into<String>,
        description_kind: DescriptionKind,
        form_identity: impl Into<String>,
        language: impl Into<String>,
        partner_name: impl Into<String>,
        operation: Operation,
    ) -> Self {
        Self {
            country: country.into(),
            description_kind,
            form_identity: form_identity.into(),
            language: language.into(),
            partner_name: partner_name.into(),
            operation,
            scenario: None,
            exposed_flights: BTreeSet::new(),
            experience_settings: None,
            parameters: IndexMap::new(),
        }
    }

    pub fn with_scenario(mut self, scenario: impl Into<String>) -> Self {
        self.scenario = Some(scenario.into());
        self
    }

    pub fn with_flights<I, S>(mut self, flights: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exposed_flights.extend(flights.into_iter().map(Into::into));
        self
    }

    pub fn with_experience_settings(mut self, settings: ExperienceSettings) -> Self {
        self.experience_settings = Some(settings);
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Features from experience settings that are active for the request market.
    pub fn active_features(&self) -> impl Iterator<Item = (&String, &FeatureConfig)> {
        self.experience_settings
            .iter()
            .flat_map(|s| s.features.iter())
            .filter(|(_, feature)| feature.applies_to(&self.country))
    }

    /// Exposed flights plus active feature names, in sorted order.
    pub fn effective_flights(&self) -> BTreeSet<String> {
        let mut flights = self.exposed_flights.clone();
        flights.extend(self.active_features().map(|(name, _)| name.clone()));
        flights
    }

    /// The partner template named by experience settings, when it differs from the partner.
    pub fn template_name(&self) -> Option<&str> {
        self.experience_settings
            .as_ref()
            .and_then(|s| s.template.as_deref())
            .filter(|t| !t.eq_ignore_ascii_case(&self.partner_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_operation_parse_case_insensitively() {
        assert_eq!(
            "TaxId".parse::<DescriptionKind>().unwrap(),
            DescriptionKind::TaxId
        );
        assert_eq!(
            "SELECTINSTANCE".parse::<Operation>().unwrap(),
            Operation::SelectInstance
        );
        assert!(matches!(
            "teleport".parse::<Operation>(),
            Err(DescriptorError::InvalidIdentity(_))
        ));
    }

    #[test]
    fn test_effective_flights_include_market_features() {
        let mut features = IndexMap::new();
        features.insert(
            "enableZipLookup".to_string(),
            FeatureConfig {
                applicable_markets: vec!["US".to_string()],
                ..Default::default()
            },
        );
        features.insert(
            "enableKanaNames".to_string(),
            FeatureConfig {
                applicable_markets: vec!["jp".to_string()],
                ..Default::default()
            },
        );
        let ctx = RequestContext::new(
            "us",
            DescriptionKind::Address,
            "billing",
            "en-us",
            "storefront",
            Operation::Add,
        )
        .with_flights(["flightB"])
        .with_experience_settings(ExperienceSettings {
            template: Some("defaulttemplate".to_string()),
            features,
        });

        let flights: Vec<_> = ctx.effective_flights().into_iter().collect();
        assert_eq!(flights, vec!["enableZipLookup", "flightB"]);
        assert_eq!(ctx.template_name(), Some("defaulttemplate"));
    }

    #[test]
    fn test_template_equal_to_partner_is_ignored() {
        let ctx = RequestContext::new(
            "us",
            DescriptionKind::Address,
            "billing",
            "en-us",
            "defaulttemplate",
            Operation::Add,
        )
        .with_experience_settings(ExperienceSettings {
            template: Some("DefaultTemplate".to_string()),
            features: IndexMap::new(),
        });
        assert_eq!(ctx.template_name(), None);
    }
}
