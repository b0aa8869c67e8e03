//! Engine settings loaded from TOML.
//!
//! Every field has a default so an empty document is a valid configuration. Partner
//! groupings, verb rules and polling policies live here rather than in code so that
//! onboarding a partner is a data change.

use crate::domain::action::HttpMethod;
use crate::domain::context::Operation;
use crate::domain::scope::ScopePrecedence;
use crate::domain::store::ConfigTable;
use crate::error::{DescriptorError, Result};
use indexmap::IndexMap;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

const ISO_COUNTRIES: &str = "ad ae af ag ai al am ao aq ar as at au aw ax az ba bb bd be bf bg bh bi \
    bj bl bm bn bo bq br bs bt bv bw by bz ca cc cd cf cg ch ci ck cl cm cn co cr cu cv cw cx cy \
    cz de dj dk dm do dz ec ee eg eh er es et fi fj fk fm fo fr ga gb gd ge gf gg gh gi gl gm gn \
    gp gq gr gs gt gu gw gy hk hm hn hr ht hu id ie il im in io iq ir is it je jm jo jp ke kg kh \
    ki km kn kp kr kw ky kz la lb lc li lk lr ls lt lu lv ly ma mc md me mf mg mh mk ml mm mn mo \
    mp mq mr ms mt mu mv mw mx my mz na nc ne nf ng ni nl no np nr nu nz om pa pe pf pg ph pk pl \
    pm pn pr ps pt pw py qa re ro rs ru rw sa sb sc sd se sg sh si sj sk sl sm sn so sr ss st sv \
    sx sy sz tc td tf tg th tj tk tl tm tn to tr tt tv tw tz ua ug um us uy uz va vc ve vg vi vn \
    vu wf ws xk ye yt za zm zw";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Known country codes, lowercase.
    pub countries: Vec<String>,
    pub language_pattern: String,
    pub identity_pattern: String,
    /// When non-empty, form identities outside this list are rejected.
    pub known_identities: Vec<String>,
    /// Partner whose rows back any partner without its own.
    pub default_template: Option<String>,
    pub partner_groups: IndexMap<String, Vec<String>>,
    /// Submit verb decision table, evaluated top-down.
    pub verb_rules: Vec<VerbRule>,
    pub polling: PollingSettings,
    /// Per-partner rank of flight scope against scenario scope.
    pub scope_precedence: IndexMap<String, ScopePrecedence>,
    pub operation_aliases: Vec<OperationAlias>,
    /// Content hint ids that receive the composed submit link.
    pub submit_hint_ids: Vec<String>,
    pub validator: ValidatorSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            countries: ISO_COUNTRIES.split_whitespace().map(str::to_string).collect(),
            language_pattern: r"^[a-z]{2,3}(-[a-z0-9]{2,8})*$".to_string(),
            identity_pattern: r"^[a-z0-9][a-z0-9_.-]*$".to_string(),
            known_identities: Vec::new(),
            default_template: Some("defaulttemplate".to_string()),
            partner_groups: IndexMap::new(),
            verb_rules: Vec::new(),
            polling: PollingSettings::default(),
            scope_precedence: IndexMap::new(),
            operation_aliases: Vec::new(),
            submit_hint_ids: [
                "submitButton",
                "submitButtonHidden",
                "saveButton",
                "saveButtonHidden",
                "saveNextButton",
                "saveContinueButton",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            validator: ValidatorSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerbRule {
    pub operation: Operation,
    /// Partner groups the rule is limited to. Empty means any partner.
    #[serde(default)]
    pub groups: Vec<String>,
    /// Flight that must be effective for the rule to apply.
    #[serde(default)]
    pub flight: Option<String>,
    pub method: HttpMethod,
    /// Submit link family the rule selects.
    pub family: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationAlias {
    pub group: String,
    pub from: Operation,
    pub to: Operation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingSettings {
    /// Flight names matching this pattern set the poll interval. Group 1 is the number,
    /// group 2 an optional `ms` or `seconds` unit (milliseconds when absent).
    pub interval_flight_pattern: String,
    pub families: IndexMap<String, FamilyPolicy>,
}

impl Default for PollingSettings {
    fn default() -> Self {
        let base = FamilyPolicy {
            interval_ms: 3000,
            max_attempts: 0,
            check_timeout: false,
            flight_max_attempts: None,
            flight_check_timeout: None,
        };
        let mut families = IndexMap::new();
        families.insert("generic".to_string(), base.clone());
        families.insert(
            "paypal".to_string(),
            FamilyPolicy {
                flight_max_attempts: Some(600),
                flight_check_timeout: Some(true),
                ..base.clone()
            },
        );
        families.insert("upi".to_string(), base.clone());
        families.insert("qrcode".to_string(), base);
        Self {
            interval_flight_pattern: r"^pollingInterval(\d+)(ms|seconds)?$".to_string(),
            families,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyPolicy {
    pub interval_ms: u64,
    #[serde(default)]
    pub max_attempts: u32,
    #[serde(default)]
    pub check_timeout: bool,
    /// Attempts used instead when an interval flight is in effect.
    #[serde(default)]
    pub flight_max_attempts: Option<u32>,
    #[serde(default)]
    pub flight_check_timeout: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ValidatorSettings {
    pub skip: Vec<SkipEntry>,
}

/// An id the validator must not report, because code builds it rather than configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkipEntry {
    #[serde(default)]
    pub partner: Option<String>,
    pub table: ConfigTable,
    pub id: String,
    pub reason: String,
}

/// Regexes compiled once per engine.
#[derive(Debug, Clone)]
pub struct SettingsPatterns {
    pub language: Regex,
    pub identity: Regex,
    pub interval_flight: Regex,
}

/// Result of checking that partner groups exactly cover a partner universe.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PartitionReport {
    pub missing: Vec<String>,
    /// Partner and the groups it appears in.
    pub overlapping: Vec<(String, Vec<String>)>,
    pub unknown_groups: Vec<String>,
}

impl PartitionReport {
    pub fn is_exact(&self) -> bool {
        self.missing.is_empty() && self.overlapping.is_empty() && self.unknown_groups.is_empty()
    }
}

impl EngineSettings {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let settings: Self = toml::from_str(raw)?;
        settings.compile()?;
        Ok(settings)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn compile(&self) -> Result<SettingsPatterns> {
        let build = |pattern: &str| {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| DescriptorError::InvalidSettings(format!("pattern {pattern:?}: {e}")))
        };
        Ok(SettingsPatterns {
            language: build(&self.language_pattern)?,
            identity: build(&self.identity_pattern)?,
            interval_flight: build(&self.polling.interval_flight_pattern)?,
        })
    }

    pub fn is_known_country(&self, country: &str) -> bool {
        self.countries.iter().any(|c| c.eq_ignore_ascii_case(country))
    }

    pub fn is_known_identity(&self, identity: &str) -> bool {
        self.known_identities.is_empty()
            || self
                .known_identities
                .iter()
                .any(|i| i.eq_ignore_ascii_case(identity))
    }

    pub fn in_group(&self, group: &str, partner: &str) -> bool {
        self.partner_groups
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case(group))
            .flat_map(|(_, members)| members)
            .any(|m| m.eq_ignore_ascii_case(partner))
    }

    pub fn precedence_for(&self, partner: &str) -> ScopePrecedence {
        self.scope_precedence
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(partner))
            .map(|(_, p)| *p)
            .unwrap_or_default()
    }

    /// Applies the first alias whose group holds any of `partners`.
    pub fn alias_operation(&self, partners: &[&str], operation: Operation) -> Operation {
        self.operation_aliases
            .iter()
            .find(|alias| {
                alias.from == operation && partners.iter().any(|p| self.in_group(&alias.group, p))
            })
            .map(|alias| alias.to)
            .unwrap_or(operation)
    }

    pub fn is_submit_hint(&self, hint_id: &str) -> bool {
        self.submit_hint_ids
            .iter()
            .any(|id| id.eq_ignore_ascii_case(hint_id))
    }

    /// Checks that `groups` split `universe` with no overlap and no omission.
    pub fn partition<S: AsRef<str>>(&self, universe: &[S], groups: &[&str]) -> PartitionReport {
        let mut report = PartitionReport {
            unknown_groups: groups
                .iter()
                .filter(|g| !self.partner_groups.keys().any(|k| k.eq_ignore_ascii_case(g)))
                .map(|g| g.to_string())
                .collect(),
            ..PartitionReport::default()
        };
        let universe: BTreeSet<String> = universe
            .iter()
            .map(|p| p.as_ref().to_ascii_lowercase())
            .collect();
        for partner in &universe {
            let holders: Vec<String> = groups
                .iter()
                .filter(|g| self.in_group(g, partner))
                .map(|g| g.to_string())
                .collect();
            match holders.len() {
                0 => report.missing.push(partner.clone()),
                1 => {}
                _ => report.overlapping.push((partner.clone(), holders)),
            }
        }
        report
    }
}
