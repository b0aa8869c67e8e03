//! Offline integrity checks over a whole configuration store.
//!
//! Each partner is checked against the static graph of its own rows, falling back to the
//! default template the way resolution does. Scopes are ignored: every scoped variant of
//! a row contributes its references. Roots are the resource rows (the partner's own plus
//! the template's it does not shadow) and the content hints of the shared dictionaries.
//! From a root the walk reaches display rows, strings, poll chains, the schema with its
//! extra validations, companions, and the submit links its verb rules can select.

use crate::domain::action::ActionType;
use crate::domain::context::DescriptionKind;
use crate::domain::rows::{DictionaryRow, OverrideEffect};
use crate::domain::store::{ConfigStore, ConfigTable, PartnerTables, Table};
use crate::error::Result;
use crate::settings::{EngineSettings, SkipEntry};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Partner name used for issues that concern the store as a whole.
pub const STORE_WIDE: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityIssue {
    pub partner: String,
    pub table: ConfigTable,
    pub id: String,
    pub kind: IssueKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "issue", rename_all = "camelCase")]
pub enum IssueKind {
    /// Declared but reached from no root.
    Unused,
    /// Referenced but declared nowhere.
    #[serde(rename_all = "camelCase")]
    Dangling { referenced_by: String },
    Cycle { path: Vec<String> },
    /// A skip-list entry that suppressed nothing.
    StaleSkip { reason: String },
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueKind::Unused => f.write_str("unused"),
            IssueKind::Dangling { referenced_by } => {
                write!(f, "dangling reference from \"{referenced_by}\"")
            }
            IssueKind::Cycle { path } => write!(f, "cycle {}", path.join(" -> ")),
            IssueKind::StaleSkip { reason } => write!(f, "stale skip entry ({reason})"),
        }
    }
}

impl fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} \"{}\": {}", self.partner, self.table, self.id, self.kind)?;
        if let Some(line) = self.line {
            write!(f, " (line {line})")?;
        }
        Ok(())
    }
}

/// Checks every partner in store order.
pub fn validate(store: &ConfigStore, settings: &EngineSettings) -> Vec<IntegrityIssue> {
    let reports = store
        .partner_names()
        .map(|partner| validate_partner(store, settings, partner))
        .collect();
    finish(store, settings, reports)
}

/// Same result as [`validate`], with partners checked on blocking tasks.
pub async fn validate_concurrently(
    store: Arc<ConfigStore>,
    settings: Arc<EngineSettings>,
) -> Result<Vec<IntegrityIssue>> {
    let mut tasks = JoinSet::new();
    for (index, partner) in store.partner_names().enumerate() {
        let store = Arc::clone(&store);
        let settings = Arc::clone(&settings);
        let partner = partner.to_string();
        tasks.spawn_blocking(move || (index, validate_partner(&store, &settings, &partner)));
    }

    let mut reports = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        reports.push(joined?);
    }
    reports.sort_by_key(|(index, _)| *index);
    let reports = reports.into_iter().map(|(_, report)| report).collect();
    Ok(finish(&store, &settings, reports))
}

#[derive(Debug, Default)]
struct PartnerReport {
    issues: Vec<IntegrityIssue>,
    skips_hit: BTreeSet<usize>,
    /// Template rows this partner reached through fallback.
    fallback_used: BTreeSet<(ConfigTable, String)>,
    dictionaries_used: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Owner {
    Own,
    Fallback,
}

fn fallback_name(settings: &EngineSettings, partner: &str) -> Option<String> {
    settings
        .default_template
        .as_ref()
        .map(|t| t.to_ascii_lowercase())
        .filter(|t| t != partner)
}

fn validate_partner(store: &ConfigStore, settings: &EngineSettings, partner: &str) -> PartnerReport {
    let Some(own) = store.partner(partner) else {
        return PartnerReport::default();
    };
    let template = fallback_name(settings, partner);
    let fallback = template.as_deref().and_then(|t| store.partner(t));
    let mut check = PartnerCheck {
        partner,
        template,
        settings,
        own,
        fallback,
        dictionaries: store.dictionaries(),
        used: BTreeSet::new(),
        fallback_used: BTreeSet::new(),
        dictionaries_used: BTreeSet::new(),
        reached_properties: BTreeSet::new(),
        visited: BTreeSet::new(),
        root_chain: None,
        submits: false,
        issues: Vec::new(),
    };
    check.sweep_roots();
    check.check_references();
    check.report_unused();

    let mut skips_hit = BTreeSet::new();
    let issues = apply_skips(check.issues, &settings.validator.skip, &mut skips_hit);
    debug!(partner, issues = issues.len(), "validated partner");
    PartnerReport {
        issues,
        skips_hit,
        fallback_used: check.fallback_used,
        dictionaries_used: check.dictionaries_used,
    }
}

fn apply_skips(
    issues: Vec<IntegrityIssue>,
    skip: &[SkipEntry],
    hit: &mut BTreeSet<usize>,
) -> Vec<IntegrityIssue> {
    issues
        .into_iter()
        .filter(|issue| {
            let matched = skip.iter().position(|entry| {
                entry.table == issue.table
                    && entry.id.eq_ignore_ascii_case(&issue.id)
                    && entry
                        .partner
                        .as_ref()
                        .is_none_or(|p| p.eq_ignore_ascii_case(&issue.partner))
            });
            if let Some(index) = matched {
                hit.insert(index);
            }
            matched.is_none()
        })
        .collect()
}

fn finish(
    store: &ConfigStore,
    settings: &EngineSettings,
    reports: Vec<PartnerReport>,
) -> Vec<IntegrityIssue> {
    let template = settings.default_template.as_ref().map(|t| t.to_ascii_lowercase());
    let fallback_used: BTreeSet<&(ConfigTable, String)> =
        reports.iter().flat_map(|r| &r.fallback_used).collect();
    let mut skips_hit: BTreeSet<usize> =
        reports.iter().flat_map(|r| r.skips_hit.iter().copied()).collect();

    let mut issues: Vec<IntegrityIssue> = reports
        .iter()
        .flat_map(|r| &r.issues)
        .filter(|issue| {
            !(issue.kind == IssueKind::Unused
                && template.as_deref() == Some(issue.partner.as_str())
                && fallback_used.contains(&(issue.table, issue.id.to_ascii_lowercase())))
        })
        .cloned()
        .collect();

    let dictionaries_used: BTreeSet<&String> =
        reports.iter().flat_map(|r| &r.dictionaries_used).collect();
    let mut store_wide = dictionary_content_issues(store);
    store_wide.extend(
        first_lines(store.dictionaries())
            .into_iter()
            .filter(|(id, _)| !dictionaries_used.contains(&id.to_ascii_lowercase()))
            .map(|(id, line)| IntegrityIssue {
                partner: STORE_WIDE.to_string(),
                table: ConfigTable::Dictionaries,
                id: id.to_string(),
                kind: IssueKind::Unused,
                line: Some(line),
            }),
    );
    issues.extend(apply_skips(store_wide, &settings.validator.skip, &mut skips_hit));

    for (index, entry) in settings.validator.skip.iter().enumerate() {
        if skips_hit.contains(&index) {
            continue;
        }
        warn!(table = %entry.table, id = %entry.id, "skip entry suppresses nothing");
        issues.push(IntegrityIssue {
            partner: entry.partner.clone().unwrap_or_else(|| STORE_WIDE.to_string()),
            table: entry.table,
            id: entry.id.clone(),
            kind: IssueKind::StaleSkip {
                reason: entry.reason.clone(),
            },
            line: None,
        });
    }

    info!(
        partners = reports.len(),
        issues = issues.len(),
        "validated configuration"
    );
    issues
}

/// Dictionary content hints that no partner declares.
fn dictionary_content_issues(store: &ConfigStore) -> Vec<IntegrityIssue> {
    let declared = |id: &str| {
        store.partners().any(|(_, tables)| {
            tables.sequences.contains(id) || tables.containers.contains(id) || tables.hints.contains(id)
        })
    };
    let mut issues = Vec::new();
    for row in store.dictionaries().rows() {
        for content in row.body.entries.iter().filter_map(|e| e.content_hint_id.as_deref()) {
            if !declared(content) {
                issues.push(IntegrityIssue {
                    partner: STORE_WIDE.to_string(),
                    table: ConfigTable::DisplayHints,
                    id: content.to_string(),
                    kind: IssueKind::Dangling {
                        referenced_by: row.id.clone(),
                    },
                    line: Some(row.origin.line),
                });
            }
        }
    }
    issues
}

struct PartnerCheck<'s> {
    partner: &'s str,
    template: Option<String>,
    settings: &'s EngineSettings,
    own: &'s PartnerTables,
    fallback: Option<&'s PartnerTables>,
    dictionaries: &'s Table<DictionaryRow>,
    used: BTreeSet<(ConfigTable, String)>,
    fallback_used: BTreeSet<(ConfigTable, String)>,
    dictionaries_used: BTreeSet<String>,
    reached_properties: BTreeSet<String>,
    visited: BTreeSet<(Owner, String)>,
    /// Poll chain of the root being swept, for poll hints without a target.
    root_chain: Option<&'s str>,
    /// Whether the root being swept displays a submit hint.
    submits: bool,
    issues: Vec<IntegrityIssue>,
}

impl<'s> PartnerCheck<'s> {
    /// Where an id would resolve from: the partner first, then its template.
    fn locate<T, F>(&self, select: F, id: &str) -> Option<(Owner, &'s Table<T>)>
    where
        F: Fn(&'s PartnerTables) -> &'s Table<T>,
    {
        let own = select(self.own);
        if own.contains(id) {
            return Some((Owner::Own, own));
        }
        self.fallback
            .map(&select)
            .filter(|table| table.contains(id))
            .map(|table| (Owner::Fallback, table))
    }

    fn mark(&mut self, owner: Owner, table: ConfigTable, id: &str) {
        let key = (table, id.to_ascii_lowercase());
        match owner {
            Owner::Own => self.used.insert(key),
            Owner::Fallback => self.fallback_used.insert(key),
        };
    }

    fn reached(&self, table: ConfigTable, id: &str) -> bool {
        let key = (table, id.to_ascii_lowercase());
        self.used.contains(&key) || self.fallback_used.contains(&key)
    }

    fn issue(&mut self, table: ConfigTable, id: &str, kind: IssueKind, line: Option<u64>) {
        let issue = IntegrityIssue {
            partner: self.partner.to_string(),
            table,
            id: id.to_string(),
            kind,
            line,
        };
        if !self.issues.contains(&issue) {
            self.issues.push(issue);
        }
    }

    fn dangling(&mut self, table: ConfigTable, id: &str, referenced_by: &str) {
        let kind = IssueKind::Dangling {
            referenced_by: referenced_by.to_string(),
        };
        if !self
            .issues
            .iter()
            .any(|i| i.table == table && i.id.eq_ignore_ascii_case(id) && i.kind == kind)
        {
            self.issue(table, id, kind, None);
        }
    }

    fn use_dictionary(&mut self, name: &str, referenced_by: &str) -> bool {
        if self.dictionaries.contains(name) {
            self.dictionaries_used.insert(name.to_ascii_lowercase());
            true
        } else {
            self.dangling(ConfigTable::Dictionaries, name, referenced_by);
            false
        }
    }

    fn sweep_roots(&mut self) {
        let own = self.own;
        let roots: Vec<_> = own
            .resources
            .rows()
            .chain(
                self.fallback
                    .into_iter()
                    .flat_map(|t| t.resources.rows())
                    .filter(|row| !own.resources.contains(&row.id)),
            )
            .collect();

        for root in roots {
            self.visited.clear();
            self.submits = false;
            self.root_chain = root.body.poll_chain.as_deref();

            for sequence_id in &root.body.sequence_ids {
                self.visit_sequence(sequence_id, &root.id, &mut Vec::new());
            }
            if let Some(strings) = &root.body.string_sequence_id {
                self.visit_strings(strings, &root.id);
            }
            if let Some(chain) = &root.body.poll_chain {
                self.visit_chain(chain, &root.id);
            }

            let Some((identity, operation)) = root.id.rsplit_once('.') else {
                continue;
            };
            self.visit_schema(identity);
            self.check_companions(&root.id, &root.body.companions, operation);
            if self.submits {
                self.visit_submit_links(&root.id, identity, operation);
            }
        }

        self.root_chain = None;
        self.submits = false;
        let dictionaries = self.dictionaries;
        for row in dictionaries.rows() {
            for content in row.body.entries.iter().filter_map(|e| e.content_hint_id.as_deref()) {
                let declared = self.locate(|t| &t.sequences, content).is_some()
                    || self.locate(|t| &t.containers, content).is_some()
                    || self.locate(|t| &t.hints, content).is_some();
                if declared {
                    self.visit(content, &row.id, &mut Vec::new());
                }
            }
        }

        for scope in own.scopes() {
            for group in &scope.country_groups {
                self.dictionaries_used.insert(group.to_ascii_lowercase());
            }
        }
    }

    fn visit(&mut self, id: &str, referenced_by: &str, stack: &mut Vec<String>) {
        if self.locate(|t| &t.sequences, id).is_some() {
            return self.visit_sequence(id, referenced_by, stack);
        }
        if let Some((owner, containers)) = self.locate(|t| &t.containers, id) {
            self.mark(owner, ConfigTable::Containers, id);
            for row in containers.candidates(id) {
                self.visit_sequence(&row.body.sequence_id, id, stack);
            }
            return;
        }
        if let Some((owner, hints)) = self.locate(|t| &t.hints, id) {
            self.mark(owner, ConfigTable::DisplayHints, id);
            for row in hints.candidates(id) {
                let hint = &row.body;
                if let Some(property) = &hint.property_name {
                    self.reached_properties.insert(property.to_ascii_lowercase());
                }
                match hint.action_type {
                    Some(ActionType::Submit) if self.settings.is_submit_hint(id) => {
                        self.submits = true
                    }
                    Some(ActionType::Poll) => {
                        if let Some(chain) = hint.action_target.as_deref().or(self.root_chain) {
                            self.visit_chain(chain, id);
                        }
                    }
                    _ => {}
                }
                if let Some(dictionary) = &hint.options {
                    self.visit_dictionary(dictionary, id, stack);
                }
            }
            return;
        }
        self.dangling(ConfigTable::DisplayHints, id, referenced_by);
    }

    fn visit_sequence(&mut self, id: &str, referenced_by: &str, stack: &mut Vec<String>) {
        if let Some(start) = stack.iter().position(|s| s.eq_ignore_ascii_case(id)) {
            let mut path = stack[start..].to_vec();
            path.push(id.to_string());
            self.issue(ConfigTable::DisplaySequences, id, IssueKind::Cycle { path }, None);
            return;
        }
        let Some((owner, sequences)) = self.locate(|t| &t.sequences, id) else {
            return self.dangling(ConfigTable::DisplaySequences, id, referenced_by);
        };
        self.mark(owner, ConfigTable::DisplaySequences, id);
        if !self.visited.insert((owner, id.to_ascii_lowercase())) {
            return;
        }

        stack.push(id.to_string());
        for row in sequences.candidates(id) {
            for entry in &row.body.entries {
                self.visit(&entry.hint_id, id, stack);
            }
        }
        stack.pop();
    }

    fn visit_dictionary(&mut self, name: &str, referenced_by: &str, stack: &mut Vec<String>) {
        if !self.use_dictionary(name, referenced_by) {
            return;
        }
        let dictionaries = self.dictionaries;
        for row in dictionaries.candidates(name) {
            for content in row.body.entries.iter().filter_map(|e| e.content_hint_id.as_deref()) {
                self.visit(content, name, stack);
            }
        }
    }

    fn visit_strings(&mut self, id: &str, referenced_by: &str) {
        let Some((owner, sequences)) = self.locate(|t| &t.string_sequences, id) else {
            return self.dangling(ConfigTable::StringSequences, id, referenced_by);
        };
        self.mark(owner, ConfigTable::StringSequences, id);
        for row in sequences.candidates(id) {
            for string_id in &row.body.string_ids {
                match self.locate(|t| &t.display_strings, string_id) {
                    Some((owner, _)) => self.mark(owner, ConfigTable::DisplayStrings, string_id),
                    None => self.dangling(ConfigTable::DisplayStrings, string_id, id),
                }
            }
        }
    }

    /// Stages `chain#n` in index order, each with its `poll_responses` row.
    fn visit_chain(&mut self, chain: &str, referenced_by: &str) {
        let prefix = format!("{chain}#");
        let stage_ids: BTreeSet<(u32, String)> = [Some(self.own), self.fallback]
            .into_iter()
            .flatten()
            .flat_map(|t| t.poll_stages.ids_with_prefix(&prefix))
            .filter_map(|id| {
                let index = id.get(prefix.len()..)?.parse().ok()?;
                Some((index, id.to_ascii_lowercase()))
            })
            .collect();
        if stage_ids.is_empty() {
            return self.dangling(ConfigTable::PollStages, chain, referenced_by);
        }

        for (_, stage_id) in stage_ids {
            if let Some((owner, _)) = self.locate(|t| &t.poll_stages, &stage_id) {
                self.mark(owner, ConfigTable::PollStages, &stage_id);
            }
            match self.locate(|t| &t.poll_responses, &stage_id) {
                Some((owner, _)) => self.mark(owner, ConfigTable::PollResponses, &stage_id),
                None => self.dangling(ConfigTable::PollResponses, &stage_id, &stage_id),
            }
        }
    }

    /// The `kind.identity` schema with its extra validations. A missing schema is allowed.
    fn visit_schema(&mut self, schema_id: &str) {
        let Some((owner, descriptions)) = self.locate(|t| &t.data_descriptions, schema_id) else {
            return;
        };
        self.mark(owner, ConfigTable::DataDescriptions, schema_id);
        for row in descriptions.candidates(schema_id) {
            for property in &row.body.properties {
                let validation_id = format!("{schema_id}.{}", property.name);
                if let Some((owner, _)) = self.locate(|t| &t.extra_validations, &validation_id) {
                    self.mark(owner, ConfigTable::ExtraValidations, &validation_id);
                }
                if let Some(dictionary) = &property.possible_values {
                    self.use_dictionary(dictionary, schema_id);
                }
            }
        }
    }

    /// Companions are built with the root's operation, so `kind.identity.operation` must exist.
    fn check_companions(&mut self, root_id: &str, companions: &[String], operation: &str) {
        for companion in companions {
            let companion_root = format!("{companion}.{operation}");
            let well_formed = companion
                .split_once('.')
                .is_some_and(|(kind, _)| kind.parse::<DescriptionKind>().is_ok());
            if !well_formed || self.locate(|t| &t.resources, &companion_root).is_none() {
                self.dangling(ConfigTable::ResourceSequences, &companion_root, root_id);
            }
        }
    }

    fn visit_submit_links(&mut self, root_id: &str, identity: &str, operation: &str) {
        for family in self.submit_families(operation) {
            let link_id = format!("{identity}.{operation}.{family}");
            match self.locate(|t| &t.submit_links, &link_id) {
                Some((owner, _)) => self.mark(owner, ConfigTable::SubmitLinks, &link_id),
                None => self.dangling(ConfigTable::SubmitLinks, &link_id, root_id),
            }
        }
    }

    /// Families the verb rules can pick for this partner: every applicable rule up to the
    /// first one without a flight, then `default` if no such rule exists.
    fn submit_families(&self, operation: &str) -> Vec<String> {
        let partners = [Some(self.partner), self.template.as_deref()];
        let mut families: Vec<String> = Vec::new();
        for rule in &self.settings.verb_rules {
            let applies = rule.operation.as_str().eq_ignore_ascii_case(operation)
                && (rule.groups.is_empty()
                    || rule.groups.iter().any(|group| {
                        partners
                            .iter()
                            .flatten()
                            .any(|partner| self.settings.in_group(group, partner))
                    }));
            if !applies {
                continue;
            }
            let family = rule.family.to_ascii_lowercase();
            if !families.contains(&family) {
                families.push(family);
            }
            if rule.flight.is_none() {
                return families;
            }
        }
        if !families.iter().any(|f| f == "default") {
            families.push("default".to_string());
        }
        families
    }

    /// Rows keyed by a hint id, and scenario override targets, must point at something.
    fn check_references(&mut self) {
        let own = self.own;
        let targets_node = |check: &Self, id: &str| {
            check.locate(|t| &t.hints, id).is_some() || check.locate(|t| &t.containers, id).is_some()
        };

        let keyed = [
            (ConfigTable::ErrorMessages, own.error_messages.ids().collect::<Vec<_>>()),
            (ConfigTable::DisplayTags, own.display_tags.ids().collect()),
            (ConfigTable::ConditionalFields, own.conditional_fields.ids().collect()),
        ];
        for (table, ids) in keyed {
            for id in ids {
                if !targets_node(self, id) {
                    self.dangling(table, id, table.file_stem());
                }
            }
        }

        let property_names: BTreeSet<String> = [Some(own), self.fallback]
            .into_iter()
            .flatten()
            .flat_map(|t| t.hints.rows())
            .filter_map(|r| r.body.property_name.as_deref())
            .map(str::to_ascii_lowercase)
            .collect();
        let overrides = own.scenario_overrides.rows().map(|row| (Owner::Own, row)).chain(
            self.fallback
                .into_iter()
                .flat_map(|t| t.scenario_overrides.rows())
                .filter(|row| !own.scenario_overrides.contains(&row.id))
                .map(|row| (Owner::Fallback, row)),
        );
        for (owner, row) in overrides.collect::<Vec<_>>() {
            let mut applies = false;
            for entry in &row.body.entries {
                if owner == Owner::Own
                    && !targets_node(self, &entry.target)
                    && !property_names.contains(&entry.target.to_ascii_lowercase())
                {
                    self.dangling(ConfigTable::ScenarioOverrides, &entry.target, &row.id);
                }
                applies |= self.reached(ConfigTable::DisplayHints, &entry.target)
                    || self.reached(ConfigTable::Containers, &entry.target)
                    || self
                        .reached_properties
                        .contains(&entry.target.to_ascii_lowercase());
                if owner == Owner::Own
                    && let OverrideEffect::RestrictOptions(dictionary) = &entry.effect
                {
                    self.use_dictionary(dictionary, &row.id);
                }
            }
            if applies {
                self.mark(owner, ConfigTable::ScenarioOverrides, &row.id);
            }
        }
    }

    fn report_unused(&mut self) {
        let own = self.own;
        let mut unused = Vec::new();
        let mut collect = |table: ConfigTable, ids: Vec<(&'s str, u64)>| {
            for (id, line) in ids {
                if !self.used.contains(&(table, id.to_ascii_lowercase())) {
                    unused.push((table, id, line));
                }
            }
        };
        collect(ConfigTable::DisplaySequences, first_lines(&own.sequences));
        collect(ConfigTable::Containers, first_lines(&own.containers));
        collect(ConfigTable::DisplayHints, first_lines(&own.hints));
        collect(ConfigTable::StringSequences, first_lines(&own.string_sequences));
        collect(ConfigTable::DisplayStrings, first_lines(&own.display_strings));
        collect(ConfigTable::DataDescriptions, first_lines(&own.data_descriptions));
        collect(ConfigTable::ExtraValidations, first_lines(&own.extra_validations));
        collect(ConfigTable::SubmitLinks, first_lines(&own.submit_links));
        collect(ConfigTable::PollStages, first_lines(&own.poll_stages));
        collect(ConfigTable::PollResponses, first_lines(&own.poll_responses));
        collect(ConfigTable::ScenarioOverrides, first_lines(&own.scenario_overrides));
        for (table, id, line) in unused {
            self.issue(table, id, IssueKind::Unused, Some(line));
        }
    }
}

fn first_lines<T>(table: &Table<T>) -> Vec<(&str, u64)> {
    table
        .ids()
        .map(|id| {
            let line = table
                .candidates(id)
                .first()
                .map(|r| r.origin.line)
                .unwrap_or_default();
            (id, line)
        })
        .collect()
}
