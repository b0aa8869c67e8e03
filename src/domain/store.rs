use super::rows::{
    ConditionalFieldRow, ContainerRow, DataDescriptionRow, DictionaryRow, DisplayStringRow,
    DisplayTagRow, ErrorMessageRow, ExtraValidationRow, HintRow, PollResponseRow, PollStageRow,
    ResourceRow, ScenarioOverrideRow, SequenceRow, StringSequenceRow, SubmitLinkRow,
};
use super::scope::Scope;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One logical configuration table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigTable {
    ResourceSequences,
    DisplaySequences,
    Containers,
    DisplayHints,
    ErrorMessages,
    DisplayTags,
    ConditionalFields,
    StringSequences,
    DisplayStrings,
    DataDescriptions,
    ExtraValidations,
    SubmitLinks,
    PollStages,
    PollResponses,
    ScenarioOverrides,
    Dictionaries,
}

impl ConfigTable {
    /// Tables stored per partner, in load order.
    pub const PARTNER_TABLES: [ConfigTable; 15] = [
        ConfigTable::ResourceSequences,
        ConfigTable::DisplaySequences,
        ConfigTable::Containers,
        ConfigTable::DisplayHints,
        ConfigTable::ErrorMessages,
        ConfigTable::DisplayTags,
        ConfigTable::ConditionalFields,
        ConfigTable::StringSequences,
        ConfigTable::DisplayStrings,
        ConfigTable::DataDescriptions,
        ConfigTable::ExtraValidations,
        ConfigTable::SubmitLinks,
        ConfigTable::PollStages,
        ConfigTable::PollResponses,
        ConfigTable::ScenarioOverrides,
    ];

    pub fn file_stem(&self) -> &'static str {
        match self {
            ConfigTable::ResourceSequences => "resource_sequences",
            ConfigTable::DisplaySequences => "display_sequences",
            ConfigTable::Containers => "containers",
            ConfigTable::DisplayHints => "display_hints",
            ConfigTable::ErrorMessages => "error_messages",
            ConfigTable::DisplayTags => "display_tags",
            ConfigTable::ConditionalFields => "conditional_fields",
            ConfigTable::StringSequences => "string_sequences",
            ConfigTable::DisplayStrings => "display_strings",
            ConfigTable::DataDescriptions => "data_descriptions",
            ConfigTable::ExtraValidations => "extra_validations",
            ConfigTable::SubmitLinks => "submit_links",
            ConfigTable::PollStages => "poll_stages",
            ConfigTable::PollResponses => "poll_responses",
            ConfigTable::ScenarioOverrides => "scenario_overrides",
            ConfigTable::Dictionaries => "dictionaries",
        }
    }
}

impl fmt::Display for ConfigTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_stem())
    }
}

impl FromStr for ConfigTable {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConfigTable::PARTNER_TABLES
            .iter()
            .chain(std::iter::once(&ConfigTable::Dictionaries))
            .find(|t| t.file_stem().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| format!("unknown configuration table \"{s}\""))
    }
}

/// Where a row was declared, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RowOrigin {
    pub table: ConfigTable,
    pub line: u64,
}

/// A scoped record. Several rows may share an id under different scopes.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigRow<T> {
    pub id: String,
    pub scope: Scope,
    pub origin: RowOrigin,
    pub body: T,
}

impl<T> ConfigRow<T> {
    pub fn new(id: impl Into<String>, scope: Scope, origin: RowOrigin, body: T) -> Self {
        Self {
            id: id.into(),
            scope,
            origin,
            body,
        }
    }
}

/// Rows of one table grouped by case-insensitive id, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct Table<T> {
    kind: ConfigTable,
    rows: IndexMap<String, Vec<ConfigRow<T>>>,
}

impl<T> Table<T> {
    pub fn new(kind: ConfigTable) -> Self {
        Self {
            kind,
            rows: IndexMap::new(),
        }
    }

    pub fn kind(&self) -> ConfigTable {
        self.kind
    }

    pub fn push(&mut self, row: ConfigRow<T>) {
        self.rows
            .entry(row.id.to_ascii_lowercase())
            .or_default()
            .push(row);
    }

    /// Every row declared under `id`, whatever its scope.
    pub fn candidates(&self, id: &str) -> &[ConfigRow<T>] {
        self.rows
            .get(&id.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.rows.contains_key(&id.to_ascii_lowercase())
    }

    /// Distinct ids, as first declared.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.rows.values().filter_map(|rows| rows.first()).map(|r| r.id.as_str())
    }

    pub fn ids_with_prefix<'t>(&'t self, prefix: &str) -> impl Iterator<Item = &'t str> + use<'t, T> {
        let prefix = prefix.to_ascii_lowercase();
        self.rows
            .iter()
            .filter(move |(key, _)| key.starts_with(&prefix))
            .filter_map(|(_, rows)| rows.first())
            .map(|r| r.id.as_str())
    }

    pub fn rows(&self) -> impl Iterator<Item = &ConfigRow<T>> {
        self.rows.values().flatten()
    }

    pub fn scopes(&self) -> impl Iterator<Item = &Scope> {
        self.rows().map(|r| &r.scope)
    }

    pub fn len(&self) -> usize {
        self.rows.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Every per-partner table.
#[derive(Debug, Clone, PartialEq)]
pub struct PartnerTables {
    pub resources: Table<ResourceRow>,
    pub sequences: Table<SequenceRow>,
    pub containers: Table<ContainerRow>,
    pub hints: Table<HintRow>,
    pub error_messages: Table<ErrorMessageRow>,
    pub display_tags: Table<DisplayTagRow>,
    pub conditional_fields: Table<ConditionalFieldRow>,
    pub string_sequences: Table<StringSequenceRow>,
    pub display_strings: Table<DisplayStringRow>,
    pub data_descriptions: Table<DataDescriptionRow>,
    pub extra_validations: Table<ExtraValidationRow>,
    pub submit_links: Table<SubmitLinkRow>,
    pub poll_stages: Table<PollStageRow>,
    pub poll_responses: Table<PollResponseRow>,
    pub scenario_overrides: Table<ScenarioOverrideRow>,
}

impl Default for PartnerTables {
    fn default() -> Self {
        Self {
            resources: Table::new(ConfigTable::ResourceSequences),
            sequences: Table::new(ConfigTable::DisplaySequences),
            containers: Table::new(ConfigTable::Containers),
            hints: Table::new(ConfigTable::DisplayHints),
            error_messages: Table::new(ConfigTable::ErrorMessages),
            display_tags: Table::new(ConfigTable::DisplayTags),
            conditional_fields: Table::new(ConfigTable::ConditionalFields),
            string_sequences: Table::new(ConfigTable::StringSequences),
            display_strings: Table::new(ConfigTable::DisplayStrings),
            data_descriptions: Table::new(ConfigTable::DataDescriptions),
            extra_validations: Table::new(ConfigTable::ExtraValidations),
            submit_links: Table::new(ConfigTable::SubmitLinks),
            poll_stages: Table::new(ConfigTable::PollStages),
            poll_responses: Table::new(ConfigTable::PollResponses),
            scenario_overrides: Table::new(ConfigTable::ScenarioOverrides),
        }
    }
}

impl PartnerTables {
    /// Scopes of every row in every table.
    pub fn scopes(&self) -> impl Iterator<Item = &Scope> {
        self.resources
            .scopes()
            .chain(self.sequences.scopes())
            .chain(self.containers.scopes())
            .chain(self.hints.scopes())
            .chain(self.error_messages.scopes())
            .chain(self.display_tags.scopes())
            .chain(self.conditional_fields.scopes())
            .chain(self.string_sequences.scopes())
            .chain(self.display_strings.scopes())
            .chain(self.data_descriptions.scopes())
            .chain(self.extra_validations.scopes())
            .chain(self.submit_links.scopes())
            .chain(self.poll_stages.scopes())
            .chain(self.poll_responses.scopes())
            .chain(self.scenario_overrides.scopes())
    }

    pub fn row_count(&self) -> usize {
        self.resources.len()
            + self.sequences.len()
            + self.containers.len()
            + self.hints.len()
            + self.error_messages.len()
            + self.display_tags.len()
            + self.conditional_fields.len()
            + self.string_sequences.len()
            + self.display_strings.len()
            + self.data_descriptions.len()
            + self.extra_validations.len()
            + self.submit_links.len()
            + self.poll_stages.len()
            + self.poll_responses.len()
            + self.scenario_overrides.len()
    }
}

/// The immutable configuration loaded at startup.
///
/// Partners are keyed by lowercased name. Dictionaries are shared by every partner.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigStore {
    partners: IndexMap<String, PartnerTables>,
    dictionaries: Table<DictionaryRow>,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(Table::new(ConfigTable::Dictionaries))
    }
}

impl ConfigStore {
    pub fn new(dictionaries: Table<DictionaryRow>) -> Self {
        Self {
            partners: IndexMap::new(),
            dictionaries,
        }
    }

    pub fn insert_partner(&mut self, name: &str, tables: PartnerTables) {
        self.partners.insert(name.to_ascii_lowercase(), tables);
    }

    pub fn partner(&self, name: &str) -> Option<&PartnerTables> {
        self.partners.get(&name.to_ascii_lowercase())
    }

    pub fn partners(&self) -> impl Iterator<Item = (&str, &PartnerTables)> {
        self.partners.iter().map(|(name, tables)| (name.as_str(), tables))
    }

    pub fn partner_names(&self) -> impl Iterator<Item = &str> {
        self.partners.keys().map(String::as_str)
    }

    pub fn dictionaries(&self) -> &Table<DictionaryRow> {
        &self.dictionaries
    }
}
