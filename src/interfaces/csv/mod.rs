//! CSV rendition of the configuration tables.

pub mod directory;
pub mod records;
pub mod table_reader;

use crate::domain::rows::DictionaryRow;
use crate::domain::store::{ConfigStore, ConfigTable, PartnerTables, Table};
use crate::error::Result;
use indexmap::IndexMap;
use std::io::Read;
use table_reader::TableReader;

/// Builds a [`ConfigStore`] table by table from CSV sources.
///
/// Dictionaries must be supplied before any table whose countries column refers to them.
pub struct CsvStoreBuilder {
    dictionaries: Table<DictionaryRow>,
    partners: IndexMap<String, PartnerTables>,
}

impl Default for CsvStoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CsvStoreBuilder {
    pub fn new() -> Self {
        Self {
            dictionaries: Table::new(ConfigTable::Dictionaries),
            partners: IndexMap::new(),
        }
    }

    pub fn with_dictionaries<R: Read>(mut self, source: R) -> Result<Self> {
        self.dictionaries = TableReader::new(ConfigTable::Dictionaries, source)
            .read_table(&Table::new(ConfigTable::Dictionaries))?;
        Ok(self)
    }

    /// Registers a partner even if it ends up with no tables.
    pub fn with_partner(mut self, partner: &str) -> Self {
        self.partners.entry(partner.to_ascii_lowercase()).or_default();
        self
    }

    /// Loads one partner table, replacing any earlier load of the same table.
    pub fn with_table<R: Read>(mut self, partner: &str, table: ConfigTable, source: R) -> Result<Self> {
        if table == ConfigTable::Dictionaries {
            return self.with_dictionaries(source);
        }
        let dictionaries = &self.dictionaries;
        let tables = self.partners.entry(partner.to_ascii_lowercase()).or_default();
        let reader = TableReader::new(table, source);
        match table {
            ConfigTable::ResourceSequences => tables.resources = reader.read_table(dictionaries)?,
            ConfigTable::DisplaySequences => tables.sequences = reader.read_table(dictionaries)?,
            ConfigTable::Containers => tables.containers = reader.read_table(dictionaries)?,
            ConfigTable::DisplayHints => tables.hints = reader.read_table(dictionaries)?,
            ConfigTable::ErrorMessages => tables.error_messages = reader.read_table(dictionaries)?,
            ConfigTable::DisplayTags => tables.display_tags = reader.read_table(dictionaries)?,
            ConfigTable::ConditionalFields => {
                tables.conditional_fields = reader.read_table(dictionaries)?
            }
            ConfigTable::StringSequences => {
                tables.string_sequences = reader.read_table(dictionaries)?
            }
            ConfigTable::DisplayStrings => tables.display_strings = reader.read_table(dictionaries)?,
            ConfigTable::DataDescriptions => {
                tables.data_descriptions = reader.read_table(dictionaries)?
            }
            ConfigTable::ExtraValidations => {
                tables.extra_validations = reader.read_table(dictionaries)?
            }
            ConfigTable::SubmitLinks => tables.submit_links = reader.read_table(dictionaries)?,
            ConfigTable::PollStages => tables.poll_stages = reader.read_table(dictionaries)?,
            ConfigTable::PollResponses => tables.poll_responses = reader.read_table(dictionaries)?,
            ConfigTable::ScenarioOverrides => {
                tables.scenario_overrides = reader.read_table(dictionaries)?
            }
            ConfigTable::Dictionaries => {}
        }
        Ok(self)
    }

    pub fn build(self) -> ConfigStore {
        let mut store = ConfigStore::new(self.dictionaries);
        for (name, tables) in self.partners {
            store.insert_partner(&name, tables);
        }
        store
    }
}
