//! Column layout of each configuration table.
//!
//! Every table shares the `id`, `countries`, `flight` and `scenario` columns; the rest
//! are listed on each impl. Columns may appear in any order and may be omitted.

use super::table_reader::RawRow;
use crate::domain::action::ActionType;
use crate::domain::rows::{
    ClientActionSpec, ConditionalField, ConditionalFieldRow, ContainerRow, DataDescriptionRow,
    DataSourceRef, DictionaryEntry, DictionaryRow, DisplayStringRow, DisplayTagRow, ErrorMessage,
    ErrorMessageRow, ExtraValidationRow, HintRow, OverrideEffect, OverrideEntry, PollResponse,
    PollResponseRow, PollStageRow, PropertyRow, ResourceRow, ScenarioOverrideRow, SequenceEntry,
    SequenceRow, StringSequenceRow, SubmitLinkRow, ValidationSpec,
};
use crate::domain::scope::FlightCondition;
use crate::domain::store::ConfigTable;
use crate::error::ConfigError;

/// A row body that can be built from a group of consecutive CSV lines.
pub trait RowBody: Sized {
    const TABLE: ConfigTable;

    fn from_rows(rows: &[RawRow]) -> Result<Self, ConfigError>;
}

/// Tables holding one line per id and scope.
fn single(table: ConfigTable, rows: &[RawRow]) -> Result<&RawRow, ConfigError> {
    match rows {
        [row] => Ok(row),
        [_, second, ..] => Err(second.malformed(table, "duplicate line for the same id and scope")),
        [] => Err(ConfigError::MalformedRow {
            table,
            line: 0,
            message: "empty row group".to_string(),
        }),
    }
}

fn validation(row: &RawRow) -> Option<ValidationSpec> {
    let spec = ValidationSpec {
        regex: row.text("regex"),
        function: row.text("function"),
        error_code: row.text("error_code"),
        error_message: row.text("error_message"),
    };
    (spec.regex.is_some() || spec.function.is_some()).then_some(spec)
}

/// `sequence_ids`, `string_sequence_id`, `poll_chain`, `companions`, `client_action`,
/// `client_action_target`, `data_sources` (`name|href;name|href`).
impl RowBody for ResourceRow {
    const TABLE: ConfigTable = ConfigTable::ResourceSequences;

    fn from_rows(rows: &[RawRow]) -> Result<Self, ConfigError> {
        let row = single(Self::TABLE, rows)?;
        let client_action = row
            .parse::<ActionType>(Self::TABLE, "client_action")?
            .map(|action_type| ClientActionSpec {
                action_type,
                target: row.text("client_action_target"),
            });
        let data_sources = row
            .list("data_sources")
            .into_iter()
            .map(|pair| match pair.split_once('|') {
                Some((name, href)) => Ok(DataSourceRef {
                    name: name.trim().to_string(),
                    href: href.trim().to_string(),
                }),
                None => Err(row.malformed(
                    Self::TABLE,
                    format!("data source \"{pair}\" is not a name|href pair"),
                )),
            })
            .collect::<Result<_, _>>()?;

        Ok(ResourceRow {
            sequence_ids: row.list("sequence_ids"),
            string_sequence_id: row.text("string_sequence_id"),
            poll_chain: row.text("poll_chain"),
            companions: row.list("companions"),
            client_action,
            data_sources,
        })
    }
}

/// `hint_id`, `entry_flight`.
impl RowBody for SequenceRow {
    const TABLE: ConfigTable = ConfigTable::DisplaySequences;

    fn from_rows(rows: &[RawRow]) -> Result<Self, ConfigError> {
        let entries = rows
            .iter()
            .map(|row| {
                Ok(SequenceEntry {
                    hint_id: row.require(Self::TABLE, "hint_id")?,
                    flight: row.text("entry_flight").and_then(|f| FlightCondition::parse(&f)),
                })
            })
            .collect::<Result<_, ConfigError>>()?;
        Ok(SequenceRow { entries })
    }
}

/// `display_type`, `sequence_id`, `display_name`.
impl RowBody for ContainerRow {
    const TABLE: ConfigTable = ConfigTable::Containers;

    fn from_rows(rows: &[RawRow]) -> Result<Self, ConfigError> {
        let row = single(Self::TABLE, rows)?;
        let display_type = row
            .parse(Self::TABLE, "display_type")?
            .ok_or_else(|| row.malformed(Self::TABLE, "missing value for column \"display_type\""))?;
        Ok(ContainerRow {
            display_type,
            sequence_id: row.require(Self::TABLE, "sequence_id")?,
            display_name: row.text("display_name"),
        })
    }
}

/// `kind`, `property_name`, `display_text`, `accessibility_name`, `is_hidden`,
/// `is_disabled`, `action`, `action_target`, `options`, `source_url`.
impl RowBody for HintRow {
    const TABLE: ConfigTable = ConfigTable::DisplayHints;

    fn from_rows(rows: &[RawRow]) -> Result<Self, ConfigError> {
        let row = single(Self::TABLE, rows)?;
        let kind = row
            .parse(Self::TABLE, "kind")?
            .ok_or_else(|| row.malformed(Self::TABLE, "missing value for column \"kind\""))?;
        Ok(HintRow {
            kind,
            property_name: row.text("property_name"),
            display_text: row.text("display_text"),
            accessibility_name: row.text("accessibility_name"),
            is_hidden: row.flag(Self::TABLE, "is_hidden")?,
            is_disabled: row.flag(Self::TABLE, "is_disabled")?,
            action_type: row.parse(Self::TABLE, "action")?,
            action_target: row.text("action_target"),
            options: row.text("options"),
            source_url: row.text("source_url"),
        })
    }
}

/// `error_code`, `message`.
impl RowBody for ErrorMessageRow {
    const TABLE: ConfigTable = ConfigTable::ErrorMessages;

    fn from_rows(rows: &[RawRow]) -> Result<Self, ConfigError> {
        let messages = rows
            .iter()
            .map(|row| {
                Ok(ErrorMessage {
                    error_code: row.require(Self::TABLE, "error_code")?,
                    message: row.require(Self::TABLE, "message")?,
                })
            })
            .collect::<Result<_, ConfigError>>()?;
        Ok(ErrorMessageRow { messages })
    }
}

/// `tag`, `value`.
impl RowBody for DisplayTagRow {
    const TABLE: ConfigTable = ConfigTable::DisplayTags;

    fn from_rows(rows: &[RawRow]) -> Result<Self, ConfigError> {
        let tags = rows
            .iter()
            .map(|row| Ok((row.require(Self::TABLE, "tag")?, row.text("value").unwrap_or_default())))
            .collect::<Result<_, ConfigError>>()?;
        Ok(DisplayTagRow { tags })
    }
}

/// `field`, `condition`.
impl RowBody for ConditionalFieldRow {
    const TABLE: ConfigTable = ConfigTable::ConditionalFields;

    fn from_rows(rows: &[RawRow]) -> Result<Self, ConfigError> {
        let fields = rows
            .iter()
            .map(|row| {
                Ok(ConditionalField {
                    field: row.require(Self::TABLE, "field")?,
                    condition: row.require(Self::TABLE, "condition")?,
                })
            })
            .collect::<Result<_, ConfigError>>()?;
        Ok(ConditionalFieldRow { fields })
    }
}

/// `string_id`.
impl RowBody for StringSequenceRow {
    const TABLE: ConfigTable = ConfigTable::StringSequences;

    fn from_rows(rows: &[RawRow]) -> Result<Self, ConfigError> {
        let string_ids = rows
            .iter()
            .map(|row| row.require(Self::TABLE, "string_id"))
            .collect::<Result<_, _>>()?;
        Ok(StringSequenceRow { string_ids })
    }
}

/// `text`.
impl RowBody for DisplayStringRow {
    const TABLE: ConfigTable = ConfigTable::DisplayStrings;

    fn from_rows(rows: &[RawRow]) -> Result<Self, ConfigError> {
        let row = single(Self::TABLE, rows)?;
        Ok(DisplayStringRow {
            text: row.text("text").unwrap_or_default(),
        })
    }
}

/// `property`, `data_type`, `is_optional`, `is_key`, `default_value`, `regex`,
/// `function`, `error_code`, `error_message`, `possible_values`.
impl RowBody for DataDescriptionRow {
    const TABLE: ConfigTable = ConfigTable::DataDescriptions;

    fn from_rows(rows: &[RawRow]) -> Result<Self, ConfigError> {
        let properties = rows
            .iter()
            .map(|row| {
                Ok(PropertyRow {
                    name: row.require(Self::TABLE, "property")?,
                    data_type: row.text("data_type").unwrap_or_else(|| "string".to_string()),
                    is_optional: row.flag(Self::TABLE, "is_optional")?,
                    is_key: row.flag(Self::TABLE, "is_key")?,
                    default_value: row.text("default_value"),
                    validation: validation(row),
                    possible_values: row.text("possible_values"),
                })
            })
            .collect::<Result<_, ConfigError>>()?;
        Ok(DataDescriptionRow { properties })
    }
}

/// `regex`, `function`, `error_code`, `error_message`.
impl RowBody for ExtraValidationRow {
    const TABLE: ConfigTable = ConfigTable::ExtraValidations;

    fn from_rows(rows: &[RawRow]) -> Result<Self, ConfigError> {
        let validations = rows
            .iter()
            .map(|row| {
                validation(row)
                    .ok_or_else(|| row.malformed(Self::TABLE, "a validation needs a regex or a function"))
            })
            .collect::<Result<_, _>>()?;
        Ok(ExtraValidationRow { validations })
    }
}

/// `href`, `method`, `api_version`, `correlation_id`, `tracking_id`,
/// `error_code_expressions`.
impl RowBody for SubmitLinkRow {
    const TABLE: ConfigTable = ConfigTable::SubmitLinks;

    fn from_rows(rows: &[RawRow]) -> Result<Self, ConfigError> {
        let row = single(Self::TABLE, rows)?;
        Ok(SubmitLinkRow {
            href: row.require(Self::TABLE, "href")?,
            method: row.parse(Self::TABLE, "method")?,
            api_version: row.text("api_version"),
            correlation_id: row.flag(Self::TABLE, "correlation_id")?,
            tracking_id: row.flag(Self::TABLE, "tracking_id")?,
            error_code_expressions: row.list("error_code_expressions"),
        })
    }
}

/// `href`, `method`, `payload` (JSON), `result_expression`, `family`.
impl RowBody for PollStageRow {
    const TABLE: ConfigTable = ConfigTable::PollStages;

    fn from_rows(rows: &[RawRow]) -> Result<Self, ConfigError> {
        let row = single(Self::TABLE, rows)?;
        let payload = row
            .text("payload")
            .map(|raw| {
                serde_json::from_str(&raw)
                    .map_err(|e| row.malformed(Self::TABLE, format!("payload is not JSON: {e}")))
            })
            .transpose()?;
        Ok(PollStageRow {
            href: row.require(Self::TABLE, "href")?,
            method: row.parse(Self::TABLE, "method")?,
            payload,
            result_expression: row
                .text("result_expression")
                .unwrap_or_else(|| "status".to_string()),
            family: row.text("family").unwrap_or_else(|| "generic".to_string()),
        })
    }
}

/// `status`, `action`.
impl RowBody for PollResponseRow {
    const TABLE: ConfigTable = ConfigTable::PollResponses;

    fn from_rows(rows: &[RawRow]) -> Result<Self, ConfigError> {
        let responses = rows
            .iter()
            .map(|row| {
                let action = row
                    .parse(Self::TABLE, "action")?
                    .ok_or_else(|| row.malformed(Self::TABLE, "missing value for column \"action\""))?;
                Ok(PollResponse {
                    status: row.require(Self::TABLE, "status")?,
                    action,
                })
            })
            .collect::<Result<_, ConfigError>>()?;
        Ok(PollResponseRow { responses })
    }
}

/// `target`, `effect`, `argument`.
impl RowBody for ScenarioOverrideRow {
    const TABLE: ConfigTable = ConfigTable::ScenarioOverrides;

    fn from_rows(rows: &[RawRow]) -> Result<Self, ConfigError> {
        let entries = rows
            .iter()
            .map(|row| {
                let effect = OverrideEffect::parse(
                    &row.require(Self::TABLE, "effect")?,
                    row.text("argument").as_deref(),
                )
                .map_err(|e| row.malformed(Self::TABLE, e))?;
                Ok(OverrideEntry {
                    target: row.require(Self::TABLE, "target")?,
                    effect,
                })
            })
            .collect::<Result<_, ConfigError>>()?;
        Ok(ScenarioOverrideRow { entries })
    }
}

/// `key`, `display_text`, `content_hint_id`.
impl RowBody for DictionaryRow {
    const TABLE: ConfigTable = ConfigTable::Dictionaries;

    fn from_rows(rows: &[RawRow]) -> Result<Self, ConfigError> {
        let entries = rows
            .iter()
            .map(|row| {
                let key = row.require(Self::TABLE, "key")?;
                Ok(DictionaryEntry {
                    display_text: row.text("display_text").unwrap_or_else(|| key.clone()),
                    key,
                    content_hint_id: row.text("content_hint_id"),
                })
            })
            .collect::<Result<_, ConfigError>>()?;
        Ok(DictionaryRow { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::action::HttpMethod;
    use crate::domain::rows::{ContainerType, LeafKind};
    use crate::domain::store::Table;
    use crate::interfaces::csv::table_reader::TableReader;

    fn read<T: RowBody>(data: &str) -> crate::error::Result<Table<T>> {
        TableReader::new(T::TABLE, data.as_bytes()).read_table(&Table::new(ConfigTable::Dictionaries))
    }

    #[test]
    fn test_hint_columns() {
        let table: Table<HintRow> = read(
            "id,kind,property_name,is_hidden,action,action_target\n\
             addressCountry,property,country,yes,,\n\
             cancelButton,button,,,goHome,\n",
        )
        .unwrap();
        let country = &table.candidates("addressCountry")[0].body;
        assert_eq!(country.kind, LeafKind::Property);
        assert!(country.is_hidden);
        let cancel = &table.candidates("cancelButton")[0].body;
        assert_eq!(cancel.action_type, Some(ActionType::GoHome));
    }

    #[test]
    fn test_duplicate_single_row_is_rejected() {
        let result = read::<ContainerRow>(
            "id,display_type,sequence_id\npage1,page,seqA\npage1,page,seqB\n",
        );
        assert!(matches!(
            result,
            Err(crate::error::DescriptorError::Config(ConfigError::MalformedRow { line: 3, .. }))
        ));
        let ok: Table<ContainerRow> = read("id,display_type,sequence_id\npage1,textGroup,seqA\n").unwrap();
        assert_eq!(ok.candidates("page1")[0].body.display_type, ContainerType::TextGroup);
    }

    #[test]
    fn test_resource_data_sources() {
        let table: Table<ResourceRow> = read(
            "id,sequence_ids,data_sources,client_action\n\
             address.billing.add,addressSequence;footerSequence,addresses|https://{pifd-endpoint}/users/{userId}/addresses,\n",
        )
        .unwrap();
        let row = &table.candidates("address.billing.add")[0].body;
        assert_eq!(row.sequence_ids, vec!["addressSequence", "footerSequence"]);
        assert_eq!(row.data_sources[0].name, "addresses");
        assert!(row.client_action.is_none());

        let bad = read::<ResourceRow>("id,data_sources\naddress.billing.add,justaname\n");
        assert!(bad.is_err());
    }

    #[test]
    fn test_poll_stage_payload_and_defaults() {
        let table: Table<PollStageRow> = read(
            "id,href,method,payload\n\
             upi#3,https://{pifd-endpoint}/orders/{orderId},PATCH,\"{\"\"orderState\"\":\"\"Purchased\"\"}\"\n",
        )
        .unwrap();
        let stage = &table.candidates("upi#3")[0].body;
        assert_eq!(stage.method, Some(HttpMethod::Patch));
        assert_eq!(stage.payload.as_ref().unwrap()["orderState"], "Purchased");
        assert_eq!(stage.result_expression, "status");
        assert_eq!(stage.family, "generic");

        let bad = read::<PollStageRow>("id,href,payload\nupi#1,https://x,{not json\n");
        assert!(bad.is_err());
    }

    #[test]
    fn test_override_effects() {
        let table: Table<ScenarioOverrideRow> = read(
            "id,target,effect,argument\n\
             hiddenProfile,firstName,hide,\n\
             ,addressCountry,restrictOptions,smdMarkets\n",
        )
        .unwrap();
        let entries = &table.candidates("hiddenProfile")[0].body.entries;
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[1].effect,
            OverrideEffect::RestrictOptions("smdMarkets".into())
        );
        assert!(read::<ScenarioOverrideRow>("id,target,effect\ns,x,restrictOptions\n").is_err());
    }
}
