use super::records::RowBody;
use crate::domain::rows::DictionaryRow;
use crate::domain::scope::{FlightCondition, Scope};
use crate::domain::store::{ConfigRow, ConfigTable, RowOrigin, Table};
use crate::error::{ConfigError, Result};
use indexmap::IndexMap;
use std::fmt::Display;
use std::io::Read;
use std::str::FromStr;

/// One CSV line keyed by lowercased header name.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub line: u64,
    fields: IndexMap<String, String>,
}

impl RawRow {
    pub fn new(line: u64, fields: IndexMap<String, String>) -> Self {
        let fields = fields
            .into_iter()
            .map(|(k, v)| (k.trim().to_ascii_lowercase(), v))
            .collect();
        Self { line, fields }
    }

    /// Trimmed, non-empty value of a column.
    pub fn text(&self, column: &str) -> Option<String> {
        self.fields
            .get(column)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    pub fn require(&self, table: ConfigTable, column: &str) -> std::result::Result<String, ConfigError> {
        self.text(column)
            .ok_or_else(|| self.malformed(table, format!("missing value for column \"{column}\"")))
    }

    pub fn flag(&self, table: ConfigTable, column: &str) -> std::result::Result<bool, ConfigError> {
        match self.text(column).map(|v| v.to_ascii_lowercase()).as_deref() {
            None | Some("false") | Some("no") | Some("n") | Some("0") => Ok(false),
            Some("true") | Some("yes") | Some("y") | Some("1") => Ok(true),
            Some(other) => Err(self.malformed(
                table,
                format!("column \"{column}\" expects a boolean, got \"{other}\""),
            )),
        }
    }

    pub fn parse<T>(&self, table: ConfigTable, column: &str) -> std::result::Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.text(column)
            .map(|v| v.parse::<T>().map_err(|e| self.malformed(table, e.to_string())))
            .transpose()
    }

    /// Splits a `;` separated column.
    pub fn list(&self, column: &str) -> Vec<String> {
        self.text(column)
            .map(|v| {
                v.split(';')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn malformed(&self, table: ConfigTable, message: impl Into<String>) -> ConfigError {
        ConfigError::MalformedRow {
            table,
            line: self.line,
            message: message.into(),
        }
    }

    fn group_key(&self) -> [Option<String>; 4] {
        [
            self.text("id").map(|id| id.to_ascii_lowercase()),
            self.text("countries"),
            self.text("flight"),
            self.text("scenario"),
        ]
    }
}

/// Reads one configuration table from a CSV source.
///
/// Lines whose `id` is blank continue the row above, and consecutive lines repeating
/// the same id and scope are grouped the same way. `#` starts a comment line.
pub struct TableReader<R: Read> {
    table: ConfigTable,
    reader: csv::Reader<R>,
}

impl<R: Read> TableReader<R> {
    pub fn new(table: ConfigTable, source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .comment(Some(b'#'))
            .from_reader(source);
        Self { table, reader }
    }

    /// Lazily yields raw lines with their line numbers.
    pub fn rows(mut self) -> Result<impl Iterator<Item = Result<RawRow>>> {
        let headers = self.reader.headers()?.clone();
        Ok(self.reader.into_records().map(move |record| {
            let record = record?;
            let line = record.position().map(|p| p.line()).unwrap_or_default();
            let fields: IndexMap<String, String> = record.deserialize(Some(&headers))?;
            Ok(RawRow::new(line, fields))
        }))
    }

    /// Groups lines into scoped rows. `{name}` entries in the countries column expand to
    /// the keys of the named dictionary.
    pub fn read_table<T: RowBody>(self, dictionaries: &Table<DictionaryRow>) -> Result<Table<T>> {
        let table_kind = self.table;
        let mut table = Table::new(table_kind);
        let mut group: Vec<RawRow> = Vec::new();
        let mut current_key = None;

        for row in self.rows()? {
            let row = row?;
            if row.text("id").is_none() {
                if group.is_empty() {
                    return Err(row
                        .malformed(table_kind, "continuation line without a preceding id")
                        .into());
                }
                group.push(row);
                continue;
            }
            let key = row.group_key();
            if current_key.as_ref() != Some(&key) {
                flush(&mut table, &mut group, dictionaries)?;
                current_key = Some(key);
            }
            group.push(row);
        }
        flush(&mut table, &mut group, dictionaries)?;
        Ok(table)
    }
}

fn flush<T: RowBody>(
    table: &mut Table<T>,
    group: &mut Vec<RawRow>,
    dictionaries: &Table<DictionaryRow>,
) -> std::result::Result<(), ConfigError> {
    let Some(first) = group.first() else {
        return Ok(());
    };
    let kind = table.kind();
    let id = first.require(kind, "id")?;
    let scope = parse_scope(first, kind, dictionaries)?;
    let origin = RowOrigin {
        table: kind,
        line: first.line,
    };
    let body = T::from_rows(group)?;
    table.push(ConfigRow::new(id, scope, origin, body));
    group.clear();
    Ok(())
}

fn parse_scope(
    row: &RawRow,
    table: ConfigTable,
    dictionaries: &Table<DictionaryRow>,
) -> std::result::Result<Scope, ConfigError> {
    let raw_countries = row.text("countries");
    let countries = raw_countries
        .as_deref()
        .map(|raw| expand_countries(raw, dictionaries).map_err(|e| row.malformed(table, e)))
        .transpose()?;
    Ok(Scope {
        countries,
        flight: row.text("flight").and_then(|f| FlightCondition::parse(&f)),
        scenario: row.text("scenario"),
        country_groups: raw_countries.as_deref().map(country_groups).unwrap_or_default(),
    })
}

fn country_items(raw: &str) -> impl Iterator<Item = &str> {
    raw.split([';', ',']).map(str::trim).filter(|s| !s.is_empty())
}

/// Names of the `{dictionary}` entries in a countries column.
pub fn country_groups(raw: &str) -> Vec<String> {
    country_items(raw)
        .filter_map(|item| item.strip_prefix('{')?.strip_suffix('}'))
        .map(str::to_string)
        .collect()
}

/// Expands `us;ca;{euMarkets}` into lowercase country codes.
pub fn expand_countries(
    raw: &str,
    dictionaries: &Table<DictionaryRow>,
) -> std::result::Result<Vec<String>, String> {
    let mut countries = Vec::new();
    for item in country_items(raw) {
        match item.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            Some(name) => {
                let dictionary = dictionaries
                    .candidates(name)
                    .first()
                    .ok_or_else(|| format!("unknown country dictionary \"{name}\""))?;
                countries.extend(dictionary.body.keys().map(|k| k.to_ascii_lowercase()));
            }
            None => countries.push(item.to_ascii_lowercase()),
        }
    }
    Ok(countries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rows::{DisplayStringRow, SequenceRow};

    fn dictionaries() -> Table<DictionaryRow> {
        let data = "id,key,display_text\neuMarkets,de,Germany\n,fr,France\n";
        TableReader::new(ConfigTable::Dictionaries, data.as_bytes())
            .read_table(&Table::new(ConfigTable::Dictionaries))
            .unwrap()
    }

    #[test]
    fn test_rows_carry_line_numbers() {
        let data = "id, text\n# a comment\ngreeting, Hello\nfarewell, Bye";
        let rows: Vec<RawRow> = TableReader::new(ConfigTable::DisplayStrings, data.as_bytes())
            .rows()
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].text("text").as_deref(), Some("Hello"));
        assert_eq!(rows[1].line, 4);
    }

    #[test]
    fn test_grouping_and_scope() {
        let data = "\
id,countries,flight,hint_id,entry_flight
addressSequence,,,line1,
,,,line2,newLayout
addressSequence,,,line3,
addressSequence,{euMarkets};gb,!newLayout,line1,
";
        let table: Table<SequenceRow> = TableReader::new(ConfigTable::DisplaySequences, data.as_bytes())
            .read_table(&dictionaries())
            .unwrap();
        let rows = table.candidates("addresssequence");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].body.entries.len(), 3);
        assert_eq!(rows[0].origin.line, 2);
        assert_eq!(
            rows[0].body.entries[1].flight,
            FlightCondition::parse("newLayout")
        );
        assert_eq!(
            rows[1].scope.countries,
            Some(vec!["de".to_string(), "fr".to_string(), "gb".to_string()])
        );
        assert!(rows[1].scope.flight.as_ref().unwrap().negated);
        assert_eq!(rows[1].scope.country_groups, vec!["euMarkets".to_string()]);
        assert!(rows[0].scope.country_groups.is_empty());
    }

    #[test]
    fn test_continuation_without_id_is_malformed() {
        let data = "id,text\n,orphan\n";
        let result = TableReader::new(ConfigTable::DisplayStrings, data.as_bytes())
            .read_table::<DisplayStringRow>(&dictionaries());
        assert!(matches!(
            result,
            Err(crate::error::DescriptorError::Config(ConfigError::MalformedRow { line: 2, .. }))
        ));
    }

    #[test]
    fn test_unknown_country_dictionary() {
        let err = expand_countries("us;{nowhere}", &dictionaries()).unwrap_err();
        assert!(err.contains("nowhere"));
    }
}
