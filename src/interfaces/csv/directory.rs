use super::CsvStoreBuilder;
use crate::domain::ports::ConfigSource;
use crate::domain::store::{ConfigStore, ConfigTable};
use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Loads configuration from a directory laid out as
/// `<root>/dictionaries.csv` plus `<root>/<partner>/<table>.csv`.
///
/// Partner directories are read in name order. Missing table files load as empty tables.
#[derive(Debug, Clone)]
pub struct CsvDirectorySource {
    root: PathBuf,
}

impl CsvDirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn partner_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

#[async_trait]
impl ConfigSource for CsvDirectorySource {
    async fn load(&self) -> Result<ConfigStore> {
        let mut builder = CsvStoreBuilder::new();

        let dictionaries = self.root.join("dictionaries.csv");
        if tokio::fs::try_exists(&dictionaries).await? {
            let bytes = tokio::fs::read(&dictionaries).await?;
            builder = builder.with_dictionaries(bytes.as_slice())?;
        }

        let partners = self.partner_names().await?;
        for partner in &partners {
            builder = builder.with_partner(partner);
            for table in ConfigTable::PARTNER_TABLES {
                let path = self
                    .root
                    .join(partner)
                    .join(format!("{}.csv", table.file_stem()));
                if !tokio::fs::try_exists(&path).await? {
                    continue;
                }
                let bytes = tokio::fs::read(&path).await?;
                builder = builder
                    .with_table(partner, table, bytes.as_slice())
                    .inspect_err(|e| error!(partner = %partner, table = %table, error = %e, "failed to load table"))?;
                debug!(partner = %partner, table = %table, "loaded table");
            }
        }

        let store = builder.build();
        info!(
            root = %self.root.display(),
            partners = partners.len(),
            dictionaries = store.dictionaries().len(),
            "loaded configuration"
        );
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn test_load_directory_layout() {
        let root = tempfile::tempdir().unwrap();
        fs::write(
            root.path().join("dictionaries.csv"),
            "id,key,display_text\nnorthAmerica,us,United States\n,ca,Canada\n",
        )
        .unwrap();
        let partner = root.path().join("DefaultTemplate");
        fs::create_dir(&partner).unwrap();
        fs::write(
            partner.join("display_strings.csv"),
            "id,countries,text\nsaveText,{northAmerica},Save\nsaveText,,Submit\n",
        )
        .unwrap();
        fs::create_dir(root.path().join("emptypartner")).unwrap();

        let store = CsvDirectorySource::new(root.path()).load().await.unwrap();

        let names: Vec<_> = store.partner_names().collect();
        assert_eq!(names, vec!["defaulttemplate", "emptypartner"]);
        let strings = &store.partner("defaulttemplate").unwrap().display_strings;
        let rows = strings.candidates("saveText");
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0].scope.countries,
            Some(vec!["us".to_string(), "ca".to_string()])
        );
        assert_eq!(store.partner("emptypartner").unwrap().row_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_table_fails_the_load() {
        let root = tempfile::tempdir().unwrap();
        let partner = root.path().join("storefront");
        fs::create_dir(&partner).unwrap();
        fs::write(partner.join("containers.csv"), "id,display_type,sequence_id\np,widget,s\n").unwrap();

        let result = CsvDirectorySource::new(root.path()).load().await;
        assert!(result.is_err());
    }
}
