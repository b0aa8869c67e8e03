//! Fixtures shared by unit tests.

use crate::domain::context::{DescriptionKind, Operation, RequestContext};
use crate::domain::store::{ConfigStore, ConfigTable};
use crate::interfaces::csv::CsvStoreBuilder;

pub(crate) fn store_from_csv(
    partners: &[(&str, Vec<(ConfigTable, &str)>)],
    dictionaries: &str,
) -> ConfigStore {
    let mut builder = CsvStoreBuilder::new()
        .with_dictionaries(dictionaries.as_bytes())
        .unwrap();
    for (partner, tables) in partners {
        builder = builder.with_partner(partner);
        for (table, data) in tables {
            builder = builder.with_table(partner, *table, data.as_bytes()).unwrap();
        }
    }
    builder.build()
}

/// `address/billing/add` for partner `storefront`.
pub(crate) fn context(country: &str) -> RequestContext {
    RequestContext::new(
        country,
        DescriptionKind::Address,
        "billing",
        "en-us",
        "storefront",
        Operation::Add,
    )
}
