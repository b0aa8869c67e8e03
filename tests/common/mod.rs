#![allow(dead_code)]

use descriptor_engine::application::builder::DescriptorBuilder;
use descriptor_engine::domain::context::{DescriptionKind, Operation, RequestContext};
use descriptor_engine::domain::display::DisplayNode;
use descriptor_engine::domain::ports::ConfigSource;
use descriptor_engine::domain::store::ConfigStore;
use descriptor_engine::interfaces::csv::directory::CsvDirectorySource;
use descriptor_engine::settings::EngineSettings;
use std::path::PathBuf;
use std::sync::Arc;

pub fn fixture_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/config")
}

pub async fn load_fixture() -> (Arc<ConfigStore>, Arc<EngineSettings>) {
    let root = fixture_dir();
    let settings = EngineSettings::from_path(&root.join("settings.toml")).unwrap();
    let store = CsvDirectorySource::new(root).load().await.unwrap();
    (Arc::new(store), Arc::new(settings))
}

pub async fn fixture_builder() -> DescriptorBuilder {
    let (store, settings) = load_fixture().await;
    DescriptorBuilder::new(store, settings).unwrap()
}

pub fn billing(country: &str, partner: &str, operation: Operation) -> RequestContext {
    RequestContext::new(
        country,
        DescriptionKind::Address,
        "billing",
        "en-us",
        partner,
        operation,
    )
}

pub fn upi(flights: &[&str]) -> RequestContext {
    RequestContext::new(
        "in",
        DescriptionKind::Challenge,
        "upi_qr",
        "en-us",
        "defaulttemplate",
        Operation::Add,
    )
    .with_flights(flights.iter().copied())
    .with_parameter("sessionId", "s-100")
    .with_parameter("orderId", "o-7")
}

/// Hint ids of every node in the tree, depth first.
pub fn hint_ids(tree: &[DisplayNode]) -> Vec<String> {
    let mut ids = Vec::new();
    for root in tree {
        root.walk(&mut |node| ids.push(node.hint_id().to_string()));
    }
    ids
}
