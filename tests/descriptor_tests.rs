mod common;

use common::{billing, fixture_builder, hint_ids, upi};
use descriptor_engine::domain::action::{Action, ActionContext, ActionType, HttpMethod, RestLink};
use descriptor_engine::domain::context::Operation;
use descriptor_engine::domain::descriptor::Descriptor;
use descriptor_engine::domain::display::DisplayNode;
use descriptor_engine::error::{ConfigError, DescriptorError};
use rand::seq::SliceRandom;
use std::sync::Arc;

fn node<'d>(descriptor: &'d Descriptor, hint_id: &str) -> &'d DisplayNode {
    descriptor
        .display_tree
        .iter()
        .find_map(|root| root.find(hint_id))
        .unwrap_or_else(|| panic!("no node {hint_id}"))
}

fn save_link(descriptor: &Descriptor) -> RestLink {
    node(descriptor, "saveButton")
        .common()
        .action
        .as_ref()
        .and_then(Action::rest_link)
        .cloned()
        .expect("save button carries a rest link")
}

#[tokio::test]
async fn test_us_billing_has_full_address_schema() {
    let builder = fixture_builder().await;
    let descriptors = builder
        .build(&billing("us", "defaulttemplate", Operation::Add))
        .unwrap();
    assert_eq!(descriptors.len(), 1);

    let billing = &descriptors[0];
    for property in [
        "address_line1",
        "address_line2",
        "address_line3",
        "city",
        "region",
        "postal_code",
        "country",
    ] {
        assert!(billing.data_schema.contains_key(property), "missing {property}");
    }
    assert_eq!(billing.identity_value("description_type"), Some("address"));
    assert_eq!(billing.identity_value("type"), Some("billing"));
    assert_eq!(billing.identity_value("operation"), Some("add"));
    assert_eq!(billing.identity_value("country"), Some("us"));
    assert_eq!(billing.identity_value("scenario"), None);

    assert_eq!(billing.data_schema["postal_code"].validations.len(), 1);
    assert_eq!(billing.data_schema["country"].possible_values.len(), 6);
    assert_eq!(
        billing.data_schema["address_line1"]
            .validation
            .as_ref()
            .and_then(|v| v.regex.as_deref()),
        Some("^.{1,128}$")
    );

    assert_eq!(billing.display_strings["addressTitle"], "Billing address");
    assert_eq!(
        billing.data_sources["addresses"].href,
        "https://{pifd-endpoint}/users/{userId}/addresses?country=us"
    );
    assert!(billing.client_action.is_none());
}

#[tokio::test]
async fn test_us_billing_display_tree() {
    let builder = fixture_builder().await;
    let billing = builder
        .build(&billing("us", "defaulttemplate", Operation::Add))
        .unwrap()
        .remove(0);

    assert_eq!(billing.display_tree.len(), 1);
    assert!(billing.display_tree[0].is_page());
    let ids = hint_ids(&billing.display_tree);
    assert!(ids.contains(&"addressLine2".to_string()));
    assert!(!ids.contains(&"addressZipHelp".to_string()));

    let region = node(&billing, "addressRegion").as_property().unwrap();
    assert_eq!(region.display_name.as_deref(), Some("State"));
    assert_eq!(region.common.conditional_fields.len(), 1);

    let postal = node(&billing, "addressPostalCode").as_property().unwrap();
    assert_eq!(postal.error_messages.len(), 2);
    assert_eq!(postal.common.display_tags["autocomplete"], "postal-code");

    let cancel = node(&billing, "cancelButton").common().action.as_ref().unwrap();
    assert_eq!(cancel.action_type, ActionType::GoHome);

    let submit = save_link(&billing);
    assert_eq!(submit.method, HttpMethod::Post);
    assert_eq!(
        submit.href,
        "https://{pifd-endpoint}/users/{userId}/addresses?country=us&language=en-us&partner=defaulttemplate"
    );
    assert_eq!(submit.headers["api-version"], "2015-03-31");
    assert!(submit.headers.contains_key("x-ms-correlation-id"));
    assert_eq!(submit.error_code_expressions.len(), 2);
}

#[tokio::test]
async fn test_xk_billing_omits_extra_address_lines() {
    let builder = fixture_builder().await;
    let descriptors = builder
        .build(&billing("xk", "defaulttemplate", Operation::Add))
        .unwrap();
    let billing = &descriptors[0];

    assert!(!billing.data_schema.contains_key("address_line2"));
    assert!(!billing.data_schema.contains_key("address_line3"));
    assert!(billing.data_schema.contains_key("postal_code"));
    assert!(billing.data_schema.contains_key("country"));
    assert!(billing.data_schema["postal_code"].is_optional);
    // The ZIP pattern is scoped to the US.
    assert!(billing.data_schema["postal_code"].validations.is_empty());

    let ids = hint_ids(&billing.display_tree);
    assert!(!ids.contains(&"addressLine2".to_string()));
    assert!(!ids.contains(&"addressLine3".to_string()));
    assert!(ids.contains(&"addressPostalCode".to_string()));
}

#[tokio::test]
async fn test_country_and_partner_scoped_hints() {
    let builder = fixture_builder().await;
    let region_label = |descriptor: &Descriptor| {
        node(descriptor, "addressRegion")
            .as_property()
            .and_then(|p| p.display_name.clone())
    };

    let de = builder
        .build(&billing("de", "defaulttemplate", Operation::Add))
        .unwrap();
    assert_eq!(region_label(&de[0]).as_deref(), Some("Province"));

    let commercial = builder
        .build(&billing("us", "commercialstores", Operation::Add))
        .unwrap();
    assert_eq!(region_label(&commercial[0]).as_deref(), Some("State or territory"));

    let storefront = builder
        .build(&billing("us", "storefront", Operation::Add))
        .unwrap();
    assert_eq!(region_label(&storefront[0]).as_deref(), Some("State"));
    assert_eq!(storefront[0].display_strings["addressTitle"], "Your billing address");
    assert_eq!(
        storefront[0].display_strings["addressSubtitle"],
        "We use this address for your invoices"
    );
}

#[tokio::test]
async fn test_entry_flight_adds_redirect_hyperlink() {
    let builder = fixture_builder().await;
    let ctx = billing("us", "defaulttemplate", Operation::Add).with_flights(["enableZipHelp"]);
    let descriptors = builder.build(&ctx).unwrap();

    let help = node(&descriptors[0], "addressZipHelp").common().action.as_ref().unwrap();
    assert_eq!(help.action_type, ActionType::Redirect);
    match &help.context {
        Some(ActionContext::Redirect(link)) => {
            assert_eq!(link.base_url, "https://tools.example.com/zip?country=us")
        }
        other => panic!("unexpected context {other:?}"),
    }
}

#[tokio::test]
async fn test_upi_chain_length_follows_flight() {
    let builder = fixture_builder().await;

    let plain = builder.build(&upi(&[])).unwrap().remove(0);
    let chain = plain.display_tree[0].common().action.as_ref().unwrap();
    let stages: Vec<&Action> = chain.chain().collect();
    assert_eq!(stages.len(), 2);
    assert!(plain.data_schema.is_empty());
    assert!(plain.client_action.is_none());

    let first = stages[0].poll_context().unwrap();
    assert_eq!(first.href, "https://{pifd-endpoint}/paymentSessions/s-100/status");
    assert_eq!(first.method, HttpMethod::Get);
    assert_eq!(first.interval_ms, 2000);
    assert_eq!(first.max_polling_attempts, 150);
    assert!(first.check_polling_timeout);
    assert_eq!(
        first.response_actions["Active"].action_type,
        ActionType::MoveNextAndPoll
    );
    assert_eq!(
        stages[1].poll_context().unwrap().response_actions["Purchased"].action_type,
        ActionType::Success
    );

    let flighted = builder
        .build(&upi(&["enableOrderStateCheck", "pollingInterval500"]))
        .unwrap()
        .remove(0);
    let chain = flighted.display_tree[0].common().action.as_ref().unwrap();
    let stages: Vec<&Action> = chain.chain().collect();
    assert_eq!(stages.len(), 3);
    assert_eq!(
        stages[1].poll_context().unwrap().response_actions["Purchased"].action_type,
        ActionType::UpdatePoll
    );

    let last = stages[2].poll_context().unwrap();
    assert_eq!(last.method, HttpMethod::Patch);
    assert_eq!(last.interval_ms, 500);
    assert_eq!(last.max_polling_attempts, 150);
    assert_eq!(
        last.payload,
        Some(serde_json::json!({"orderId": "o-7", "orderState": "Purchased"}))
    );
}

#[tokio::test]
async fn test_upi_image_source_is_expanded() {
    let builder = fixture_builder().await;
    let descriptor = builder.build(&upi(&[])).unwrap().remove(0);
    match node(&descriptor, "upiQrImage") {
        DisplayNode::Image(image) => assert_eq!(
            image.source_url.as_deref(),
            Some("https://{pifd-endpoint}/paymentSessions/s-100/qrCode")
        ),
        other => panic!("unexpected node {other:?}"),
    }
}

#[tokio::test]
async fn test_update_verb_depends_on_partner_group_and_flight() {
    let builder = fixture_builder().await;
    let update = |partner: &str| billing("us", partner, Operation::Update).with_parameter("id", "a-1");

    let put = builder.build(&update("commercialstores")).unwrap();
    let link = save_link(&put[0]);
    assert_eq!(link.method, HttpMethod::Put);
    assert_eq!(
        link.href,
        "https://{pifd-endpoint}/users/{userId}/addresses/a-1?partner=commercialstores"
    );
    assert_eq!(put[0].identity_value("operation"), Some("update"));

    let patch = builder
        .build(&update("commercialstores").with_flights(["enablePatchUpdate"]))
        .unwrap();
    let link = save_link(&patch[0]);
    assert_eq!(link.method, HttpMethod::Patch);
    assert_eq!(link.href, "https://{hapi-endpoint}/my-org/addresses/a-1");
    assert_eq!(link.headers["api-version"], "2023-01-01");
    assert!(link.headers.contains_key("x-ms-tracking-id"));

    let replaced = builder.build(&update("storefront")).unwrap();
    assert_eq!(replaced[0].identity_value("operation"), Some("replace"));
    let link = save_link(&replaced[0]);
    assert_eq!(link.method, HttpMethod::Put);
    assert_eq!(link.href, "https://{pifd-endpoint}/users/{userId}/addresses/a-1/replace");

    let add = builder
        .build(&billing("us", "commercialstores", Operation::Add).with_flights(["enablePatchUpdate"]))
        .unwrap();
    assert_eq!(save_link(&add[0]).method, HttpMethod::Post);
}

#[tokio::test]
async fn test_update_without_resource_id_is_rejected() {
    let builder = fixture_builder().await;
    for partner in ["commercialstores", "storefront"] {
        let result = builder.build(&billing("us", partner, Operation::Update));
        assert!(
            matches!(result, Err(DescriptorError::InvalidIdentity(ref message)) if message.contains("\"id\"")),
            "{partner}: {result:?}"
        );
    }
}

#[tokio::test]
async fn test_scenario_overrides_are_idempotent() {
    let builder = fixture_builder().await;
    let ctx = billing("us", "storefront", Operation::Add).with_scenario("compactAddress");

    let first = builder.build(&ctx).unwrap();
    let second = builder.build(&ctx).unwrap();
    assert_eq!(first, second);

    let compact = &first[0];
    assert_eq!(compact.identity_value("scenario"), Some("compactAddress"));
    assert!(node(compact, "addressLine3").common().is_hidden);
    assert!(!node(compact, "addressLine2").common().is_hidden);

    let country = node(compact, "addressCountry").as_property().unwrap();
    let options: Vec<&str> = country.possible_options.keys().map(String::as_str).collect();
    assert_eq!(options, vec!["de", "fr"]);
    assert_eq!(compact.data_schema["country"].possible_values.len(), 2);
    assert!(save_link(compact).href.ends_with("&scenario=compactAddress"));

    // Other requests are unaffected by the scenario having run.
    let plain = builder
        .build(&billing("us", "storefront", Operation::Add))
        .unwrap();
    assert!(!node(&plain[0], "addressLine3").common().is_hidden);
}

#[tokio::test]
async fn test_identity_rejections() {
    let builder = fixture_builder().await;

    let unknown_country = builder.build(&billing("zz", "storefront", Operation::Add));
    assert!(matches!(unknown_country, Err(DescriptorError::InvalidIdentity(_))));

    let empty_partner = builder.build(&billing("us", " ", Operation::Add));
    assert!(matches!(empty_partner, Err(DescriptorError::InvalidIdentity(_))));

    let delete = builder.build(&billing("us", "storefront", Operation::Delete));
    assert!(matches!(delete, Err(DescriptorError::Unsupported(_))));

    let mut shipping = billing("us", "storefront", Operation::Add);
    shipping.form_identity = "shipping".to_string();
    assert!(matches!(
        builder.build(&shipping),
        Err(DescriptorError::Config(ConfigError::NotFound { .. }))
    ));
}

#[tokio::test]
async fn test_flight_order_does_not_change_output() {
    let builder = fixture_builder().await;
    let mut flights = vec![
        "enableZipHelp",
        "enablePatchUpdate",
        "pollingInterval500",
        "unrelatedFlight",
        "enableOrderStateCheck",
    ];
    let request = |flights: &[&str]| {
        billing("us", "commercialstores", Operation::Update)
            .with_parameter("id", "a-1")
            .with_flights(flights.iter().copied())
    };
    let baseline = serde_json::to_string(&builder.build(&request(&flights)).unwrap()).unwrap();

    let mut rng = rand::thread_rng();
    for _ in 0..20 {
        flights.shuffle(&mut rng);
        let shuffled = serde_json::to_string(&builder.build(&request(&flights)).unwrap()).unwrap();
        assert_eq!(baseline, shuffled);
    }
}

#[tokio::test]
async fn test_concurrent_builds_match_sequential() {
    let builder = Arc::new(fixture_builder().await);
    let contexts = vec![
        billing("us", "storefront", Operation::Add),
        billing("xk", "commercialstores", Operation::Add),
        billing("us", "commercialstores", Operation::Update).with_parameter("id", "a-1"),
        upi(&["enableOrderStateCheck"]),
    ];
    let expected: Vec<_> = contexts.iter().map(|ctx| builder.build(ctx).unwrap()).collect();

    let mut handles = Vec::new();
    for round in 0..8 {
        for (index, ctx) in contexts.iter().cloned().enumerate() {
            let builder = Arc::clone(&builder);
            handles.push(tokio::spawn(async move {
                (round, index, builder.build(&ctx).unwrap())
            }));
        }
    }
    for handle in handles {
        let (_, index, descriptors) = handle.await.unwrap();
        assert_eq!(descriptors, expected[index]);
    }
}
