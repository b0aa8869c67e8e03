use super::assembler::DisplayAssembler;
use super::composer::ActionComposer;
use super::overrides::{apply_feature_customizations, apply_scenario_overrides};
use super::polling::PollChainBuilder;
use super::resolver::ScopeResolver;
use crate::domain::action::{Action, ActionContext, ActionType, PartnerActionContext, RestLink};
use crate::domain::context::{DescriptionKind, Operation, RequestContext};
use crate::domain::descriptor::{DataSource, Descriptor, PropertyDescription, Validation};
use crate::domain::display::{DisplayNode, PendingAction};
use crate::domain::rows::{ResourceRow, ValidationSpec};
use crate::domain::store::{ConfigStore, ConfigTable};
use crate::error::{ConfigError, DescriptorError, Result};
use crate::settings::{EngineSettings, SettingsPatterns};
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Resolves request contexts into descriptors.
///
/// The builder holds the store and settings behind `Arc`s and never mutates them, so one
/// instance can serve any number of concurrent callers.
pub struct DescriptorBuilder {
    store: Arc<ConfigStore>,
    settings: Arc<EngineSettings>,
    patterns: SettingsPatterns,
}

impl DescriptorBuilder {
    pub fn new(store: Arc<ConfigStore>, settings: Arc<EngineSettings>) -> Result<Self> {
        let patterns = settings.compile()?;
        Ok(Self {
            store,
            settings,
            patterns,
        })
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Builds the descriptor for the request, followed by one per companion identity.
    pub fn build(&self, ctx: &RequestContext) -> Result<Vec<Descriptor>> {
        self.validate_identity(ctx)?;

        let resolver = ScopeResolver::new(&self.store, &self.settings, ctx);
        let partners: Vec<&str> = resolver.partners().iter().map(String::as_str).collect();
        let operation = self.settings.alias_operation(&partners, ctx.operation);

        let (primary, companions) = self.describe(ctx, &resolver, operation)?;
        let mut descriptors = vec![primary];
        for companion in companions {
            let companion_ctx = companion_context(ctx, &companion)?;
            let (descriptor, _) = self.describe(&companion_ctx, &resolver, operation)?;
            descriptors.push(descriptor);
        }

        info!(
            kind = %ctx.description_kind,
            identity = %ctx.form_identity,
            operation = %operation,
            partner = %ctx.partner_name,
            descriptors = descriptors.len(),
            "resolved descriptors"
        );
        Ok(descriptors)
    }

    fn validate_identity(&self, ctx: &RequestContext) -> Result<()> {
        let invalid = |message: String| Err(DescriptorError::InvalidIdentity(message));
        if ctx.country.trim().is_empty() || !self.settings.is_known_country(&ctx.country) {
            return invalid(format!("unknown country \"{}\"", ctx.country));
        }
        if !self.patterns.language.is_match(&ctx.language) {
            return invalid(format!("malformed language \"{}\"", ctx.language));
        }
        if !self.patterns.identity.is_match(&ctx.form_identity)
            || !self.settings.is_known_identity(&ctx.form_identity)
        {
            return invalid(format!("unknown type \"{}\"", ctx.form_identity));
        }
        if ctx.partner_name.trim().is_empty() {
            return invalid("missing partner name".to_string());
        }
        Ok(())
    }

    /// One descriptor, plus the companion identities its root row lists.
    fn describe(
        &self,
        ctx: &RequestContext,
        resolver: &ScopeResolver<'_>,
        operation: Operation,
    ) -> Result<(Descriptor, Vec<String>)> {
        let root_id = format!(
            "{}.{}.{}",
            ctx.description_kind, ctx.form_identity, operation
        );
        let root = match resolver.try_resolve(&root_id, |t| &t.resources) {
            Some(row) => &row.body,
            None => return Err(self.missing_root(ctx, resolver, &root_id, operation)),
        };
        debug!(root = %root_id, sequences = root.sequence_ids.len(), "resolved root");

        let mut data_schema = data_schema(ctx, resolver)?;
        let mut display_tree = DisplayAssembler::new(resolver).assemble(&root.sequence_ids)?;
        apply_scenario_overrides(resolver, &mut display_tree, &mut data_schema)?;
        apply_feature_customizations(ctx, &mut display_tree);
        check_property_links(&display_tree, &data_schema)?;

        let composer = ActionComposer::new(resolver, &self.settings, ctx, operation);
        let polls = PollChainBuilder::new(
            resolver,
            &composer,
            &self.settings.polling,
            &self.patterns.interval_flight,
        );
        let resource_id = ctx.parameters.get("id").map(String::as_str);

        let pending = pending_actions(&display_tree);
        let submit_link = if pending
            .iter()
            .any(|(hint, p)| p.action_type == ActionType::Submit && self.settings.is_submit_hint(hint))
        {
            Some(composer.compose_submit(resource_id)?)
        } else {
            None
        };
        let mut chains: IndexMap<String, Action> = IndexMap::new();
        for (_, p) in &pending {
            if p.action_type == ActionType::Poll
                && let Some(chain) = p.target.as_ref().or(root.poll_chain.as_ref())
                && !chains.contains_key(chain)
            {
                chains.insert(chain.clone(), polls.build(chain)?);
            }
        }
        let attach = ActionAttacher {
            composer: &composer,
            settings: &self.settings,
            submit_link: submit_link.as_ref(),
            chains: &chains,
            default_chain: root.poll_chain.as_deref(),
        };
        for node in display_tree.iter_mut() {
            node.walk_mut(&mut |node| attach.attach(node));
        }

        let root_chain = root.poll_chain.as_deref().map(|c| polls.build(c)).transpose()?;
        let mut client_action = root.client_action.as_ref().map(|spec| {
            attach.compose(
                &PendingAction {
                    action_type: spec.action_type,
                    target: spec.target.clone(),
                },
                "",
            )
        });
        if let Some(chain) = root_chain {
            attach_root_chain(&mut display_tree, &mut client_action, chain);
        }

        let descriptor = Descriptor {
            identity: identity_map(ctx, operation),
            data_schema,
            display_tree,
            display_strings: display_strings(resolver, root)?,
            data_sources: root
                .data_sources
                .iter()
                .map(|source| {
                    (
                        source.name.clone(),
                        DataSource {
                            href: composer.expand_href(&source.href, resource_id),
                        },
                    )
                })
                .collect(),
            client_action,
        };
        Ok((descriptor, root.companions.clone()))
    }

    /// `Unsupported` when the identity is configured for other operations, else `NotFound`.
    fn missing_root(
        &self,
        ctx: &RequestContext,
        resolver: &ScopeResolver<'_>,
        root_id: &str,
        operation: Operation,
    ) -> DescriptorError {
        let prefix = format!("{}.{}.", ctx.description_kind, ctx.form_identity);
        let known = resolver
            .tables()
            .iter()
            .any(|t| t.resources.ids_with_prefix(&prefix).next().is_some());
        if known {
            DescriptorError::Unsupported(format!(
                "operation \"{operation}\" is not offered for {} \"{}\" to partner \"{}\"",
                ctx.description_kind, ctx.form_identity, ctx.partner_name
            ))
        } else {
            ConfigError::NotFound {
                table: ConfigTable::ResourceSequences,
                id: root_id.to_string(),
            }
            .into()
        }
    }
}

/// Turns pending hint actions into composed actions.
struct ActionAttacher<'x, 'r, 'a> {
    composer: &'x ActionComposer<'r, 'a>,
    settings: &'x EngineSettings,
    submit_link: Option<&'x RestLink>,
    chains: &'x IndexMap<String, Action>,
    default_chain: Option<&'x str>,
}

impl ActionAttacher<'_, '_, '_> {
    fn attach(&self, node: &mut DisplayNode) {
        if let DisplayNode::Image(source) | DisplayNode::IFrame(source) = node
            && let Some(url) = &source.source_url
        {
            let expanded = self.composer.expand_href(url, None);
            source.source_url = Some(expanded);
        }
        let common = node.common_mut();
        if let Some(pending) = common.pending_action.take() {
            common.action = Some(self.compose(&pending, &common.hint_id));
        }
    }

    fn compose(&self, pending: &PendingAction, hint_id: &str) -> Action {
        let action = Action::new(pending.action_type);
        let target = pending.target.as_deref();
        match pending.action_type {
            ActionType::Submit if self.settings.is_submit_hint(hint_id) => match self.submit_link {
                Some(link) => action.with_context(ActionContext::Rest(link.clone())),
                None => action,
            },
            ActionType::Redirect => match target {
                Some(target) => action
                    .with_context(ActionContext::Redirect(self.composer.compose_redirect(target))),
                None => action,
            },
            ActionType::RestAction => match target {
                Some(target) => action
                    .with_context(ActionContext::Rest(self.composer.compose_rest_action(target))),
                None => action,
            },
            ActionType::PartnerAction => action.with_context(ActionContext::Partner(
                PartnerActionContext {
                    action_name: target.unwrap_or(hint_id).to_string(),
                },
            )),
            ActionType::Poll => target
                .or(self.default_chain)
                .and_then(|chain| self.chains.get(chain))
                .cloned()
                .unwrap_or(action),
            _ => action,
        }
    }
}

fn pending_actions(tree: &[DisplayNode]) -> Vec<(String, PendingAction)> {
    let mut pending = Vec::new();
    for root in tree {
        root.walk(&mut |node| {
            if let Some(p) = &node.common().pending_action {
                pending.push((node.hint_id().to_string(), p.clone()));
            }
        });
    }
    pending
}

/// A root client action is continued by the chain. Without one, the chain goes on the
/// first page unless that page already acts, in which case it becomes the client action.
fn attach_root_chain(tree: &mut [DisplayNode], client_action: &mut Option<Action>, chain: Action) {
    if let Some(action) = client_action.as_mut() {
        return action.append(chain);
    }
    match tree.iter_mut().find(|n| n.is_page()).map(DisplayNode::common_mut) {
        Some(page) if page.action.is_none() => page.action = Some(chain),
        _ => *client_action = Some(chain),
    }
}

/// Identities without a `data_descriptions` row have an empty schema; any property node
/// they display is then caught as dangling.
fn data_schema(
    ctx: &RequestContext,
    resolver: &ScopeResolver<'_>,
) -> std::result::Result<IndexMap<String, PropertyDescription>, ConfigError> {
    let schema_id = format!("{}.{}", ctx.description_kind, ctx.form_identity);
    let Some(row) = resolver.try_resolve(&schema_id, |t| &t.data_descriptions) else {
        return Ok(IndexMap::new());
    };

    let mut schema = IndexMap::new();
    for property in &row.body.properties {
        let validations = resolver
            .try_resolve(&format!("{schema_id}.{}", property.name), |t| {
                &t.extra_validations
            })
            .map(|r| r.body.validations.iter().map(validation).collect())
            .unwrap_or_default();
        let possible_values = match &property.possible_values {
            Some(name) => resolver
                .dictionary(name)
                .ok_or_else(|| ConfigError::NotFound {
                    table: ConfigTable::Dictionaries,
                    id: name.clone(),
                })?
                .body
                .entries
                .iter()
                .map(|e| (e.key.clone(), e.display_text.clone()))
                .collect(),
            None => IndexMap::new(),
        };
        schema.insert(
            property.name.clone(),
            PropertyDescription {
                property_type: property.data_type.clone(),
                is_optional: property.is_optional,
                is_key: property.is_key,
                default_value: property.default_value.clone(),
                validation: property.validation.as_ref().map(validation),
                validations,
                possible_values,
            },
        );
    }
    Ok(schema)
}

fn validation(spec: &ValidationSpec) -> Validation {
    Validation {
        validation_type: if spec.regex.is_some() { "regex" } else { "function" }.to_string(),
        regex: spec.regex.clone(),
        function: spec.function.clone(),
        error_code: spec.error_code.clone(),
        error_message: spec.error_message.clone(),
    }
}

fn check_property_links(
    tree: &[DisplayNode],
    schema: &IndexMap<String, PropertyDescription>,
) -> std::result::Result<(), ConfigError> {
    let mut dangling = None;
    for root in tree {
        root.walk(&mut |node| {
            if dangling.is_none()
                && let Some(property) = node.as_property()
                && !schema.contains_key(&property.property_name)
            {
                dangling = Some(ConfigError::DanglingProperty {
                    hint_id: property.common.hint_id.clone(),
                    property: property.property_name.clone(),
                });
            }
        });
    }
    dangling.map_or(Ok(()), Err)
}

fn display_strings(
    resolver: &ScopeResolver<'_>,
    root: &ResourceRow,
) -> std::result::Result<IndexMap<String, String>, ConfigError> {
    let Some(sequence_id) = &root.string_sequence_id else {
        return Ok(IndexMap::new());
    };
    let sequence = resolver.resolve(sequence_id, |t| &t.string_sequences)?;
    sequence
        .body
        .string_ids
        .iter()
        .map(|id| {
            let row = resolver.resolve(id, |t| &t.display_strings)?;
            Ok((id.clone(), row.body.text.clone()))
        })
        .collect()
}

fn identity_map(ctx: &RequestContext, operation: Operation) -> IndexMap<String, String> {
    let mut identity = IndexMap::new();
    identity.insert("description_type".to_string(), ctx.description_kind.to_string());
    identity.insert("type".to_string(), ctx.form_identity.clone());
    identity.insert("operation".to_string(), operation.to_string());
    identity.insert("country".to_string(), ctx.country.clone());
    if let Some(scenario) = &ctx.scenario {
        identity.insert("scenario".to_string(), scenario.clone());
    }
    identity
}

/// Companions are named `kind.identity`.
fn companion_context(ctx: &RequestContext, companion: &str) -> Result<RequestContext> {
    let (kind, identity) = companion.split_once('.').ok_or_else(|| {
        DescriptorError::InvalidIdentity(format!("companion \"{companion}\" is not kind.identity"))
    })?;
    let mut companion_ctx = ctx.clone();
    companion_ctx.description_kind = kind.parse::<DescriptionKind>()?;
    companion_ctx.form_identity = identity.to_string();
    Ok(companion_ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::display::{ContainerNode, NodeCommon};
    use crate::testing::{context, store_from_csv};

    const RESOURCES: &str = "\
id,countries,sequence_ids,string_sequence_id,poll_chain,companions,client_action,client_action_target,data_sources
address.billing.add,,addressSequence,addressStrings,,taxId.vat_disabled,,,addresses|https://{pifd-endpoint}/users/{userId}/addresses?country={country}
address.billing.update,,addressSequence,,,,,,
address.shipping.add,,shippingSequence,,,,,,
taxId.vat_disabled.add,,vatSequence,,,,,,
challenge.threeds.add,,,,threeds,,,,
challenge.redirect.add,,,,,,redirect,https://{pifd-endpoint}/challenge?language={language},
challenge.acs.add,,,,threeds,,redirect,https://acs/{country},
";

    const SEQUENCES: &str = "\
id,hint_id
addressSequence,addressLine1
,addressCountry
,saveButton
shippingSequence,addressLine1
,shippingNickname
vatSequence,vatId
";

    const HINTS: &str = "\
id,kind,property_name,display_text,is_disabled,action,action_target,options
addressLine1,property,address_line1,Street,,,,
addressCountry,property,country,Country,,,,smdMarkets
shippingNickname,property,nickname,Nickname,,,,
saveButton,button,,Save,,submit,,
vatId,property,vat_id,VAT,true,,,
";

    const DATA: &str = "\
id,property,is_optional,possible_values
address.billing,address_line1,,
,country,,smdMarkets
address.shipping,address_line1,,
taxId.vat_disabled,vat_id,true,
";

    const LINKS: &str = "\
id,href,api_version
address.billing.add.default,https://{pifd-endpoint}/users/{userId}/addresses,2015-03-31
address.billing.update.default,https://{pifd-endpoint}/users/{userId}/addresses/{id},2015-03-31
";

    const STRINGS: &str = "\
id,string_id
addressStrings,addressTitle
";

    const TEXTS: &str = "\
id,text
addressTitle,Billing address
";

    const STAGES: &str = "\
id,href
threeds#1,https://{pifd-endpoint}/sessions/{sessionId}/status
";

    const RESPONSES: &str = "\
id,status,action
threeds#1,Succeeded,success
,Failed,handleFailure
";

    const DICTIONARIES: &str = "\
id,key,display_text
smdMarkets,de,Germany
,fr,France
";

    fn builder() -> DescriptorBuilder {
        let store = store_from_csv(
            &[(
                "defaulttemplate",
                vec![
                    (ConfigTable::ResourceSequences, RESOURCES),
                    (ConfigTable::DisplaySequences, SEQUENCES),
                    (ConfigTable::DisplayHints, HINTS),
                    (ConfigTable::DataDescriptions, DATA),
                    (ConfigTable::SubmitLinks, LINKS),
                    (ConfigTable::StringSequences, STRINGS),
                    (ConfigTable::DisplayStrings, TEXTS),
                    (ConfigTable::PollStages, STAGES),
                    (ConfigTable::PollResponses, RESPONSES),
                ],
            )],
            DICTIONARIES,
        );
        DescriptorBuilder::new(Arc::new(store), Arc::new(EngineSettings::default())).unwrap()
    }

    fn identity(kind: DescriptionKind, identity: &str) -> RequestContext {
        let mut ctx = context("us");
        ctx.description_kind = kind;
        ctx.form_identity = identity.to_string();
        ctx
    }

    #[test]
    fn test_build_assembles_schema_tree_and_companion() {
        let descriptors = builder().build(&context("us")).unwrap();
        assert_eq!(descriptors.len(), 2);

        let billing = &descriptors[0];
        assert_eq!(billing.identity_value("description_type"), Some("address"));
        assert_eq!(billing.identity_value("country"), Some("us"));
        assert_eq!(billing.identity_value("operation"), Some("add"));
        assert_eq!(
            billing.data_schema.keys().collect::<Vec<_>>(),
            vec!["address_line1", "country"]
        );
        assert_eq!(billing.data_schema["country"].possible_values.len(), 2);
        assert_eq!(billing.display_strings["addressTitle"], "Billing address");
        assert_eq!(
            billing.data_sources["addresses"].href,
            "https://{pifd-endpoint}/users/{userId}/addresses?country=us"
        );

        let save = billing.display_tree[0].find("saveButton").unwrap();
        let link = save.common().action.as_ref().unwrap().rest_link().unwrap();
        assert_eq!(link.href, "https://{pifd-endpoint}/users/{userId}/addresses");

        let vat = &descriptors[1];
        assert_eq!(vat.identity_value("description_type"), Some("taxId"));
        assert_eq!(vat.identity_value("type"), Some("vat_disabled"));
        assert!(vat.display_tree[0].find("vatId").unwrap().common().is_disabled);
    }

    #[test]
    fn test_invalid_identity_fails_before_lookup() {
        let builder = builder();
        for ctx in [
            context("zz"),
            context("").with_scenario("x"),
            RequestContext {
                language: "english please".into(),
                ..context("us")
            },
            identity(DescriptionKind::Address, "Bad Identity"),
        ] {
            assert!(
                matches!(builder.build(&ctx), Err(DescriptorError::InvalidIdentity(_))),
                "{ctx:?}"
            );
        }
    }

    #[test]
    fn test_unconfigured_operation_is_unsupported() {
        let mut ctx = identity(DescriptionKind::Address, "shipping");
        ctx.operation = Operation::Delete;
        assert!(matches!(
            builder().build(&ctx),
            Err(DescriptorError::Unsupported(_))
        ));

        let unknown = identity(DescriptionKind::Profile, "consumer");
        assert!(matches!(
            builder().build(&unknown),
            Err(DescriptorError::Config(ConfigError::NotFound {
                table: ConfigTable::ResourceSequences,
                ..
            }))
        ));
    }

    #[test]
    fn test_property_without_schema_entry_is_dangling() {
        let err = builder()
            .build(&identity(DescriptionKind::Address, "shipping"))
            .unwrap_err();
        assert!(matches!(
            err,
            DescriptorError::Config(ConfigError::DanglingProperty { ref property, .. })
                if property == "nickname"
        ));
    }

    #[test]
    fn test_action_only_roots_become_client_actions() {
        let builder = builder();

        let threeds = builder
            .build(&identity(DescriptionKind::Challenge, "threeds"))
            .unwrap();
        assert!(threeds[0].display_tree.is_empty());
        let action = threeds[0].client_action.as_ref().unwrap();
        assert_eq!(action.action_type, ActionType::Poll);
        assert_eq!(action.chain().count(), 1);

        let redirect = builder
            .build(&identity(DescriptionKind::Challenge, "redirect"))
            .unwrap();
        let action = redirect[0].client_action.as_ref().unwrap();
        assert_eq!(action.action_type, ActionType::Redirect);
        assert_eq!(
            action.context,
            Some(ActionContext::Redirect(crate::domain::action::RedirectLink {
                base_url: "https://{pifd-endpoint}/challenge?language=en-us".into()
            }))
        );
    }

    #[test]
    fn test_root_chain_continues_client_action() {
        let acs = builder()
            .build(&identity(DescriptionKind::Challenge, "acs"))
            .unwrap();
        let action = acs[0].client_action.as_ref().unwrap();
        let types: Vec<_> = action.chain().map(|a| a.action_type).collect();
        assert_eq!(types, vec![ActionType::Redirect, ActionType::Poll]);
        let poll = action.chain().nth(1).unwrap().poll_context().unwrap();
        assert_eq!(
            poll.href,
            "https://{pifd-endpoint}/sessions/{sessionId}/status"
        );
    }

    fn page(action: Option<Action>) -> DisplayNode {
        DisplayNode::Page(ContainerNode {
            common: NodeCommon {
                action,
                ..NodeCommon::new("challengePage")
            },
            display_name: None,
            members: Vec::new(),
        })
    }

    #[test]
    fn test_root_chain_placement() {
        let chain = Action::new(ActionType::Poll);

        let mut idle = vec![page(None)];
        let mut client_action = None;
        attach_root_chain(&mut idle, &mut client_action, chain.clone());
        assert_eq!(idle[0].common().action, Some(chain.clone()));
        assert!(client_action.is_none());

        let mut acting = vec![page(Some(Action::new(ActionType::GoHome)))];
        let mut client_action = None;
        attach_root_chain(&mut acting, &mut client_action, chain.clone());
        assert_eq!(
            acting[0].common().action,
            Some(Action::new(ActionType::GoHome))
        );
        assert_eq!(client_action, Some(chain.clone()));

        let mut client_action = Some(Action::new(ActionType::Redirect));
        attach_root_chain(&mut idle, &mut client_action, chain.clone());
        assert_eq!(
            client_action,
            Some(Action::new(ActionType::Redirect).with_next(chain))
        );
    }

    #[test]
    fn test_operation_alias_is_echoed() {
        let store = builder().store.clone();
        let settings = EngineSettings::from_toml_str(
            "[partner_groups]\nlegacy = [\"storefront\"]\n\n[[operation_aliases]]\ngroup = \"legacy\"\nfrom = \"replace\"\nto = \"update\"\n",
        )
        .unwrap();
        let builder = DescriptorBuilder::new(store, Arc::new(settings)).unwrap();
        let mut ctx = context("us").with_parameter("id", "a-1");
        ctx.operation = Operation::Replace;
        let descriptors = builder.build(&ctx).unwrap();
        assert_eq!(descriptors[0].identity_value("operation"), Some("update"));
    }
}
