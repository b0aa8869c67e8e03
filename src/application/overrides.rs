use super::resolver::ScopeResolver;
use crate::domain::context::RequestContext;
use crate::domain::descriptor::PropertyDescription;
use crate::domain::display::DisplayNode;
use crate::domain::rows::OverrideEffect;
use crate::domain::store::ConfigTable;
use crate::error::ConfigError;
use indexmap::IndexMap;
use std::collections::BTreeSet;
use tracing::debug;

/// Applies the request scenario's override rows to an assembled tree, in declaration order.
///
/// Only the tree and schema built for this request change; configuration rows do not.
/// Returns the number of nodes touched.
pub fn apply_scenario_overrides(
    resolver: &ScopeResolver<'_>,
    tree: &mut [DisplayNode],
    schema: &mut IndexMap<String, PropertyDescription>,
) -> Result<usize, ConfigError> {
    let Some(scenario) = resolver.scenario() else {
        return Ok(0);
    };
    let mut touched = 0;
    for row in resolver.applicable(scenario, |t| &t.scenario_overrides) {
        for entry in &row.body.entries {
            let allowed: Option<BTreeSet<String>> = match &entry.effect {
                OverrideEffect::RestrictOptions(dictionary) => Some(
                    resolver
                        .dictionary(dictionary)
                        .ok_or_else(|| ConfigError::NotFound {
                            table: ConfigTable::Dictionaries,
                            id: dictionary.clone(),
                        })?
                        .body
                        .keys()
                        .map(str::to_string)
                        .collect(),
                ),
                _ => None,
            };
            touched += apply_effect(tree, schema, &entry.target, &entry.effect, allowed.as_ref());
        }
    }
    debug!(scenario, touched, "applied scenario overrides");
    Ok(touched)
}

/// Applies `hideFields` and `disableFields` customizations of the active features.
pub fn apply_feature_customizations(ctx: &RequestContext, tree: &mut [DisplayNode]) -> usize {
    let mut schema = IndexMap::new();
    let mut touched = 0;
    for (name, feature) in ctx.active_features() {
        for target in feature.string_list("hideFields") {
            touched += apply_effect(tree, &mut schema, &target, &OverrideEffect::Hide, None);
        }
        for target in feature.string_list("disableFields") {
            touched += apply_effect(tree, &mut schema, &target, &OverrideEffect::Disable, None);
        }
        debug!(feature = %name, "applied feature customizations");
    }
    touched
}

/// Applies one effect to every node whose hint id or property name is `target`.
pub fn apply_effect(
    tree: &mut [DisplayNode],
    schema: &mut IndexMap<String, PropertyDescription>,
    target: &str,
    effect: &OverrideEffect,
    allowed: Option<&BTreeSet<String>>,
) -> usize {
    let mut touched = 0;
    let mut restricted = Vec::new();
    for root in tree.iter_mut() {
        root.walk_mut(&mut |node| {
            let property_match = node
                .as_property()
                .is_some_and(|p| p.property_name.eq_ignore_ascii_case(target));
            if !property_match && !node.hint_id().eq_ignore_ascii_case(target) {
                return;
            }
            touched += 1;
            match effect {
                OverrideEffect::Hide => node.common_mut().is_hidden = true,
                OverrideEffect::Show => node.common_mut().is_hidden = false,
                OverrideEffect::Disable => node.common_mut().is_disabled = true,
                OverrideEffect::Enable => node.common_mut().is_disabled = false,
                OverrideEffect::RestrictOptions(_) => {
                    if let (DisplayNode::Property(property), Some(allowed)) = (node, allowed) {
                        property.possible_options.retain(|key, _| allowed.contains(key));
                        restricted.push(property.property_name.clone());
                    }
                }
            }
        });
    }
    if let Some(allowed) = allowed {
        for name in restricted {
            if let Some(description) = schema.get_mut(&name) {
                description.possible_values.retain(|key, _| allowed.contains(key));
            }
        }
    }
    touched
}
