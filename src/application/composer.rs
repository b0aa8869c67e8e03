use super::polling::IntervalPolicy;
use super::resolver::ScopeResolver;
use crate::domain::action::{Action, HttpMethod, PollContext, RedirectLink, RestLink};
use crate::domain::context::{Operation, RequestContext};
use crate::domain::rows::PollStageRow;
use crate::error::{DescriptorError, Result};
use crate::settings::{EngineSettings, VerbRule};
use indexmap::IndexMap;
use regex::{Captures, Regex};
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z0-9_.-]+)\}").expect("valid placeholder regex"));

/// Submit verb and the endpoint family whose link row is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerbChoice {
    pub method: HttpMethod,
    pub family: String,
}

enum Marker {
    Value(String),
    /// A caller marker the request has no value for.
    Missing,
    /// Not ours to fill; the HTTP-issuing side resolves it.
    External,
}

/// Builds REST, redirect and poll contexts for one request.
///
/// Hrefs are templates with `{name}` placeholders. Caller markers (`country`, `language`,
/// `partner`, `scenario`, `operation`, `type`, `kind`, `id`) and request parameters are
/// substituted URL-encoded; anything else, such as endpoint or user markers, is kept.
pub struct ActionComposer<'r, 'a> {
    resolver: &'r ScopeResolver<'a>,
    settings: &'r EngineSettings,
    ctx: &'r RequestContext,
    operation: Operation,
}

impl<'r, 'a> ActionComposer<'r, 'a> {
    /// `operation` is the one used for lookup, after any partner alias.
    pub fn new(
        resolver: &'r ScopeResolver<'a>,
        settings: &'r EngineSettings,
        ctx: &'r RequestContext,
        operation: Operation,
    ) -> Self {
        Self {
            resolver,
            settings,
            ctx,
            operation,
        }
    }

    /// First verb rule matching the operation, partner group and flights, else the
    /// operation's default. `add` is always `POST`.
    pub fn select_verb(&self) -> VerbChoice {
        let rule = self
            .settings
            .verb_rules
            .iter()
            .find(|rule| self.rule_applies(rule));
        let mut choice = match rule {
            Some(rule) => VerbChoice {
                method: rule.method,
                family: rule.family.to_ascii_lowercase(),
            },
            None => VerbChoice {
                method: default_method(self.operation),
                family: "default".to_string(),
            },
        };
        if self.operation == Operation::Add {
            choice.method = HttpMethod::Post;
        }
        choice
    }

    fn rule_applies(&self, rule: &VerbRule) -> bool {
        rule.operation == self.operation
            && (rule.groups.is_empty()
                || rule.groups.iter().any(|group| {
                    self.resolver
                        .partners()
                        .iter()
                        .any(|partner| self.settings.in_group(group, partner))
                }))
            && rule
                .flight
                .as_ref()
                .is_none_or(|flight| self.resolver.flights().contains(flight))
    }

    /// Composes the submit link for the request from its `submit_links` row.
    ///
    /// The row is picked by `kind.identity.operation.family`, so a rule that switches family
    /// switches the href and headers along with the verb. A caller marker in the path with
    /// no value, such as `{id}` on an update without a resource id, rejects the request.
    pub fn compose_submit(&self, resource_id: Option<&str>) -> Result<RestLink> {
        let choice = self.select_verb();
        let link_id = format!(
            "{}.{}.{}.{}",
            self.ctx.description_kind, self.ctx.form_identity, self.operation, choice.family
        );
        let row = self.resolver.resolve(&link_id, |t| &t.submit_links)?;
        if let Some(missing) = self.missing_path_marker(&row.body.href, resource_id) {
            return Err(DescriptorError::InvalidIdentity(format!(
                "missing parameter \"{missing}\" required by {link_id}"
            )));
        }
        let method = match self.operation {
            Operation::Add => HttpMethod::Post,
            _ => row.body.method.unwrap_or(choice.method),
        };

        let mut link = RestLink::new(self.expand_href(&row.body.href, resource_id), method);
        if let Some(version) = &row.body.api_version {
            link.headers.insert("api-version".into(), version.clone());
        }
        if row.body.correlation_id {
            link.headers
                .insert("x-ms-correlation-id".into(), "{correlation-id}".into());
        }
        if row.body.tracking_id {
            link.headers
                .insert("x-ms-tracking-id".into(), "{tracking-id}".into());
        }
        link.error_code_expressions = row.body.error_code_expressions.clone();
        debug!(link = %link_id, method = %link.method, "composed submit link");
        Ok(link)
    }

    pub fn compose_redirect(&self, target: &str) -> RedirectLink {
        RedirectLink {
            base_url: self.expand_href(target, None),
        }
    }

    /// A `GET` link for a button that calls a REST endpoint directly.
    pub fn compose_rest_action(&self, target: &str) -> RestLink {
        RestLink::new(self.expand_href(target, None), HttpMethod::Get)
    }

    pub fn compose_poll(
        &self,
        stage: &PollStageRow,
        policy: &IntervalPolicy,
        response_actions: IndexMap<String, Action>,
    ) -> PollContext {
        PollContext {
            href: self.expand_href(&stage.href, None),
            method: stage.method.unwrap_or(HttpMethod::Get),
            interval_ms: policy.interval_ms,
            max_polling_attempts: policy.max_attempts,
            check_polling_timeout: policy.check_timeout,
            response_result_expression: stage.result_expression.clone(),
            response_actions,
            payload: stage.payload.as_ref().map(|p| self.expand_payload(p)),
        }
    }

    /// Substitutes placeholders in an href. Query pairs naming a caller marker with no
    /// value are dropped.
    pub fn expand_href(&self, template: &str, resource_id: Option<&str>) -> String {
        let (path, query) = match template.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (template, None),
        };
        let mut href = self.substitute(path, resource_id, true);

        let pairs: Vec<String> = query
            .into_iter()
            .flat_map(|q| q.split('&'))
            .filter(|pair| !pair.is_empty())
            .filter(|pair| {
                !PLACEHOLDER
                    .captures_iter(pair)
                    .any(|caps| matches!(self.marker(&caps[1], resource_id), Marker::Missing))
            })
            .map(|pair| self.substitute(pair, resource_id, true))
            .collect();
        if !pairs.is_empty() {
            href.push('?');
            href.push_str(&pairs.join("&"));
        }
        href
    }

    fn missing_path_marker(&self, template: &str, resource_id: Option<&str>) -> Option<String> {
        let path = template.split_once('?').map_or(template, |(path, _)| path);
        PLACEHOLDER
            .captures_iter(path)
            .find(|caps| matches!(self.marker(&caps[1], resource_id), Marker::Missing))
            .map(|caps| caps[1].to_string())
    }

    /// Substitutes placeholders in every string of a JSON payload, without URL encoding.
    pub fn expand_payload(&self, payload: &Value) -> Value {
        match payload {
            Value::String(s) => Value::String(self.substitute(s, None, false)),
            Value::Array(items) => {
                Value::Array(items.iter().map(|i| self.expand_payload(i)).collect())
            }
            Value::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), self.expand_payload(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn substitute(&self, text: &str, resource_id: Option<&str>, encode: bool) -> String {
        PLACEHOLDER
            .replace_all(text, |caps: &Captures| match self.marker(&caps[1], resource_id) {
                Marker::Value(value) if encode => urlencoding::encode(&value).into_owned(),
                Marker::Value(value) => value,
                Marker::Missing | Marker::External => caps[0].to_string(),
            })
            .into_owned()
    }

    fn marker(&self, name: &str, resource_id: Option<&str>) -> Marker {
        let ctx = self.ctx;
        let known = match name.to_ascii_lowercase().as_str() {
            "country" => Some(Some(ctx.country.to_ascii_lowercase())),
            "language" => Some(Some(ctx.language.clone())),
            "partner" => Some(Some(ctx.partner_name.clone())),
            "scenario" => Some(ctx.scenario.clone()),
            "operation" => Some(Some(self.operation.to_string())),
            "type" => Some(Some(ctx.form_identity.clone())),
            "kind" => Some(Some(ctx.description_kind.to_string())),
            "id" => Some(resource_id.map(str::to_string)),
            _ => None,
        };
        match known {
            Some(Some(value)) => Marker::Value(value),
            Some(None) => Marker::Missing,
            None => ctx
                .parameters
                .get(name)
                .map(|v| Marker::Value(v.clone()))
                .unwrap_or(Marker::External),
        }
    }
}

fn default_method(operation: Operation) -> HttpMethod {
    match operation {
        Operation::Update | Operation::Replace => HttpMethod::Put,
        Operation::Delete => HttpMethod::Delete,
        _ => HttpMethod::Post,
    }
}
