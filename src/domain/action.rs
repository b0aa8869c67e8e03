use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionType {
    Submit,
    MoveNext,
    MovePrevious,
    Redirect,
    Poll,
    Success,
    HandleFailure,
    GoHome,
    PartnerAction,
    UpdatePoll,
    MoveNextAndPoll,
    RestAction,
    Navigate,
    Cancel,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Submit => "submit",
            ActionType::MoveNext => "moveNext",
            ActionType::MovePrevious => "movePrevious",
            ActionType::Redirect => "redirect",
            ActionType::Poll => "poll",
            ActionType::Success => "success",
            ActionType::HandleFailure => "handleFailure",
            ActionType::GoHome => "goHome",
            ActionType::PartnerAction => "partnerAction",
            ActionType::UpdatePoll => "updatePoll",
            ActionType::MoveNextAndPoll => "moveNextAndPoll",
            ActionType::RestAction => "restAction",
            ActionType::Navigate => "navigate",
            ActionType::Cancel => "cancel",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "submit" => Ok(Self::Submit),
            "movenext" => Ok(Self::MoveNext),
            "moveprevious" => Ok(Self::MovePrevious),
            "redirect" => Ok(Self::Redirect),
            "poll" => Ok(Self::Poll),
            "success" => Ok(Self::Success),
            "handlefailure" => Ok(Self::HandleFailure),
            "gohome" => Ok(Self::GoHome),
            "partneraction" => Ok(Self::PartnerAction),
            "updatepoll" => Ok(Self::UpdatePoll),
            "movenextandpoll" => Ok(Self::MoveNextAndPoll),
            "restaction" => Ok(Self::RestAction),
            "navigate" => Ok(Self::Navigate),
            "cancel" => Ok(Self::Cancel),
            other => Err(format!("unknown action type \"{other}\"")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        })
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            other => Err(format!("unknown http method \"{other}\"")),
        }
    }
}

/// A REST call the client issues. `href` may still hold environment placeholders.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestLink {
    pub href: String,
    pub method: HttpMethod,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub headers: IndexMap<String, String>,
    /// Lookup expressions tried in order against an error payload.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub error_code_expressions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl RestLink {
    pub fn new(href: impl Into<String>, method: HttpMethod) -> Self {
        Self {
            href: href.into(),
            method,
            headers: IndexMap::new(),
            error_code_expressions: Vec::new(),
            payload: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedirectLink {
    pub base_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerActionContext {
    pub action_name: String,
}

/// One poll stage: where to ask, how often, and what each status means.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollContext {
    pub href: String,
    pub method: HttpMethod,
    #[serde(rename = "intervalMilliseconds")]
    pub interval_ms: u64,
    pub max_polling_attempts: u32,
    pub check_polling_timeout: bool,
    pub response_result_expression: String,
    pub response_actions: IndexMap<String, Action>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "contextType", rename_all = "camelCase")]
pub enum ActionContext {
    Rest(RestLink),
    Redirect(RedirectLink),
    Poll(PollContext),
    Partner(PartnerActionContext),
}

/// A client action. Continuations form a singly linked chain through `next_action`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub action_type: ActionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ActionContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_action: Option<Box<Action>>,
}

impl Action {
    pub fn new(action_type: ActionType) -> Self {
        Self {
            action_type,
            context: None,
            next_action: None,
        }
    }

    pub fn with_context(mut self, context: ActionContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_next(mut self, next: Action) -> Self {
        self.next_action = Some(Box::new(next));
        self
    }

    /// Hangs `next` off the last continuation.
    pub fn append(&mut self, next: Action) {
        match &mut self.next_action {
            Some(successor) => successor.append(next),
            None => self.next_action = Some(Box::new(next)),
        }
    }

    /// This action followed by every continuation.
    pub fn chain(&self) -> impl Iterator<Item = &Action> {
        std::iter::successors(Some(self), |a| a.next_action.as_deref())
    }

    pub fn poll_context(&self) -> Option<&PollContext> {
        match &self.context {
            Some(ActionContext::Poll(poll)) => Some(poll),
            _ => None,
        }
    }

    pub fn rest_link(&self) -> Option<&RestLink> {
        match &self.context {
            Some(ActionContext::Rest(link)) => Some(link),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_walks_continuations() {
        let action = Action::new(ActionType::Poll)
            .with_next(Action::new(ActionType::Poll).with_next(Action::new(ActionType::Success)));
        let types: Vec<_> = action.chain().map(|a| a.action_type).collect();
        assert_eq!(
            types,
            vec![ActionType::Poll, ActionType::Poll, ActionType::Success]
        );
    }

    #[test]
    fn test_append_extends_the_tail() {
        let mut action = Action::new(ActionType::Redirect).with_next(Action::new(ActionType::Poll));
        action.append(Action::new(ActionType::Poll).with_next(Action::new(ActionType::Success)));
        let types: Vec<_> = action.chain().map(|a| a.action_type).collect();
        assert_eq!(
            types,
            vec![
                ActionType::Redirect,
                ActionType::Poll,
                ActionType::Poll,
                ActionType::Success
            ]
        );
    }

    #[test]
    fn test_action_serializes_camel_case() {
        let link = RestLink::new("https://{pifd-endpoint}/users/{userId}/addresses", HttpMethod::Post);
        let action = Action::new(ActionType::MoveNextAndPoll).with_context(ActionContext::Rest(link));
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["actionType"], "moveNextAndPoll");
        assert_eq!(json["context"]["contextType"], "rest");
        assert_eq!(json["context"]["method"], "POST");
        assert!(json.get("nextAction").is_none());
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("HandleFailure".parse::<ActionType>(), Ok(ActionType::HandleFailure));
        assert_eq!("patch".parse::<HttpMethod>(), Ok(HttpMethod::Patch));
        assert!("teleport".parse::<ActionType>().is_err());
    }
}
