use super::action::{Action, ActionType};
use super::rows::{ConditionalField, ErrorMessage};
use indexmap::IndexMap;
use serde::Serialize;

/// Attributes every display node carries.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NodeCommon {
    pub hint_id: String,
    pub is_hidden: bool,
    pub is_disabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub display_tags: IndexMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conditional_fields: Vec<ConditionalField>,
    /// Action declared by the hint, composed once the tree is complete.
    #[serde(skip)]
    pub pending_action: Option<PendingAction>,
}

impl NodeCommon {
    pub fn new(hint_id: impl Into<String>) -> Self {
        Self {
            hint_id: hint_id.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingAction {
    pub action_type: ActionType,
    pub target: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerNode {
    #[serde(flatten)]
    pub common: NodeCommon,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub members: Vec<DisplayNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectOption {
    pub display_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_content: Option<Vec<DisplayNode>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyNode {
    #[serde(flatten)]
    pub common: NodeCommon,
    pub property_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accessibility_name: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub error_messages: Vec<ErrorMessage>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub possible_options: IndexMap<String, SelectOption>,
}

/// Button, hyperlink or text.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentNode {
    #[serde(flatten)]
    pub common: NodeCommon,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accessibility_name: Option<String>,
}

/// Image or iframe.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceNode {
    #[serde(flatten)]
    pub common: NodeCommon,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accessibility_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "displayType", rename_all = "camelCase")]
pub enum DisplayNode {
    Page(ContainerNode),
    Container(ContainerNode),
    TextGroup(ContainerNode),
    Property(PropertyNode),
    Button(ContentNode),
    Hyperlink(ContentNode),
    Text(ContentNode),
    Image(SourceNode),
    #[serde(rename = "iframe")]
    IFrame(SourceNode),
}

impl DisplayNode {
    pub fn common(&self) -> &NodeCommon {
        match self {
            DisplayNode::Page(n) | DisplayNode::Container(n) | DisplayNode::TextGroup(n) => {
                &n.common
            }
            DisplayNode::Property(n) => &n.common,
            DisplayNode::Button(n) | DisplayNode::Hyperlink(n) | DisplayNode::Text(n) => &n.common,
            DisplayNode::Image(n) | DisplayNode::IFrame(n) => &n.common,
        }
    }

    pub fn common_mut(&mut self) -> &mut NodeCommon {
        match self {
            DisplayNode::Page(n) | DisplayNode::Container(n) | DisplayNode::TextGroup(n) => {
                &mut n.common
            }
            DisplayNode::Property(n) => &mut n.common,
            DisplayNode::Button(n) | DisplayNode::Hyperlink(n) | DisplayNode::Text(n) => {
                &mut n.common
            }
            DisplayNode::Image(n) | DisplayNode::IFrame(n) => &mut n.common,
        }
    }

    pub fn hint_id(&self) -> &str {
        &self.common().hint_id
    }

    pub fn is_page(&self) -> bool {
        matches!(self, DisplayNode::Page(_))
    }

    pub fn as_property(&self) -> Option<&PropertyNode> {
        match self {
            DisplayNode::Property(p) => Some(p),
            _ => None,
        }
    }

    pub fn members(&self) -> &[DisplayNode] {
        match self {
            DisplayNode::Page(n) | DisplayNode::Container(n) | DisplayNode::TextGroup(n) => {
                &n.members
            }
            _ => &[],
        }
    }

    /// Visits this node and every descendant, option content included, depth first.
    pub fn walk<'n>(&'n self, visit: &mut dyn FnMut(&'n DisplayNode)) {
        visit(self);
        match self {
            DisplayNode::Page(n) | DisplayNode::Container(n) | DisplayNode::TextGroup(n) => {
                n.members.iter().for_each(|m| m.walk(visit));
            }
            DisplayNode::Property(p) => {
                p.possible_options
                    .values()
                    .filter_map(|o| o.display_content.as_ref())
                    .flatten()
                    .for_each(|m| m.walk(visit));
            }
            _ => {}
        }
    }

    pub fn walk_mut(&mut self, visit: &mut dyn FnMut(&mut DisplayNode)) {
        visit(self);
        match self {
            DisplayNode::Page(n) | DisplayNode::Container(n) | DisplayNode::TextGroup(n) => {
                n.members.iter_mut().for_each(|m| m.walk_mut(visit));
            }
            DisplayNode::Property(p) => {
                p.possible_options
                    .values_mut()
                    .filter_map(|o| o.display_content.as_mut())
                    .flatten()
                    .for_each(|m| m.walk_mut(visit));
            }
            _ => {}
        }
    }

    /// First node (self included) with the given hint id.
    pub fn find(&self, hint_id: &str) -> Option<&DisplayNode> {
        let mut found = None;
        self.walk(&mut |node| {
            if found.is_none() && node.hint_id().eq_ignore_ascii_case(hint_id) {
                found = Some(node);
            }
        });
        found
    }
}

/// Searches a whole tree.
pub fn find_node<'n>(tree: &'n [DisplayNode], hint_id: &str) -> Option<&'n DisplayNode> {
    tree.iter().find_map(|node| node.find(hint_id))
}
