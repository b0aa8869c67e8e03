use super::resolver::ScopeResolver;
use crate::domain::display::{
    ContainerNode, ContentNode, DisplayNode, NodeCommon, PendingAction, PropertyNode, SelectOption,
    SourceNode,
};
use crate::domain::rows::{ContainerType, HintRow, LeafKind};
use crate::domain::store::{ConfigRow, ConfigTable};
use crate::error::ConfigError;
use indexmap::IndexMap;
use tracing::debug;

/// Unfolds display sequences into a tree of display nodes.
///
/// A hint id is looked up as a sequence first (its entries are spliced in place), then
/// as a container (its sequence becomes the container's members), then as a leaf hint.
/// The ids of the sequences being expanded are kept on a stack; meeting one again is a
/// [`ConfigError::Cycle`].
pub struct DisplayAssembler<'r, 'a> {
    resolver: &'r ScopeResolver<'a>,
}

impl<'r, 'a> DisplayAssembler<'r, 'a> {
    pub fn new(resolver: &'r ScopeResolver<'a>) -> Self {
        Self { resolver }
    }

    /// Expands every root sequence into pages, in order.
    pub fn assemble(&self, root_sequence_ids: &[String]) -> Result<Vec<DisplayNode>, ConfigError> {
        let mut pages = Vec::new();
        for root in root_sequence_ids {
            let mut stack = Vec::new();
            let nodes = self.expand_sequence(root, &mut stack)?;
            let before = pages.len();
            paginate(root, nodes, &mut pages);
            debug!(root = %root, pages = pages.len() - before, "assembled display sequence");
        }
        Ok(pages)
    }

    /// Expands one hint reference. Used for option content as well as sequence entries.
    pub fn expand_reference(
        &self,
        hint_id: &str,
        stack: &mut Vec<String>,
    ) -> Result<Vec<DisplayNode>, ConfigError> {
        if self.resolver.try_resolve(hint_id, |t| &t.sequences).is_some() {
            return self.expand_sequence(hint_id, stack);
        }

        if let Some(container) = self.resolver.try_resolve(hint_id, |t| &t.containers) {
            let members = self.expand_sequence(&container.body.sequence_id, stack)?;
            let node = ContainerNode {
                common: self.common(&container.id, false, false),
                display_name: container.body.display_name.clone(),
                members,
            };
            return Ok(vec![match container.body.display_type {
                ContainerType::Page => DisplayNode::Page(node),
                ContainerType::Group => DisplayNode::Container(node),
                ContainerType::TextGroup => DisplayNode::TextGroup(node),
            }]);
        }

        if let Some(hint) = self.resolver.try_resolve(hint_id, |t| &t.hints) {
            return Ok(vec![self.leaf(hint, stack)?]);
        }

        Err(ConfigError::UnknownHint {
            hint_id: hint_id.to_string(),
            country: self.resolver.country().to_string(),
        })
    }

    fn expand_sequence(
        &self,
        sequence_id: &str,
        stack: &mut Vec<String>,
    ) -> Result<Vec<DisplayNode>, ConfigError> {
        if stack.iter().any(|s| s.eq_ignore_ascii_case(sequence_id)) {
            let mut path = stack.clone();
            path.push(sequence_id.to_string());
            return Err(ConfigError::Cycle { path });
        }

        let row = self.resolver.resolve(sequence_id, |t| &t.sequences)?;
        stack.push(row.id.clone());
        let flights = self.resolver.flights();
        let mut nodes = Vec::new();
        for entry in row
            .body
            .entries
            .iter()
            .filter(|e| e.flight.as_ref().is_none_or(|f| f.holds(flights)))
        {
            nodes.extend(self.expand_reference(&entry.hint_id, stack)?);
        }
        stack.pop();
        Ok(nodes)
    }

    fn leaf(
        &self,
        hint: &ConfigRow<HintRow>,
        stack: &mut Vec<String>,
    ) -> Result<DisplayNode, ConfigError> {
        let body = &hint.body;
        let mut common = self.common(&hint.id, body.is_hidden, body.is_disabled);
        common.pending_action = body.action_type.map(|action_type| PendingAction {
            action_type,
            target: body.action_target.clone(),
        });

        let node = match body.kind {
            LeafKind::Property => {
                let error_messages = self
                    .resolver
                    .try_resolve(&hint.id, |t| &t.error_messages)
                    .map(|r| r.body.messages.clone())
                    .unwrap_or_default();
                let possible_options = match &body.options {
                    Some(dictionary) => self.options(dictionary, stack)?,
                    None => IndexMap::new(),
                };
                DisplayNode::Property(PropertyNode {
                    common,
                    property_name: body.property_name.clone().unwrap_or_else(|| hint.id.clone()),
                    display_name: body.display_text.clone(),
                    accessibility_name: body.accessibility_name.clone(),
                    error_messages,
                    possible_options,
                })
            }
            LeafKind::Button | LeafKind::Hyperlink | LeafKind::Text => {
                let content = ContentNode {
                    common,
                    display_content: body.display_text.clone(),
                    accessibility_name: body.accessibility_name.clone(),
                };
                match body.kind {
                    LeafKind::Button => DisplayNode::Button(content),
                    LeafKind::Hyperlink => DisplayNode::Hyperlink(content),
                    _ => DisplayNode::Text(content),
                }
            }
            LeafKind::Image | LeafKind::IFrame => {
                let source = SourceNode {
                    common,
                    source_url: body.source_url.clone(),
                    accessibility_name: body.accessibility_name.clone(),
                };
                if body.kind == LeafKind::Image {
                    DisplayNode::Image(source)
                } else {
                    DisplayNode::IFrame(source)
                }
            }
        };
        Ok(node)
    }

    fn options(
        &self,
        dictionary: &str,
        stack: &mut Vec<String>,
    ) -> Result<IndexMap<String, SelectOption>, ConfigError> {
        let row = self
            .resolver
            .dictionary(dictionary)
            .ok_or_else(|| ConfigError::NotFound {
                table: ConfigTable::Dictionaries,
                id: dictionary.to_string(),
            })?;
        let mut options = IndexMap::new();
        for entry in &row.body.entries {
            let display_content = entry
                .content_hint_id
                .as_deref()
                .map(|content| self.expand_reference(content, stack))
                .transpose()?;
            options.insert(
                entry.key.clone(),
                SelectOption {
                    display_text: entry.display_text.clone(),
                    display_content,
                },
            );
        }
        Ok(options)
    }

    fn common(&self, hint_id: &str, is_hidden: bool, is_disabled: bool) -> NodeCommon {
        let display_tags = self
            .resolver
            .try_resolve(hint_id, |t| &t.display_tags)
            .map(|r| r.body.tags.iter().cloned().collect())
            .unwrap_or_default();
        let conditional_fields = self
            .resolver
            .try_resolve(hint_id, |t| &t.conditional_fields)
            .map(|r| r.body.fields.clone())
            .unwrap_or_default();
        NodeCommon {
            hint_id: hint_id.to_string(),
            is_hidden,
            is_disabled,
            display_tags,
            conditional_fields,
            ..NodeCommon::default()
        }
    }
}

/// Keeps pages as they are and wraps runs of other nodes into pages named after the sequence.
fn paginate(sequence_id: &str, nodes: Vec<DisplayNode>, pages: &mut Vec<DisplayNode>) {
    let mut loose = Vec::new();
    let mut wrapped = 0;
    let mut flush = |loose: &mut Vec<DisplayNode>, pages: &mut Vec<DisplayNode>| {
        if loose.is_empty() {
            return;
        }
        let hint_id = match wrapped {
            0 => sequence_id.to_string(),
            n => format!("{sequence_id}{n}"),
        };
        wrapped += 1;
        pages.push(DisplayNode::Page(ContainerNode {
            common: NodeCommon::new(hint_id),
            display_name: Some(sequence_id.to_string()),
            members: std::mem::take(loose),
        }));
    };
    for node in nodes {
        if node.is_page() {
            flush(&mut loose, pages);
            pages.push(node);
        } else {
            loose.push(node);
        }
    }
    flush(&mut loose, pages);
}
