//! DOM edits recorded by page scripts, replayed by the host onto its document.

use serde::Deserialize;
use sl_dom::NodeId;

/// One recorded edit. Node references are script-side keys; see [`NodeRef`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum DomMutation {
    CreateElement { key: String, tag: String },
    SetAttribute { node: String, name: String, value: String },
    RemoveAttribute { node: String, name: String },
    SetText { node: String, text: String },
    ClearChildren { node: String },
    AppendChild { parent: String, child: String },
    InsertBefore { parent: String, child: String, before: String },
    AppendText { parent: String, text: String },
    Remove { node: String },
    SetTitle { text: String },
}

/// Parsed form of a script-side node key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeRef<'a> {
    /// A node that already existed in the host document.
    Existing(NodeId),
    /// An element created by script since the last sync, named `new-<n>`.
    Created(&'a str),
}

impl<'a> NodeRef<'a> {
    pub fn parse(key: &'a str) -> Option<Self> {
        if key.starts_with("new-") {
            return Some(Self::Created(key));
        }
        key.parse::<NodeId>().ok().map(Self::Existing)
    }
}

#[cfg(test)]
mod tests {
    use super::DomMutation;
    use super::NodeRef;

    #[test]
    fn decodes_tagged_records() {
        let json = r#"[
            {"op":"create-element","key":"new-1","tag":"p"},
            {"op":"append-child","parent":"7","child":"new-1"},
            {"op":"set-title","text":"Done"}
        ]"#;
        let records: Vec<DomMutation> = match serde_json::from_str(json) {
            Ok(records) => records,
            Err(error) => panic!("{error}"),
        };
        assert_eq!(
            records,
            vec![
                DomMutation::CreateElement {
                    key: "new-1".to_owned(),
                    tag: "p".to_owned()
                },
                DomMutation::AppendChild {
                    parent: "7".to_owned(),
                    child: "new-1".to_owned()
                },
                DomMutation::SetTitle {
                    text: "Done".to_owned()
                },
            ]
        );
    }

    #[test]
    fn parses_node_keys() {
        assert_eq!(NodeRef::parse("12"), Some(NodeRef::Existing(12)));
        assert_eq!(NodeRef::parse("new-3"), Some(NodeRef::Created("new-3")));
        assert_eq!(NodeRef::parse("bogus"), None);
    }
}
