use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The JSON form of a server interface descriptor, as served by
/// `GET /rpc/{label}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DumpServer {
    pub revision: String,
    pub name: String,
    pub label: String,
    pub operations: BTreeMap<String, DumpOperation>,
    /// TypeScript declarations of the user types the operations mention,
    /// keyed by type name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub types: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub nested: BTreeMap<String, DumpServer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DumpOperation {
    pub kind: DumpKind,
    pub args: Vec<DumpArg>,
    pub returns: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DumpArg {
    pub name: String,
    pub ts_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DumpKind {
    Query,
    Mutation,
    Subscription,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_server() -> DumpServer {
        let mut operations = BTreeMap::new();
        operations.insert(
            "echo_cookie".to_owned(),
            DumpOperation {
                kind: DumpKind::Query,
                args: vec![],
                returns: "string".to_owned(),
            },
        );
        DumpServer {
            revision: "0000beef".to_owned(),
            name: "QubitServer".to_owned(),
            label: "auth".to_owned(),
            operations,
            types: BTreeMap::new(),
            nested: BTreeMap::new(),
        }
    }

    #[test]
    fn wire_shape() {
        let dump = echo_server();
        let json = serde_json::to_value(&dump).unwrap();
        assert_eq!(json["operations"]["echo_cookie"]["kind"]["type"], "query");
        assert_eq!(json["operations"]["echo_cookie"]["returns"], "string");
        assert!(json.get("types").is_none());
        assert!(json.get("nested").is_none());

        let back: DumpServer = serde_json::from_value(json).unwrap();
        assert_eq!(back, dump);
    }

    #[test]
    fn nested_servers_and_types() {
        let mut child = echo_server();
        child.label = "child".to_owned();
        child
            .types
            .insert("User".to_owned(), "export type User = { name: string, };".to_owned());
        let mut dump = echo_server();
        dump.nested.insert("child".to_owned(), child);

        let json = serde_json::to_value(&dump).unwrap();
        assert_eq!(json["nested"]["child"]["label"], "child");
        assert!(json["nested"]["child"]["types"]["User"].is_string());

        let back: DumpServer = serde_json::from_value(json).unwrap();
        assert_eq!(back, dump);
    }

    #[test]
    fn subscription_kind() {
        let json = serde_json::to_value(DumpKind::Subscription).unwrap();
        assert_eq!(json["type"], "subscription");
    }
}
