use std::fs;
use std::sync::Arc;

use batchlab_core::{BatchError, DocumentFormat};
use batchlab_doc::{
    BackendRegistry, DocumentTree, EditScope, FormatBackend, JsonBackend, ParentScope, Scalar,
    XmlBackend, YamlBackend,
};
use tempfile::tempdir;

const TEAMS_JSON: &str = r#"{
  "teams": [
    {
      "name": "red",
      "agent": {
        "speed": 1
      }
    },
    {
      "name": "blue",
      "agent": {
        "speed": 2
      }
    }
  ]
}
"#;

const TEAMS_YAML: &str = "teams:\n- name: red\n  agent:\n    speed: 1\n- name: blue\n  agent:\n    speed: 2\n";

#[test]
fn policies_differ_per_format() {
    assert_eq!(XmlBackend.policy().edit, EditScope::FirstMatch);
    assert_eq!(XmlBackend.policy().parent, ParentScope::Unique);
    assert_eq!(JsonBackend.policy().edit, EditScope::AllMatches);
    assert_eq!(JsonBackend.policy().parent, ParentScope::Every);
    assert_eq!(YamlBackend.policy().edit, EditScope::AllMatches);
    assert_eq!(YamlBackend.policy().parent, ParentScope::Unique);
}

#[test]
fn json_edits_every_match() {
    let mut tree = DocumentTree::parse(TEAMS_JSON, Arc::new(JsonBackend)).expect("parse");
    let result = tree.set_attribute(".//agent", "speed", 5i64).expect("speed");
    assert_eq!(result.matched, 2);
    assert_eq!(
        result.paths,
        vec![
            "./teams[0]/agent@speed".to_string(),
            "./teams[1]/agent@speed".to_string()
        ]
    );
    let speeds: Vec<_> = tree
        .resolve(".//agent@speed")
        .expect("resolve")
        .iter()
        .filter_map(|node| node.value().cloned())
        .collect();
    assert_eq!(speeds, vec![Scalar::Int(5), Scalar::Int(5)]);
}

#[test]
fn json_adds_under_every_parent() {
    let mut tree = DocumentTree::parse(TEAMS_JSON, Arc::new(JsonBackend)).expect("parse");
    let paths = tree
        .add_element("./teams", "sensor", &[("range".to_string(), Scalar::Float(0.5))])
        .expect("add");
    assert_eq!(
        paths,
        vec!["./teams[0]/sensor".to_string(), "./teams[1]/sensor".to_string()]
    );
    let text = tree.into_string().expect("write");
    let value: serde_json::Value = serde_json::from_str(&text).expect("json");
    assert_eq!(value["teams"][1]["sensor"]["range"], serde_json::json!(0.5));
    assert_eq!(value["teams"][0]["agent"]["speed"], serde_json::json!(1));
}

#[test]
fn yaml_requires_unique_parent() {
    let mut tree = DocumentTree::parse(TEAMS_YAML, Arc::new(YamlBackend)).expect("parse");
    let err = tree.add_element("./teams", "sensor", &[]).expect_err("two teams");
    assert!(matches!(err, BatchError::AmbiguousAncestor(_)));
    tree.add_element("./teams[1]", "sensor", &[]).expect("indexed parent");
    let result = tree.set_attribute(".//agent", "speed", 3i64).expect("speed");
    assert_eq!(result.paths.len(), 2);
}

#[test]
fn pretty_json_and_yaml_roundtrip() {
    let json = DocumentTree::parse(TEAMS_JSON, Arc::new(JsonBackend)).expect("json");
    assert_eq!(json.into_string().expect("write json"), TEAMS_JSON);
    let yaml = DocumentTree::parse(TEAMS_YAML, Arc::new(YamlBackend)).expect("yaml");
    assert_eq!(yaml.into_string().expect("write yaml"), TEAMS_YAML);
}

#[test]
fn shared_key_conflict_is_malformed() {
    let mut tree = DocumentTree::parse(TEAMS_JSON, Arc::new(JsonBackend)).expect("parse");
    let err = tree
        .set_attribute("./teams[0]", "agent", 1i64)
        .expect_err("agent is an object");
    assert_eq!(err.info().code, "doc.kind_conflict");
    assert!(matches!(err, BatchError::MalformedDocument(_)));
}

#[test]
fn nested_arrays_are_malformed() {
    let backends: [(&str, Arc<dyn FormatBackend>); 2] = [
        ("{\"m\": [[1, 2], [3]]}", Arc::new(JsonBackend)),
        ("m:\n- - 1\n  - 2\n- - 3\n", Arc::new(YamlBackend)),
    ];
    for (source, backend) in backends {
        let err = DocumentTree::parse(source, backend).expect_err(source);
        assert!(matches!(err, BatchError::MalformedDocument(_)), "{source}");
        assert_eq!(err.info().code, "doc.nested_sequence");
        assert_eq!(err.info().context.get("key").map(String::as_str), Some("m"));
    }
}

#[test]
fn unaddressable_keys_are_malformed() {
    for key in ["my key", "a/b", "x@y", "v[0]"] {
        let source = format!("{{\"{key}\": 1}}");
        let err = DocumentTree::parse(&source, Arc::new(JsonBackend)).expect_err(key);
        assert_eq!(err.info().code, "doc.key_syntax");
        assert_eq!(err.info().context.get("key").map(String::as_str), Some(key));
    }
}

#[test]
fn xml_allows_attribute_and_child_with_same_name() {
    let mut tree =
        DocumentTree::parse("<a><b/></a>", Arc::new(XmlBackend)).expect("parse");
    tree.set_attribute(".", "b", "x").expect("attr named like child");
    assert_eq!(tree.into_string().expect("write"), "<a b=\"x\"><b/></a>");
}

#[test]
fn load_infers_format_from_extension() {
    let dir = tempdir().expect("tmp dir");
    let registry = BackendRegistry::default();
    let path = dir.path().join("teams.yml");
    fs::write(&path, TEAMS_YAML).expect("write yaml");
    let tree = DocumentTree::load(&path, &registry, None).expect("load");
    assert_eq!(tree.format(), DocumentFormat::Yaml);
    assert_eq!(tree.resolve("./teams[1]@name").expect("resolve").len(), 1);

    let unknown = dir.path().join("teams.txt");
    fs::write(&unknown, TEAMS_JSON).expect("write json");
    let err = DocumentTree::load(&unknown, &registry, None).expect_err("no extension match");
    assert_eq!(err.info().code, "doc.format");
    let forced = DocumentTree::load(&unknown, &registry, Some(DocumentFormat::Json)).expect("forced");
    assert_eq!(forced.into_string().expect("write"), TEAMS_JSON);
}
