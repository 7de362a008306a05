#![cfg(feature = "serde")]

use hpcdb_formats::Database;
use hpcdb_testutils::write_sample_database;
use serde_json::{json, Value};

use similar_asserts::assert_eq;

type Error = Box<dyn std::error::Error>;

fn sample() -> Result<Value, Error> {
    let dir = tempfile::tempdir()?;
    write_sample_database(dir.path(), true)?;

    let db = Database::open(dir.path())?;
    Ok(serde_json::to_value(&db)?)
}

fn context(value: &Value, ctx_id: u32) -> &Value {
    value["meta"]["context"]["contexts"]
        .as_array()
        .unwrap()
        .iter()
        .find(|context| context["ctx_id"] == ctx_id)
        .unwrap()
}

#[test]
fn test_serialize_meta() -> Result<(), Error> {
    let value = sample()?;
    let meta = &value["meta"];

    assert_eq!(meta["minor_version"], 0);
    assert_eq!(meta["general"]["title"], "app");
    assert_eq!(meta["id_names"]["names"][3], "THREAD");
    assert_eq!(meta["modules"][0]["flags"], json!([]));
    assert_eq!(meta["files"][1]["flags"], json!(["COPIED"]));
    assert_eq!(meta["functions"][1]["name"], "solve");

    let entry = &meta["context"]["entry_points"][0];
    assert_eq!(entry["kind"], "MainThread");
    assert_eq!(entry["pretty_name"], "main thread");
    assert!(meta["context"].get("by_id").is_none());

    let root = context(&value, 2);
    assert_eq!(root["parent"], Value::Null);
    assert_eq!(root["relation"], "Call");
    assert_eq!(root["flags"], json!(["HAS_FUNCTION"]));

    let leaf = context(&value, 6);
    assert_eq!(leaf["lexical_type"], "Instruction");
    assert_eq!(leaf["flags"], json!(["HAS_FUNCTION", "HAS_SRCLOC", "HAS_POINT"]));

    Ok(())
}

#[test]
fn test_serialize_values() -> Result<(), Error> {
    let value = sample()?;

    assert_eq!(value["profiles"]["profiles"].as_array().map(Vec::len), Some(3));
    assert_eq!(value["profiles"]["profiles"][2]["values"]["2"]["1"], 40.0);

    let traces = &value["traces"];
    assert_eq!(traces["timestamp_range"], json!({ "min": 1000, "max": 1600 }));
    assert_eq!(traces["traces"][0]["prof_index"], 1);
    assert_eq!(
        traces["traces"][0]["line"][1],
        json!({ "timestamp": 1200, "ctx_id": 4 })
    );

    Ok(())
}
