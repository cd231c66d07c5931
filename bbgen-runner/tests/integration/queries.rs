// Copyright (c) The bbgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::{TempCheckout, settings};
use bbgen_runner::{
    errors::QueryError,
    generate::Generator,
    query::{Query, QueryRunner},
};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

fn run_query(query: &str) -> Result<Value, QueryError> {
    let checkout = TempCheckout::new();
    let config = checkout.load();
    let settings = settings();
    let generator = Generator::new(&config)?;
    QueryRunner::new(&generator, &settings.query).run(&Query::parse(query)?)
}

#[test]
fn bot_queries() {
    let bots = run_query("bots").expect("query succeeds");
    let names: Vec<_> = bots
        .as_object()
        .map(|bots| bots.keys().cloned().collect())
        .unwrap_or_default();
    assert_eq!(names, ["Linux Tests", "Linux Tests (dbg)", "Mac Tests"]);
    assert!(
        bots["Linux Tests"].get("AAAAA1 AUTOGENERATED FILE DO NOT EDIT").is_none(),
        "query output has no sentinels"
    );

    let tests = run_query("bot/Linux Tests (dbg)/tests").expect("query succeeds");
    assert_eq!(tests.as_array().map(Vec::len), Some(1));
    assert_eq!(tests[0]["name"], json!("base_unittests"));

    assert!(matches!(
        run_query("bot/Win Tests"),
        Err(QueryError::UnknownBot(bot)) if bot == "Win Tests"
    ));
}

#[test]
fn test_queries() {
    let bots = run_query("test/url_unittests/bots").expect("query succeeds");
    assert_eq!(bots, json!(["Linux Tests"]));

    let expanded = run_query("test/webgpu_cts_tests").expect("query succeeds");
    assert_eq!(
        expanded
            .as_array()
            .map(|tests| tests.iter().map(|test| test["name"].clone()).collect::<Vec<_>>()),
        Some(vec![
            json!("webgpu_cts_tests vulkan"),
            json!("webgpu_cts_tests swiftshader"),
        ])
    );

    let matching = run_query("tests/--verbose").expect("query succeeds");
    assert_eq!(matching, json!(["url_unittests"]));

    assert!(matches!(
        run_query("tests/a:b:c"),
        Err(QueryError::Malformed { .. })
    ));
}
