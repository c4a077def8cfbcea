// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::ManualFixture;

use nixman::{
    aggregate, aggregate_set,
    manifest::BuildProducts,
    options::{EvalError, OptionsDocument},
    path::PublicRoot,
    write_documents, ModuleSet, NormalizedRef, Normalizer,
};

use anyhow::Result;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::BTreeMap;

fn option(type_name: &str, declaration: &str) -> Value {
    json!({
        "type": type_name,
        "default": false,
        "description": "Some option.",
        "declarations": [declaration]
    })
}

#[test]
fn disjoint_sets_stay_isolated() -> Result<()> {
    let fixture = ManualFixture::new()?;
    fixture.module("a", json!({ "options": { "a.x": option("boolean", "/build/src/a.nix") } }))?;
    fixture.module("b", json!({ "options": { "b.y": option("string", "/build/src/b.nix") } }))?;
    let sets = [
        ModuleSet::resolve(&fixture.module_set("alpha", true, &["a"]))?,
        ModuleSet::resolve(&fixture.module_set("beta", false, &["b"]))?,
    ];

    let aggregation = aggregate(&sets, &Normalizer::default());
    assert!(aggregation.is_complete());
    let documents = aggregation.documents;
    let names = |document: &OptionsDocument| document.names().map(String::from).collect::<Vec<_>>();
    assert_eq!(names(&documents["alpha"]), ["a.x"]);
    assert_eq!(names(&documents["beta"]), ["b.y"]);

    Ok(())
}

#[test]
fn failing_set_does_not_affect_other_sets() -> Result<()> {
    let fixture = ManualFixture::new()?;
    fixture.module("good", json!({ "options": { "good.enable": option("boolean", "/m/good.nix") } }))?;
    fixture.module("bad", json!({ "config": { "nowhere.enable": true } }))?;
    let good = ModuleSet::resolve(&fixture.module_set("good", true, &["good"]))?;
    let bad = ModuleSet::resolve(&fixture.module_set("bad", false, &["bad"]))?;

    let result = aggregate_set(&bad, &Normalizer::default());
    assert!(matches!(result, Err(EvalError::UndefinedOption { option, .. }) if option == "nowhere.enable"));

    let document = aggregate_set(&good, &Normalizer::default())?;
    assert_eq!(document.names().collect::<Vec<_>>(), ["good.enable"]);

    let aggregation = aggregate(&[good, bad], &Normalizer::default());
    let documents = aggregation.documents.keys().map(String::as_str).collect::<Vec<_>>();
    assert_eq!(documents, ["good"]);
    let failures = aggregation
        .failures
        .iter()
        .map(|failure| failure.set.as_str())
        .collect::<Vec<_>>();
    assert_eq!(failures, ["bad"]);

    // Healthy sets still get written.
    let written = write_documents(&aggregation.documents, fixture.output())?;
    assert_eq!(written.len(), 1);
    assert!(fixture.output().join("options/good/options.json").exists());
    assert!(!fixture.output().join("options/bad").exists());

    Ok(())
}

#[test]
fn redeclaration_merges_sites_in_module_order() -> Result<()> {
    let fixture = ManualFixture::new()?;
    fixture.module("1-base", json!({ "options": { "foo": option("boolean", "/build/src/modules/foo.nix") } }))?;
    fixture.module("2-ext", json!({ "options": { "foo": option("boolean", "/elsewhere/ext.nix") } }))?;
    let set = ModuleSet::resolve(&fixture.module_set("nixos", true, &["1-base", "2-ext"]))?;
    let normalizer = Normalizer::new(["/build/src/"], None)?;

    let document = aggregate_set(&set, &normalizer)?;
    let result = document.get("foo").map(|option| option.declarations.clone());
    let expect = vec![
        NormalizedRef::Relative("modules/foo.nix".into()),
        NormalizedRef::Unchanged("/elsewhere/ext.nix".into()),
    ];
    assert_eq!(result, Some(expect));

    Ok(())
}

#[test]
fn conflicting_types_fail_evaluation() -> Result<()> {
    let fixture = ManualFixture::new()?;
    fixture.module("1-base", json!({ "options": { "foo": option("boolean", "/m/a.nix") } }))?;
    fixture.module("2-ext", json!({ "options": { "foo": option("string", "/m/b.nix") } }))?;
    let set = ModuleSet::resolve(&fixture.module_set("nixos", true, &["1-base", "2-ext"]))?;

    let result = aggregate_set(&set, &Normalizer::default());
    assert!(matches!(result, Err(EvalError::ConflictingDeclaration { .. })));

    Ok(())
}

#[test]
fn hidden_options_are_left_out() -> Result<()> {
    let fixture = ManualFixture::new()?;
    fixture.module(
        "mixed",
        json!({
            "options": {
                "shown": option("boolean", "/m/a.nix"),
                "hidden": { "type": "boolean", "description": "x", "visible": false },
                "internal": { "type": "boolean", "description": "x", "internal": true }
            }
        }),
    )?;
    let set = ModuleSet::resolve(&fixture.module_set("nixos", true, &["mixed"]))?;

    let document = aggregate_set(&set, &Normalizer::default())?;
    assert_eq!(document.names().collect::<Vec<_>>(), ["shown"]);

    Ok(())
}

#[test]
fn missing_description_is_error_when_requested() -> Result<()> {
    let fixture = ManualFixture::new()?;
    fixture.module("bare", json!({ "options": { "bare": { "type": "boolean" } } }))?;
    let mut definition = fixture.module_set("nixos", true, &["bare"]);

    let document = aggregate_set(&ModuleSet::resolve(&definition)?, &Normalizer::default())?;
    assert_eq!(document.names().collect::<Vec<_>>(), ["bare"]);

    definition.warnings_are_errors = true;
    let result = aggregate_set(&ModuleSet::resolve(&definition)?, &Normalizer::default());
    assert!(matches!(result, Err(EvalError::Warnings(warnings)) if warnings.len() == 1));

    Ok(())
}

#[test]
fn write_documents_per_set() -> Result<()> {
    let fixture = ManualFixture::new()?;
    fixture.module("a", json!({ "options": { "services.foo.enable": option("boolean", "/build/src/modules/foo.nix") } }))?;
    fixture.module("b", json!({ "options": { "nodes": option("attrs", "/build/src/testing.nix") } }))?;
    let sets = [
        ModuleSet::resolve(&fixture.module_set("nixos", true, &["a"]))?,
        ModuleSet::resolve(&fixture.module_set("nixos-test", false, &["b"]))?,
    ];
    let normalizer = Normalizer::new(
        Vec::<String>::new(),
        Some(PublicRoot {
            root: "/build/src/".into(),
            url: "https://github.com/NixOS/nixpkgs/blob/master/{sub}".parse()?,
        }),
    )?;

    let aggregation = aggregate(&sets, &normalizer);
    let written = write_documents(&aggregation.documents, fixture.output())?;

    let expect = BTreeMap::from([
        ("nixos".to_string(), fixture.output().join("options/nixos/options.json")),
        ("nixos-test".to_string(), fixture.output().join("options/nixos-test/options.json")),
    ]);
    assert_eq!(written, expect);
    assert!(fixture.output().join("options/nixos/options.xml").exists());
    assert!(!fixture.output().join("options/nixos-test/options.xml").exists());

    let json: Value = serde_json::from_str(&fixture.read("result/options/nixos/options.json")?)?;
    assert_eq!(
        json["services.foo.enable"]["declarations"],
        json!([{
            "url": "https://github.com/NixOS/nixpkgs/blob/master/modules/foo.nix",
            "name": "modules/foo.nix"
        }])
    );

    let products = BuildProducts::open(fixture.output().join("options/nixos"))?.products()?;
    assert_eq!(products.len(), 1);
    assert_eq!(products[0].kind, "file");
    assert_eq!(products[0].label, "json");
    assert_eq!(products[0].path, expect["nixos"]);

    Ok(())
}
