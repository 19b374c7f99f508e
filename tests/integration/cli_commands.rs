#![allow(missing_docs)]

use std::fs;
use std::path::PathBuf;

use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use tempfile::TempDir;

const SITE: &str = r#"
[[tables]]
name = "articles"
csv = "articles.csv"

[[tables.fields]]
name = "id"
type = "integer"

[[tables.fields]]
name = "title"
type = "string"
title = "Title"

[[views]]
id = "articles"
base_table = "articles"

[views.displays.page_1]
plugin = "page"
options = { path = "articles", title = "Article %1" }

[[views.displays.page_1.handlers]]
type = "argument"
plugin = "numeric"
field = "articles.id"

[[views.displays.page_1.handlers]]
type = "field"
plugin = "standard"
field = "articles.title"

[[views.displays.page_1.handlers]]
type = "sort"
plugin = "standard"
field = "articles.id"

[[views]]
id = "broken"
base_table = "nowhere"

[views.displays.block_1]
plugin = "block"
"#;

const ARTICLES: &str = "id,title\n1,First post\n2,Second post\n3,Third post\n";

fn setup_site() -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("tempdir");
    let site = dir.path().join("site.toml");
    fs::write(&site, SITE).expect("write site");
    fs::write(dir.path().join("articles.csv"), ARTICLES).expect("write csv");
    (dir, site)
}

#[test]
fn run_json_reports_status_rows_and_title() {
    let (_dir, site) = setup_site();
    let output = cargo_bin_cmd!("viewkit")
        .args(["--format", "json", "run", "--site"])
        .arg(&site)
        .args(["articles", "page_1", "--path", "articles/2"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: Value = serde_json::from_slice(&output).expect("valid json");
    assert_eq!(json["status"], "ok");
    assert_eq!(json["rows"], 1);
    assert_eq!(json["title"], "Article 2");
    assert_eq!(json["arguments"][0]["source"], "path");
}

#[test]
fn run_html_prints_escaped_markup() {
    let (_dir, site) = setup_site();
    let output = cargo_bin_cmd!("viewkit")
        .args(["--format", "html", "run", "--site"])
        .arg(&site)
        .args(["articles", "page_1", "--path", "articles/all"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let html = String::from_utf8(output).expect("utf8");
    assert!(html.starts_with("<div class=\"view view-articles view-display-page-1"));
    assert!(html.contains("First post"));
    assert!(html.contains("Third post"));
}

#[test]
fn explain_prints_the_compiled_query() {
    let (_dir, site) = setup_site();
    let output = cargo_bin_cmd!("viewkit")
        .args(["--theme", "plain", "explain", "--site"])
        .arg(&site)
        .args(["articles", "page_1", "--path", "articles/3"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).expect("utf8");
    assert!(text.contains("WHERE articles.id = 3 ORDER BY articles.id ASC"), "{text}");
}

#[test]
fn analyze_exits_with_two_on_errors() {
    let (_dir, site) = setup_site();
    let output = cargo_bin_cmd!("viewkit")
        .args(["--format", "json", "analyze", "--site"])
        .arg(&site)
        .arg("broken")
        .assert()
        .code(2)
        .get_output()
        .stdout
        .clone();
    let json: Value = serde_json::from_slice(&output).expect("valid json");
    let messages: Vec<&str> = json
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|d| d["message"].as_str())
        .collect();
    assert!(messages.contains(&"unknown base table 'nowhere'"), "{messages:?}");
}

#[test]
fn analyze_clean_view_succeeds() {
    let (_dir, site) = setup_site();
    cargo_bin_cmd!("viewkit")
        .args(["--theme", "plain", "analyze", "--site"])
        .arg(&site)
        .arg("articles")
        .assert()
        .success();
}

#[test]
fn unknown_view_is_an_error() {
    let (_dir, site) = setup_site();
    cargo_bin_cmd!("viewkit")
        .args(["run", "--site"])
        .arg(&site)
        .args(["missing", "page_1"])
        .assert()
        .failure()
        .code(1);
}

#[test]
fn plugins_json_lists_builtins_by_type() {
    let output = cargo_bin_cmd!("viewkit")
        .args(["--format", "json", "plugins", "--type", "style"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: Value = serde_json::from_slice(&output).expect("valid json");
    let rows = json.as_array().expect("array");
    assert!(!rows.is_empty());
    assert!(rows.iter().all(|row| row["type"] == "style"));
    assert!(rows.iter().any(|row| row["id"] == "list"));
}
