mod common;

use common::{renderer, write_tree};
use serde_json::json;
use stencil::config::{EngineRule, SkipFile, TemplateEngine};
use stencil::error::Error;
use stencil::options::MissingKeyAction;
use stencil::renderer::Vars;
use stencil::selector::{
    engine_for, expand_glob, select_engines, select_skips, should_skip, SkipKind,
};
use tempfile::TempDir;

fn tree() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_tree(
        dir.path(),
        &[
            ("README.md", "readme"),
            ("main.go", "package main"),
            ("docs/guide.md", "guide"),
            ("docs/api/index.md", "api"),
            ("config/app.json.expr", "{}"),
        ],
    );
    dir
}

fn vars() -> Vars {
    let mut vars = Vars::new();
    vars.insert("WithDocs".into(), json!(false));
    vars.insert("DocsDir".into(), json!("docs"));
    vars
}

fn path_rule(path: &str, condition: Option<&str>) -> SkipFile {
    SkipFile { path: Some(path.into()), not_path: None, condition: condition.map(String::from) }
}

#[test]
fn test_expand_glob() {
    let dir = tree();
    let relative = |pattern: &str| -> Vec<String> {
        expand_glob(dir.path(), pattern)
            .unwrap()
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().display().to_string())
            .collect()
    };

    assert_eq!(relative("*.md"), vec!["README.md"]);
    assert_eq!(relative("docs/*.md"), vec!["docs/guide.md"]);
    assert_eq!(relative("docs/**/*.md"), vec!["docs/api/index.md", "docs/guide.md"]);
    assert_eq!(relative("main.go"), vec!["main.go"]);
    assert!(relative("missing.txt").is_empty());
    assert!(relative("nowhere/*.md").is_empty());
}

#[test]
fn test_invalid_glob() {
    let dir = tree();
    assert!(matches!(expand_glob(dir.path(), "docs/[.md"), Err(Error::GlobError { .. })));
}

#[test]
fn test_path_rule_without_condition_always_skips() {
    let dir = tree();
    let r = renderer(dir.path(), MissingKeyAction::Error);
    let skips = select_skips(&[path_rule("README.md", None)], &r, &vars(), dir.path()).unwrap();

    assert_eq!(skips[0].kind, SkipKind::Path);
    assert!(skips[0].active);
    assert!(should_skip("README.md", &skips));
    assert!(!should_skip("main.go", &skips));
}

#[test]
fn test_path_rule_condition() {
    let dir = tree();
    let r = renderer(dir.path(), MissingKeyAction::Error);
    let rules = vec![
        path_rule("{{ DocsDir }}", Some("{{ not WithDocs }}")),
        path_rule("main.go", Some("{{ WithDocs }}")),
        path_rule("README.md", Some("yes")),
    ];
    let skips = select_skips(&rules, &r, &vars(), dir.path()).unwrap();

    assert!(should_skip("docs", &skips));
    assert!(!should_skip("main.go", &skips));
    assert!(!should_skip("README.md", &skips));
}

#[test]
fn test_not_path_rule() {
    let dir = tree();
    let r = renderer(dir.path(), MissingKeyAction::Error);
    let rules = vec![SkipFile {
        path: None,
        not_path: Some("docs/**/*.md".into()),
        condition: None,
    }];
    let skips = select_skips(&rules, &r, &vars(), dir.path()).unwrap();

    assert!(!should_skip("docs", &skips));
    assert!(!should_skip("docs/api", &skips));
    assert!(!should_skip("docs/guide.md", &skips));
    assert!(!should_skip("docs/api/index.md", &skips));
    assert!(should_skip("README.md", &skips));
    assert!(should_skip("main.go", &skips));
    assert!(should_skip("config", &skips));
}

#[test]
fn test_inactive_not_path_rule() {
    let dir = tree();
    let r = renderer(dir.path(), MissingKeyAction::Error);
    let rules = vec![SkipFile {
        path: None,
        not_path: Some("docs".into()),
        condition: Some("{{ WithDocs }}".into()),
    }];
    let skips = select_skips(&rules, &r, &vars(), dir.path()).unwrap();
    assert!(!should_skip("main.go", &skips));
}

#[test]
fn test_skip_rule_with_both_paths_is_rejected() {
    let dir = tree();
    let r = renderer(dir.path(), MissingKeyAction::Error);
    let rules = vec![SkipFile {
        path: Some("a".into()),
        not_path: Some("b".into()),
        condition: None,
    }];
    assert!(matches!(select_skips(&rules, &r, &vars(), dir.path()), Err(Error::ConfigError(_))));
}

#[test]
fn test_engines() {
    let dir = tree();
    let r = renderer(dir.path(), MissingKeyAction::Error);
    let rules = vec![
        EngineRule { path: "config/*.expr".into(), template_engine: TemplateEngine::Expression },
        EngineRule { path: "**/*.expr".into(), template_engine: TemplateEngine::Jinja },
    ];
    let engines = select_engines(&rules, &r, &vars(), dir.path()).unwrap();

    assert_eq!(engine_for("config/app.json.expr", &engines), TemplateEngine::Expression);
    assert_eq!(engine_for("main.go", &engines), TemplateEngine::Jinja);
}
