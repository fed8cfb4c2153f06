mod common;

use common::{renderer, write_tree};
use serde_json::json;
use stencil::error::Error;
use stencil::logger::Logger;
use stencil::options::MissingKeyAction;
use stencil::renderer::{
    MiniJinjaRenderer, RenderSettings, TemplateRenderer, Vars, MAX_RENDER_ATTEMPTS, NO_VALUE_MARKER,
};
use tempfile::TempDir;

fn vars(pairs: &[(&str, serde_json::Value)]) -> Vars {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

#[test]
fn test_hello_foo() {
    let dir = TempDir::new().unwrap();
    let r = renderer(dir.path(), MissingKeyAction::Error);
    let out = r.render_to_fixed_point("t", "Hello {{ Foo }}", &vars(&[("Foo", json!("bar"))])).unwrap();
    assert_eq!(out, "Hello bar");
}

#[test]
fn test_text_without_placeholders_is_unchanged() {
    let dir = TempDir::new().unwrap();
    let r = renderer(dir.path(), MissingKeyAction::Error);
    let text = "plain text\n  with indentation and <html> & symbols\n\n";
    assert_eq!(r.render_to_fixed_point("t", text, &Vars::new()).unwrap(), text);
}

#[test]
fn test_fixed_point_expands_nested_values() {
    let dir = TempDir::new().unwrap();
    let r = renderer(dir.path(), MissingKeyAction::Error);
    let vars = vars(&[
        ("Outer", json!("[{{ Inner }}]")),
        ("Inner", json!("<{{ Leaf }}>")),
        ("Leaf", json!("x")),
    ]);

    assert_eq!(r.render("t", "{{ Outer }}", &vars).unwrap(), "[{{ Inner }}]");
    let out = r.render_to_fixed_point("t", "{{ Outer }}", &vars).unwrap();
    assert_eq!(out, "[<x>]");
    assert_eq!(r.render_to_fixed_point("t", &out, &vars).unwrap(), out);
}

#[test]
fn test_self_expanding_value_is_an_infinite_loop() {
    let dir = TempDir::new().unwrap();
    let r = renderer(dir.path(), MissingKeyAction::Error);
    let vars = vars(&[("Grow", json!("{{ Grow }}+"))]);

    match r.render_to_fixed_point("grow.txt", "{{ Grow }}", &vars) {
        Err(Error::InfiniteLoopSuspected { path, iterations, .. }) => {
            assert_eq!(path, "grow.txt");
            assert_eq!(iterations, MAX_RENDER_ATTEMPTS);
        }
        other => panic!("expected InfiniteLoopSuspected, got {other:?}"),
    }
}

#[test]
fn test_missing_key_policies() {
    let dir = TempDir::new().unwrap();

    let r = renderer(dir.path(), MissingKeyAction::Error);
    assert!(matches!(
        r.render_to_fixed_point("t", "{{ Foo }}", &Vars::new()),
        Err(Error::RenderError { .. })
    ));

    let r = renderer(dir.path(), MissingKeyAction::Invalid);
    assert_eq!(r.render_to_fixed_point("t", "[{{ Foo }}]", &Vars::new()).unwrap(), format!("[{NO_VALUE_MARKER}]"));

    let r = renderer(dir.path(), MissingKeyAction::Zero);
    assert_eq!(r.render_to_fixed_point("t", "[{{ Foo }}]", &Vars::new()).unwrap(), "[]");
}

#[test]
fn test_syntax_error_names_the_template() {
    let dir = TempDir::new().unwrap();
    let r = renderer(dir.path(), MissingKeyAction::Error);
    match r.render("broken.txt", "{{ unclosed", &Vars::new()) {
        Err(Error::RenderError { path, .. }) => assert_eq!(path, "broken.txt"),
        other => panic!("expected RenderError, got {other:?}"),
    }
}

#[test]
fn test_case_and_string_filters() {
    let dir = TempDir::new().unwrap();
    let r = renderer(dir.path(), MissingKeyAction::Error);
    let vars = vars(&[("Name", json!("my_cool-project"))]);

    let render = |t: &str| r.render("t", t, &vars).unwrap();
    assert_eq!(render("{{ 'MyProject' | dasherize }}"), "my-project");
    assert_eq!(render("{{ 'MyProject' | snake_case }}"), "my_project");
    assert_eq!(render("{{ 'my_project' | camel_case }}"), "MyProject");
    assert_eq!(render("{{ 'my_project' | pascal_case }}"), "MyProject");
    assert_eq!(render("{{ 'my_project' | camel_case_lower }}"), "myProject");
    assert_eq!(render("{{ 'a-b-c' | replace_one('-', '+') }}"), "a+b-c");
    assert_eq!(render("{{ 'v1.2' | trim_prefix('v') }}"), "1.2");
    assert_eq!(render("{{ 'main.rs' | trim_suffix('.rs') }}"), "main");
}

#[test]
fn test_numeric_functions() {
    let dir = TempDir::new().unwrap();
    let r = renderer(dir.path(), MissingKeyAction::Error);
    let render = |t: &str| r.render("t", t, &Vars::new());

    assert_eq!(render("{{ plus(1, 2) }}").unwrap(), "3");
    assert_eq!(render("{{ minus('10', 4) }}").unwrap(), "6");
    assert_eq!(render("{{ times(2.5, 2) }}").unwrap(), "5");
    assert_eq!(render("{{ divide(7, 2) }}").unwrap(), "3.5");
    assert!(render("{{ divide(1, 0) }}").is_err());
    assert_eq!(render("{{ round_int(2.6) }}").unwrap(), "3");
    assert_eq!(render("{{ ceil_int(2.1) }}").unwrap(), "3");
    assert_eq!(render("{{ floor_int(2.9) }}").unwrap(), "2");
    assert_eq!(render("{{ num_range(0, 6, 2) | join(',') }}").unwrap(), "0,2,4");
}

#[test]
fn test_keys_sorted() {
    let dir = TempDir::new().unwrap();
    let r = renderer(dir.path(), MissingKeyAction::Error);
    let vars = vars(&[("Map", json!({"b": 1, "a": 2, "c": 3}))]);
    assert_eq!(r.render("t", "{{ keys_sorted(Map) | join(' ') }}", &vars).unwrap(), "a b c");
}

#[test]
fn test_shell_disabled_placeholder() {
    let dir = TempDir::new().unwrap();
    let r = renderer(dir.path(), MissingKeyAction::Error);
    assert_eq!(r.render("t", "{{ shell('echo', 'hi') }}", &Vars::new()).unwrap(), "replace-me");
}

#[test_log::test]
fn test_renderer_logs_in_the_unit_scope() {
    let dir = TempDir::new().unwrap();
    write_tree(dir.path(), &[("partials/footer.txt", "-- {{ Name }}")]);
    let mut r = MiniJinjaRenderer::with_logger(
        RenderSettings {
            template_folder: dir.path().to_path_buf(),
            output_folder: dir.path().join("out"),
            missing_key_action: MissingKeyAction::Error,
            disable_shell: true,
        },
        Logger::new().child("docs", Some("a")),
    );

    assert_eq!(r.logger().scope(), "root/docs[a]");
    r.add_partials(&["partials/*".to_string()], &Vars::new()).unwrap();
    assert!(r.is_defined("footer.txt"));
    assert_eq!(r.render("t", "{{ shell('echo', 'hi') }}", &Vars::new()).unwrap(), "replace-me");
}

#[test]
fn test_shell_runs_in_template_folder() {
    let dir = TempDir::new().unwrap();
    let r = MiniJinjaRenderer::new(RenderSettings {
        template_folder: dir.path().to_path_buf(),
        output_folder: dir.path().join("out"),
        missing_key_action: MissingKeyAction::Error,
        disable_shell: false,
    });
    write_tree(dir.path(), &[("marker.txt", "")]);

    let out = r
        .render("t", "{{ shell('sh', '-c', 'ls marker.txt && echo $GREETING', 'ENV:GREETING=hi') }}", &Vars::new())
        .unwrap();
    assert_eq!(out, "marker.txt\nhi");
}

#[test]
fn test_file_helpers() {
    let dir = TempDir::new().unwrap();
    write_tree(
        dir.path(),
        &[
            ("docs/example.rs", "fn a() {}\n// stencil-snippet: body\nlet x = 1;\n// stencil-snippet: body\n"),
            ("parts/header.txt", "Header for {{ name }}"),
        ],
    );
    let r = renderer(dir.path(), MissingKeyAction::Error);
    let vars = vars(&[("Name", json!("demo"))]);

    assert_eq!(r.render("t", "{{ path_exists('docs/example.rs') }}", &vars).unwrap(), "true");
    assert_eq!(r.render("t", "{{ path_exists('docs/missing.rs') }}", &vars).unwrap(), "false");
    assert_eq!(
        r.render("t", "{{ snippet('docs/example.rs', 'body') }}", &vars).unwrap(),
        "let x = 1;"
    );
    assert_eq!(
        r.render("t", "{{ render_file('parts/header.txt', {'name': Name}) }}", &vars).unwrap(),
        "Header for demo"
    );
    assert_eq!(
        r.render("t", "{{ template_folder() }}", &vars).unwrap(),
        std::path::absolute(dir.path()).unwrap().display().to_string()
    );
}

#[test]
fn test_partials() {
    let dir = TempDir::new().unwrap();
    write_tree(
        dir.path(),
        &[
            ("partials/macros.jinja", "{% macro greet(who) %}Hi {{ who }}{% endmacro %}"),
            ("partials/footer.txt", "-- {{ Name }}"),
        ],
    );
    let mut r = renderer(dir.path(), MissingKeyAction::Error);
    let vars = vars(&[("Dir", json!("partials")), ("Name", json!("demo"))]);
    r.add_partials(&["{{ Dir }}/*".to_string()], &vars).unwrap();

    assert!(r.is_defined("footer.txt"));
    assert!(!r.is_defined("missing.txt"));
    assert_eq!(r.render("t", "{% include 'footer.txt' %}", &vars).unwrap(), "-- demo");
    assert_eq!(
        r.render("t", "{% import 'macros.jinja' as m %}{{ m.greet(Name) }}", &vars).unwrap(),
        "Hi demo"
    );
    assert_eq!(r.render("t", "{{ template_is_defined('footer.txt') }}", &vars).unwrap(), "true");
}

#[test]
fn test_evaluate_condition() {
    let dir = TempDir::new().unwrap();
    let r = renderer(dir.path(), MissingKeyAction::Error);
    let vars = vars(&[("Flag", json!(true)), ("Other", json!("yes"))]);

    assert!(r.evaluate_condition("t", "{{ Flag }}", &vars).unwrap());
    assert!(r.evaluate_condition("t", "true", &vars).unwrap());
    assert!(!r.evaluate_condition("t", "{{ Other }}", &vars).unwrap());
    assert!(!r.evaluate_condition("t", "{{ not Flag }}", &vars).unwrap());
}

#[test]
fn test_expression_engine() {
    let dir = TempDir::new().unwrap();
    let r = renderer(dir.path(), MissingKeyAction::Error);
    let vars = vars(&[("Name", json!("api")), ("Replicas", json!(3))]);

    let out = r
        .render_expression(
            &dir.path().join("deploy.json.expr"),
            "{'name': vars.Name, 'replicas': vars.Replicas}\n",
            &vars,
        )
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(parsed, json!({"name": "api", "replicas": 3}));
    assert!(out.ends_with('\n'));
}
