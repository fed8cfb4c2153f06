use serde_json::json;
use stencil::config::{
    find_config_file, load_config, parse_config, ForEach, TemplateEngine,
};
use stencil::error::Error;
use stencil::logger::Logger;
use stencil::options::MissingConfigAction;
use stencil::variable::VariableType;
use tempfile::TempDir;

const FULL_CONFIG: &str = r#"
variables:
  - name: Name
    description: Project name
    default: demo
  - name: Port
    type: int
    default: 8080
  - name: Flavor
    type: enum
    options: [vanilla, chocolate]
  - name: Alias
    reference: Name

dependencies:
  - name: docs
    template-url: ../docs
    output-folder: "docs/{{ __each__ }}"
    for_each: [a, b]
    variables:
      - name: Title
        default: "{{ Name }} docs"
  - name: ci
    template-url: ../ci
    output-folder: .ci
    dont-inherit-variables: true
    skip: "{{ not WithCi }}"
    for_each_reference: Targets

hooks:
  before:
    - command: echo
      args: ["{{ Name }}"]
      env:
        MODE: test
  after:
    - command: git
      args: [init]
      dir: "{{ Name }}"

partials:
  - "partials/*.html"

skip_files:
  - path: "docs/**"
    if: "{{ SkipDocs }}"
  - not_path: "src"

engines:
  - path: "*.json.expr"
    template_engine: expression
"#;

#[test]
fn test_parse_full_config() {
    let config = parse_config(FULL_CONFIG).unwrap();

    assert_eq!(config.variables.len(), 4);
    assert_eq!(config.variables[0].default, Some(json!("demo")));
    assert_eq!(config.variables[1].var_type, VariableType::Int);
    assert_eq!(config.variables[2].options, vec![json!("vanilla"), json!("chocolate")]);
    assert_eq!(config.variables[3].reference.as_deref(), Some("Name"));

    let docs = config.dependency("docs").unwrap();
    assert_eq!(docs.template_url, "../docs");
    assert_eq!(docs.for_each, Some(ForEach::List(vec![json!("a"), json!("b")])));
    assert_eq!(docs.variables[0].name, "Title");
    assert!(!docs.dont_inherit_variables);

    let ci = config.dependency("ci").unwrap();
    assert!(ci.dont_inherit_variables);
    assert_eq!(ci.for_each_reference.as_deref(), Some("Targets"));
    assert_eq!(ci.skip.as_deref(), Some("{{ not WithCi }}"));

    assert_eq!(config.hooks.before[0].env.get("MODE").map(String::as_str), Some("test"));
    assert_eq!(config.hooks.after[0].dir.as_deref(), Some("{{ Name }}"));
    assert_eq!(config.partials, vec!["partials/*.html"]);
    assert_eq!(config.skip_files[0].condition.as_deref(), Some("{{ SkipDocs }}"));
    assert_eq!(config.skip_files[1].not_path.as_deref(), Some("src"));
    assert_eq!(config.engines[0].template_engine, TemplateEngine::Expression);
}

#[test]
fn test_parse_json_config() {
    let config = parse_config(
        r#"{"variables": [{"name": "Foo", "default": "bar"}], "dependencies": []}"#,
    )
    .unwrap();
    assert_eq!(config.variable("Foo").unwrap().default, Some(json!("bar")));
}

#[test]
fn test_for_each_expression() {
    let config = parse_config(
        r#"
dependencies:
  - name: svc
    template-url: ./svc
    output-folder: "{{ __each__ }}"
    for_each: "{{ Services }}"
"#,
    )
    .unwrap();
    assert_eq!(
        config.dependencies[0].for_each,
        Some(ForEach::Expression("{{ Services }}".to_string()))
    );
}

#[test]
fn test_empty_config() {
    assert!(parse_config("").unwrap().variables.is_empty());
    assert!(parse_config("{}").unwrap().dependencies.is_empty());
}

#[test]
fn test_duplicate_names() {
    let err = parse_config("variables:\n  - name: A\n  - name: A\n").unwrap_err();
    assert!(matches!(err, Error::DuplicateVariable(name) if name == "A"));

    let err = parse_config(
        r#"
dependencies:
  - {name: d, template-url: ./a, output-folder: a}
  - {name: d, template-url: ./b, output-folder: b}
"#,
    )
    .unwrap_err();
    assert!(matches!(err, Error::DuplicateDependency(name) if name == "d"));
}

#[test]
fn test_schema_violations() {
    // dependency without output-folder
    let err = parse_config("dependencies:\n  - {name: d, template-url: ./a}\n").unwrap_err();
    assert!(matches!(err, Error::ConfigError(_)));

    let err = parse_config("variables:\n  - name: A\n    type: decimal\n").unwrap_err();
    assert!(matches!(err, Error::ConfigError(_)));

    let err = parse_config("variables: not-a-list\n").unwrap_err();
    assert!(matches!(err, Error::ConfigError(_)));
}

#[test]
fn test_invalid_engine() {
    let err = parse_config("engines:\n  - {path: '*.x', template_engine: handlebars}\n").unwrap_err();
    assert!(matches!(err, Error::InvalidTemplateEngine(id) if id == "handlebars"));
}

#[test]
fn test_skip_rule_needs_exactly_one_path() {
    let err = parse_config("skip_files:\n  - {path: a, not_path: b}\n").unwrap_err();
    assert!(matches!(err, Error::ConfigError(_)));

    let err = parse_config("skip_files:\n  - {if: 'true'}\n").unwrap_err();
    assert!(matches!(err, Error::ConfigError(_)));
}

#[test]
fn test_dependency_invariants() {
    let err = parse_config(
        "dependencies:\n  - {name: a.b, template-url: ./a, output-folder: a}\n",
    )
    .unwrap_err();
    assert!(matches!(err, Error::ConfigError(_)));

    let err = parse_config(
        "dependencies:\n  - {name: a, template-url: ./a, output-folder: a, for_each: [x], for_each_reference: Xs}\n",
    )
    .unwrap_err();
    assert!(matches!(err, Error::ConfigError(_)));
}

#[test]
fn test_enum_needs_options() {
    let err = parse_config("variables:\n  - {name: E, type: enum}\n").unwrap_err();
    assert!(matches!(err, Error::ConfigError(_)));
}

#[test]
fn test_load_config_lookup_order() {
    let dir = TempDir::new().unwrap();
    assert!(find_config_file(dir.path()).is_none());

    std::fs::write(dir.path().join("stencil.json"), r#"{"variables": [{"name": "FromJson"}]}"#)
        .unwrap();
    std::fs::write(dir.path().join("stencil.yml"), "variables:\n  - name: FromYml\n").unwrap();

    assert_eq!(find_config_file(dir.path()).unwrap(), dir.path().join("stencil.yml"));
    let logger = Logger::noop();
    let config = load_config(dir.path(), "./template", MissingConfigAction::Exit, &logger).unwrap();
    assert_eq!(config.variables[0].name, "FromYml");
}

#[test]
fn test_missing_config() {
    let dir = TempDir::new().unwrap();
    let logger = Logger::noop();

    let err = load_config(dir.path(), "./template", MissingConfigAction::Exit, &logger).unwrap_err();
    assert!(matches!(err, Error::MissingConfig { .. }));

    let config = load_config(dir.path(), "./template", MissingConfigAction::Ignore, &logger).unwrap();
    assert!(config.variables.is_empty());
}
