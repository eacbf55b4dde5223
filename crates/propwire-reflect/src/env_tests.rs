use indoc::indoc;

use crate::{Environment, ReflectError};

#[test]
fn defaults_to_editor_build() {
    let env = Environment::default();
    assert!(env.editor);
    assert!(!env.console);
    assert!(!env.filter_editor_only);
    assert!(env.loads_editor_only());
}

#[test]
fn console_never_loads_editor_only() {
    let env = Environment::new().console(true);
    assert!(!env.loads_editor_only());

    let env = Environment::new().editor(false);
    assert!(!env.loads_editor_only());
}

#[test]
fn json_fields_are_optional() {
    let env = Environment::from_json(r#"{"console": true}"#).unwrap();
    assert_eq!(env, Environment::new().console(true));

    let env = Environment::from_json("{}").unwrap();
    assert_eq!(env, Environment::new());
}

#[test]
fn stripped_console_build() {
    let env = Environment::from_json(indoc! {r#"
        {
          "editor": false,
          "console": true,
          "filter_editor_only": true
        }
    "#})
    .unwrap();
    assert_eq!(env, Environment::new().editor(false).console(true).filter_editor_only(true));
    assert!(!env.loads_editor_only());
}

#[test]
fn json_roundtrip() {
    let env = Environment::new().editor(false).filter_editor_only(true);
    let text = env.to_json().unwrap();
    insta::assert_snapshot!(text, @r#"{"editor":false,"console":false,"filter_editor_only":true}"#);
    assert_eq!(Environment::from_json(&text).unwrap(), env);
}

#[test]
fn malformed_json_is_a_config_error() {
    let err = Environment::from_json(r#"{"editor": 1}"#).unwrap_err();
    assert!(matches!(err, ReflectError::Config(_)));
}
