// ABOUTME: Tests for request key construction.
// ABOUTME: Keys must be stable across param field order and nesting.

use reqwest::Method;
use serde::Serialize;
use serde_json::json;

use super::key::RequestKey;

#[test]
fn test_bare_key() {
    let key = RequestKey::bare(&Method::GET, "/meals");
    assert_eq!(key.as_str(), "GET:/meals:{}");
}

#[test]
fn test_unit_params_match_bare_key() {
    let key = RequestKey::new(&Method::GET, "/meals", &()).unwrap();
    assert_eq!(key, RequestKey::bare(&Method::GET, "/meals"));
}

#[test]
fn test_params_serialized_compactly() {
    let key = RequestKey::new(&Method::POST, "/shopping-lists", &json!({"item": "eggs", "qty": 12}))
        .unwrap();
    assert_eq!(key.as_str(), r#"POST:/shopping-lists:{"item":"eggs","qty":12}"#);
}

#[test]
fn test_field_order_does_not_change_key() {
    #[derive(Serialize)]
    struct Forward {
        date: &'static str,
        limit: u32,
    }

    #[derive(Serialize)]
    struct Backward {
        limit: u32,
        date: &'static str,
    }

    let a = RequestKey::new(&Method::GET, "/meals", &Forward { date: "2026-10-16", limit: 20 })
        .unwrap();
    let b = RequestKey::new(&Method::GET, "/meals", &Backward { limit: 20, date: "2026-10-16" })
        .unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_nested_objects_sorted() {
    let a = RequestKey::new(
        &Method::POST,
        "/analysis",
        &json!({"photo": {"w": 640, "h": 480}, "tags": [{"b": 1, "a": 2}]}),
    )
    .unwrap();
    assert_eq!(
        a.as_str(),
        r#"POST:/analysis:{"photo":{"h":480,"w":640},"tags":[{"a":2,"b":1}]}"#
    );
}

#[test]
fn test_method_and_path_distinguish_keys() {
    let get = RequestKey::bare(&Method::GET, "/meals");
    let post = RequestKey::bare(&Method::POST, "/meals");
    let other = RequestKey::bare(&Method::GET, "/questionnaires");
    assert_ne!(get, post);
    assert_ne!(get, other);
}

#[test]
fn test_key_converts_to_string() {
    let key = RequestKey::bare(&Method::DELETE, "/meals/1");
    assert_eq!(key.to_string(), "DELETE:/meals/1:{}");
    let owned: String = key.into();
    assert_eq!(owned, "DELETE:/meals/1:{}");
}
