//! Integration tests for attrmodel

use attrmodel::{
    ArrayModel, ChangeEvent, Key, LengthRule, Model, ModelError, Rule, Scope, Tracker,
    Validations, Value,
};
use serde_json::{json, Value as JsonValue};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

fn counting() -> (Arc<AtomicUsize>, impl Fn(&ChangeEvent) + Send + Sync + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let count_clone = count.clone();
    (count, move |_: &ChangeEvent| {
        count_clone.fetch_add(1, Ordering::SeqCst);
    })
}

#[test]
fn end_to_end_record_lifecycle() {
    let m = Model::new(json!({})).with_validations(
        Validations::from_json(json!({ "name": { "length": 5 } })).unwrap(),
    );
    let (broad, on_change) = counting();
    let _listener = m.on_change(on_change);

    m.set("name", "Alice").unwrap();
    assert_eq!(m.get("name").as_str(), Some("Alice"));
    assert!(m.get("age").is_nil());
    assert!(m.errors().is_empty());

    m.set_validations(Validations::new().validate("name", Rule::Length(LengthRule::at_least(6))));
    assert_eq!(
        m.errors().get("name"),
        Some(&vec!["must be at least 6 characters".to_string()])
    );

    m.delete("name").unwrap();
    assert!(m.get("name").is_nil());

    // Validation rule changes only reach the error views.
    assert_eq!(broad.load(Ordering::SeqCst), 2);
}

#[test]
fn scoped_listener_ignores_unrelated_keys() {
    let m = Model::new(json!({ "name": "Ada", "age": 36 }));
    let (scoped, on_name) = counting();
    let (broad, on_any) = counting();
    let _scoped = m.on_attribute("name", on_name);
    let _broad = m.on_change(on_any);

    m.set("age", 37).unwrap();
    assert_eq!(scoped.load(Ordering::SeqCst), 0);
    assert_eq!(broad.load(Ordering::SeqCst), 1);

    m.set("name", "Grace").unwrap();
    assert_eq!(scoped.load(Ordering::SeqCst), 1);
    assert_eq!(broad.load(Ordering::SeqCst), 2);
}

#[test]
fn absent_root_materializes_on_deep_write() {
    let r = Model::new(JsonValue::Null);
    assert!(r.is_nil());

    r.get("a").set("b", 1).unwrap();

    assert!(r.get("a").as_model().unwrap().len().is_ok());
    assert_eq!(r.get("a").get("b"), Value::Int(1));
    assert!(r.get("a").get("b").get("c").is_nil());
    assert_eq!(r, json!({ "a": { "b": 1 } }));
}

#[test]
fn forcing_a_chain_reports_the_failed_access() {
    let r = Model::new(JsonValue::Null);
    let chained = r.get("profile").get("email");

    assert!(chained.is_false());
    match chained.force() {
        Err(ModelError::UndefinedAccess(access)) => {
            assert_eq!(access.member(), "email");
            assert_eq!(access.target(), "<Model:profile nil>");
        }
        other => panic!("expected a captured access, got {other:?}"),
    }
}

#[test]
fn observers_follow_what_they_read() {
    let tracker = Tracker::new();
    let form = Model::with_tracker(json!({ "first": "Ada", "last": "Lovelace", "shown": "first" }), &tracker);
    let rendered = Arc::new(Mutex::new(Vec::new()));

    let observer = tracker.observe({
        let form = form.clone();
        let rendered = rendered.clone();
        move || {
            let field = form.get("shown").as_str().unwrap_or("first").to_string();
            let text = form.get(&field).as_str().unwrap_or_default().to_string();
            rendered.lock().unwrap().push(text);
        }
    });
    assert_eq!(observer.dependency_count(), 2);

    form.set("last", "Byron").unwrap();
    assert_eq!(rendered.lock().unwrap().len(), 1);

    form.set("shown", "last").unwrap();
    form.set("last", "King").unwrap();
    form.set("first", "Augusta").unwrap();

    assert_eq!(
        *rendered.lock().unwrap(),
        vec!["Ada".to_string(), "Byron".to_string(), "King".to_string()]
    );

    drop(observer);
    form.set("last", "Noel").unwrap();
    assert_eq!(rendered.lock().unwrap().len(), 3);
}

#[test]
fn marked_errors_track_field_marking() {
    let form = Model::new(json!({ "name": "Al", "email": "" })).with_validations(
        Validations::from_json(json!({
            "name": { "length": { "minimum": 3, "maximum": 20 } },
            "email": { "presence": true },
        }))
        .unwrap(),
    );
    let views = Arc::new(Mutex::new(Vec::new()));

    let _observer = form.observe({
        let form = form.clone();
        let views = views.clone();
        move || {
            let marked: Vec<String> = form.marked_errors().into_keys().collect();
            views.lock().unwrap().push(marked);
        }
    });

    assert_eq!(form.errors().len(), 2);

    form.mark_field("name");
    form.set("name", "Alan").unwrap();
    form.mark_field("email");
    form.exclude_from_errors("email");

    let views = views.lock().unwrap();
    assert_eq!(views[0], Vec::<String>::new());
    assert_eq!(views[1], vec!["name".to_string()]);
    assert_eq!(views[2], Vec::<String>::new());
    assert_eq!(views[3], vec!["email".to_string()]);
    assert_eq!(views[4], Vec::<String>::new());
}

#[test]
fn nested_arrays_relay_to_the_root() {
    let root = Model::new(json!({ "todos": [{ "title": "write", "done": false }] }));
    let events = Arc::new(Mutex::new(Vec::new()));
    let _log = root.on_change({
        let events = events.clone();
        move |event: &ChangeEvent| events.lock().unwrap().push(event.clone())
    });

    root.get("todos")
        .as_array()
        .unwrap()
        .get(0)
        .set("done", true)
        .unwrap();

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].key(), Some(&Key::from("todos")));
    assert_eq!(events[0].args(), &[Value::Int(0), Value::from("done")]);
    assert_eq!(root.to_json()["todos"][0]["done"], json!(true));
}

#[test]
fn append_builds_sequences_under_absent_parents() {
    let root = Model::new(JsonValue::Null);
    let (count, on_change) = counting();
    let _reg = root.subscribe(Scope::All, on_change);

    let tags = root.get("post").get("tags").append("rust").unwrap();
    tags.push("models").unwrap();

    assert_eq!(root.to_json(), json!({ "post": { "tags": ["rust", "models"] } }));
    assert!(count.load(Ordering::SeqCst) > 0);

    let standalone = ArrayModel::new();
    assert!(standalone.is_empty());
}

#[test]
fn registrations_release_on_drop() {
    let m = Model::new(json!({}));
    let (count, on_change) = counting();

    let registration = m.on_change(on_change);
    assert!(registration.is_active());
    m.set("a", 1).unwrap();

    registration.remove();
    m.set("a", 2).unwrap();

    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(m.tracker().listener_count(m.id()), 0);
}
