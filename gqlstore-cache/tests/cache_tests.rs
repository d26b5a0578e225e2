//! End-to-end tests for the cache engine: writes, reads through record
//! handles, and subscription bookkeeping across link changes.

use gqlstore_cache::{Cache, CacheConfig, FieldValue, RecordId, Selection, TypeInfo, Variables};
use gqlstore_core::{CacheError, PayloadError};
use gqlstore_test_utils::assertions::{
    assert_no_subscribers, assert_payload_error, assert_subscriber_count,
};
use gqlstore_test_utils::fixtures::{
    friends_selection, response_type_info, seeded_cache, user, vars, viewer_selection,
};
use gqlstore_test_utils::{init_tracing, SetRecorder};
use serde_json::json;

fn write(cache: &mut Cache, payload: serde_json::Value) {
    cache
        .write(&response_type_info(), &payload, &Variables::new())
        .expect("payload is an object");
}

fn jane_and_mary(cache: &mut Cache) {
    write(
        cache,
        json!({
            "viewer": {
                "id": "1",
                "friends": [
                    {"id": "2", "firstName": "jane"},
                    {"id": "3", "firstName": "mary"},
                ],
            }
        }),
    );
}

// ============================================================================
// WRITES
// ============================================================================

#[test]
fn save_root_object() {
    init_tracing();
    let mut cache = Cache::new();
    let data = json!({"viewer": {"id": "1", "firstName": "bob"}});
    write(&mut cache, data.clone());

    let fields = cache.record("User", &data["viewer"]).fields();
    assert_eq!(serde_json::Value::Object(fields), json!({"firstName": "bob"}));
}

#[test]
fn partial_update_existing_record() {
    let mut cache = Cache::new();
    write(&mut cache, json!({"viewer": {"id": "1", "firstName": "bob"}}));
    write(&mut cache, json!({"viewer": {"id": "1", "lastName": "geldof"}}));

    let fields = cache.record("User", &json!({"id": "1"})).fields();
    assert_eq!(
        serde_json::Value::Object(fields),
        json!({"firstName": "bob", "lastName": "geldof"})
    );
}

#[test]
fn linked_records_with_updates() {
    let mut cache = Cache::new();
    write(
        &mut cache,
        json!({
            "viewer": {
                "id": "1",
                "firstName": "bob",
                "parent": {"id": "2", "firstName": "jane"},
            }
        }),
    );

    let user1 = cache.get(&user("1"));
    assert_eq!(serde_json::Value::Object(user1.fields()), json!({"firstName": "bob"}));
    let parent = user1.linked_record("parent").expect("user 1 has a parent");
    assert_eq!(serde_json::Value::Object(parent.fields()), json!({"firstName": "jane"}));

    let user2 = cache.get(&user("2"));
    assert_eq!(serde_json::Value::Object(user2.fields()), json!({"firstName": "jane"}));
    assert!(user2.linked_record("parent").is_none());

    write(
        &mut cache,
        json!({
            "viewer": {
                "id": "2",
                "firstName": "jane-prime",
                "parent": {"id": "3", "firstName": "mary"},
            }
        }),
    );

    let user2 = cache.get(&user("2"));
    assert_eq!(
        serde_json::Value::Object(user2.fields()),
        json!({"firstName": "jane-prime"})
    );
    let parent = user2.linked_record("parent").expect("user 2 has a parent");
    assert_eq!(parent.id(), &user("3"));
    assert_eq!(serde_json::Value::Object(parent.fields()), json!({"firstName": "mary"}));
}

#[test]
fn linked_lists() {
    let mut cache = Cache::new();
    write(
        &mut cache,
        json!({
            "viewer": {
                "id": "1",
                "firstName": "bob",
                "friends": [
                    {"id": "2", "firstName": "jane"},
                    {"id": "3", "firstName": "mary"},
                ],
            }
        }),
    );

    let friends: Vec<serde_json::Value> = cache
        .get(&user("1"))
        .linked_list("friends")
        .into_iter()
        .map(|friend| serde_json::Value::Object(friend.expect("no null entries").fields()))
        .collect();
    assert_eq!(
        friends,
        vec![json!({"firstName": "jane"}), json!({"firstName": "mary"})]
    );
}

#[test]
fn list_as_value_with_args() {
    let mut cache = Cache::new();
    write(
        &mut cache,
        json!({
            "viewer": {
                "id": "1",
                "firstName": "bob",
                "favoriteColors": ["red", "green", "blue"],
            }
        }),
    );

    let user1 = cache.get(&user("1"));
    assert_eq!(
        user1.fields().get("favoriteColors(where: \"foo\")"),
        Some(&json!(["red", "green", "blue"]))
    );
    assert_eq!(
        user1.field("favoriteColors(where: \"foo\")"),
        Some(&json!(["red", "green", "blue"]))
    );
}

#[test]
fn field_key_arguments_are_isolated() {
    let info = TypeInfo::new("Query")
        .with_field("Query", "viewer", "User", "viewer")
        .with_field("User", "favoriteColors", "String", "favoriteColors(where: $filter)");
    let mut cache = Cache::new();

    cache
        .write(
            &info,
            &json!({"viewer": {"id": "1", "favoriteColors": ["red"]}}),
            &vars(json!({"filter": "foo"})),
        )
        .unwrap();
    cache
        .write(
            &info,
            &json!({"viewer": {"id": "1", "favoriteColors": ["blue"]}}),
            &vars(json!({"filter": "bar"})),
        )
        .unwrap();

    let user1 = cache.get(&user("1"));
    assert_eq!(user1.field("favoriteColors(where: \"foo\")"), Some(&json!(["red"])));
    assert_eq!(user1.field("favoriteColors(where: \"bar\")"), Some(&json!(["blue"])));

    let selection = Selection::new().link(
        "viewer",
        "User",
        "viewer",
        Selection::new().scalar("favoriteColors", "favoriteColors(where: $filter)"),
    );
    let root = RecordId::root("Query");
    assert_eq!(
        cache.read(&root, &selection, &vars(json!({"filter": "foo"}))),
        json!({"viewer": {"favoriteColors": ["red"]}})
    );
    assert_eq!(
        cache.read(&root, &selection, &vars(json!({"filter": "bar"}))),
        json!({"viewer": {"favoriteColors": ["blue"]}})
    );
}

#[test]
fn writing_a_key_as_another_kind_replaces_it() {
    let mut cache = Cache::new();
    write(&mut cache, json!({"viewer": {"id": "1", "parent": {"id": "2"}}}));
    assert!(cache.get(&user("1")).linked_record("parent").is_some());

    // type-info that declares parent as a plain string this time
    let info = TypeInfo::new("Query")
        .with_field("Query", "viewer", "User", "viewer")
        .with_field("User", "parent", "String", "parent");
    cache
        .write(&info, &json!({"viewer": {"id": "1", "parent": "nobody"}}), &Variables::new())
        .unwrap();

    let user1 = cache.get(&user("1"));
    assert!(user1.linked_record("parent").is_none());
    assert_eq!(user1.field("parent"), Some(&json!("nobody")));
    assert!(matches!(user1.value("parent"), Some(FieldValue::Scalar(_))));
}

#[test]
fn numeric_and_string_ids_are_the_same_record() {
    let mut cache = Cache::new();
    write(&mut cache, json!({"viewer": {"id": 7, "firstName": "bob"}}));
    write(&mut cache, json!({"viewer": {"id": "7", "lastName": "geldof"}}));

    assert_eq!(cache.id("User", &json!({"id": 7})), user("7"));
    assert_eq!(cache.stats().records, 2);
    assert_eq!(
        serde_json::Value::Object(cache.get(&user("7")).fields()),
        json!({"firstName": "bob", "lastName": "geldof"})
    );
}

#[test]
fn typename_overrides_declared_type() {
    let mut cache = Cache::new();
    write(
        &mut cache,
        json!({"viewer": {"__typename": "Admin", "id": "1", "firstName": "root"}}),
    );

    let admin = RecordId::new("Admin", "1");
    assert!(cache.get(&admin).exists());
    assert!(!cache.get(&user("1")).exists());
    assert_eq!(
        cache.get(&RecordId::root("Query")).linked_record("viewer").map(|r| r.id().clone()),
        Some(admin)
    );
}

#[test]
fn objects_without_ids_are_never_merged() {
    let mut cache = Cache::new();
    write(&mut cache, json!({"viewer": {"firstName": "bob"}}));
    let first = cache
        .get(&RecordId::root("Query"))
        .linked_record("viewer")
        .map(|r| r.id().clone())
        .unwrap();
    write(&mut cache, json!({"viewer": {"firstName": "bob"}}));
    let second = cache
        .get(&RecordId::root("Query"))
        .linked_record("viewer")
        .map(|r| r.id().clone())
        .unwrap();

    assert!(first.is_synthetic());
    assert!(second.is_synthetic());
    assert_ne!(first, second);
}

#[test]
fn custom_id_field() {
    let mut cache = Cache::with_config(CacheConfig::new().with_id_field("uuid")).unwrap();
    write(&mut cache, json!({"viewer": {"uuid": "abc", "firstName": "bob"}}));
    assert_eq!(
        serde_json::Value::Object(cache.get(&user("abc")).fields()),
        json!({"firstName": "bob"})
    );
}

#[test]
fn non_object_payload_is_rejected() {
    let mut cache = Cache::new();
    let result = cache.write(&response_type_info(), &json!("viewer"), &Variables::new());
    assert_payload_error(&result);
    assert_eq!(
        result.unwrap_err(),
        CacheError::Payload(PayloadError::RootNotObject {
            root_type: "Query".to_string(),
            found: "string".to_string(),
        })
    );
    assert_eq!(cache.stats().records, 0);
}

// ============================================================================
// SUBSCRIPTIONS
// ============================================================================

#[test]
fn root_subscribe_field_change() {
    init_tracing();
    let mut cache = seeded_cache();
    let recorder = SetRecorder::new();
    cache.subscribe(recorder.spec("Query", viewer_selection()));

    write(&mut cache, json!({"viewer": {"id": "1", "firstName": "mary"}}));

    assert!(recorder.was_called_with(&json!({
        "viewer": {"firstName": "mary", "favoriteColors": ["red", "green", "blue"]}
    })));
}

#[test]
fn root_subscribe_linked_object_changed() {
    let mut cache = seeded_cache();
    let recorder = SetRecorder::new();
    cache.subscribe(recorder.spec("Query", viewer_selection()));
    assert_subscriber_count(&cache, &user("1"), "firstName", 1);

    write(&mut cache, json!({"viewer": {"id": "2", "firstName": "mary"}}));

    // user 2 was never written with favoriteColors, so the key is absent
    assert_eq!(recorder.last(), Some(json!({"viewer": {"firstName": "mary"}})));
    assert_no_subscribers(&cache, &user("1"), "firstName");
    assert_no_subscribers(&cache, &user("1"), "favoriteColors(where: \"foo\")");
    assert_subscriber_count(&cache, &user("2"), "firstName", 1);
}

#[test]
fn root_subscribe_linked_list_lost_entry() {
    let mut cache = Cache::new();
    jane_and_mary(&mut cache);
    let recorder = SetRecorder::new();
    cache.subscribe(recorder.spec("Query", friends_selection()));
    assert_subscriber_count(&cache, &user("3"), "firstName", 1);

    write(&mut cache, json!({"viewer": {"id": "1", "friends": [{"id": "2"}]}}));

    assert!(recorder.was_called_with(&json!({
        "viewer": {"friends": [{"firstName": "jane"}]}
    })));
    assert_no_subscribers(&cache, &user("3"), "firstName");
    assert_subscriber_count(&cache, &user("2"), "firstName", 1);
}

#[test]
fn root_subscribe_linked_list_reorder() {
    let mut cache = Cache::new();
    jane_and_mary(&mut cache);
    let recorder = SetRecorder::new();
    cache.subscribe(recorder.spec("Query", friends_selection()));

    write(
        &mut cache,
        json!({"viewer": {"id": "1", "friends": [{"id": "3"}, {"id": "2"}]}}),
    );

    assert!(recorder.was_called_with(&json!({
        "viewer": {"friends": [{"firstName": "mary"}, {"firstName": "jane"}]}
    })));
    assert_subscriber_count(&cache, &user("2"), "firstName", 1);
    assert_subscriber_count(&cache, &user("3"), "firstName", 1);
}

#[test]
fn unsubscribe_removes_every_entry() {
    let mut cache = seeded_cache();
    let recorder = SetRecorder::new();
    let id = cache.subscribe(recorder.spec("Query", viewer_selection()));
    assert_subscriber_count(&cache, &user("1"), "firstName", 1);

    assert!(cache.unsubscribe(id));

    assert_no_subscribers(&cache, &user("1"), "firstName");
    assert_no_subscribers(&cache, &user("1"), "favoriteColors(where: \"foo\")");
    assert_no_subscribers(&cache, &RecordId::root("Query"), "viewer");
    assert_eq!(cache.stats().index_entries, 0);
    assert_eq!(cache.stats().subscriptions, 0);

    write(&mut cache, json!({"viewer": {"id": "1", "firstName": "mary"}}));
    assert_eq!(recorder.call_count(), 0);
}

#[test]
fn removing_a_link_keeps_entries_reached_another_way() {
    let mut cache = Cache::new();
    write(
        &mut cache,
        json!({
            "viewer": {
                "id": "1",
                "parent": {"id": "2", "firstName": "jane"},
                "friends": [{"id": "2"}],
            }
        }),
    );
    let recorder = SetRecorder::new();
    let both = Selection::new().link(
        "viewer",
        "User",
        "viewer",
        Selection::new()
            .link("parent", "User", "parent", Selection::new().scalar("firstName", "firstName"))
            .link("friends", "User", "friends", Selection::new().scalar("firstName", "firstName")),
    );
    cache.subscribe(recorder.spec("Query", both));
    assert_subscriber_count(&cache, &user("2"), "firstName", 1);

    write(&mut cache, json!({"viewer": {"id": "1", "friends": []}}));

    assert_eq!(
        recorder.last(),
        Some(json!({"viewer": {"parent": {"firstName": "jane"}, "friends": []}}))
    );
    // still reached through parent
    assert_subscriber_count(&cache, &user("2"), "firstName", 1);

    write(&mut cache, json!({"viewer": {"id": "1", "parent": null}}));
    assert_no_subscribers(&cache, &user("2"), "firstName");
}

#[test]
fn link_null_drops_subscribers_on_previous_target() {
    let mut cache = Cache::new();
    write(
        &mut cache,
        json!({"viewer": {"id": "1", "parent": {"id": "2", "firstName": "jane"}}}),
    );
    let recorder = SetRecorder::new();
    let selection = Selection::new().link(
        "viewer",
        "User",
        "viewer",
        Selection::new().link("parent", "User", "parent", Selection::new().scalar("firstName", "firstName")),
    );
    cache.subscribe(recorder.spec("Query", selection));
    assert_subscriber_count(&cache, &user("2"), "firstName", 1);

    write(&mut cache, json!({"viewer": {"id": "1", "parent": null}}));

    assert!(cache.get(&user("1")).linked_record("parent").is_none());
    assert_eq!(recorder.last(), Some(json!({"viewer": {"parent": null}})));
    assert_no_subscribers(&cache, &user("2"), "firstName");
}

#[test]
fn null_list_entries_are_kept() {
    let mut cache = Cache::new();
    write(
        &mut cache,
        json!({"viewer": {"id": "1", "friends": [{"id": "2", "firstName": "jane"}, null]}}),
    );

    let friends = cache.get(&user("1")).linked_list("friends");
    assert_eq!(friends.len(), 2);
    assert!(friends[1].is_none());

    let value = cache.read(&RecordId::root("Query"), &friends_selection(), &Variables::new());
    assert_eq!(value, json!({"viewer": {"friends": [{"firstName": "jane"}, null]}}));
}

#[test]
fn one_set_per_write() {
    let mut cache = Cache::new();
    jane_and_mary(&mut cache);
    let recorder = SetRecorder::new();
    let id = cache.subscribe(recorder.spec("Query", friends_selection()));

    let summary = cache
        .write(
            &response_type_info(),
            &json!({
                "viewer": {
                    "id": "1",
                    "friends": [
                        {"id": "2", "firstName": "janet"},
                        {"id": "3", "firstName": "maria"},
                    ],
                }
            }),
            &Variables::new(),
        )
        .unwrap();

    assert_eq!(summary.notified, vec![id]);
    assert_eq!(recorder.call_count(), 1);
    assert_eq!(
        recorder.last(),
        Some(json!({"viewer": {"friends": [{"firstName": "janet"}, {"firstName": "maria"}]}}))
    );
}

#[test]
fn subscriptions_are_notified_in_affected_order() {
    let mut cache = Cache::new();
    jane_and_mary(&mut cache);
    let mary = SetRecorder::new();
    let jane = SetRecorder::new();
    let name_only = Selection::new().scalar("firstName", "firstName");

    let mary_id = cache.subscribe(mary.spec("User", name_only.clone()).with_root_id(user("3")));
    let jane_id = cache.subscribe(jane.spec("User", name_only).with_root_id(user("2")));

    let summary = cache
        .write(
            &response_type_info(),
            &json!({
                "viewer": {
                    "id": "1",
                    "friends": [
                        {"id": "2", "firstName": "janet"},
                        {"id": "3", "firstName": "maria"},
                    ],
                }
            }),
            &Variables::new(),
        )
        .unwrap();

    assert_eq!(summary.notified, vec![jane_id, mary_id]);
    assert_eq!(jane.last(), Some(json!({"firstName": "janet"})));
    assert_eq!(mary.last(), Some(json!({"firstName": "maria"})));
}

#[test]
fn subscriptions_with_variables_follow_their_own_keys() {
    let info = TypeInfo::new("Query")
        .with_field("Query", "viewer", "User", "viewer")
        .with_field("User", "friends", "User", "friends(first: $count)")
        .with_field("User", "firstName", "String", "firstName");
    let mut cache = Cache::new();
    cache
        .write(
            &info,
            &json!({"viewer": {"id": "1", "friends": [{"id": "2", "firstName": "jane"}]}}),
            &vars(json!({"count": 1})),
        )
        .unwrap();

    let selection = Selection::new().link(
        "viewer",
        "User",
        "viewer",
        Selection::new().link(
            "friends",
            "User",
            "friends(first: $count)",
            Selection::new().scalar("firstName", "firstName"),
        ),
    );
    let one = SetRecorder::new();
    let two = SetRecorder::new();
    cache.subscribe(one.spec("Query", selection.clone()).with_variables(vars(json!({"count": 1}))));
    cache.subscribe(two.spec("Query", selection).with_variables(vars(json!({"count": 2}))));
    assert_subscriber_count(&cache, &user("1"), "friends(first: 1)", 1);
    assert_subscriber_count(&cache, &user("1"), "friends(first: 2)", 1);

    cache
        .write(
            &info,
            &json!({"viewer": {"id": "1", "friends": [{"id": "2"}, {"id": "3", "firstName": "mary"}]}}),
            &vars(json!({"count": 2})),
        )
        .unwrap();

    assert_eq!(
        two.last(),
        Some(json!({"viewer": {"friends": [{"firstName": "jane"}, {"firstName": "mary"}]}}))
    );
    // nothing on the first page changed
    assert_eq!(one.call_count(), 0);
    assert_subscriber_count(&cache, &user("3"), "firstName", 1);
    assert_subscriber_count(&cache, &user("2"), "firstName", 2);
}

#[test]
fn dedupe_skips_identical_values() {
    let mut cache =
        Cache::with_config(CacheConfig::new().with_dedupe_notifications(true)).unwrap();
    write(&mut cache, json!({"viewer": {"id": "1", "firstName": "bob"}}));
    let recorder = SetRecorder::new();
    cache.subscribe(recorder.spec("Query", viewer_selection()));

    // a different user with the same visible fields
    write(&mut cache, json!({"viewer": {"id": "2", "firstName": "bob"}}));
    assert_eq!(recorder.call_count(), 0);

    write(&mut cache, json!({"viewer": {"id": "2", "firstName": "mary"}}));
    write(&mut cache, json!({"viewer": {"id": "1"}}));
    assert_eq!(
        recorder.calls(),
        vec![
            json!({"viewer": {"firstName": "mary"}}),
            json!({"viewer": {"firstName": "bob"}}),
        ]
    );

    let stats = cache.stats();
    assert_eq!(stats.notifications, 2);
    assert_eq!(stats.suppressed, 1);
}

#[test]
fn rewriting_identical_data_notifies_nobody() {
    let mut cache = seeded_cache();
    let recorder = SetRecorder::new();
    cache.subscribe(recorder.spec("Query", viewer_selection()));

    let summary = cache
        .write(
            &response_type_info(),
            &json!({
                "viewer": {
                    "id": "1",
                    "firstName": "bob",
                    "favoriteColors": ["red", "green", "blue"],
                }
            }),
            &Variables::new(),
        )
        .unwrap();

    assert!(summary.changes.iter().all(|change| change.is_noop()));
    assert!(summary.notified.is_empty());
    assert_eq!(recorder.call_count(), 0);
}

#[test]
fn selecting_id_reads_it_back() {
    let mut cache = Cache::new();
    write(&mut cache, json!({"viewer": {"id": "1", "firstName": "bob"}}));
    let selection = Selection::new().link(
        "viewer",
        "User",
        "viewer",
        Selection::new().scalar("id", "id").scalar("firstName", "firstName"),
    );
    let root = RecordId::root("Query");

    assert_eq!(
        cache.read(&root, &selection, &Variables::new()),
        json!({"viewer": {"id": "1", "firstName": "bob"}})
    );
    assert_eq!(
        serde_json::Value::Object(cache.get(&user("1")).fields()),
        json!({"firstName": "bob"})
    );

    let recorder = SetRecorder::new();
    cache.subscribe(recorder.spec("Query", selection));
    write(&mut cache, json!({"viewer": {"id": "1", "firstName": "mary"}}));
    assert_eq!(
        recorder.last(),
        Some(json!({"viewer": {"id": "1", "firstName": "mary"}}))
    );

    // numeric ids come back in their canonical text form
    write(&mut cache, json!({"viewer": {"id": 2, "firstName": "jane"}}));
    assert_eq!(
        recorder.last(),
        Some(json!({"viewer": {"id": "2", "firstName": "jane"}}))
    );
}

#[test]
fn store_id_field_keeps_id_in_fields() {
    let mut cache = Cache::with_config(CacheConfig::new().with_store_id_field(true)).unwrap();
    write(&mut cache, json!({"viewer": {"id": "1", "firstName": "bob"}}));

    assert_eq!(
        serde_json::Value::Object(cache.get(&user("1")).fields()),
        json!({"id": "1", "firstName": "bob"})
    );
    assert_eq!(cache.get(&user("1")).field("id"), Some(&json!("1")));
}

#[test]
fn watermark_advances_per_write() {
    let mut cache = Cache::new();
    let before = cache.watermark();
    write(&mut cache, json!({"viewer": {"id": "1", "firstName": "bob"}}));
    write(&mut cache, json!({"viewer": {"id": "1", "firstName": "mary"}}));

    let after = cache.watermark();
    assert!(after.is_newer_than(&before));
    assert!(cache.changed_since(&before));
    assert_eq!(after.sequence - before.sequence, 2);
    assert_eq!(cache.stats().writes, 2);
    assert_eq!(cache.stats().last_write_at, Some(after.observed_at));
}
