//! gqlstore Test Utilities
//!
//! Centralized test infrastructure for the gqlstore workspace:
//! - Proptest generators for ids, names and payloads
//! - A recording `set` callback
//! - Fixtures for the `Query`/`User` response used across the test suites
//! - Custom assertions for subscriber bookkeeping

pub use gqlstore_cache::{Cache, CacheStats, RecordHandle, SubscriptionId, SubscriptionSpec};
pub use gqlstore_core::{
    CacheConfig, CacheError, CacheResult, FieldKey, RecordId, Selection, TypeInfo, Variables,
};

use serde_json::Value;
use std::sync::{Arc, Mutex, Once};

// ============================================================================
// TRACING
// ============================================================================

static TRACING: Once = Once::new();

/// Install a fmt subscriber honouring `RUST_LOG`, once per process.
///
/// Output goes through the test writer so it is captured unless the test
/// fails or `--nocapture` is passed.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        // Another harness may already have installed a global subscriber.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

// ============================================================================
// RECORDING CALLBACK
// ============================================================================

/// Captures every value passed to a subscription's `set`.
#[derive(Debug, Clone, Default)]
pub struct SetRecorder {
    calls: Arc<Mutex<Vec<Value>>>,
}

impl SetRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A `set` callback feeding this recorder.
    pub fn callback(&self) -> impl FnMut(&Value) + Send + 'static {
        let calls = Arc::clone(&self.calls);
        move |value: &Value| {
            calls
                .lock()
                .expect("set recorder poisoned")
                .push(value.clone())
        }
    }

    /// Build a subscription spec rooted at `root_type` that records into self.
    pub fn spec(&self, root_type: &str, selection: Selection) -> SubscriptionSpec {
        SubscriptionSpec::new(root_type, selection, self.callback())
    }

    pub fn calls(&self) -> Vec<Value> {
        self.calls.lock().expect("set recorder poisoned").clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("set recorder poisoned").len()
    }

    pub fn last(&self) -> Option<Value> {
        self.calls.lock().expect("set recorder poisoned").last().cloned()
    }

    pub fn was_called_with(&self, expected: &Value) -> bool {
        self.calls
            .lock()
            .expect("set recorder poisoned")
            .iter()
            .any(|value| value == expected)
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for cache inputs.

    use proptest::collection::{btree_set, vec};
    use proptest::prelude::*;
    use serde_json::{json, Value};

    /// Generate an entity id as it appears in payloads: short digit strings.
    pub fn arb_entity_id() -> impl Strategy<Value = String> {
        (1u32..500).prop_map(|n| n.to_string())
    }

    /// Generate a first name.
    pub fn arb_name() -> impl Strategy<Value = String> {
        "[a-z]{1,12}"
    }

    /// Generate a set of distinct entity ids, in random order.
    pub fn arb_distinct_ids(max: usize) -> impl Strategy<Value = Vec<String>> {
        btree_set(2u32..500, 1..=max)
            .prop_map(|ids| ids.into_iter().map(|n| n.to_string()).collect::<Vec<_>>())
            .prop_shuffle()
    }

    /// Generate a scalar value for an undeclared or `String` field.
    pub fn arb_scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i32>().prop_map(|n| json!(n)),
            "[a-zA-Z ]{0,16}".prop_map(Value::String),
            vec("[a-z]{1,6}", 0..4).prop_map(|items| json!(items)),
        ]
    }

    /// Generate a `friends` list payload: `(id, firstName)` pairs with
    /// distinct ids.
    pub fn arb_friends(max: usize) -> impl Strategy<Value = Vec<(String, String)>> {
        arb_distinct_ids(max).prop_flat_map(|ids| {
            let len = ids.len();
            (Just(ids), vec(arb_name(), len))
                .prop_map(|(ids, names)| ids.into_iter().zip(names).collect::<Vec<_>>())
        })
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;
    use serde_json::json;

    /// The `Query`/`User` response type-info used throughout the suites.
    pub fn response_type_info() -> TypeInfo {
        TypeInfo::new("Query")
            .with_field("Query", "viewer", "User", "viewer")
            .with_field("User", "parent", "User", "parent")
            .with_field("User", "friends", "User", "friends")
            .with_field("User", "id", "String", "id")
            .with_field("User", "firstName", "String", "firstName")
            .with_field("User", "lastName", "String", "lastName")
            .with_field("User", "favoriteColors", "String", "favoriteColors(where: \"foo\")")
    }

    /// `viewer { firstName favoriteColors(where: "foo") }`
    pub fn viewer_selection() -> Selection {
        Selection::new().link(
            "viewer",
            "User",
            "viewer",
            Selection::new()
                .scalar("firstName", "firstName")
                .scalar("favoriteColors", "favoriteColors(where: \"foo\")"),
        )
    }

    /// `viewer { friends { firstName } }`
    pub fn friends_selection() -> Selection {
        Selection::new().link(
            "viewer",
            "User",
            "viewer",
            Selection::new().link(
                "friends",
                "User",
                "friends",
                Selection::new().scalar("firstName", "firstName"),
            ),
        )
    }

    /// Variables from a JSON object literal; anything else yields none.
    pub fn vars(value: Value) -> Variables {
        match value {
            Value::Object(map) => map,
            _ => Variables::new(),
        }
    }

    /// `{viewer: {id, firstName}}`
    pub fn viewer_payload(id: &str, first_name: &str) -> Value {
        json!({"viewer": {"id": id, "firstName": first_name}})
    }

    /// `{viewer: {id, friends: [{id, firstName}, ...]}}`
    pub fn friends_payload(viewer_id: &str, friends: &[(String, String)]) -> Value {
        let friends: Vec<Value> = friends
            .iter()
            .map(|(id, name)| json!({"id": id, "firstName": name}))
            .collect();
        json!({"viewer": {"id": viewer_id, "friends": friends}})
    }

    /// Id of the `User` with `id`.
    pub fn user(id: &str) -> RecordId {
        RecordId::new("User", id)
    }

    /// A cache already holding `{viewer: {id: "1", firstName: "bob",
    /// favoriteColors: [red, green, blue]}}`.
    pub fn seeded_cache() -> Cache {
        let mut cache = Cache::new();
        cache
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
            .expect("seed payload is an object");
        cache
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Custom assertions for subscriber bookkeeping.

    use super::*;

    /// Assert that `record.key` has exactly `expected` subscribers.
    pub fn assert_subscriber_count(cache: &Cache, record: &RecordId, key: &str, expected: usize) {
        let subscribers = cache.get(record).subscribers(key);
        assert_eq!(
            subscribers.len(),
            expected,
            "expected {} subscriber(s) on {}.{}, found {:?}",
            expected,
            record,
            key,
            subscribers
        );
    }

    /// Assert that `record.key` has no subscribers.
    pub fn assert_no_subscribers(cache: &Cache, record: &RecordId, key: &str) {
        assert_subscriber_count(cache, record, key, 0);
    }

    /// Assert that a cache result is a configuration error.
    pub fn assert_config_error<T: std::fmt::Debug>(result: &CacheResult<T>) {
        assert!(
            matches!(result, Err(CacheError::Config(_))),
            "Expected Config error, got {:?}",
            result
        );
    }

    /// Assert that a cache result is a payload error.
    pub fn assert_payload_error<T: std::fmt::Debug>(result: &CacheResult<T>) {
        assert!(
            matches!(result, Err(CacheError::Payload(_))),
            "Expected Payload error, got {:?}",
            result
        );
    }
}
