use marketplace_sync::decode::{decode_page, parse_payload};
use marketplace_sync::model::{Page, Thread};
use proptest::prelude::*;
use serde_json::{json, Value};

fn thread_items(ids: &[String]) -> Vec<Value> {
    ids.iter().map(|id| json!({"_id": id, "unread": false})).collect()
}

/// The envelopes the inbox endpoint has been seen to use.
fn envelopes(items: &[Value], cursor: Option<&str>) -> Vec<Value> {
    vec![
        json!({"data": items, "nextCursor": cursor}),
        json!({"threads": items, "nextCursor": cursor}),
        json!({"data": {"threads": items, "nextCursor": cursor}}),
        json!({"data": {"items": items, "pagination": {"nextCursor": cursor}}}),
    ]
}

fn ids(page: &Page<Thread>) -> Vec<String> {
    page.items.iter().map(|t| t.id.to_string()).collect()
}

fn arb_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z_]{0,8}".prop_map(Value::from),
    ];
    leaf.prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map(
                prop_oneof![
                    Just("data".to_string()),
                    Just("threads".to_string()),
                    Just("nextCursor".to_string()),
                    Just("_id".to_string()),
                    "[a-z]{1,6}",
                ],
                inner,
                0..6
            )
            .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

proptest! {
    #[test]
    fn every_envelope_yields_the_same_threads(
        thread_ids in prop::collection::vec("[a-z0-9]{1,12}", 0..8),
        cursor in prop::option::of("[A-Za-z0-9+/=_-]{1,24}"),
    ) {
        let items = thread_items(&thread_ids);
        for envelope in envelopes(&items, cursor.as_deref()) {
            let page: Page<Thread> = decode_page(&envelope).unwrap();
            prop_assert_eq!(ids(&page), thread_ids.clone());
            prop_assert_eq!(page.next_cursor.as_ref().map(|c| c.as_str()), cursor.as_deref());
        }
        let bare: Page<Thread> = decode_page(&Value::Array(items)).unwrap();
        prop_assert_eq!(ids(&bare), thread_ids);
        prop_assert!(!bare.has_more());
    }

    #[test]
    fn unreadable_entries_are_skipped(
        thread_ids in prop::collection::vec("[a-z0-9]{1,12}", 1..6),
        junk in prop::collection::vec(prop_oneof![
            Just(json!(42)),
            Just(json!("thread")),
            Just(json!({"title": "no id"})),
            Just(Value::Null),
        ], 0..4),
    ) {
        let mut items = junk;
        items.extend(thread_items(&thread_ids));
        for envelope in envelopes(&items, None) {
            let page: Page<Thread> = decode_page(&envelope).unwrap();
            prop_assert_eq!(ids(&page), thread_ids.clone());
        }
        let bare: Page<Thread> = decode_page(&Value::Array(items)).unwrap();
        prop_assert_eq!(ids(&bare), thread_ids);
    }

    #[test]
    fn arbitrary_payloads_never_panic(value in arb_json()) {
        let _ = decode_page::<Thread>(&value);
        let _ = parse_payload(&value.to_string());
    }
}
