//! Locating the interesting array/object inside loosely wrapped responses.

use serde_json::Value;

use super::fields::{Fields, JsonObject};
use crate::model::Cursor;

const DATA: &str = "data";
const CURSOR_KEYS: &[&str] = &["nextCursor", "next_cursor", "cursor", "nextPageToken"];
const HAS_MORE_KEYS: &[&str] = &["hasMore", "has_more"];
const PAGINATION_KEYS: &[&str] = &["pagination", "meta", "pageInfo"];

/// A list found inside a payload, plus the object it sat in (for cursor lookup).
#[derive(Debug)]
pub struct ListLocation<'a> {
    pub items: &'a [Value],
    pub container: Option<&'a JsonObject>,
}

/// Finds the list for `keys`, in priority order:
///
/// 1. `data` as an array
/// 2. `data.<key>`, then `data.data.<key>`
/// 3. a bare top-level array
/// 4. `<key>` at the top level
///
/// The first structural match wins even when it is empty.
pub fn locate_list<'a>(root: &'a Value, keys: &[&str]) -> Option<ListLocation<'a>> {
    let root_obj = root.as_object();
    let data = root_obj.and_then(|obj| obj.get(DATA));

    if let Some(Value::Array(items)) = data {
        return Some(ListLocation {
            items,
            container: root_obj,
        });
    }

    let data_obj = data.and_then(Value::as_object);
    let inner_obj = data_obj
        .and_then(|d| d.get(DATA))
        .and_then(Value::as_object);
    for obj in [data_obj, inner_obj].into_iter().flatten() {
        if let Some(items) = named_array(obj, keys) {
            return Some(ListLocation {
                items,
                container: Some(obj),
            });
        }
    }

    if let Value::Array(items) = root {
        return Some(ListLocation {
            items,
            container: None,
        });
    }

    let obj = root_obj?;
    named_array(obj, keys).map(|items| ListLocation {
        items,
        container: Some(obj),
    })
}

fn named_array<'a>(obj: &'a JsonObject, keys: &[&str]) -> Option<&'a [Value]> {
    keys.iter()
        .filter_map(|key| obj.get(*key))
        .find_map(Value::as_array)
        .map(Vec::as_slice)
}

/// Finds a single object for `keys`: `data.<key>`, `data`, `<key>`, then the root.
pub fn locate_object<'a>(root: &'a Value, keys: &[&str]) -> Option<&'a JsonObject> {
    let root_obj = root.as_object()?;
    let data_obj = root_obj.get(DATA).and_then(Value::as_object);

    if let Some(data) = data_obj {
        if let Some(found) = named_object(data, keys) {
            return Some(found);
        }
        return Some(data);
    }
    named_object(root_obj, keys).or(Some(root_obj))
}

fn named_object<'a>(obj: &'a JsonObject, keys: &[&str]) -> Option<&'a JsonObject> {
    keys.iter()
        .filter_map(|key| obj.get(*key))
        .find_map(Value::as_object)
}

/// Reads the next-page cursor that accompanied a list.
///
/// Searched in the list's container, then `data`, then the root, including
/// `pagination`/`meta` sub-objects. An explicit `hasMore: false` wins over a
/// stray cursor value.
pub fn next_cursor(root: &Value, location: &ListLocation<'_>) -> Option<Cursor> {
    let root_obj = root.as_object();
    let data_obj = root_obj
        .and_then(|obj| obj.get(DATA))
        .and_then(Value::as_object);

    let mut scopes: Vec<Fields<'_>> = Vec::with_capacity(6);
    for obj in [location.container, data_obj, root_obj].into_iter().flatten() {
        let fields = Fields::new(obj);
        scopes.push(fields);
        if let Some(nested) = fields.object(PAGINATION_KEYS) {
            scopes.push(nested);
        }
    }

    let has_more = scopes.iter().find_map(|f| f.boolean(HAS_MORE_KEYS));
    if has_more == Some(false) {
        return None;
    }
    scopes
        .iter()
        .find_map(|f| f.string(CURSOR_KEYS))
        .map(Cursor::from_server)
}
