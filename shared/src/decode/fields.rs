//! Alias-chain field readers over a JSON object.
//!
//! Every reader takes an ordered list of keys and returns the first value
//! that is present, non-null and readable as the target type.

use serde_json::{Map, Value};

pub type JsonObject = Map<String, Value>;

#[derive(Clone, Copy, Debug)]
pub struct Fields<'a> {
    obj: &'a JsonObject,
}

impl<'a> Fields<'a> {
    pub fn new(obj: &'a JsonObject) -> Self {
        Self { obj }
    }

    pub fn raw(&self) -> &'a JsonObject {
        self.obj
    }

    fn present(&self, keys: &'a [&'a str]) -> impl Iterator<Item = &'a Value> + 'a {
        let obj = self.obj;
        keys.iter()
            .filter_map(move |key| obj.get(*key))
            .filter(|value| !value.is_null())
    }

    /// String primitive (numbers are rendered as text). Blank strings count as absent.
    pub fn string(&self, keys: &'a [&'a str]) -> Option<String> {
        self.present(keys).find_map(primitive_text)
    }

    pub fn string_or(&self, keys: &'a [&'a str], default: &str) -> String {
        self.string(keys).unwrap_or_else(|| default.to_string())
    }

    /// Whole number. Numeric strings are parsed; fractional values are rejected.
    pub fn int(&self, keys: &'a [&'a str]) -> Option<i64> {
        self.present(keys).find_map(|value| match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        })
    }

    /// Non-negative count; negative values clamp to zero.
    pub fn count(&self, keys: &'a [&'a str]) -> Option<u32> {
        self.int(keys)
            .map(|n| u32::try_from(n.max(0)).unwrap_or(u32::MAX))
    }

    pub fn double(&self, keys: &'a [&'a str]) -> Option<f64> {
        self.present(keys).find_map(|value| match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
            _ => None,
        })
    }

    /// JSON boolean, or the exact strings `"true"` / `"false"`.
    pub fn boolean(&self, keys: &'a [&'a str]) -> Option<bool> {
        self.present(keys).find_map(|value| match value {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        })
    }

    pub fn object(&self, keys: &'a [&'a str]) -> Option<Fields<'a>> {
        self.present(keys)
            .find_map(Value::as_object)
            .map(Fields::new)
    }

    pub fn array(&self, keys: &'a [&'a str]) -> Option<&'a Vec<Value>> {
        self.present(keys).find_map(Value::as_array)
    }

    /// List of strings. Object elements contribute their `url`/`id` style field.
    pub fn strings(&self, keys: &'a [&'a str]) -> Vec<String> {
        const NESTED: &[&str] = &["url", "secure_url", "src", "_id", "id", "name"];
        self.array(keys)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| match item {
                        Value::Object(obj) => Fields::new(obj).string(NESTED),
                        other => primitive_text(other),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Id of a nested reference that may be a bare string or an object.
    pub fn reference_id(&self, keys: &'a [&'a str]) -> Option<String> {
        self.present(keys).find_map(|value| match value {
            Value::Object(obj) => Fields::new(obj).string(&["_id", "id"]),
            other => primitive_text(other),
        })
    }

    /// Person name: `name`, `displayName`, `fullName`, then first + last.
    pub fn person_name(&self) -> Option<String> {
        if let Some(name) = self.string(&["name", "displayName", "display_name", "fullName"]) {
            return Some(name);
        }
        let first = self.string(&["firstName", "first_name"]);
        let last = self.string(&["lastName", "last_name"]);
        match (first, last) {
            (Some(f), Some(l)) => Some(format!("{f} {l}")),
            (Some(only), None) | (None, Some(only)) => Some(only),
            (None, None) => None,
        }
    }
}

fn primitive_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
