//! Serde helper for partial updates that can clear a field.
//!
//! A field typed `Option<Option<T>>` and annotated with
//! `#[serde(default, deserialize_with = "kasaku_core::patch::double_option")]`
//! reads as:
//!
//! - absent: `None` (keep the current value)
//! - `null`: `Some(None)` (clear it)
//! - a value: `Some(Some(v))` (set it)

use serde::{Deserialize, Deserializer};

pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Edit {
        #[serde(default, deserialize_with = "super::double_option")]
        note: Option<Option<String>>,
    }

    #[test]
    fn absent_null_and_value_are_distinct() {
        let absent: Edit = serde_json::from_str("{}").unwrap();
        let null: Edit = serde_json::from_str(r#"{"note":null}"#).unwrap();
        let set: Edit = serde_json::from_str(r#"{"note":"x"}"#).unwrap();

        assert_eq!(absent.note, None);
        assert_eq!(null.note, Some(None));
        assert_eq!(set.note, Some(Some("x".to_string())));
    }
}
