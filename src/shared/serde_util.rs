//! Custom serde helpers for the wire format.

/// Distinguishes an absent field from one explicitly set to `null`.
///
/// Use with `#[serde(default, deserialize_with = "double_option::deserialize")]`:
/// absent → `None`, `null` → `Some(None)`, value → `Some(Some(v))`.
pub mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}
