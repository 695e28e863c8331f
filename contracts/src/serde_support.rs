//! Serde helpers for registries keyed by composite keys.

/// Encodes a `BTreeMap` as a sequence of `(key, value)` pairs, for maps whose
/// keys are tuples and therefore cannot be JSON object keys.
pub(crate) mod entry_list {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<K, V, S>(map: &BTreeMap<K, V>, serializer: S) -> Result<S::Ok, S::Error>
    where
        K: Serialize,
        V: Serialize,
        S: Serializer,
    {
        serializer.collect_seq(map.iter())
    }

    pub fn deserialize<'de, K, V, D>(deserializer: D) -> Result<BTreeMap<K, V>, D::Error>
    where
        K: Deserialize<'de> + Ord,
        V: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        let entries: Vec<(K, V)> = Vec::deserialize(deserializer)?;
        let len = entries.len();
        let map: BTreeMap<K, V> = entries.into_iter().collect();
        if map.len() != len {
            return Err(serde::de::Error::custom("duplicate key in entry list"));
        }
        Ok(map)
    }
}
