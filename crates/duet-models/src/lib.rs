pub mod gateway;
pub mod message;
pub mod outbox;
pub mod user;

/// Serialize i64 ids as JSON strings (and parse them back).
///
/// JavaScript clients lose precision above 2^53, so every id crossing the
/// wire is stringified.
pub mod id_str {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(id: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(id)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse::<i64>().map_err(serde::de::Error::custom)
    }
}
