use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// Deserialize a port that may arrive as a number, a numeric string, an empty
/// string or null. Empty and null both mean "not configured".
pub fn deserialize_port<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    let val = Value::deserialize(deserializer)?;
    match val {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_u64()
            .and_then(|u| u16::try_from(u).ok())
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("port out of range: {n}"))),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            trimmed
                .parse::<u16>()
                .map(Some)
                .map_err(|err| serde::de::Error::custom(format!("invalid port '{s}': {err}")))
        }
        _ => Err(serde::de::Error::custom("expected string or number for port")),
    }
}

/// Deserialize optional text where the backend writes "" for "unset".
pub fn deserialize_optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let val: Option<String> = Option::deserialize(deserializer)?;
    Ok(val.filter(|s| !s.trim().is_empty()))
}

pub fn deserialize_lines<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let val: Option<Vec<String>> = Option::deserialize(deserializer)?;
    Ok(val.unwrap_or_default())
}

/// Opaque identity of a history entry. The chat backend stamps entries with a
/// float of epoch seconds and offers nothing better, so the textual form of
/// that stamp is the key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ReplyKey(pub String);

impl ReplyKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ReplyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ReplyKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl<'de> Deserialize<'de> for ReplyKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let val = Value::deserialize(deserializer)?;
        match val {
            Value::Null => Ok(Self::default()),
            Value::String(s) => Ok(Self(s)),
            Value::Number(n) => Ok(Self(n.to_string())),
            _ => Err(serde::de::Error::custom(
                "expected string or number for timestamp",
            )),
        }
    }
}
