/// Conversation records as Cursor stores them in its key-value table.
///
/// Each row of `cursorDiskKV` whose key starts with `composerData:` holds one
/// JSON blob. The fields this crate reads:
///
/// ```json
/// {
///   "composerId": "5b0c…",
///   "createdAt": 1718000000000,
///   "conversation": [
///     { "type": 1, "text": "how do I…", "timestamp": 1718000000123 },
///     { "type": 2, "text": "You can…" }
///   ]
/// }
/// ```
///
/// Older chat rows use `messages` with `{ "role": "user", "content": "…" }`
/// instead; both shapes decode into the same [`ConversationRecord`].
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// How much of an unparsable payload is kept for diagnostics.
pub const EXCERPT_CHARS: usize = 100;

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Decode the integer `type` discriminant. Unknown codes are `None`;
    /// callers fall back to [`Role::System`].
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Role::System),
            1 => Some(Role::User),
            2 => Some(Role::Assistant),
            _ => None,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "system" => Some(Role::System),
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Role::System => "SYSTEM",
            Role::User => "USER",
            Role::Assistant => "ASSISTANT",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub text: String,
    /// Epoch milliseconds; 0 when absent or not a number.
    pub timestamp: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationRecord {
    pub id: String,
    /// Epoch milliseconds.
    pub created_at: Option<i64>,
    pub messages: Vec<Message>,
}

impl ConversationRecord {
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed record ({reason}): {excerpt}")]
pub struct ParseError {
    pub reason: String,
    /// The first [`EXCERPT_CHARS`] characters of the payload.
    pub excerpt: String,
}

impl ParseError {
    fn new(reason: impl ToString, raw: &str) -> Self {
        Self {
            reason: reason.to_string(),
            excerpt: excerpt(raw),
        }
    }
}

fn excerpt(raw: &str) -> String {
    match raw.char_indices().nth(EXCERPT_CHARS) {
        Some((idx, _)) => format!("{}...", &raw[..idx]),
        None => raw.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawComposer {
    #[serde(default)]
    composer_id: Option<Value>,
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    created_at: Option<Value>,
    #[serde(default)]
    timestamp: Option<Value>,
    #[serde(default)]
    conversation: Option<Vec<Value>>,
    #[serde(default)]
    messages: Option<Vec<Value>>,
}

/// Decode one stored value. `fallback_id` names the record when the payload
/// carries no id of its own (usually the store key minus its prefix).
pub fn parse(raw: &str, fallback_id: &str) -> Result<ConversationRecord, ParseError> {
    let value: Value = serde_json::from_str(raw).map_err(|e| ParseError::new(e, raw))?;
    if !value.is_object() {
        return Err(ParseError::new("expected a JSON object", raw));
    }
    let composer: RawComposer =
        serde_json::from_value(value).map_err(|e| ParseError::new(e, raw))?;

    let id = [&composer.composer_id, &composer.id]
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .find(|s| !s.is_empty())
        .unwrap_or(fallback_id)
        .to_string();

    let created_at = [&composer.created_at, &composer.timestamp]
        .into_iter()
        .flatten()
        .find_map(as_millis);

    let messages = composer
        .conversation
        .or(composer.messages)
        .unwrap_or_default()
        .iter()
        .map(parse_message)
        .collect();

    Ok(ConversationRecord {
        id,
        created_at,
        messages,
    })
}

fn parse_message(value: &Value) -> Message {
    let Some(obj) = value.as_object() else {
        tracing::debug!(entry = %value, "non-object message entry, keeping as empty");
        return Message {
            role: Role::System,
            text: String::new(),
            timestamp: 0,
        };
    };

    let role = match (obj.get("type"), obj.get("role")) {
        (Some(code), _) => match as_integer(code).and_then(Role::from_code) {
            Some(role) => role,
            None => {
                tracing::warn!(code = %code, "unknown role code, treating as system");
                Role::System
            }
        },
        (None, Some(name)) => match name.as_str().and_then(Role::from_name) {
            Some(role) => role,
            None => {
                tracing::warn!(role = %name, "unknown role name, treating as system");
                Role::System
            }
        },
        (None, None) => Role::System,
    };

    let text = ["text", "content"]
        .into_iter()
        .find_map(|field| obj.get(field).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string();

    let timestamp = match obj.get("timestamp") {
        None | Some(Value::Null) => 0,
        Some(v) => as_millis(v).unwrap_or_else(|| {
            tracing::warn!(timestamp = %v, "unparsable message timestamp, using 0");
            0
        }),
    };

    Message {
        role,
        text,
        timestamp,
    }
}

fn as_millis(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
}

/// Integer value, accepting whole floats such as `1.0`.
fn as_integer(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_composer_blob() {
        let raw = r#"{
            "composerId": "abc",
            "createdAt": 1718000000000,
            "conversation": [
                {"type": 1, "text": "hi", "timestamp": 1718000000001},
                {"type": 2, "text": "hello"},
                {"type": 0, "text": ""}
            ]
        }"#;
        let record = parse(raw, "fallback").unwrap();
        assert_eq!(record.id, "abc");
        assert_eq!(record.created_at, Some(1718000000000));
        assert_eq!(
            record.messages,
            vec![
                Message {
                    role: Role::User,
                    text: "hi".into(),
                    timestamp: 1718000000001
                },
                Message {
                    role: Role::Assistant,
                    text: "hello".into(),
                    timestamp: 0
                },
                Message {
                    role: Role::System,
                    text: String::new(),
                    timestamp: 0
                },
            ]
        );
    }

    #[test]
    fn missing_conversation_is_an_empty_record() {
        let record = parse(r#"{"composerId": "abc"}"#, "fallback").unwrap();
        assert_eq!(record.message_count(), 0);
        assert_eq!(record.created_at, None);
    }

    #[test]
    fn falls_back_to_key_id() {
        let record = parse(r#"{"conversation": []}"#, "from-key").unwrap();
        assert_eq!(record.id, "from-key");
    }

    #[test]
    fn chat_shape_with_role_names() {
        let raw = r#"{"id": "c1", "timestamp": 5, "messages": [
            {"role": "User", "content": "q"},
            {"role": "assistant", "content": "a"},
            {"role": "tool", "content": "?"}
        ]}"#;
        let record = parse(raw, "k").unwrap();
        assert_eq!(record.id, "c1");
        assert_eq!(record.created_at, Some(5));
        let roles: Vec<Role> = record.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::System]);
        assert_eq!(record.messages[1].text, "a");
    }

    #[test]
    fn unknown_role_code_defaults_to_system() {
        let record = parse(r#"{"conversation": [{"type": 7, "text": "x"}]}"#, "k").unwrap();
        assert_eq!(record.messages[0].role, Role::System);
    }

    #[test]
    fn whole_float_role_codes_decode() {
        let raw = r#"{"conversation": [
            {"type": 1.0, "text": "q"},
            {"type": 2.0, "text": "a"},
            {"type": 1.5, "text": "?"}
        ]}"#;
        let roles: Vec<Role> = parse(raw, "k")
            .unwrap()
            .messages
            .iter()
            .map(|m| m.role)
            .collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::System]);
    }

    #[test]
    fn unusable_fields_fall_back_to_their_alternates() {
        let raw = r#"{"composerId": "", "id": "c2", "createdAt": "soon", "timestamp": 5,
            "conversation": [
                {"type": 1, "text": null, "content": "from content"},
                {"type": 2, "text": 3, "content": "also content"},
                {"type": 2, "text": "kept", "content": "ignored"}
            ]}"#;
        let record = parse(raw, "k").unwrap();
        assert_eq!(record.id, "c2");
        assert_eq!(record.created_at, Some(5));
        let texts: Vec<&str> = record.messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["from content", "also content", "kept"]);
    }

    #[test]
    fn bad_timestamp_does_not_fail_the_record() {
        let raw = r#"{"conversation": [
            {"type": 1, "text": "a", "timestamp": "yesterday"},
            {"type": 2, "text": "b", "timestamp": 12.0}
        ]}"#;
        let record = parse(raw, "k").unwrap();
        assert_eq!(record.messages[0].timestamp, 0);
        assert_eq!(record.messages[1].timestamp, 12);
    }

    #[test]
    fn non_object_entries_keep_their_slot() {
        let record = parse(r#"{"conversation": [1, {"type": 1, "text": "b"}]}"#, "k").unwrap();
        assert_eq!(record.message_count(), 2);
        assert_eq!(record.messages[0].text, "");
        assert_eq!(record.messages[1].text, "b");
    }

    #[test]
    fn malformed_json_carries_an_excerpt() {
        let raw = format!("{{\"conversation\": [{}", "x".repeat(300));
        let err = parse(&raw, "k").unwrap_err();
        assert_eq!(err.excerpt.chars().count(), EXCERPT_CHARS + 3);
        assert!(err.excerpt.starts_with("{\"conversation\": [xxx"));
    }

    #[test]
    fn non_object_payload_is_rejected() {
        let err = parse("[1, 2]", "k").unwrap_err();
        assert_eq!(err.reason, "expected a JSON object");
        assert_eq!(err.excerpt, "[1, 2]");
    }

    #[test]
    fn non_array_conversation_is_rejected() {
        assert!(parse(r#"{"conversation": "nope"}"#, "k").is_err());
    }

    #[test]
    fn excerpt_respects_char_boundaries() {
        let raw = "é".repeat(150);
        let err = parse(&raw, "k").unwrap_err();
        assert_eq!(err.excerpt, format!("{}...", "é".repeat(EXCERPT_CHARS)));
    }
}
