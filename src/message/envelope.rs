//! Envelope fields supplied by the caller when composing a message.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::template::split_addresses;

use super::MessageError;

/// Keys that are always derived from the template
const TEMPLATE_OWNED_FIELDS: [&str; 3] = ["subject", "body", "alternatives"];

/// A list of email addresses.
///
/// Deserializes from either a comma separated string or a list of strings,
/// so callers only ever handle the normalized list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AddressList(Vec<String>);

impl AddressList {
    pub fn new(addresses: Vec<String>) -> Self {
        Self(addresses)
    }

    /// Parse a comma separated string, trimming entries
    pub fn parse(value: &str) -> Self {
        Self(split_addresses(value))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl From<Vec<String>> for AddressList {
    fn from(addresses: Vec<String>) -> Self {
        Self(addresses)
    }
}

impl From<&str> for AddressList {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl<'de> Deserialize<'de> for AddressList {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Input {
            Joined(String),
            List(Vec<String>),
        }

        Ok(match Option::<Input>::deserialize(deserializer)? {
            None => AddressList::default(),
            Some(Input::Joined(value)) => AddressList::parse(&value),
            Some(Input::List(values)) => AddressList(
                values
                    .iter()
                    .map(|v| v.trim())
                    .filter(|v| !v.is_empty())
                    .map(str::to_string)
                    .collect(),
            ),
        })
    }
}

/// A file attached to a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            data: data.into(),
        }
    }
}

/// Caller supplied message fields.
///
/// `from_email` and `reply_to` fall back to the template's defaults when
/// left empty.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Envelope {
    pub to: AddressList,
    pub cc: AddressList,
    pub bcc: AddressList,
    pub from_email: Option<String>,
    pub reply_to: Option<AddressList>,
    pub headers: BTreeMap<String, String>,
    pub attachments: Vec<Attachment>,
}

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Envelope addressed to the given recipients
    pub fn to<I, S>(recipients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            to: AddressList(recipients.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    pub fn cc<I, S>(mut self, recipients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cc = AddressList(recipients.into_iter().map(Into::into).collect());
        self
    }

    pub fn bcc<I, S>(mut self, recipients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bcc = AddressList(recipients.into_iter().map(Into::into).collect());
        self
    }

    pub fn from_email(mut self, from_email: impl Into<String>) -> Self {
        self.from_email = Some(from_email.into());
        self
    }

    pub fn reply_to<I, S>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reply_to = Some(AddressList(addresses.into_iter().map(Into::into).collect()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Parse untyped keyword fields into an envelope.
    ///
    /// `subject`, `body` and `alternatives` are set from the template and
    /// rejected here, as are unknown keys. An empty `reply_to` is treated as
    /// absent so the template's reply-to applies.
    pub fn from_fields(fields: &Map<String, Value>) -> Result<Self, MessageError> {
        for key in TEMPLATE_OWNED_FIELDS {
            if fields.contains_key(key) {
                return Err(MessageError::InvalidArgument(format!(
                    "Invalid argument: '{}' is set from the template.",
                    key
                )));
            }
        }

        let mut envelope: Envelope = serde_json::from_value(Value::Object(fields.clone()))
            .map_err(|e| MessageError::InvalidArgument(format!("Invalid argument: {}", e)))?;
        envelope.reply_to = envelope.reply_to.filter(|r| !r.is_empty());
        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_address_list_from_string_or_list() {
        let joined: AddressList = serde_json::from_value(json!("a@example.com, b@example.com")).unwrap();
        let listed: AddressList =
            serde_json::from_value(json!(["a@example.com", " b@example.com "])).unwrap();
        let empty: AddressList = serde_json::from_value(json!("")).unwrap();
        let null: AddressList = serde_json::from_value(Value::Null).unwrap();

        assert_eq!(joined, listed);
        assert_eq!(joined.as_slice(), ["a@example.com", "b@example.com"]);
        assert!(empty.is_empty());
        assert!(null.is_empty());
    }

    #[test]
    fn test_from_fields_parses_envelope() {
        let envelope = Envelope::from_fields(&fields(json!({
            "to": ["bruce@kung.fu"],
            "cc": "fred@example.com",
            "from_email": "Fred <fred@example.com>",
            "headers": {"X-Campaign": "spring"}
        })))
        .unwrap();

        assert_eq!(envelope.to.as_slice(), ["bruce@kung.fu"]);
        assert_eq!(envelope.cc.as_slice(), ["fred@example.com"]);
        assert!(envelope.bcc.is_empty());
        assert_eq!(envelope.from_email.as_deref(), Some("Fred <fred@example.com>"));
        assert!(envelope.reply_to.is_none());
        assert_eq!(envelope.headers["X-Campaign"], "spring");
    }

    #[test]
    fn test_from_fields_rejects_template_owned_keys() {
        for key in ["subject", "body", "alternatives"] {
            let mut map = fields(json!({"to": ["a@example.com"]}));
            map.insert(key.to_string(), json!("foo"));

            match Envelope::from_fields(&map) {
                Err(MessageError::InvalidArgument(message)) => assert_eq!(
                    message,
                    format!("Invalid argument: '{}' is set from the template.", key)
                ),
                other => panic!("expected invalid argument, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_from_fields_empty_reply_to_is_absent() {
        for reply_to in [json!(""), json!([]), json!(" , ")] {
            let envelope =
                Envelope::from_fields(&fields(json!({"reply_to": reply_to}))).unwrap();
            assert!(envelope.reply_to.is_none());
        }

        let envelope =
            Envelope::from_fields(&fields(json!({"reply_to": "a@example.com"}))).unwrap();
        assert_eq!(
            envelope.reply_to.map(AddressList::into_vec),
            Some(vec!["a@example.com".to_string()])
        );
    }

    #[test]
    fn test_from_fields_rejects_unknown_keys() {
        assert!(matches!(
            Envelope::from_fields(&fields(json!({"priority": "high"}))),
            Err(MessageError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_builder() {
        let envelope = Envelope::to(["a@example.com"])
            .cc(["b@example.com"])
            .bcc(["c@example.com"])
            .reply_to(["d@example.com"])
            .header("X-Test", "1")
            .attachment(Attachment::new("a.txt", "text/plain", b"hi".to_vec()));

        assert_eq!(envelope.to.as_slice(), ["a@example.com"]);
        assert_eq!(envelope.attachments.len(), 1);
        assert_eq!(envelope.headers.len(), 1);
    }
}
