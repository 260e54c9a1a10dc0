//! Wire message schema for the daemon's browser protocol.
//!
//! Every message is one JSON object. Requests carry an action tag and a
//! per-process client identifier; sealed requests additionally carry a base64
//! nonce and ciphertext as two separate fields. A non-empty `error` in a
//! response means the request failed and the payload must not be decrypted.

use serde::{Deserialize, Serialize};

/// Protocol actions the client issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    ChangePublicKeys,
    Associate,
    TestAssociate,
    GetLogins,
    GeneratePassword,
}

/// Identity reference attached to query operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyListEntry {
    pub id: String,
    pub key: String,
}

/// Outbound message. Doubles as the plaintext payload of sealed requests
/// (with `client_id`, `nonce` and `message` left unset).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub action: Action,

    #[serde(rename = "clientID", skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    #[serde(rename = "publicKey", skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,

    /// Base64 ciphertext of the sealed payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Profile name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "idKey", skip_serializing_if = "Option::is_none")]
    pub id_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<KeyListEntry>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Request {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            client_id: None,
            public_key: None,
            nonce: None,
            message: None,
            id: None,
            id_key: None,
            key: None,
            keys: None,
            url: None,
        }
    }
}

/// Inbound response envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub action: String,

    pub message: Option<String>,

    pub nonce: Option<String>,

    #[serde(rename = "publicKey")]
    pub public_key: Option<String>,

    pub error: Option<String>,

    #[serde(rename = "errorCode")]
    pub error_code: Option<serde_json::Value>,

    pub success: Option<String>,

    /// Daemon software version, present on unsealed responses.
    #[serde(default)]
    pub version: Option<String>,
}

/// Decrypted payload of an `associate` response.
#[derive(Debug, Clone, Deserialize)]
pub struct AssociatePayload {
    #[serde(default)]
    pub hash: Option<String>,

    /// Daemon-assigned profile name for this client.
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub nonce: Option<String>,

    #[serde(default)]
    pub success: Option<String>,

    #[serde(default)]
    pub version: Option<String>,
}

/// One credential entry from a `get-logins` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginEntry {
    #[serde(default)]
    pub group: String,

    #[serde(default)]
    pub login: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub password: String,

    #[serde(default)]
    pub uuid: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub totp: Option<String>,
}

/// Decrypted payload of a `get-logins` response.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginsPayload {
    #[serde(default)]
    pub count: Option<u64>,

    #[serde(default)]
    pub entries: Vec<LoginEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn actions_use_kebab_case_tags() {
        assert_eq!(
            serde_json::to_value(Action::ChangePublicKeys).unwrap(),
            json!("change-public-keys")
        );
        assert_eq!(
            serde_json::to_value(Action::TestAssociate).unwrap(),
            json!("test-associate")
        );
        assert_eq!(
            serde_json::to_value(Action::GeneratePassword).unwrap(),
            json!("generate-password")
        );
    }

    #[test]
    fn unset_request_fields_stay_off_the_wire() {
        let mut req = Request::new(Action::ChangePublicKeys);
        req.client_id = Some("kpxc-test".into());
        req.public_key = Some("cGs=".into());

        let value: Value = serde_json::to_value(&req).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj.len(), 3);
        assert_eq!(obj["action"], "change-public-keys");
        assert_eq!(obj["clientID"], "kpxc-test");
        assert_eq!(obj["publicKey"], "cGs=");
    }

    #[test]
    fn response_with_error_parses() {
        let resp: Response = serde_json::from_value(json!({
            "action": "associate",
            "error": "association failed",
            "errorCode": 6,
            "nonce": "bm8="
        }))
        .unwrap();
        assert_eq!(resp.error.as_deref(), Some("association failed"));
        assert_eq!(resp.error_code, Some(json!(6)));
        assert!(resp.message.is_none());
    }

    #[test]
    fn minimal_response_parses() {
        let resp: Response = serde_json::from_value(json!({ "nonce": "bm8=" })).unwrap();
        assert!(resp.action.is_empty());
        assert!(resp.error.is_none());
    }

    #[test]
    fn login_entry_tolerates_unknown_fields() {
        let entry: LoginEntry = serde_json::from_value(json!({
            "group": "web",
            "login": "alice",
            "name": "example",
            "password": "hunter2",
            "uuid": "0ff1ce",
            "stringFields": []
        }))
        .unwrap();
        assert_eq!(entry.login, "alice");
        assert!(entry.totp.is_none());
    }
}
