//! RocketChat message model: requests, attachments, emoji and wire encoding.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Icons understood by the RocketChat instances we post to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emoji {
    Info,
    Warning,
    Alert,
    Bulb,
    ArrowRight,
    ArrowLeft,
    LoginTest,
    LogoutTest,
    LoginProd,
    LogoutProd,
}

impl Emoji {
    pub fn as_str(self) -> &'static str {
        match self {
            Emoji::Info => ":information_source:",
            Emoji::Warning => ":warning:",
            Emoji::Alert => ":rotating_light:",
            Emoji::Bulb => ":bulb:",
            Emoji::ArrowRight => ":arrow_right:",
            Emoji::ArrowLeft => ":arrow_left:",
            Emoji::LoginTest => ":login_test:",
            Emoji::LogoutTest => ":logout_test:",
            Emoji::LoginProd => ":login_prod:",
            Emoji::LogoutProd => ":logout_prod:",
        }
    }
}

impl fmt::Display for Emoji {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Emoji> for String {
    fn from(emoji: Emoji) -> Self {
        emoji.as_str().to_string()
    }
}

/// Wire format flavour of the target RocketChat instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVersion {
    /// `emoji` key, attachments, multipart uploads
    #[default]
    Current,
    /// `icon_emoji` key, no attachments, raw-body uploads
    Legacy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredField {
    Channel,
    Message,
}

impl fmt::Display for RequiredField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequiredField::Channel => f.write_str("channel"),
            RequiredField::Message => f.write_str("message"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} parameter missing")]
    MissingField(RequiredField),
}

/// A webhook message. Field order matches the JSON body RocketChat expects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Channel (`#name`) or direct message target (`@user`)
    pub channel: String,
    /// Display name override
    #[serde(rename = "username", default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default)]
    pub emoji: String,
    #[serde(rename = "text")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

/// Rich content block attached to a message (links, images, sub-fields).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_icon: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub title_link: String,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumb_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub title: String,
    pub value: String,
    #[serde(default)]
    pub short: bool,
}

/// Body shape for instances that predate the `emoji` key.
#[derive(Serialize)]
struct LegacyRequest<'a> {
    channel: &'a str,
    #[serde(rename = "username", skip_serializing_if = "Option::is_none")]
    user: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    alias: Option<&'a str>,
    icon_emoji: &'a str,
    text: &'a str,
}

impl Request {
    pub fn new(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    /// Check the required fields and fill in defaults.
    ///
    /// Channels without a `#` or `@` sigil are treated as regular channels
    /// and an empty emoji falls back to [`Emoji::Info`]. Applying this to an
    /// already normalized request returns it unchanged.
    pub fn normalize(mut self) -> Result<Self, ValidationError> {
        if self.channel.is_empty() {
            return Err(ValidationError::MissingField(RequiredField::Channel));
        }
        if self.message.is_empty() {
            return Err(ValidationError::MissingField(RequiredField::Message));
        }

        if !self.channel.starts_with('#') && !self.channel.starts_with('@') {
            self.channel.insert(0, '#');
        }
        if self.emoji.is_empty() {
            self.emoji = Emoji::Info.into();
        }
        Ok(self)
    }

    /// Wrap the message body in code markup. Empty bodies are left alone so
    /// validation still rejects them.
    pub fn wrap_as_code(mut self) -> Self {
        if !self.message.is_empty() {
            self.message = format!("```{}```", self.message);
        }
        self
    }

    /// Serialize the request into the JSON body for the given protocol.
    pub fn encode(&self, protocol: ProtocolVersion) -> serde_json::Result<Vec<u8>> {
        match protocol {
            ProtocolVersion::Current => serde_json::to_vec(self),
            ProtocolVersion::Legacy => serde_json::to_vec(&LegacyRequest {
                channel: &self.channel,
                user: self.user.as_deref(),
                alias: self.alias.as_deref(),
                icon_emoji: &self.emoji,
                text: &self.message,
            }),
        }
    }
}

/// A file to post into a room through the REST API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUploadRequest {
    pub data: Vec<u8>,
    pub room_id: String,
    pub file_name: String,
    pub message: Option<String>,
    pub description: Option<String>,
}

impl FileUploadRequest {
    pub fn new(room_id: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            data,
            room_id: room_id.into(),
            file_name: "upload.bin".to_string(),
            message: None,
            description: None,
        }
    }
}

/// REST API credentials. Never written anywhere by this crate.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct ApiAuth {
    pub user_id: String,
    pub token: String,
}

impl fmt::Debug for ApiAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiAuth")
            .field("user_id", &self.user_id)
            .field("token", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(channel: &str, emoji: &str, message: &str) -> Request {
        Request {
            channel: channel.to_string(),
            user: Some("user".to_string()),
            emoji: emoji.to_string(),
            message: message.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn validates_required_fields() {
        assert!(request("@test", ":rotating_light:", "Hello, world!").normalize().is_ok());

        let err = request("", ":rotating_light:", "Hello, world!").normalize().unwrap_err();
        assert_eq!(err, ValidationError::MissingField(RequiredField::Channel));
        assert_eq!(err.to_string(), "channel parameter missing");

        let err = request("@test", ":rotating_light:", "").normalize().unwrap_err();
        assert_eq!(err.to_string(), "message parameter missing");
    }

    #[test]
    fn missing_channel_is_reported_before_missing_message() {
        let err = Request::default().normalize().unwrap_err();
        assert_eq!(err, ValidationError::MissingField(RequiredField::Channel));
    }

    #[test]
    fn prepends_channel_sigil() {
        let req = Request::new("test", "hi").normalize().unwrap();
        assert_eq!(req.channel, "#test");

        let req = Request::new("#ops", "hi").normalize().unwrap();
        assert_eq!(req.channel, "#ops");

        let req = Request::new("@alice", "hi").normalize().unwrap();
        assert_eq!(req.channel, "@alice");
    }

    #[test]
    fn defaults_emoji_only_when_empty() {
        let req = Request::new("test", "hi").normalize().unwrap();
        assert_eq!(req.emoji, ":information_source:");

        let req = request("test", ":bulb:", "hi").normalize().unwrap();
        assert_eq!(req.emoji, Emoji::Bulb.as_str());
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = Request::new("test", "hi").normalize().unwrap();
        let twice = once.clone().normalize().unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn encodes_current_body() {
        let req = request("test", Emoji::Alert.as_str(), "Hello, world!")
            .normalize()
            .unwrap();
        let body = req.encode(ProtocolVersion::Current).unwrap();
        assert_eq!(
            String::from_utf8(body).unwrap(),
            r##"{"channel":"#test","username":"user","emoji":":rotating_light:","text":"Hello, world!"}"##
        );
    }

    #[test]
    fn encodes_legacy_body_without_attachments() {
        let mut req = request("@test", "", "Hello, world!").normalize().unwrap();
        req.attachments.push(Attachment {
            title: "ignored".to_string(),
            ..Default::default()
        });
        let body = req.encode(ProtocolVersion::Legacy).unwrap();
        assert_eq!(
            String::from_utf8(body).unwrap(),
            r#"{"channel":"@test","username":"user","icon_emoji":":information_source:","text":"Hello, world!"}"#
        );
    }

    #[test]
    fn attachment_omits_unset_optionals() {
        let attachment = Attachment {
            color: Some("#ff0000".to_string()),
            title: "build".to_string(),
            fields: vec![Field {
                title: "status".to_string(),
                value: "red".to_string(),
                short: true,
            }],
            ..Default::default()
        };
        let value = serde_json::to_value(&attachment).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "color": "#ff0000",
                "title": "build",
                "title_link": "",
                "text": "",
                "fields": [{"title": "status", "value": "red", "short": true}],
            })
        );
    }

    #[test]
    fn survives_json_round_trip() {
        let mut req = request("ops", "", "deploy finished").normalize().unwrap();
        req.alias = Some("ci".to_string());
        req.attachments.push(Attachment {
            title: "log".to_string(),
            title_link: "https://ci.example.org/1".to_string(),
            text: "all green".to_string(),
            ..Default::default()
        });

        let body = req.encode(ProtocolVersion::Current).unwrap();
        let parsed: Request = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed, req);
    }

    #[test]
    fn wraps_message_as_code() {
        assert_eq!(Request::new("c", "ls").wrap_as_code().message, "```ls```");
        assert_eq!(Request::new("c", "").wrap_as_code().message, "");
    }

    #[test]
    fn debug_redacts_token() {
        let auth = ApiAuth {
            user_id: "id".to_string(),
            token: "secret".to_string(),
        };
        let printed = format!("{auth:?}");
        assert!(printed.contains("id"));
        assert!(!printed.contains("secret"));
    }
}
