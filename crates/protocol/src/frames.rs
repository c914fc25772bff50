use serde::{Deserialize, Serialize};

/// A presence announcement datagram.
///
/// Encoded as `{"type":"discovery","name":<hostname>,"os":<platform>}`.
/// Datagrams with an unrecognized `type` fail to parse and are dropped by
/// the receiver; this is how forward compatibility works on the broadcast
/// channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PresenceFrame {
    Discovery {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        os: Option<String>,
    },
}

impl PresenceFrame {
    /// Builds a discovery frame for this host.
    pub fn discovery(name: impl Into<String>, os: impl Into<String>) -> Self {
        Self::Discovery {
            name: name.into(),
            os: Some(os.into()),
        }
    }

    /// Serializes the frame to a single datagram payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        // Serialization of a tagged enum of strings cannot fail.
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Parses a received datagram. `None` for anything malformed or of an
    /// unknown type; broadcast traffic is untrusted.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        serde_json::from_slice(payload).ok()
    }
}

/// The metadata line sent at the head of every transfer stream.
///
/// Exactly one JSON object, terminated by `\n`, after which the raw file
/// bytes follow. `transfer_id` is optional on the wire; receivers fall back
/// to a locally assigned id when it is absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_id: Option<String>,
    pub name: String,
    pub size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presence_frame_roundtrip() {
        let frame = PresenceFrame::discovery("office-laptop", "linux");
        let bytes = frame.to_bytes();
        let parsed = PresenceFrame::parse(&bytes).unwrap();
        assert_eq!(parsed, frame);
    }

    #[test]
    fn presence_frame_wire_shape() {
        let frame = PresenceFrame::discovery("host", "windows");
        let json: serde_json::Value = serde_json::from_slice(&frame.to_bytes()).unwrap();
        assert_eq!(json["type"], "discovery");
        assert_eq!(json["name"], "host");
        assert_eq!(json["os"], "windows");
    }

    #[test]
    fn presence_frame_unknown_type_rejected() {
        assert!(PresenceFrame::parse(br#"{"type":"heartbeat","name":"x"}"#).is_none());
    }

    #[test]
    fn presence_frame_garbage_rejected() {
        assert!(PresenceFrame::parse(b"not json at all").is_none());
        assert!(PresenceFrame::parse(b"").is_none());
    }

    #[test]
    fn presence_frame_missing_os_accepted() {
        let parsed = PresenceFrame::parse(br#"{"type":"discovery","name":"bare"}"#).unwrap();
        let PresenceFrame::Discovery { name, os } = parsed;
        assert_eq!(name, "bare");
        assert!(os.is_none());
    }

    #[test]
    fn transfer_meta_uses_camel_case() {
        let meta = TransferMeta {
            transfer_id: Some("t-1".into()),
            name: "report.pdf".into(),
            size: 4096,
        };
        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains("\"transferId\":\"t-1\""));

        let parsed: TransferMeta = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, meta);
    }

    #[test]
    fn transfer_meta_id_optional() {
        let parsed: TransferMeta =
            serde_json::from_str(r#"{"name":"a.bin","size":10}"#).unwrap();
        assert!(parsed.transfer_id.is_none());
        assert_eq!(parsed.size, 10);
    }
}
