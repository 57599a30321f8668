use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

/// The pagination cursor handed to API consumers. Opaque from the outside:
/// base64-wrapped JSON of the last sort key plus the running offset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    #[serde(default)]
    pub sort: Option<serde_json::Value>,
    #[serde(default)]
    pub offset: i64,
}

pub fn encode_cursor(cursor: &Cursor) -> String {
    let json = serde_json::to_vec(cursor).expect("cursor serialization cannot fail");
    STANDARD.encode(json)
}

/// Tolerant decode: anything that is not a valid cursor means "start from
/// the beginning" rather than an error.
pub fn decode_cursor(raw: Option<&str>) -> Cursor {
    let Some(raw) = raw else {
        return Cursor::default();
    };
    if raw.is_empty() {
        return Cursor::default();
    }

    STANDARD
        .decode(raw)
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trip() {
        let cursor = Cursor {
            sort: Some(json!([1234, 56])),
            offset: 30,
        };
        let decoded = decode_cursor(Some(&encode_cursor(&cursor)));
        assert_eq!(decoded, cursor);
    }

    #[test]
    fn invalid_input_starts_over() {
        assert_eq!(decode_cursor(None), Cursor::default());
        assert_eq!(decode_cursor(Some("")), Cursor::default());
        assert_eq!(decode_cursor(Some("not base64!!!")), Cursor::default());

        let not_json = STANDARD.encode(b"plainly not json");
        assert_eq!(decode_cursor(Some(&not_json)), Cursor::default());
    }
}
