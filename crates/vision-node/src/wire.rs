//! JSON body encoding for the image store's record endpoints.
//!
//! The store's `addimage` and `addcontent` endpoints bind their body to a
//! string and parse the JSON out of it themselves, so every record is sent
//! as a JSON string literal whose content is the record's JSON:
//!
//! ```text
//! {"imageid":"a_1.jpg"}   ->   "{\"imageid\":\"a_1.jpg\"}"
//! ```
//!
//! Keep all knowledge of this quirk in this module.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encode a record the way the store expects it.
pub fn encode_record<T: Serialize>(record: &T) -> Result<String, serde_json::Error> {
    let inner = serde_json::to_string(record)?;
    serde_json::to_string(&inner)
}

/// Decode a body produced by [`encode_record`].
pub fn decode_record<T: DeserializeOwned>(body: &str) -> Result<T, serde_json::Error> {
    let inner: String = serde_json::from_str(body)?;
    serde_json::from_str(&inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use crate::models::ContentRecord;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        imageid: String,
        sequencenumber: u32,
    }

    #[test]
    fn test_body_is_quoted_and_escaped() {
        let body = encode_record(&Sample {
            imageid: "a_1.jpg".into(),
            sequencenumber: 1,
        })
        .unwrap();
        assert_eq!(body, r#""{\"imageid\":\"a_1.jpg\",\"sequencenumber\":1}""#);
    }

    #[test]
    fn test_decode_reverses_encode() {
        let record = ContentRecord::new(
            "a_1.jpg",
            "http://s/a_1.jpg",
            Rect::new(1, 2, 3, 4),
            "movement",
            "camera-movement",
        )
        .with_data(r#"{"score": "0.9"}"#);
        let body = encode_record(&record).unwrap();
        let decoded: ContentRecord = decode_record(&body).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_decode_rejects_plain_json() {
        let result: Result<Sample, _> = decode_record(r#"{"imageid":"a","sequencenumber":1}"#);
        assert!(result.is_err());
    }
}
