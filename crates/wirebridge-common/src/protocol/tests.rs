//! Protocol tests spanning the envelope, status and codec.

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::transport::Codec;
    use serde::{Deserialize, Serialize};
    use std::collections::BTreeMap;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Order {
        id: u64,
        items: Vec<String>,
        note: Option<String>,
    }

    fn order() -> Order {
        Order {
            id: 9,
            items: vec!["tea".to_string()],
            note: None,
        }
    }

    #[test]
    fn test_request_survives_envelope_round_trip() {
        let codec = Codec::default();
        let mut headers = HeaderCarrier::new();
        headers.set("X-Trace", "t-1");

        let envelope = Envelope::with_payload(codec.encode(&order()).unwrap(), headers.to_map());
        let bytes = codec.encode_envelope(&envelope).unwrap();

        let received = codec.decode_envelope(&bytes).unwrap();
        let carrier = HeaderCarrier::from_map(received.headers.clone());
        assert_eq!(carrier.get("x-trace"), Some("t-1"));

        let payload = received.into_payload().unwrap().unwrap();
        let decoded: Order = codec.decode(&payload).unwrap();
        assert_eq!(decoded, order());
    }

    #[test]
    fn test_error_envelope_payload_is_never_decoded() {
        let codec = Codec::default();
        // garbage that would fail to decode as an Order
        let envelope = Envelope {
            payload: Some(vec![0xFF; 16]),
            headers: BTreeMap::new(),
            error: Some(Status::new(422, "INVALID", "bad order")),
        };
        let bytes = codec.encode_envelope(&envelope).unwrap();

        let received = codec.decode_envelope(&bytes).unwrap();
        let err = received.into_payload().unwrap_err();
        assert_eq!(err.as_status().unwrap().reason, "INVALID");
    }

    #[test]
    fn test_error_value_becomes_equivalent_status() {
        let original = BridgeError::Status(Status::new(401, "UNAUTHENTICATED", "token expired"));
        let envelope = Envelope::from_status(Status::from_error(&original), BTreeMap::new());

        let codec = Codec::Json;
        let received = codec
            .decode_envelope(&codec.encode_envelope(&envelope).unwrap())
            .unwrap();
        match received.into_payload() {
            Err(BridgeError::Status(status)) => {
                assert_eq!(Some(&status), original.as_status());
            }
            other => panic!("expected application error, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_envelope_round_trip() {
        let codec = Codec::default();
        let bytes = codec.encode_envelope(&Envelope::new()).unwrap();
        let received = codec.decode_envelope(&bytes).unwrap();
        assert_eq!(received, Envelope::new());
        assert_eq!(received.into_payload().unwrap(), None);
    }
}
