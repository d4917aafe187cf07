//! Device commands

use bytes::Bytes;
use serde::Serialize;

#[derive(Serialize)]
struct Pushing<'a> {
    sequence_id: &'a str,
    command: &'a str,
    version: u32,
    push_target: u32,
}

#[derive(Serialize)]
struct Request<'a> {
    pushing: Pushing<'a>,
}

/// Payload asking the device to push its full status
pub fn pushall() -> Bytes {
    let request = Request {
        pushing: Pushing {
            sequence_id: "0",
            command: "pushall",
            version: 1,
            push_target: 1,
        },
    };

    // Serializing a struct of plain fields cannot fail
    Bytes::from(serde_json::to_vec(&request).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pushall_payload() {
        let payload = pushall();
        let json: serde_json::Value = serde_json::from_slice(&payload).unwrap();

        assert_eq!(json["pushing"]["command"], "pushall");
        assert_eq!(json["pushing"]["sequence_id"], "0");
        assert_eq!(json["pushing"]["version"], 1);
        assert_eq!(json["pushing"]["push_target"], 1);
    }
}
