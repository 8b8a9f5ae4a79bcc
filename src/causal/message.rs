use serde::{Deserialize, Serialize};

use super::clock::VectorClock;
use crate::common::error::ProtocolError;
use crate::network::peers::PeerId;

/// Identity of one broadcast: the origin plus the origin's vector slot
/// value at send time. Stamps alone cannot tell a re-gossiped copy
/// from a distinct event, this can.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct CausalId(pub PeerId, pub u64);

impl CausalId {
    pub fn origin(&self) -> PeerId {
        self.0
    }

    pub fn seq(&self) -> u64 {
        self.1
    }
}

/// Wire messages, carried as JSON datagrams:
///
/// ```text
/// { "type": "broadcast", "originId": 0, "vectorStamp": [1,0,0,0],
///   "causalId": [0,1], "payload": "..." }
/// { "type": "private", "originId": 0, "destId": 2,
///   "lamportStamp": 1, "payload": "..." }
/// ```
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    #[serde(rename_all = "camelCase")]
    Broadcast {
        origin_id: PeerId,
        vector_stamp: VectorClock,
        causal_id: CausalId,
        payload: String,
    },
    #[serde(rename_all = "camelCase")]
    Private {
        origin_id: PeerId,
        dest_id: PeerId,
        lamport_stamp: u64,
        payload: String,
    },
}

impl Message {
    pub fn origin(&self) -> PeerId {
        match self {
            Message::Broadcast { origin_id, .. } => *origin_id,
            Message::Private { origin_id, .. } => *origin_id,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let message = Message::Broadcast {
            origin_id: 0,
            vector_stamp: VectorClock::from(vec![1, 0, 0, 0]),
            causal_id: CausalId(0, 1),
            payload: "hello".into(),
        };

        let value: serde_json::Value =
            serde_json::from_slice(&message.encode().unwrap()).unwrap();
        assert_eq!(value["type"], "broadcast");
        assert_eq!(value["originId"], 0);
        assert_eq!(value["vectorStamp"], serde_json::json!([1, 0, 0, 0]));
        assert_eq!(value["causalId"], serde_json::json!([0, 1]));

        assert_eq!(Message::decode(&message.encode().unwrap()).unwrap(), message);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = Message::decode(b"{\"type\": \"broadcast\"").unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedMessage(_)));

        let err = Message::decode(b"{\"type\": \"vote\", \"originId\": 1}").unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedMessage(_)));
    }
}
