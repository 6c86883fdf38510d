use serde::{Deserialize, Serialize};

/// A plugin message relayed by the realtime transport between participants.
///
/// The payload is opaque to the host and is handed through unchanged in both
/// directions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMessage {
    pub plugin_id: String,
    pub block_id: String,
    /// Client identity of the participant whose plugin sent the message.
    pub sender_id: String,
    pub payload: String,
}
