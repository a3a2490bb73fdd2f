//! Argument and reply encoding for relayed login calls.

use serde::{Deserialize, Serialize};

/// What a relayed login call certifies: the session to fetch the delegation
/// for and the user's long-lived key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginReply {
    pub session_id: String,
    pub long_lived_public_key: Vec<u8>,
}

/// Encodes the login argument and decodes the certified reply for the login
/// canister's interface.
pub trait CallCodec: Send + Sync {
    fn encode_login_arg(&self, session_public_key: &[u8]) -> Result<Vec<u8>, String>;

    fn decode_login_reply(&self, reply: &[u8]) -> Result<LoginReply, String>;
}

#[derive(Serialize)]
struct LoginArg<'a> {
    #[serde(with = "serde_bytes")]
    session_key: &'a [u8],
}

#[derive(Serialize, Deserialize)]
struct WireReply {
    session_id: String,
    #[serde(with = "serde_bytes")]
    user_key: Vec<u8>,
}

/// CBOR codec: the argument is `{session_key: bytes}`, the reply is
/// `{session_id: text, user_key: bytes}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CborCallCodec;

impl CallCodec for CborCallCodec {
    fn encode_login_arg(&self, session_public_key: &[u8]) -> Result<Vec<u8>, String> {
        to_cbor(&LoginArg {
            session_key: session_public_key,
        })
    }

    fn decode_login_reply(&self, reply: &[u8]) -> Result<LoginReply, String> {
        let wire: WireReply = ciborium::de::from_reader(reply)
            .map_err(|e| format!("Failed to decode login reply: {}", e))?;
        Ok(LoginReply {
            session_id: wire.session_id,
            long_lived_public_key: wire.user_key,
        })
    }
}

/// Encode a reply the way [`CborCallCodec`] expects it.
pub fn encode_login_reply(reply: &LoginReply) -> Result<Vec<u8>, String> {
    to_cbor(&WireReply {
        session_id: reply.session_id.clone(),
        user_key: reply.long_lived_public_key.clone(),
    })
}

fn to_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>, String> {
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(value, &mut bytes)
        .map_err(|e| format!("Failed to encode CBOR: {}", e))?;
    Ok(bytes)
}
