//! Call envelopes relayed back by a wallet signer.
//!
//! The relay returns the CBOR content map of the call it submitted. Before
//! any certificate work, the map is compared with the call the caller
//! actually asked for, so a relay cannot substitute a different method,
//! argument, canister or sender.

use crate::certificate::cbor;
use crate::certificate::error::CertificateError;
use crate::principal::Principal;
use crate::request_id::{hash_of_map, HashValue, RequestId};
use ciborium::value::Value;

const REQUEST_TYPE_CALL: &str = "call";

const KNOWN_FIELDS: [&str; 7] = [
    "request_type",
    "canister_id",
    "method_name",
    "arg",
    "sender",
    "ingress_expiry",
    "nonce",
];

/// Fields of an update call content map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequestFields {
    pub request_type: String,
    pub canister_id: Principal,
    pub method_name: String,
    pub arg: Vec<u8>,
    pub sender: Principal,
    /// Nanoseconds since the UNIX epoch.
    pub ingress_expiry: u64,
    pub nonce: Option<Vec<u8>>,
}

/// The call the caller issued, as it should appear in the relayed envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedCall {
    pub sender: Principal,
    pub canister_id: Principal,
    pub method_name: String,
    pub arg: Vec<u8>,
}

/// Parse a CBOR content map into call fields.
pub fn decode_envelope(raw_content_map: &[u8]) -> Result<CallRequestFields, CertificateError> {
    let malformed = |reason: String| CertificateError::MalformedEnvelope(reason);

    let value = cbor::decode(raw_content_map).map_err(malformed)?;
    let Value::Map(entries) = value else {
        return Err(malformed("content map is not a CBOR map".to_string()));
    };

    let mut seen: Vec<&str> = Vec::with_capacity(entries.len());
    for (key, _) in &entries {
        match cbor::as_text(key) {
            Some(name) if seen.contains(&name) => {
                return Err(malformed(format!("duplicate field {}", name)))
            }
            Some(name) if KNOWN_FIELDS.contains(&name) => seen.push(name),
            Some(name) => return Err(malformed(format!("unexpected field {}", name))),
            None => return Err(malformed("content map key is not text".to_string())),
        }
    }

    let field = |name: &'static str| {
        cbor::map_get(&entries, name).ok_or_else(|| malformed(format!("missing field {}", name)))
    };
    let bytes_field = |name: &'static str| {
        field(name).and_then(|v| {
            cbor::as_bytes(v)
                .map(<[u8]>::to_vec)
                .ok_or_else(|| malformed(format!("field {} is not bytes", name)))
        })
    };
    let text_field = |name: &'static str| {
        field(name).and_then(|v| {
            cbor::as_text(v)
                .map(str::to_string)
                .ok_or_else(|| malformed(format!("field {} is not text", name)))
        })
    };
    let principal_field = |name: &'static str| {
        bytes_field(name).and_then(|bytes| {
            Principal::from_slice(&bytes)
                .ok_or_else(|| malformed(format!("field {} is not a principal", name)))
        })
    };

    let request_type = text_field("request_type")?;
    if request_type != REQUEST_TYPE_CALL {
        return Err(malformed(format!(
            "request_type is {}, expected {}",
            request_type, REQUEST_TYPE_CALL
        )));
    }

    let ingress_expiry = field("ingress_expiry").and_then(|v| {
        cbor::as_u64(v).ok_or_else(|| malformed("field ingress_expiry is not a nat".to_string()))
    })?;

    let nonce = match cbor::map_get(&entries, "nonce") {
        Some(v) => Some(
            cbor::as_bytes(v)
                .map(<[u8]>::to_vec)
                .ok_or_else(|| malformed("field nonce is not bytes".to_string()))?,
        ),
        None => None,
    };

    Ok(CallRequestFields {
        request_type,
        canister_id: principal_field("canister_id")?,
        method_name: text_field("method_name")?,
        arg: bytes_field("arg")?,
        sender: principal_field("sender")?,
        ingress_expiry,
        nonce,
    })
}

/// Representation-independent request id of the call.
pub fn request_id_of(fields: &CallRequestFields) -> RequestId {
    let mut map = vec![
        ("request_type", HashValue::Text(fields.request_type.clone())),
        ("canister_id", HashValue::Bytes(fields.canister_id.as_slice().to_vec())),
        ("method_name", HashValue::Text(fields.method_name.clone())),
        ("arg", HashValue::Bytes(fields.arg.clone())),
        ("sender", HashValue::Bytes(fields.sender.as_slice().to_vec())),
        ("ingress_expiry", HashValue::Nat(fields.ingress_expiry)),
    ];
    if let Some(nonce) = &fields.nonce {
        map.push(("nonce", HashValue::Bytes(nonce.clone())));
    }
    RequestId::new(hash_of_map(map.iter().map(|(k, v)| (*k, v))))
}

/// True when the relayed envelope is exactly the call that was issued.
pub fn match_envelope(fields: &CallRequestFields, expected: &ExpectedCall) -> bool {
    mismatched_field(fields, expected).is_none()
}

/// The first field that differs from the issued call, if any.
pub fn mismatched_field(fields: &CallRequestFields, expected: &ExpectedCall) -> Option<&'static str> {
    if fields.request_type != REQUEST_TYPE_CALL {
        Some("request_type")
    } else if fields.sender != expected.sender {
        Some("sender")
    } else if fields.canister_id != expected.canister_id {
        Some("canister_id")
    } else if fields.method_name != expected.method_name {
        Some("method_name")
    } else if fields.arg != expected.arg {
        Some("arg")
    } else {
        None
    }
}

impl CallRequestFields {
    pub fn request_id(&self) -> RequestId {
        request_id_of(self)
    }

    /// Encode as a self-describing CBOR content map.
    pub fn to_cbor(&self) -> Result<Vec<u8>, CertificateError> {
        let mut entries = vec![
            (cbor::text_key("request_type"), Value::Text(self.request_type.clone())),
            (cbor::text_key("canister_id"), Value::Bytes(self.canister_id.as_slice().to_vec())),
            (cbor::text_key("method_name"), Value::Text(self.method_name.clone())),
            (cbor::text_key("arg"), Value::Bytes(self.arg.clone())),
            (cbor::text_key("sender"), Value::Bytes(self.sender.as_slice().to_vec())),
            (cbor::text_key("ingress_expiry"), Value::Integer(self.ingress_expiry.into())),
        ];
        if let Some(nonce) = &self.nonce {
            entries.push((cbor::text_key("nonce"), Value::Bytes(nonce.clone())));
        }
        cbor::encode(Value::Map(entries)).map_err(CertificateError::MalformedEnvelope)
    }
}
