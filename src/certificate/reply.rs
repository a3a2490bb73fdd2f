//! Certified replies to relayed calls.
//!
//! The only trust anchor for a relayed call is the certificate itself, so the
//! checks run cheapest first and every step hard-fails:
//!
//! 1. Decode the content map and compare it with the issued call
//! 2. Compute the request id
//! 3. Verify the certificate (signature, delegation, freshness)
//! 4. Require `request_status/<id>/status` to be `replied`
//! 5. Read `request_status/<id>/reply` and decode it

use crate::certificate::certificate::{CertificateVerifier, VerifiedCertificate};
use crate::certificate::envelope::{decode_envelope, mismatched_field, request_id_of, ExpectedCall};
use crate::certificate::error::CertificateError;
use crate::certificate::tree::LookupResult;
use crate::request_id::{leb128_decode, RequestId};
use log::{debug, info, warn};
use std::time::Duration;

/// What a wallet signer relays back after submitting a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayedCallResponse {
    /// CBOR-encoded certificate.
    pub certificate: Vec<u8>,
    /// CBOR-encoded content map of the submitted call.
    pub content_map: Vec<u8>,
}

/// Read the certified reply for `request_id`.
pub fn lookup_reply(
    certificate: &VerifiedCertificate,
    request_id: &RequestId,
) -> Result<Vec<u8>, CertificateError> {
    let id = request_id.as_bytes().as_slice();
    let status_path: [&[u8]; 3] = [b"request_status", id, b"status"];

    let status = match certificate.lookup_path(&status_path) {
        LookupResult::Found(status) => status,
        LookupResult::Absent => {
            warn!("Request {} absent from certificate", request_id);
            return Err(CertificateError::RequestIdMismatch {
                request_id: request_id.to_string(),
            });
        }
        LookupResult::Unknown => {
            return Err(CertificateError::ReplyMissing(
                "request status is pruned from the certificate".to_string(),
            ))
        }
        LookupResult::Error => {
            return Err(CertificateError::Malformed(
                "request status is not a leaf".to_string(),
            ))
        }
    };

    match status {
        b"replied" => {
            let reply_path: [&[u8]; 3] = [b"request_status", id, b"reply"];
            match certificate.lookup_path(&reply_path) {
                LookupResult::Found(reply) => {
                    debug!("Request {} replied with {} bytes", request_id, reply.len());
                    Ok(reply.to_vec())
                }
                other => Err(CertificateError::ReplyMissing(format!(
                    "status is replied but reply lookup returned {:?}",
                    other
                ))),
            }
        }
        b"rejected" => {
            let code_path: [&[u8]; 3] = [b"request_status", id, b"reject_code"];
            let message_path: [&[u8]; 3] = [b"request_status", id, b"reject_message"];
            let code = match certificate.lookup_path(&code_path) {
                LookupResult::Found(bytes) => leb128_decode(bytes).ok_or_else(|| {
                    CertificateError::Malformed("reject_code is not LEB128".to_string())
                })?,
                other => {
                    return Err(CertificateError::Malformed(format!(
                        "rejected status without reject_code ({:?})",
                        other
                    )))
                }
            };
            let message = match certificate.lookup_path(&message_path) {
                LookupResult::Found(bytes) => String::from_utf8_lossy(bytes).into_owned(),
                _ => String::new(),
            };
            warn!("Request {} rejected ({}): {}", request_id, code, message);
            Err(CertificateError::CallRejected { code, message })
        }
        other => Err(CertificateError::UnexpectedStatus(
            String::from_utf8_lossy(other).into_owned(),
        )),
    }
}

/// Run the full relayed-call protocol and return the raw reply bytes.
pub fn verify_call_response(
    verifier: &CertificateVerifier,
    expected: &ExpectedCall,
    response: &RelayedCallResponse,
    max_age: Duration,
) -> Result<Vec<u8>, CertificateError> {
    let fields = decode_envelope(&response.content_map)?;
    if let Some(field) = mismatched_field(&fields, expected) {
        warn!("Relayed content map differs from issued call in {}", field);
        return Err(CertificateError::ContentMapMismatch { field });
    }

    let request_id = request_id_of(&fields);
    debug!("Relayed call {} has request id {}", fields.method_name, request_id);

    let certificate = verifier.verify_bytes(&response.certificate, &expected.canister_id, max_age)?;
    let reply = lookup_reply(&certificate, &request_id)?;

    info!(
        "Verified certified reply to {} on {}",
        expected.method_name, expected.canister_id
    );
    Ok(reply)
}

/// [`verify_call_response`] followed by decoding with the caller's schema.
pub fn verify_and_decode<T, F>(
    verifier: &CertificateVerifier,
    expected: &ExpectedCall,
    response: &RelayedCallResponse,
    max_age: Duration,
    decode: F,
) -> Result<T, CertificateError>
where
    F: FnOnce(&[u8]) -> Result<T, String>,
{
    let reply = verify_call_response(verifier, expected, response, max_age)?;
    decode(&reply).map_err(CertificateError::ReplyDecode)
}
