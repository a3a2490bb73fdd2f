mod common;

use common::{root_key, sign_certificate, HashBls, NOW};
use siwx::certificate::{
    bls_key_to_der, decode_envelope, lookup_reply, match_envelope, request_id_of,
    verify_call_response, CallRequestFields, CertificateError, CertificateVerifier, ExpectedCall,
    HashTree, LookupResult, RelayedCallResponse,
};
use siwx::request_id::{hash_of_map, leb128_encode, HashValue};
use siwx::time::FixedClock;
use siwx::Principal;
use std::sync::Arc;
use std::time::Duration;

const MAX_AGE: Duration = Duration::from_secs(300);

fn fields() -> CallRequestFields {
    CallRequestFields {
        request_type: "call".to_string(),
        canister_id: Principal::from_text(common::LOGIN_CANISTER).unwrap(),
        method_name: "siwx_login".to_string(),
        arg: vec![0x44, 0x49, 0x44, 0x4c],
        sender: Principal::self_authenticating(b"sender key"),
        ingress_expiry: NOW + 60_000_000_000,
        nonce: None,
    }
}

fn expected() -> ExpectedCall {
    let fields = fields();
    ExpectedCall {
        sender: fields.sender,
        canister_id: fields.canister_id,
        method_name: fields.method_name,
        arg: fields.arg,
    }
}

fn verifier() -> CertificateVerifier {
    CertificateVerifier::new(
        bls_key_to_der(&root_key()),
        Arc::new(HashBls),
        Arc::new(FixedClock::new(NOW)),
    )
}

fn certified(status_subtree: HashTree, request_id: &[u8]) -> Vec<u8> {
    let tree = HashTree::fork(
        HashTree::labeled(
            "request_status",
            HashTree::labeled(request_id.to_vec(), status_subtree),
        ),
        HashTree::labeled("time", HashTree::leaf(leb128_encode(NOW))),
    );
    sign_certificate(tree).encode().unwrap()
}

fn replied(reply: &[u8]) -> HashTree {
    HashTree::fork(
        HashTree::labeled("reply", HashTree::leaf(reply.to_vec())),
        HashTree::labeled("status", HashTree::leaf(b"replied".to_vec())),
    )
}

#[test]
fn test_request_id_ignores_field_order() {
    let fields = fields();
    let forward = vec![
        ("request_type", HashValue::Text(fields.request_type.clone())),
        ("canister_id", HashValue::Bytes(fields.canister_id.as_slice().to_vec())),
        ("method_name", HashValue::Text(fields.method_name.clone())),
        ("arg", HashValue::Bytes(fields.arg.clone())),
        ("sender", HashValue::Bytes(fields.sender.as_slice().to_vec())),
        ("ingress_expiry", HashValue::Nat(fields.ingress_expiry)),
    ];
    let mut reversed = forward.clone();
    reversed.reverse();

    let a = hash_of_map(forward.iter().map(|(k, v)| (*k, v)));
    let b = hash_of_map(reversed.iter().map(|(k, v)| (*k, v)));
    assert_eq!(a, b);
    assert_eq!(request_id_of(&fields).as_bytes(), &a);
    assert_eq!(request_id_of(&fields), request_id_of(&fields.clone()));
}

#[test]
fn test_envelope_roundtrip_matches_issued_call() {
    let decoded = decode_envelope(&fields().to_cbor().unwrap()).unwrap();
    assert_eq!(decoded, fields());
    assert!(match_envelope(&decoded, &expected()));

    let mut other = expected();
    other.arg.push(0);
    assert!(!match_envelope(&decoded, &other));
}

#[test]
fn test_verified_reply_is_returned() {
    let fields = fields();
    let request_id = request_id_of(&fields);
    let response = RelayedCallResponse {
        certificate: certified(replied(b"welcome"), request_id.as_bytes()),
        content_map: fields.to_cbor().unwrap(),
    };
    let reply = verify_call_response(&verifier(), &expected(), &response, MAX_AGE).unwrap();
    assert_eq!(reply, b"welcome");
}

#[test]
fn test_certificate_for_other_request_is_request_id_mismatch() {
    let fields = fields();
    let response = RelayedCallResponse {
        certificate: certified(replied(b"welcome"), &[0u8; 32]),
        content_map: fields.to_cbor().unwrap(),
    };
    assert!(matches!(
        verify_call_response(&verifier(), &expected(), &response, MAX_AGE),
        Err(CertificateError::RequestIdMismatch { .. })
    ));
}

#[test]
fn test_pruned_status_is_unknown_not_absent() {
    let fields = fields();
    let request_id = request_id_of(&fields);
    let pruned = HashTree::fork(
        HashTree::labeled("reply", HashTree::leaf(b"welcome".to_vec())),
        HashTree::labeled("status", HashTree::leaf(b"replied".to_vec())).pruned(),
    );
    let certificate = certified(pruned, request_id.as_bytes());

    let verified = verifier()
        .verify_bytes(&certificate, &fields.canister_id, MAX_AGE)
        .unwrap();
    let status_path: [&[u8]; 3] = [b"request_status", request_id.as_bytes(), b"status"];
    assert_eq!(verified.lookup_path(&status_path), LookupResult::Unknown);
    assert!(matches!(
        lookup_reply(&verified, &request_id),
        Err(CertificateError::ReplyMissing(_))
    ));
}

#[test]
fn test_processing_status_is_unexpected() {
    let fields = fields();
    let request_id = request_id_of(&fields);
    let response = RelayedCallResponse {
        certificate: certified(
            HashTree::labeled("status", HashTree::leaf(b"processing".to_vec())),
            request_id.as_bytes(),
        ),
        content_map: fields.to_cbor().unwrap(),
    };
    assert!(matches!(
        verify_call_response(&verifier(), &expected(), &response, MAX_AGE),
        Err(CertificateError::UnexpectedStatus(status)) if status == "processing"
    ));
}

#[test]
fn test_stale_certificate_rejected() {
    let fields = fields();
    let request_id = request_id_of(&fields);
    let response = RelayedCallResponse {
        certificate: certified(replied(b"welcome"), request_id.as_bytes()),
        content_map: fields.to_cbor().unwrap(),
    };
    let later = CertificateVerifier::new(
        bls_key_to_der(&root_key()),
        Arc::new(HashBls),
        Arc::new(FixedClock::new(NOW + 600_000_000_000)),
    );
    assert!(matches!(
        verify_call_response(&later, &expected(), &response, MAX_AGE),
        Err(CertificateError::Expired { .. })
    ));
}

#[test]
fn test_rejection_needs_a_reject_code() {
    let fields = fields();
    let request_id = request_id_of(&fields);
    let rejected = |code: Option<Vec<u8>>| {
        let status = HashTree::fork(
            HashTree::labeled("reject_message", HashTree::leaf(b"denied".to_vec())),
            HashTree::labeled("status", HashTree::leaf(b"rejected".to_vec())),
        );
        let status = match code {
            Some(code) => HashTree::fork(HashTree::labeled("reject_code", HashTree::leaf(code)), status),
            None => status,
        };
        RelayedCallResponse {
            certificate: certified(status, request_id.as_bytes()),
            content_map: fields.to_cbor().unwrap(),
        }
    };

    assert!(matches!(
        verify_call_response(&verifier(), &expected(), &rejected(Some(leb128_encode(5))), MAX_AGE),
        Err(CertificateError::CallRejected { code: 5, .. })
    ));
    assert!(matches!(
        verify_call_response(&verifier(), &expected(), &rejected(None), MAX_AGE),
        Err(CertificateError::Malformed(reason)) if reason.contains("reject_code")
    ));
    // Unterminated LEB128
    assert!(matches!(
        verify_call_response(&verifier(), &expected(), &rejected(Some(vec![0x85])), MAX_AGE),
        Err(CertificateError::Malformed(reason)) if reason.contains("reject_code")
    ));
}
