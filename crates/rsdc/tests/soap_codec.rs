// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rsdc contributors

//! SOAP plane: correlation, fault taxonomy, report round-trips.

use rsdc::biceps::qname::Ns;
use rsdc::soap::{
    action, body_element, decode_envelope, encode_envelope, Headers, SoapError, SoapFault,
};

#[test]
fn response_correlates_to_request_message_id() {
    let request = Headers::request(action::GET_MDIB, "urn:uuid:device");
    let response = Headers::response(&request, action::GET_MDIB_RESPONSE);
    assert_eq!(response.relates_to.as_deref(), Some(request.message_id.as_str()));
    assert_ne!(response.message_id, request.message_id);
}

#[test]
fn every_encoded_envelope_decodes_back() {
    let mut headers = Headers::request(action::WSE_SUBSCRIBE, "http://device/svc");
    headers.identifier = Some("urn:uuid:sub-7".to_string());
    let xml = encode_envelope(&headers, |w| {
        w.start(Ns::Wse, "Subscribe");
        w.leaf_text(Ns::Wse, "Expires", "PT3600S");
        w.end();
    });
    let msg = decode_envelope(&xml).expect("decodes");
    assert_eq!(msg.headers.action, action::WSE_SUBSCRIBE);
    assert_eq!(msg.headers.identifier.as_deref(), Some("urn:uuid:sub-7"));
    let doc = msg.document().expect("re-parses");
    let body = body_element(&doc).expect("body present");
    assert_eq!(body.tag_name().name(), "Subscribe");
}

#[test]
fn fault_subcodes_survive_the_wire() {
    for fault in [
        SoapFault::invalid_handle("nm9"),
        SoapFault::invalid_state("operation pending"),
        SoapFault::action_not_supported("urn:bogus"),
        SoapFault::receiver("internal"),
    ] {
        let xml = fault.to_envelope(Some("urn:uuid:req"));
        let msg = decode_envelope(&xml).expect("fault envelope decodes");
        assert_eq!(msg.headers.relates_to.as_deref(), Some("urn:uuid:req"));
        let doc = msg.document().expect("re-parses");
        let back = SoapFault::from_body(&doc).expect("fault recognized");
        assert_eq!(back, fault);
    }
}

#[test]
fn must_understand_policy() {
    // Unknown header flagged mustUnderstand: NotUnderstood fault.
    let flagged = format!(
        r#"<s12:Envelope xmlns:s12="{s12}" xmlns:wsa="{wsa}"><s12:Header><wsa:Action>urn:a</wsa:Action><wsa:MessageID>urn:uuid:1</wsa:MessageID><x:Priority xmlns:x="urn:x" s12:mustUnderstand="1">high</x:Priority></s12:Header><s12:Body/></s12:Envelope>"#,
        s12 = Ns::S12.uri(),
        wsa = Ns::Wsa.uri(),
    );
    match decode_envelope(&flagged) {
        Err(SoapError::Fault(f)) => {
            assert_eq!(f.code, rsdc::soap::FaultCode::MustUnderstand);
            assert!(f.reason.contains("Priority"));
        }
        other => panic!("expected fault, got {:?}", other.map(|m| m.headers.action)),
    }

    // The same header without the flag is skipped.
    let tolerated = flagged.replace(" s12:mustUnderstand=\"1\"", "");
    let msg = decode_envelope(&tolerated).expect("tolerated");
    assert_eq!(msg.headers.action, "urn:a");
}

#[test]
fn garbage_is_a_decode_error_not_a_panic() {
    for input in ["", "not xml", "<unclosed", "<other-root/>"] {
        match decode_envelope(input) {
            Err(SoapError::Decode(_)) => {}
            other => panic!("{:?} should be a decode error, got {:?}", input, other.map(|m| m.headers.action)),
        }
    }
}
