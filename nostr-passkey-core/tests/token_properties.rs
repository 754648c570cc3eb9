//! Property-based tests for the token codec, verifier and key derivation

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use nostr_passkey_core::*;
use proptest::prelude::*;

const NOW: i64 = 1_700_000_000;

fn path_strategy() -> impl Strategy<Value = String> {
    "[a-z0-9]{1,12}(/[a-z0-9]{1,12}){0,3}"
}

fn method_strategy() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["GET", "POST", "PUT", "PATCH", "DELETE"])
}

fn reencode(event: &SignedEvent) -> String {
    authorization_header(&STANDARD.encode(serde_json::to_vec(event).unwrap()))
}

// A freshly encoded token verifies against the request it was made for.
proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn encoded_token_round_trips(
        prf in prop::array::uniform32(any::<u8>()),
        path in path_strategy(),
        method in method_strategy(),
        body in prop::option::of(prop::collection::vec(any::<u8>(), 0..256)),
    ) {
        let keypair = NostrKeypair::derive_from_prf(&prf).unwrap();
        let url = format!("https://forum.example.com/{path}");
        let token = token::encode_at(&keypair, &url, method, body.as_deref(), NOW).unwrap();
        let header = authorization_header(&token);

        let mut context = VerifyContext::new(&url, method);
        if let Some(body) = body.as_deref() {
            context = context.with_body(body);
        }

        let verified = verify_at(Some(&header), &context, NOW).unwrap();
        prop_assert_eq!(verified.identity(), keypair.identity());
    }
}

// Changing any one of url, method, body, created_at or sig breaks verification.
proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn single_mutation_is_rejected(
        path in path_strategy(),
        body in prop::collection::vec(any::<u8>(), 1..128),
        field in 0usize..5,
    ) {
        let keypair = NostrKeypair::generate().unwrap();
        let url = format!("https://forum.example.com/{path}");
        let mut event = sign_http_auth(&keypair, &url, "POST", Some(&body), NOW).unwrap();

        let mut request_body = body.clone();
        let mut request_url = url.clone();
        let mut request_method = "POST";

        let expected = match field {
            0 => {
                request_url.push_str("x");
                Rejection::UrlMismatch
            }
            1 => {
                request_method = "PUT";
                Rejection::MethodMismatch
            }
            2 => {
                request_body[0] ^= 0x01;
                Rejection::PayloadHashMismatch
            }
            3 => {
                event.created_at += 1;
                Rejection::IdRecomputeMismatch
            }
            _ => {
                let flipped = if event.sig.starts_with('0') { "1" } else { "0" };
                event.sig.replace_range(0..1, flipped);
                Rejection::SignatureInvalid
            }
        };

        let header = reencode(&event);
        let context = VerifyContext::new(&request_url, request_method).with_body(&request_body);
        prop_assert_eq!(verify_at(Some(&header), &context, NOW), Err(expected));
    }
}

// Key derivation is a pure function of the PRF output.
proptest! {
    #[test]
    fn derivation_is_deterministic(prf in prop::collection::vec(any::<u8>(), 1..64)) {
        let a = NostrKeypair::derive_from_prf(&prf).unwrap();
        let b = NostrKeypair::derive_from_prf(&prf).unwrap();
        prop_assert_eq!(a.identity(), b.identity());
        prop_assert!(is_identity_shape(a.identity().as_str()));
    }
}

// Arbitrary header input never panics and never verifies.
proptest! {
    #[test]
    fn arbitrary_headers_are_rejected(input in ".{0,512}") {
        let context = VerifyContext::new("https://forum.example.com/x", "GET");
        prop_assert!(verify_at(Some(&input), &context, NOW).is_err());
        let nostr = format!("Nostr {input}");
        prop_assert!(verify_at(Some(&nostr), &context, NOW).is_err());
    }
}
