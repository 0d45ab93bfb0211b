//! Webhook request-signature validation
//!
//! The provider signs webhook POSTs with HMAC-SHA1 over the full request
//! URL followed by the form parameters sorted by name, keyed by the
//! account auth token, base64-encoded into the X-Twilio-Signature header.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// Compute the expected signature for a webhook request.
pub fn compute(auth_token: &str, url: &str, params: &[(String, String)]) -> String {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut data = String::from(url);
    for (name, value) in sorted {
        data.push_str(name);
        data.push_str(value);
    }

    let mut mac =
        HmacSha1::new_from_slice(auth_token.as_bytes()).expect("hmac accepts any key length");
    mac.update(data.as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}

/// Validate a webhook signature. Comparison is constant time so the header
/// cannot be brute-forced byte by byte.
pub fn validate(
    auth_token: &str,
    url: &str,
    params: &[(String, String)],
    signature: &str,
) -> bool {
    let expected = compute(auth_token, url, params);
    constant_time_eq(expected.as_bytes(), signature.as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_signature_roundtrip() {
        let token = "12345";
        let url = "https://host.example.com/voice/incoming";
        let form = params(&[("CallSid", "CA1"), ("From", "+15550001111")]);
        let signature = compute(token, url, &form);
        assert!(validate(token, url, &form, &signature));
        assert!(!validate("othertoken", url, &form, &signature));
    }

    #[test]
    fn test_param_order_does_not_matter() {
        let token = "tok";
        let url = "https://host/voice/incoming";
        let a = params(&[("B", "2"), ("A", "1")]);
        let b = params(&[("A", "1"), ("B", "2")]);
        assert_eq!(compute(token, url, &a), compute(token, url, &b));
    }

    #[test]
    fn test_tampered_params_fail() {
        let token = "tok";
        let url = "https://host/voice/incoming";
        let form = params(&[("CallSid", "CA1")]);
        let signature = compute(token, url, &form);
        let tampered = params(&[("CallSid", "CA2")]);
        assert!(!validate(token, url, &tampered, &signature));
    }
}
