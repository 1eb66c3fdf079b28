//! Webhook signatures.
//!
//! GitHub signs each delivery with HMAC-SHA1 over the raw request body and
//! sends it as `X-Hub-Signature: sha1=<hex>`.

use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

pub const SIGNATURE_HEADER: &str = "x-hub-signature";
const PREFIX: &str = "sha1=";

/// Header value for `body` signed with `secret`
pub fn sign(secret: &[u8], body: &[u8]) -> Result<String, InvalidLength> {
    let mut mac = HmacSha1::new_from_slice(secret)?;
    mac.update(body);
    Ok(format!("{}{}", PREFIX, hex::encode(mac.finalize().into_bytes())))
}

/// Check a header value against `body` in constant time
pub fn verify(secret: &[u8], body: &[u8], header: &str) -> bool {
    let Some(hex_digest) = header.trim().strip_prefix(PREFIX) else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha1::new_from_slice(secret) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &[u8] = br#"{"ref":"refs/heads/main","repository":{"full_name":"a/b"}}"#;

    #[test]
    fn test_known_vector() {
        // RFC 2202 test case 2
        assert_eq!(
            sign(b"Jefe", b"what do ya want for nothing?").unwrap(),
            "sha1=effcdf6ae5eb2fa2d27416d5f184df9c259a7c79"
        );
    }

    #[test]
    fn test_any_key_length_signs() {
        let long_key = vec![0x0bu8; 200];
        for key in [&b""[..], &b"k"[..], &long_key[..]] {
            let header = sign(key, BODY).unwrap();
            assert!(verify(key, BODY, &header));
        }
    }

    #[test]
    fn test_roundtrip() {
        let header = sign(b"s3cret", BODY).unwrap();
        assert!(verify(b"s3cret", BODY, &header));
        assert!(!verify(b"other", BODY, &header));
    }

    #[test]
    fn test_any_bit_flip_fails() {
        let header = sign(b"s3cret", BODY).unwrap();
        for byte in 0..BODY.len() {
            for bit in 0..8 {
                let mut mutated = BODY.to_vec();
                mutated[byte] ^= 1 << bit;
                assert!(!verify(b"s3cret", &mutated, &header), "byte {} bit {}", byte, bit);
            }
        }
    }

    #[test]
    fn test_malformed_headers_rejected() {
        let header = sign(b"s3cret", BODY).unwrap();
        let bare = header.trim_start_matches("sha1=");
        assert!(!verify(b"s3cret", BODY, bare));
        assert!(!verify(b"s3cret", BODY, "sha1=not-hex"));
        assert!(!verify(b"s3cret", BODY, "sha1="));
        assert!(!verify(b"s3cret", BODY, &format!("sha256={}", bare)));
    }
}
