//! Request signing for the Volcengine visual API.
//!
//! The scheme follows AWS SigV4: a canonical request is hashed, wrapped in a
//! string-to-sign with the credential scope, and signed with a key derived
//! from the secret through the date, region and service.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "HMAC-SHA256";
const SIGNED_HEADERS: &str = "content-type;host;x-content-sha256;x-date";

#[derive(Debug, Clone)]
pub struct Signer {
    pub access_key: String,
    pub secret_key: String,
    pub host: String,
    pub region: String,
    pub service: String,
    pub version: String,
}

/// Header values to attach to a signed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub content_type: &'static str,
    pub host: String,
    pub x_date: String,
    pub x_content_sha256: String,
    pub authorization: String,
}

impl Signer {
    pub fn sign(&self, method: &str, action: &str, body: &str, now: DateTime<Utc>) -> SignedHeaders {
        let x_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let body_hash = sha256_hex(body.as_bytes());

        let canonical_request = format!(
            "{method}\n/\nAction={action}&Version={version}\n\
             content-type:application/json\nhost:{host}\nx-content-sha256:{body_hash}\nx-date:{x_date}\n\n\
             {SIGNED_HEADERS}\n{body_hash}",
            version = self.version,
            host = self.host,
        );

        let scope = format!("{}/{}/{}/request", date, self.region, self.service);
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            x_date,
            scope,
            sha256_hex(canonical_request.as_bytes())
        );

        let k_date = hmac_sha256(self.secret_key.as_bytes(), date.as_bytes());
        let k_region = hmac_sha256(&k_date, self.region.as_bytes());
        let k_service = hmac_sha256(&k_region, self.service.as_bytes());
        let k_signing = hmac_sha256(&k_service, b"request");
        let signature = hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes()));

        SignedHeaders {
            content_type: "application/json",
            host: self.host.clone(),
            x_date,
            x_content_sha256: body_hash,
            authorization: format!(
                "{} Credential={}/{}, SignedHeaders={}, Signature={}",
                ALGORITHM, self.access_key, scope, SIGNED_HEADERS, signature
            ),
        }
    }
}

fn hmac_sha256(key: &[u8], msg: &[u8]) -> Vec<u8> {
    // Infallible: HMAC takes keys of any length.
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(msg);
    mac.finalize().into_bytes().to_vec()
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn signer() -> Signer {
        Signer {
            access_key: "AKTEST".to_string(),
            secret_key: "secret".to_string(),
            host: "visual.volcengineapi.com".to_string(),
            region: "cn-north-1".to_string(),
            service: "cv".to_string(),
            version: "2022-08-31".to_string(),
        }
    }

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
    }

    #[test]
    fn hmac_matches_reference_vector() {
        assert_eq!(
            hex::encode(hmac_sha256(b"key", b"The quick brown fox jumps over the lazy dog")),
            "f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
        );
    }

    #[test]
    fn empty_body_hash() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn headers_carry_scope_and_timestamp() {
        let headers = signer().sign("POST", "CVSync2AsyncSubmitTask", "", fixed_time());
        assert_eq!(headers.x_date, "20240102T030405Z");
        assert_eq!(headers.host, "visual.volcengineapi.com");
        assert_eq!(headers.x_content_sha256, sha256_hex(b""));

        let prefix = "HMAC-SHA256 Credential=AKTEST/20240102/cn-north-1/cv/request, \
                      SignedHeaders=content-type;host;x-content-sha256;x-date, Signature=";
        assert!(headers.authorization.starts_with(prefix));
        let signature = &headers.authorization[prefix.len()..];
        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn authorization_for_fixed_request() {
        let headers = signer().sign(
            "POST",
            "CVSync2AsyncSubmitTask",
            r#"{"req_key":"jimeng_t2i_v40"}"#,
            fixed_time(),
        );
        assert_eq!(
            headers.x_content_sha256,
            "b1e23e1cb883cff93cc72b847e0d63ccea7f5586b3dd734101edf7d7402fb605"
        );
        assert_eq!(
            headers.authorization,
            "HMAC-SHA256 Credential=AKTEST/20240102/cn-north-1/cv/request, \
             SignedHeaders=content-type;host;x-content-sha256;x-date, \
             Signature=ae987f033fa0cdc422c368dab34ade7960dfa01b6e5558dee2bd2cb640cdb2bd"
        );
    }

    #[test]
    fn signature_is_deterministic_and_body_sensitive() {
        let s = signer();
        let a = s.sign("POST", "CVSync2AsyncGetResult", r#"{"a":1}"#, fixed_time());
        let b = s.sign("POST", "CVSync2AsyncGetResult", r#"{"a":1}"#, fixed_time());
        let c = s.sign("POST", "CVSync2AsyncGetResult", r#"{"a":2}"#, fixed_time());
        let d = s.sign("POST", "CVSync2AsyncSubmitTask", r#"{"a":1}"#, fixed_time());
        assert_eq!(a, b);
        assert_ne!(a.authorization, c.authorization);
        assert_ne!(a.authorization, d.authorization);
    }
}
