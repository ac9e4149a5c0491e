//! HMAC-SHA256 request signing for the Bitget REST API.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use common::Credentials;

type HmacSha256 = Hmac<Sha256>;

/// Headers attached to every authenticated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub access_key: String,
    pub access_sign: String,
    pub access_timestamp: String,
    pub access_passphrase: String,
}

impl SignedHeaders {
    pub fn as_pairs(&self) -> [(&'static str, &str); 4] {
        [
            ("ACCESS-KEY", self.access_key.as_str()),
            ("ACCESS-SIGN", self.access_sign.as_str()),
            ("ACCESS-TIMESTAMP", self.access_timestamp.as_str()),
            ("ACCESS-PASSPHRASE", self.access_passphrase.as_str()),
        ]
    }
}

/// Stateless signer: output depends only on the credentials and the inputs.
pub struct RequestSigner<'a> {
    credentials: &'a Credentials,
}

impl<'a> RequestSigner<'a> {
    pub fn new(credentials: &'a Credentials) -> Self {
        Self { credentials }
    }

    /// Sign a prehash string and return the Base64-encoded MAC.
    pub fn sign(&self, message: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.credentials.secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(message.as_bytes());
        STANDARD.encode(mac.finalize().into_bytes())
    }

    /// Build the signed header set for one request.
    ///
    /// `request_path` includes the query string (`/api/v2/...?symbol=X`);
    /// `body` is empty for GET requests.
    pub fn headers(
        &self,
        method: &str,
        request_path: &str,
        body: &str,
        timestamp_ms: i64,
    ) -> SignedHeaders {
        let timestamp = timestamp_ms.to_string();
        let prehash = prehash(&timestamp, method, request_path, body);
        SignedHeaders {
            access_key: self.credentials.api_key.clone(),
            access_sign: self.sign(&prehash),
            access_timestamp: timestamp,
            access_passphrase: self.credentials.passphrase.clone(),
        }
    }
}

/// Bitget prehash layout: `timestamp + METHOD + requestPath + body`.
pub fn prehash(timestamp: &str, method: &str, request_path: &str, body: &str) -> String {
    format!("{timestamp}{}{request_path}{body}", method.to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATH: &str = "/api/v2/spot/trade/history-orders?symbol=BTCUSDT&limit=100";

    fn creds() -> Credentials {
        Credentials::new("key", "test-secret", "phrase")
    }

    #[test]
    fn sign_known_vector() {
        let creds = creds();
        let signer = RequestSigner::new(&creds);
        let headers = signer.headers("GET", PATH, "", 1_700_000_000_000);
        assert_eq!(headers.access_sign, "a+bZR3gTCvNS+SdMs3uXX2yr5KJE15iz6+8bm5zPiok=");
        assert_eq!(headers.access_timestamp, "1700000000000");
        assert_eq!(headers.access_key, "key");
        assert_eq!(headers.access_passphrase, "phrase");
    }

    #[test]
    fn signing_is_deterministic() {
        let creds = creds();
        let signer = RequestSigner::new(&creds);
        let a = signer.headers("GET", PATH, "", 42);
        let b = signer.headers("GET", PATH, "", 42);
        assert_eq!(a, b);
    }

    #[test]
    fn every_input_changes_the_signature() {
        let creds = creds();
        let base = RequestSigner::new(&creds).headers("GET", PATH, "", 42).access_sign;

        let other_secret = Credentials::new("key", "other-secret", "phrase");
        let variants = [
            RequestSigner::new(&other_secret).headers("GET", PATH, "", 42).access_sign,
            RequestSigner::new(&creds).headers("POST", PATH, "", 42).access_sign,
            RequestSigner::new(&creds)
                .headers("GET", "/api/v2/spot/trade/unfilled-orders", "", 42)
                .access_sign,
            RequestSigner::new(&creds).headers("GET", PATH, "", 43).access_sign,
            RequestSigner::new(&creds).headers("GET", PATH, "{}", 42).access_sign,
        ];
        for v in variants {
            assert_ne!(v, base);
        }
    }

    #[test]
    fn method_is_uppercased_in_prehash() {
        assert_eq!(prehash("1", "get", "/p", ""), "1GET/p");
    }
}
