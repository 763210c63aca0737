//! Helpers for the portal sign-in exchange

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

/// PKCE verifier/challenge pair (S256)
pub(super) struct Pkce {
    pub verifier: String,
    pub challenge: String,
}

impl Pkce {
    pub fn generate() -> Self {
        let bytes: [u8; 32] = rand::random();
        Self::from_verifier(URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn from_verifier(verifier: String) -> Self {
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self {
            verifier,
            challenge,
        }
    }
}

/// Value of `name` in a `Cookie` header
pub(super) fn cookie_value(header: &str, name: &str) -> Option<String> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

/// Value of `name` in a URL fragment (`a=1&b=2`)
pub(super) fn fragment_param(fragment: &str, name: &str) -> Option<String> {
    fragment.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

/// Text between `start` and the next `end`
pub(super) fn extract_between<'a>(haystack: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let from = haystack.find(start)? + start.len();
    let rest = &haystack[from..];
    let to = rest.find(end)?;
    Some(&rest[..to])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pkce_challenge_matches_rfc7636_vector() {
        let pkce = Pkce::from_verifier("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".to_string());
        assert_eq!(pkce.challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
        assert_eq!(Pkce::generate().verifier.len(), 43);
    }

    #[test]
    fn cookie_and_fragment_lookup() {
        let header = "x-ms-cpim-trans=abc; x-ms-cpim-csrf=def==";
        assert_eq!(cookie_value(header, "x-ms-cpim-csrf").as_deref(), Some("def=="));
        assert_eq!(cookie_value(header, "missing"), None);

        assert_eq!(
            fragment_param("state=s&code=xyz", "code").as_deref(),
            Some("xyz")
        );
    }

    #[test]
    fn extracts_hidden_field() {
        let html = "<input type='hidden' id='id_token' value='tok.en'/>";
        assert_eq!(
            extract_between(html, "id='id_token' value='", "'/>"),
            Some("tok.en")
        );
        assert_eq!(extract_between(html, "nope", "'"), None);
    }
}
