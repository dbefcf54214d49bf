//! Local, unverified token inspection.
//!
//! The client labels "my" messages by reading the display name straight out
//! of the stored token without checking the signature. That is a rendering
//! convenience only — it must never feed an authorization decision; the
//! server's verify endpoint remains the one source of trust.

use jsonwebtoken::{DecodingKey, Validation, decode};

use parley_types::api::Claims;

/// Extract the display name from a token without verifying it.
/// Returns `None` for anything that does not parse as a JWT with our claims.
pub fn peek_display_name(token: &str) -> Option<String> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.required_spec_claims.clear();

    decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
        .ok()
        .map(|data| data.claims.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use uuid::Uuid;

    #[test]
    fn reads_the_name_without_knowing_the_secret() {
        let claims = Claims {
            sub: Uuid::new_v4(),
            name: "alice".into(),
            exp: 0,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"server-side-secret"),
        )
        .unwrap();

        assert_eq!(peek_display_name(&token).as_deref(), Some("alice"));
    }

    #[test]
    fn garbage_yields_none() {
        assert_eq!(peek_display_name("not-a-token"), None);
        assert_eq!(peek_display_name(""), None);
    }
}
