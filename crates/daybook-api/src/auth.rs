use std::time::Duration;

use http::header::{HeaderMap, COOKIE};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use daybook_core::transport::SESSION_COOKIE_NAME;

use crate::config::AppConfig;
use crate::error::AppError;

const SESSION_SUBJECT: &str = "owner";
const CLOCK_SKEW: Duration = Duration::from_secs(60);

/// Issues and verifies the HS256 session token carried in the session cookie.
#[derive(Clone)]
pub struct SessionSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
    secure_cookie: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    sub: String,
    iat: Option<i64>,
    exp: Option<i64>,
}

impl SessionSigner {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.session_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.session_secret.as_bytes()),
            ttl: config.session_ttl,
            secure_cookie: config.secure_cookie,
        }
    }

    pub fn issue(&self) -> Result<String, AppError> {
        let now = chrono::Utc::now().timestamp();
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = SessionClaims {
            sub: SESSION_SUBJECT.to_string(),
            iat: Some(now),
            exp: Some(now.saturating_add(ttl)),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(|error| {
            AppError::internal(format!("Session token signing failed: {}", sanitize(&error)))
        })
    }

    pub fn verify(&self, token: &str) -> Result<(), AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        validation.leeway = CLOCK_SKEW.as_secs();

        let decoded = decode::<SessionClaims>(token, &self.decoding, &validation).map_err(
            |error| AppError::unauthorized(format!("Session validation failed: {}", sanitize(&error))),
        )?;
        if decoded.claims.sub != SESSION_SUBJECT {
            return Err(AppError::unauthorized("Session subject is not allowed"));
        }
        validate_temporal_claims(&decoded.claims, CLOCK_SKEW)
    }

    /// `Set-Cookie` value carrying a freshly issued session.
    pub fn session_cookie(&self, token: &str) -> String {
        let mut cookie = format!(
            "{SESSION_COOKIE_NAME}={token}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
            self.ttl.as_secs()
        );
        if self.secure_cookie {
            cookie.push_str("; Secure");
        }
        cookie
    }

    pub fn clearing_cookie(&self) -> String {
        let mut cookie =
            format!("{SESSION_COOKIE_NAME}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0");
        if self.secure_cookie {
            cookie.push_str("; Secure");
        }
        cookie
    }
}

pub fn extract_session_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let mut saw_cookie_header = false;
    for value in headers.get_all(COOKIE) {
        saw_cookie_header = true;
        let header = value
            .to_str()
            .map_err(|_| AppError::unauthorized("Cookie header is not valid UTF-8"))?;
        for pair in header.split(';') {
            let Some((name, token)) = pair.trim().split_once('=') else {
                continue;
            };
            if name.trim() != SESSION_COOKIE_NAME {
                continue;
            }
            let token = token.trim();
            if token.is_empty() {
                return Err(AppError::unauthorized("Session cookie is empty"));
            }
            return Ok(token);
        }
    }

    if saw_cookie_header {
        Err(AppError::unauthorized("Session cookie is missing"))
    } else {
        Err(AppError::unauthorized("Not authenticated"))
    }
}

/// Compares without short-circuiting on the first differing byte.
pub fn password_matches(expected: &str, provided: &str) -> bool {
    let expected = expected.as_bytes();
    let provided = provided.as_bytes();
    let mut diff = expected.len() ^ provided.len();
    for (index, byte) in expected.iter().enumerate() {
        let other = provided.get(index).copied().unwrap_or(0);
        diff |= usize::from(byte ^ other);
    }
    diff == 0
}

fn validate_temporal_claims(claims: &SessionClaims, clock_skew: Duration) -> Result<(), AppError> {
    let now = chrono::Utc::now().timestamp();
    let skew = i64::try_from(clock_skew.as_secs()).unwrap_or(0);

    let exp = claims
        .exp
        .ok_or_else(|| AppError::unauthorized("Session missing `exp` claim"))?;
    if exp <= now.saturating_sub(skew) {
        return Err(AppError::unauthorized("Session is expired"));
    }

    let iat = claims
        .iat
        .ok_or_else(|| AppError::unauthorized("Session missing `iat` claim"))?;
    if iat > now.saturating_add(skew) {
        return Err(AppError::unauthorized("Session `iat` is in the future"));
    }

    Ok(())
}

pub fn sanitize(error: &impl std::fmt::Display) -> String {
    error.to_string().replace('\n', " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use http::HeaderValue;

    use super::*;

    fn signer(secure_cookie: bool) -> SessionSigner {
        SessionSigner::from_config(&AppConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            password: "pw".to_string(),
            session_secret: "0123456789abcdef".to_string(),
            data_dir: PathBuf::from("data"),
            session_ttl: Duration::from_secs(30 * 24 * 60 * 60),
            history_retention: Duration::from_secs(30 * 24 * 60 * 60),
            secure_cookie,
            rate_limit_window: Duration::from_secs(60),
            login_rate_limit_per_window: 10,
        })
    }

    #[test]
    fn issued_token_verifies() {
        let signer = signer(false);
        let token = signer.issue().unwrap();
        signer.verify(&token).unwrap();
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let token = signer(false).issue().unwrap();
        let other = SessionSigner {
            decoding: DecodingKey::from_secret(b"another-secret-value"),
            ..signer(false)
        };
        assert!(matches!(other.verify(&token), Err(AppError::Unauthorized(_))));
        assert!(signer(false).verify("not.a.token").is_err());
    }

    #[test]
    fn session_cookie_carries_attributes() {
        let cookie = signer(true).session_cookie("abc");
        assert!(cookie.starts_with("daybook_session=abc;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Strict"));
        assert!(cookie.contains("Max-Age=2592000"));
        assert!(cookie.ends_with("; Secure"));

        let cleared = signer(false).clearing_cookie();
        assert!(cleared.contains("Max-Age=0"));
        assert!(!cleared.contains("Secure"));
    }

    #[test]
    fn session_token_extractor_finds_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; daybook_session=abc.def.ghi"),
        );
        assert_eq!(extract_session_token(&headers).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn session_token_extractor_rejects_missing_or_empty_cookie() {
        assert!(extract_session_token(&HeaderMap::new()).is_err());

        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("daybook_session="));
        assert!(extract_session_token(&headers).is_err());
    }

    #[test]
    fn password_comparison_requires_exact_match() {
        assert!(password_matches("secret", "secret"));
        assert!(!password_matches("secret", "secreT"));
        assert!(!password_matches("secret", "secret-longer"));
        assert!(!password_matches("secret", ""));
    }

    #[test]
    fn temporal_claims_require_exp_and_iat() {
        let claims = SessionClaims {
            sub: SESSION_SUBJECT.to_string(),
            iat: None,
            exp: None,
        };
        let err = validate_temporal_claims(&claims, CLOCK_SKEW).unwrap_err();
        assert!(err.to_string().contains("missing `exp`"));
    }

    #[test]
    fn temporal_claims_reject_future_iat() {
        let now = chrono::Utc::now().timestamp();
        let claims = SessionClaims {
            sub: SESSION_SUBJECT.to_string(),
            iat: Some(now + 600),
            exp: Some(now + 900),
        };
        let err = validate_temporal_claims(&claims, CLOCK_SKEW).unwrap_err();
        assert!(err.to_string().contains("future"));
    }
}
