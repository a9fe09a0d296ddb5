use crate::models::chat::Role;
use hmac::{ Hmac, Mac };
use sha2::Sha256;
use std::collections::HashMap;
use thiserror::Error;
use url::form_urlencoded;

type HmacSha256 = Hmac<Sha256>;

/// Maximum clock skew accepted for a signed handshake, in seconds.
pub const MAX_SIGNATURE_AGE: i64 = 300;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid role")]
    InvalidRole,
    #[error("missing ts/sig")]
    MissingSignature,
    #[error("timestamp out of range")]
    StaleTimestamp,
    #[error("bad signature")]
    BadSignature,
}

pub fn sign(secret: &str, ts: &str) -> Result<String, AuthError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::BadSignature)?;
    mac.update(ts.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Checks a hex signature of `ts` in constant time.
pub fn verify(secret: &str, ts: &str, sig: &str) -> bool {
    let Ok(tag) = hex::decode(sig) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(ts.as_bytes());
    mac.verify_slice(&tag).is_ok()
}

/// Constant-time comparison of a presented API key against the configured one.
pub fn api_key_matches(expected: &str, provided: &str) -> bool {
    match sign(expected, expected) {
        Ok(tag) => verify(expected, provided, &tag),
        Err(_) => false,
    }
}

/// Resolves the role requested in a WebSocket handshake query string.
///
/// Public sessions need nothing. `role=admin` needs `ts` and `sig`, where
/// `sig` is the hex HMAC-SHA256 of `ts` keyed with the server API key. With
/// no key configured every role is accepted.
pub fn resolve_role(query: Option<&str>, secret: Option<&str>, now: i64) -> Result<Role, AuthError> {
    let params: HashMap<String, String> = form_urlencoded
        ::parse(query.unwrap_or("").as_bytes())
        .into_owned()
        .collect();

    let role = match params.get("role") {
        Some(r) => r.parse::<Role>().map_err(|_| AuthError::InvalidRole)?,
        None => Role::Public,
    };
    if role == Role::Public {
        return Ok(role);
    }

    let secret = match secret {
        Some(k) if !k.is_empty() => k,
        _ => {
            return Ok(role);
        }
    };

    let ts = params.get("ts").or_else(|| params.get("X-Api-Ts"));
    let sig = params.get("sig").or_else(|| params.get("X-Api-Sign"));
    let (ts, sig) = match (ts, sig) {
        (Some(ts), Some(sig)) => (ts, sig),
        _ => {
            return Err(AuthError::MissingSignature);
        }
    };

    let ts_i: i64 = ts.parse().unwrap_or(0);
    if (now - ts_i).abs() > MAX_SIGNATURE_AGE {
        return Err(AuthError::StaleTimestamp);
    }

    if verify(secret, ts, sig) {
        Ok(role)
    } else {
        Err(AuthError::BadSignature)
    }
}
