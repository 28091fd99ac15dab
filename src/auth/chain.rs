//! Chain-of-Trust Authentication
//!
//! Validates the ordered identity token chain a client submits at login.
//! The first token's verification key is bootstrapped from its own header,
//! so any client can produce a self-consistent chain; a chain only counts as
//! *authenticated* when one of the keys used for verification is the vendor
//! root key. The standalone client-data token must verify under the final
//! chain token's embedded key.
//!
//! Verification is CPU-bound P-384 work and runs on the blocking pool, never
//! on a connection task.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use p384::ecdsa::signature::Verifier;
use p384::ecdsa::{Signature, VerifyingKey};
use p384::pkcs8::DecodePublicKey;
use serde::Deserialize;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::debug;

use super::der::raw_signature_to_der;

/// The vendor root public key, base64 SPKI. A chain is authenticated when
/// one of its verification keys compares equal to this string.
pub const VENDOR_ROOT_PUBLIC_KEY: &str = "MHYwEAYHKoZIzj0CAQYFK4EEACIDYgAE8ELkixyLcwlZryUQcu1TvPOmI2B7vX83ndnWRUaXm74wFfa5f/lwQNTfrLVHa2PmenpGI6JhIMUJaWZrjmMj90NoKNFSNBuKdm8rYiXsfaz3K36x/1U26HpG0ZxK/V1V";

/// Chain validation errors. These never reach the client verbatim; the
/// session maps any failure to its own disconnect reason.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Token is not three dot-joined base64 segments of valid JSON.
    #[error("malformed token: {0}")]
    MalformedToken(String),
    /// A verification key was not valid base64 SPKI.
    #[error("malformed verification key")]
    MalformedKey,
    /// Signature was not 96 raw bytes or did not verify.
    #[error("invalid signature")]
    InvalidSignature,
    /// Token is not valid yet (nbf in the future).
    #[error("token not yet valid")]
    NotYetValid,
    /// Token has expired.
    #[error("token expired")]
    Expired,
    /// A chain token did not embed the next verification key.
    #[error("token chain is broken")]
    BrokenChain,
}

/// Header fields of an identity token.
#[derive(Debug, Deserialize)]
pub struct TokenHeader {
    /// Base64 SPKI key the token claims to be signed with.
    #[serde(default)]
    pub x5u: Option<String>,
}

/// Claims of an identity token, limited to what validation needs.
#[derive(Debug, Deserialize)]
pub struct TokenClaims {
    /// Not-before timestamp, Unix seconds.
    #[serde(default)]
    pub nbf: Option<i64>,
    /// Expiry timestamp, Unix seconds.
    #[serde(default)]
    pub exp: Option<i64>,
    /// Base64 SPKI key the *next* token must verify under.
    #[serde(rename = "identityPublicKey", default)]
    pub identity_public_key: Option<String>,
}

/// Outcome of verifying a login's token chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationVerdict {
    /// Every token verified under its expected key and passed its time
    /// window checks.
    pub valid: bool,
    /// One of the verification keys was the vendor root.
    pub authenticated: bool,
}

impl VerificationVerdict {
    fn rejected() -> Self {
        Self {
            valid: false,
            authenticated: false,
        }
    }
}

fn decode_segment<T: for<'de> Deserialize<'de>>(segment: &str) -> Result<T, AuthError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| AuthError::MalformedToken(format!("segment is not base64: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::MalformedToken(format!("segment is not valid JSON: {e}")))
}

fn parse_key(key_b64: &str) -> Result<VerifyingKey, AuthError> {
    let der = STANDARD.decode(key_b64).map_err(|_| AuthError::MalformedKey)?;
    VerifyingKey::from_public_key_der(&der).map_err(|_| AuthError::MalformedKey)
}

/// Split a serialized token into its header, claims, and signature segments.
fn split_token(token: &str) -> Result<(&str, &str, &str), AuthError> {
    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(c), Some(s), None) => Ok((h, c, s)),
        _ => Err(AuthError::MalformedToken(
            "expected three dot-joined segments".into(),
        )),
    }
}

/// Verify one token's signature under the given base64 SPKI key, yielding
/// its claims on success. Time windows are not checked here.
///
/// The signature is verified over the ASCII `header.claims` prefix; the raw
/// 96-byte r || s signature is repacked to DER first.
fn verify_signature(token: &str, key_b64: &str) -> Result<TokenClaims, AuthError> {
    let (header_b64, claims_b64, signature_b64) = split_token(token)?;
    let key = parse_key(key_b64)?;

    let raw_signature = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|e| AuthError::MalformedToken(format!("signature is not base64: {e}")))?;
    let der = raw_signature_to_der(&raw_signature).ok_or(AuthError::InvalidSignature)?;
    let signature = Signature::from_der(&der).map_err(|_| AuthError::InvalidSignature)?;

    let signed_len = header_b64.len() + 1 + claims_b64.len();
    let message = &token.as_bytes()[..signed_len];
    key.verify(message, &signature)
        .map_err(|_| AuthError::InvalidSignature)?;

    decode_segment(claims_b64)
}

fn check_time_window(claims: &TokenClaims, now: i64) -> Result<(), AuthError> {
    if claims.nbf.is_some_and(|nbf| nbf > now) {
        return Err(AuthError::NotYetValid);
    }
    if claims.exp.is_some_and(|exp| exp < now) {
        return Err(AuthError::Expired);
    }
    Ok(())
}

/// Validate one token against the given base64 SPKI key and the current
/// time, yielding its claims on success.
pub fn validate_token(token: &str, key_b64: &str, now: i64) -> Result<TokenClaims, AuthError> {
    let claims = verify_signature(token, key_b64)?;
    check_time_window(&claims, now)?;
    Ok(claims)
}

/// Verify a full login: the ordered chain, then the client-data token under
/// the final chain key, against an explicit anchor key.
pub fn verify_chain_with_anchor(
    chain: &[String],
    client_data_jwt: &str,
    now: i64,
    anchor: &str,
) -> VerificationVerdict {
    if chain.is_empty() {
        return VerificationVerdict::rejected();
    }

    let mut authenticated = false;
    let mut current_key: Option<String> = None;

    for token in chain {
        let key_b64 = match &current_key {
            Some(key) => key.clone(),
            // The first key comes from the token's own header; the chain is
            // self-consistent from here but not yet trusted.
            None => {
                let header: TokenHeader = match split_token(token).and_then(|(h, _, _)| {
                    decode_segment(h)
                }) {
                    Ok(header) => header,
                    Err(err) => {
                        debug!(error = %err, "rejecting chain: unreadable first header");
                        return VerificationVerdict::rejected();
                    }
                };
                match header.x5u {
                    Some(key) => key,
                    None => {
                        debug!("rejecting chain: first token has no embedded key");
                        return VerificationVerdict::rejected();
                    }
                }
            }
        };

        // Failures keep the authenticated bit accumulated so far: the
        // caller may still want to know the chain reached the anchor.
        let claims = match verify_signature(token, &key_b64) {
            Ok(claims) => claims,
            Err(err) => {
                debug!(error = %err, "rejecting chain: signature failed");
                return VerificationVerdict {
                    valid: false,
                    authenticated,
                };
            }
        };

        // Anchor credit requires a verified signature; a token merely
        // naming the root key in its header earns nothing.
        if key_b64 == anchor {
            authenticated = true;
        }

        if let Err(err) = check_time_window(&claims, now) {
            debug!(error = %err, "rejecting chain: token outside its time window");
            return VerificationVerdict {
                valid: false,
                authenticated,
            };
        }

        match claims.identity_public_key {
            Some(next) => current_key = Some(next),
            None => {
                debug!("rejecting chain: token embeds no successor key");
                return VerificationVerdict {
                    valid: false,
                    authenticated,
                };
            }
        }
    }

    // current_key is always set here, every chain token embedded a successor.
    let client_key = match current_key {
        Some(key) => key,
        None => return VerificationVerdict::rejected(),
    };
    let claims = match verify_signature(client_data_jwt, &client_key) {
        Ok(claims) => claims,
        Err(err) => {
            debug!(error = %err, "rejecting chain: client data signature failed");
            return VerificationVerdict {
                valid: false,
                authenticated,
            };
        }
    };
    if client_key == anchor {
        authenticated = true;
    }
    if let Err(err) = check_time_window(&claims, now) {
        debug!(error = %err, "rejecting chain: client data token outside its time window");
        return VerificationVerdict {
            valid: false,
            authenticated,
        };
    }

    VerificationVerdict {
        valid: true,
        authenticated,
    }
}

/// Verify a login against the vendor root key.
pub fn verify_chain(chain: &[String], client_data_jwt: &str, now: i64) -> VerificationVerdict {
    verify_chain_with_anchor(chain, client_data_jwt, now, VENDOR_ROOT_PUBLIC_KEY)
}

/// Current Unix time in seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Run chain verification on the blocking pool.
///
/// P-384 verification of a three-token login takes milliseconds; offloading
/// it keeps connection tasks responsive.
pub fn spawn_verification(
    chain: Vec<String>,
    client_data_jwt: String,
) -> tokio::task::JoinHandle<VerificationVerdict> {
    tokio::task::spawn_blocking(move || verify_chain(&chain, &client_data_jwt, unix_now()))
}

// =============================================================================
// TESTS
// =============================================================================
