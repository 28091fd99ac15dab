//! Authentication Layer
//!
//! Chain-of-trust token verification for login requests, plus the raw
//! signature repacking the verifier needs.

pub mod chain;
pub mod der;

pub use chain::{
    spawn_verification, unix_now, validate_token, verify_chain, verify_chain_with_anchor,
    AuthError, TokenClaims, TokenHeader, VerificationVerdict, VENDOR_ROOT_PUBLIC_KEY,
};
pub use der::{raw_signature_to_der, RAW_SIGNATURE_LEN};
