//! Signature Repacking
//!
//! Identity tokens carry their ECDSA P-384 signature as a fixed 96-byte
//! r || s concatenation. The verifier consumes ASN.1 DER, so the two 48-byte
//! scalars are repacked as a DER SEQUENCE of two INTEGERs: leading zero
//! bytes stripped, a zero byte re-prefixed when the top bit would flip the
//! sign.

/// Length of each raw scalar in bytes.
const SCALAR_LEN: usize = 48;

/// Expected raw signature length.
pub const RAW_SIGNATURE_LEN: usize = 2 * SCALAR_LEN;

fn encode_integer(scalar: &[u8], out: &mut Vec<u8>) {
    let mut start = 0;
    while start < scalar.len() - 1 && scalar[start] == 0 {
        start += 1;
    }
    let body = &scalar[start..];
    let pad = body[0] & 0x80 != 0;

    out.push(0x02);
    out.push((body.len() + usize::from(pad)) as u8);
    if pad {
        out.push(0x00);
    }
    out.extend_from_slice(body);
}

/// Repack a raw 96-byte r || s signature into ASN.1 DER.
///
/// Returns `None` when the input is not exactly 96 bytes; anything else a
/// client sends is a protocol violation, not a verification failure.
pub fn raw_signature_to_der(raw: &[u8]) -> Option<Vec<u8>> {
    if raw.len() != RAW_SIGNATURE_LEN {
        return None;
    }

    let mut body = Vec::with_capacity(RAW_SIGNATURE_LEN + 8);
    encode_integer(&raw[..SCALAR_LEN], &mut body);
    encode_integer(&raw[SCALAR_LEN..], &mut body);

    // Both integers are at most 49 bytes plus headers, so the sequence
    // length always fits the short form.
    let mut der = Vec::with_capacity(body.len() + 2);
    der.push(0x30);
    der.push(body.len() as u8);
    der.extend_from_slice(&body);
    Some(der)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrong_length_rejected() {
        assert!(raw_signature_to_der(&[0u8; 95]).is_none());
        assert!(raw_signature_to_der(&[0u8; 97]).is_none());
        assert!(raw_signature_to_der(&[]).is_none());
    }

    #[test]
    fn test_high_bit_scalars_get_sign_byte() {
        let mut raw = [0u8; RAW_SIGNATURE_LEN];
        raw[0] = 0x80;
        raw[48] = 0xFF;
        let der = raw_signature_to_der(&raw).unwrap();

        assert_eq!(der[0], 0x30);
        // First INTEGER: 49 bytes, zero sign byte in front.
        assert_eq!(&der[2..6], &[0x02, 49, 0x00, 0x80]);
    }

    #[test]
    fn test_leading_zeros_stripped() {
        let mut raw = [0u8; RAW_SIGNATURE_LEN];
        raw[47] = 0x01;
        raw[95] = 0x02;
        let der = raw_signature_to_der(&raw).unwrap();
        // SEQUENCE { INTEGER 1, INTEGER 2 }
        assert_eq!(der, vec![0x30, 0x06, 0x02, 0x01, 0x01, 0x02, 0x01, 0x02]);
    }

    #[test]
    fn test_der_parses_as_signature() {
        use p384::ecdsa::signature::Signer;
        use p384::ecdsa::{Signature, SigningKey};

        let key = SigningKey::random(&mut rand::rngs::OsRng);
        let sig: Signature = key.sign(b"payload");
        let raw = sig.to_bytes();

        let der = raw_signature_to_der(raw.as_slice()).unwrap();
        let reparsed = Signature::from_der(&der).unwrap();
        assert_eq!(reparsed, sig);
    }
}
