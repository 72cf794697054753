//! COSE public keys and signature verification.
//!
//! Supports the two algorithms advertised in creation options:
//! ES256 (EC2 key on P-256, DER-encoded ECDSA signature) and
//! RS256 (RSA key, PKCS#1 v1.5 signature over SHA-256).

use crate::error::{AppError, AppResult};
use crate::webauthn::types::{COSE_ALG_ES256, COSE_ALG_RS256};
use ciborium::value::Value;
use p256::ecdsa::signature::Verifier;
use rsa::{BigUint, Pkcs1v15Sign, RsaPublicKey};
use sha2::{Digest, Sha256};

// COSE_Key labels; negative labels depend on the key type
const LABEL_KTY: i128 = 1;
const LABEL_ALG: i128 = 3;
const LABEL_EC2_CRV: i128 = -1;
const LABEL_EC2_X: i128 = -2;
const LABEL_EC2_Y: i128 = -3;
const LABEL_RSA_N: i128 = -1;
const LABEL_RSA_E: i128 = -2;

const KTY_EC2: i128 = 2;
const KTY_RSA: i128 = 3;
const CRV_P256: i128 = 1;

#[derive(Debug, Clone)]
enum KeyMaterial {
    P256(p256::ecdsa::VerifyingKey),
    Rsa(RsaPublicKey),
}

/// A credential public key decoded from its COSE_Key encoding
#[derive(Debug, Clone)]
pub struct CosePublicKey {
    alg: i64,
    key: KeyMaterial,
}

impl CosePublicKey {
    pub fn from_cbor(bytes: &[u8]) -> AppResult<Self> {
        let value: Value = ciborium::from_reader(bytes)
            .map_err(|_| unsupported("public key is not valid CBOR"))?;
        let Value::Map(entries) = value else {
            return Err(unsupported("public key is not a COSE map"));
        };

        let get = |label: i128| -> Option<&Value> {
            entries.iter().find_map(|(k, v)| match k {
                Value::Integer(i) if i128::from(*i) == label => Some(v),
                _ => None,
            })
        };
        let int = |label: i128| -> Option<i128> {
            match get(label) {
                Some(Value::Integer(i)) => Some(i128::from(*i)),
                _ => None,
            }
        };
        let bytes_at = |label: i128| -> Option<&[u8]> {
            match get(label) {
                Some(Value::Bytes(b)) => Some(b.as_slice()),
                _ => None,
            }
        };

        let kty = int(LABEL_KTY).ok_or_else(|| unsupported("public key lacks kty"))?;
        let alg = int(LABEL_ALG)
            .and_then(|a| i64::try_from(a).ok())
            .ok_or_else(|| unsupported("public key lacks alg"))?;

        let key = match (kty, alg) {
            (KTY_EC2, COSE_ALG_ES256) => {
                if int(LABEL_EC2_CRV) != Some(CRV_P256) {
                    return Err(unsupported("only the P-256 curve is supported"));
                }
                let x = bytes_at(LABEL_EC2_X).filter(|x| x.len() == 32);
                let y = bytes_at(LABEL_EC2_Y).filter(|y| y.len() == 32);
                let (Some(x), Some(y)) = (x, y) else {
                    return Err(unsupported("EC2 key coordinates are missing or malformed"));
                };
                let point = p256::EncodedPoint::from_affine_coordinates(
                    p256::FieldBytes::from_slice(x),
                    p256::FieldBytes::from_slice(y),
                    false,
                );
                let key = p256::ecdsa::VerifyingKey::from_encoded_point(&point)
                    .map_err(|_| unsupported("EC2 key is not a point on P-256"))?;
                KeyMaterial::P256(key)
            }
            (KTY_RSA, COSE_ALG_RS256) => {
                let (Some(n), Some(e)) = (bytes_at(LABEL_RSA_N), bytes_at(LABEL_RSA_E)) else {
                    return Err(unsupported("RSA key lacks modulus or exponent"));
                };
                let key = RsaPublicKey::new(BigUint::from_bytes_be(n), BigUint::from_bytes_be(e))
                    .map_err(|_| unsupported("RSA key parameters are invalid"))?;
                KeyMaterial::Rsa(key)
            }
            _ => return Err(unsupported("unsupported public key algorithm")),
        };

        Ok(Self { alg, key })
    }

    /// COSE algorithm identifier of this key
    pub fn alg(&self) -> i64 {
        self.alg
    }

    /// Verify `signature` over `message`
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> AppResult<()> {
        let valid = match &self.key {
            KeyMaterial::P256(key) => p256::ecdsa::Signature::from_der(signature)
                .map(|sig| key.verify(message, &sig).is_ok())
                .unwrap_or(false),
            KeyMaterial::Rsa(key) => {
                let hashed = Sha256::digest(message);
                key.verify(Pkcs1v15Sign::new::<Sha256>(), &hashed, signature)
                    .is_ok()
            }
        };

        if valid {
            Ok(())
        } else {
            Err(AppError::VerificationFailed("signature is invalid".to_string()))
        }
    }
}

/// The byte string every WebAuthn signature covers
pub fn signed_payload(authenticator_data: &[u8], client_data_json: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(authenticator_data.len() + 32);
    payload.extend_from_slice(authenticator_data);
    payload.extend_from_slice(&Sha256::digest(client_data_json));
    payload
}

fn unsupported(msg: &str) -> AppError {
    AppError::VerificationFailed(msg.to_string())
}
