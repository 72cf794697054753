//! Parsing of authenticator data and attestation objects.
//!
//! Layout of authenticator data:
//!
//! ```text
//! rpIdHash (32) | flags (1) | signCount (4, big endian)
//!   [ aaguid (16) | credIdLen (2) | credId | COSE key (CBOR) ]   if AT
//!   [ extensions (CBOR map) ]                                   if ED
//! ```

use crate::error::{AppError, AppResult};
use ciborium::value::Value;
use std::io::Cursor;

pub const FLAG_USER_PRESENT: u8 = 0x01;
pub const FLAG_USER_VERIFIED: u8 = 0x04;
pub const FLAG_BACKUP_ELIGIBLE: u8 = 0x08;
pub const FLAG_BACKUP_STATE: u8 = 0x10;
pub const FLAG_ATTESTED_CREDENTIAL: u8 = 0x40;
pub const FLAG_EXTENSION_DATA: u8 = 0x80;

/// rpIdHash + flags + signCount
pub const MIN_AUTHENTICATOR_DATA_LEN: usize = 37;

#[derive(Debug, Clone)]
pub struct AttestedCredentialData {
    pub aaguid: [u8; 16],
    pub credential_id: Vec<u8>,
    /// COSE_Key exactly as the authenticator encoded it
    pub public_key: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct AuthenticatorData {
    pub rp_id_hash: [u8; 32],
    pub flags: u8,
    pub sign_count: u32,
    pub attested_credential: Option<AttestedCredentialData>,
}

impl AuthenticatorData {
    pub fn parse(bytes: &[u8]) -> AppResult<Self> {
        if bytes.len() < MIN_AUTHENTICATOR_DATA_LEN {
            return Err(malformed("authenticator data is too short"));
        }

        let mut rp_id_hash = [0u8; 32];
        rp_id_hash.copy_from_slice(&bytes[0..32]);
        let flags = bytes[32];
        let sign_count = u32::from_be_bytes([bytes[33], bytes[34], bytes[35], bytes[36]]);

        let mut offset = MIN_AUTHENTICATOR_DATA_LEN;
        let attested_credential = if flags & FLAG_ATTESTED_CREDENTIAL != 0 {
            let (data, consumed) = parse_attested_credential(&bytes[offset..])?;
            offset += consumed;
            Some(data)
        } else {
            None
        };

        if flags & FLAG_EXTENSION_DATA != 0 {
            let (_, consumed) = read_cbor_item(&bytes[offset..])
                .map_err(|_| malformed("extension data is not valid CBOR"))?;
            offset += consumed;
        }

        if offset != bytes.len() {
            return Err(malformed("trailing bytes after authenticator data"));
        }

        Ok(Self {
            rp_id_hash,
            flags,
            sign_count,
            attested_credential,
        })
    }

    pub fn user_present(&self) -> bool {
        self.flags & FLAG_USER_PRESENT != 0
    }

    pub fn user_verified(&self) -> bool {
        self.flags & FLAG_USER_VERIFIED != 0
    }

    pub fn backup_eligible(&self) -> bool {
        self.flags & FLAG_BACKUP_ELIGIBLE != 0
    }

    pub fn backed_up(&self) -> bool {
        self.flags & FLAG_BACKUP_STATE != 0
    }
}

fn parse_attested_credential(bytes: &[u8]) -> AppResult<(AttestedCredentialData, usize)> {
    if bytes.len() < 18 {
        return Err(malformed("attested credential data is truncated"));
    }
    let mut aaguid = [0u8; 16];
    aaguid.copy_from_slice(&bytes[0..16]);
    let id_len = u16::from_be_bytes([bytes[16], bytes[17]]) as usize;

    let id_end = 18 + id_len;
    if bytes.len() < id_end {
        return Err(malformed("credential id is truncated"));
    }
    let credential_id = bytes[18..id_end].to_vec();

    let (_, key_len) = read_cbor_item(&bytes[id_end..])
        .map_err(|_| malformed("credential public key is not valid CBOR"))?;
    let public_key = bytes[id_end..id_end + key_len].to_vec();

    Ok((
        AttestedCredentialData {
            aaguid,
            credential_id,
            public_key,
        },
        id_end + key_len,
    ))
}

/// Decode one CBOR item from the front of `bytes`, returning it and its length
fn read_cbor_item(bytes: &[u8]) -> Result<(Value, usize), ciborium::de::Error<std::io::Error>> {
    let mut cursor = Cursor::new(bytes);
    let value: Value = ciborium::from_reader(&mut cursor)?;
    Ok((value, cursor.position() as usize))
}

/// Decoded `attestationObject`
#[derive(Debug, Clone)]
pub struct AttestationObject {
    pub fmt: String,
    pub att_stmt: Vec<(Value, Value)>,
    /// Raw authenticator data, needed again for signature verification
    pub auth_data_bytes: Vec<u8>,
    pub auth_data: AuthenticatorData,
}

impl AttestationObject {
    pub fn parse(bytes: &[u8]) -> AppResult<Self> {
        let value: Value = ciborium::from_reader(bytes)
            .map_err(|_| malformed("attestation object is not valid CBOR"))?;
        let Value::Map(entries) = value else {
            return Err(malformed("attestation object is not a CBOR map"));
        };

        let mut fmt = None;
        let mut att_stmt = None;
        let mut auth_data_bytes = None;
        for (key, value) in entries {
            match (key.as_text(), value) {
                (Some("fmt"), Value::Text(text)) => fmt = Some(text),
                (Some("attStmt"), Value::Map(map)) => att_stmt = Some(map),
                (Some("authData"), Value::Bytes(data)) => auth_data_bytes = Some(data),
                _ => {}
            }
        }

        let fmt = fmt.ok_or_else(|| malformed("attestation object lacks 'fmt'"))?;
        let auth_data_bytes =
            auth_data_bytes.ok_or_else(|| malformed("attestation object lacks 'authData'"))?;
        let auth_data = AuthenticatorData::parse(&auth_data_bytes)?;

        Ok(Self {
            fmt,
            att_stmt: att_stmt.unwrap_or_default(),
            auth_data_bytes,
            auth_data,
        })
    }

    /// Look up a text-keyed member of the attestation statement
    pub fn statement(&self, key: &str) -> Option<&Value> {
        self.att_stmt
            .iter()
            .find(|(k, _)| k.as_text() == Some(key))
            .map(|(_, v)| v)
    }
}

fn malformed(msg: &str) -> AppError {
    AppError::MalformedRequest(msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cose_key() -> Vec<u8> {
        let map = Value::Map(vec![
            (Value::Integer(1i64.into()), Value::Integer(2i64.into())),
            (Value::Integer(3i64.into()), Value::Integer((-7i64).into())),
            (Value::Integer((-1i64).into()), Value::Integer(1i64.into())),
            (Value::Integer((-2i64).into()), Value::Bytes(vec![0x11; 32])),
            (Value::Integer((-3i64).into()), Value::Bytes(vec![0x22; 32])),
        ]);
        let mut buf = Vec::new();
        ciborium::into_writer(&map, &mut buf).unwrap();
        buf
    }

    fn registration_auth_data(flags: u8, credential_id: &[u8]) -> Vec<u8> {
        let mut data = vec![0xab; 32];
        data.push(flags);
        data.extend_from_slice(&7u32.to_be_bytes());
        data.extend_from_slice(&[0x5a; 16]);
        data.extend_from_slice(&(credential_id.len() as u16).to_be_bytes());
        data.extend_from_slice(credential_id);
        data.extend_from_slice(&cose_key());
        data
    }

    #[test]
    fn parses_assertion_layout() {
        let mut data = vec![0x01; 32];
        data.push(FLAG_USER_PRESENT | FLAG_USER_VERIFIED);
        data.extend_from_slice(&42u32.to_be_bytes());

        let parsed = AuthenticatorData::parse(&data).unwrap();
        assert_eq!(parsed.rp_id_hash, [0x01; 32]);
        assert_eq!(parsed.sign_count, 42);
        assert!(parsed.user_present());
        assert!(parsed.user_verified());
        assert!(!parsed.backup_eligible());
        assert!(parsed.attested_credential.is_none());
    }

    #[test]
    fn parses_attested_credential_and_isolates_cose_key() {
        let data = registration_auth_data(FLAG_USER_PRESENT | FLAG_ATTESTED_CREDENTIAL, b"cred-1");
        let parsed = AuthenticatorData::parse(&data).unwrap();
        let attested = parsed.attested_credential.unwrap();
        assert_eq!(attested.aaguid, [0x5a; 16]);
        assert_eq!(attested.credential_id, b"cred-1");
        assert_eq!(attested.public_key, cose_key());
        assert_eq!(parsed.sign_count, 7);
    }

    #[test]
    fn extension_data_is_skipped() {
        let mut data = registration_auth_data(
            FLAG_USER_PRESENT | FLAG_ATTESTED_CREDENTIAL | FLAG_EXTENSION_DATA,
            b"cred-1",
        );
        let ext = Value::Map(vec![(Value::Text("credProtect".into()), Value::Integer(1i64.into()))]);
        ciborium::into_writer(&ext, &mut data).unwrap();
        assert!(AuthenticatorData::parse(&data).is_ok());
    }

    #[test]
    fn rejects_truncated_and_trailing_data() {
        assert!(matches!(
            AuthenticatorData::parse(&[0u8; 36]),
            Err(AppError::MalformedRequest(_))
        ));

        let mut data = registration_auth_data(FLAG_USER_PRESENT | FLAG_ATTESTED_CREDENTIAL, b"id");
        data.truncate(60);
        assert!(AuthenticatorData::parse(&data).is_err());

        let mut data = vec![0u8; 37];
        data.push(0xff);
        assert!(AuthenticatorData::parse(&data).is_err());
    }

    #[test]
    fn parses_attestation_object() {
        let auth_data = registration_auth_data(FLAG_USER_PRESENT | FLAG_ATTESTED_CREDENTIAL, b"id");
        let object = Value::Map(vec![
            (Value::Text("fmt".into()), Value::Text("none".into())),
            (Value::Text("attStmt".into()), Value::Map(vec![])),
            (Value::Text("authData".into()), Value::Bytes(auth_data.clone())),
        ]);
        let mut buf = Vec::new();
        ciborium::into_writer(&object, &mut buf).unwrap();

        let parsed = AttestationObject::parse(&buf).unwrap();
        assert_eq!(parsed.fmt, "none");
        assert_eq!(parsed.auth_data_bytes, auth_data);
        assert!(parsed.statement("sig").is_none());
    }

    #[test]
    fn attestation_object_requires_auth_data() {
        let object = Value::Map(vec![(Value::Text("fmt".into()), Value::Text("none".into()))]);
        let mut buf = Vec::new();
        ciborium::into_writer(&object, &mut buf).unwrap();
        assert!(matches!(
            AttestationObject::parse(&buf),
            Err(AppError::MalformedRequest(_))
        ));
    }
}
