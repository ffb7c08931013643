use chrono::{DateTime, Utc};
use p256::pkcs8::{DecodePublicKey, EncodePublicKey};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errortypes::{Error, ErrorData};

pub const U2F: &str = "u2f";
pub const SECONDARY: &str = "secondary";

/// Persisted secondary authenticator record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: Uuid,
    pub user: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub mode: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub disabled: bool,
    pub active_until: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    #[serde(default)]
    pub u2f_raw: Vec<u8>,
    #[serde(default)]
    pub u2f_counter: u32,
    #[serde(default)]
    pub u2f_key_handle: Vec<u8>,
    #[serde(default)]
    pub u2f_public_key: Vec<u8>,
}

/// Decoded authenticator registration. The public key is ECDSA P-256,
/// persisted in PKIX form.
#[derive(Debug, Clone)]
pub struct Registration {
    pub raw: Vec<u8>,
    pub key_handle: Vec<u8>,
    pub public_key: p256::PublicKey,
}

impl Device {
    pub fn validate(&self) -> Result<(), ErrorData> {
        if self.name.is_empty() {
            return Err(ErrorData::new(
                "device_name_missing",
                "Device name is required",
            ));
        }

        if self.name.len() > 22 {
            return Err(ErrorData::new(
                "device_name_invalid",
                "Device name is too long",
            ));
        }

        if self.kind != U2F {
            return Err(ErrorData::new(
                "device_type_invalid",
                "Device type is invalid",
            ));
        }

        if self.mode != SECONDARY {
            return Err(ErrorData::new(
                "device_mode_invalid",
                "Device mode is invalid",
            ));
        }

        Ok(())
    }

    pub fn marshal_registration(&mut self, reg: &Registration) -> Result<(), Error> {
        let pub_pkix = reg.public_key.to_public_key_der().map_err(|e| {
            Error::Parse(format!("device: Failed to marshal device public key: {}", e))
        })?;

        self.u2f_raw = reg.raw.clone();
        self.u2f_key_handle = reg.key_handle.clone();
        self.u2f_public_key = pub_pkix.as_bytes().to_vec();

        Ok(())
    }

    pub fn unmarshal_registration(&self) -> Result<Registration, Error> {
        let public_key = p256::PublicKey::from_public_key_der(&self.u2f_public_key)
            .map_err(|e| Error::Parse(format!("device: Failed to parse device public key: {}", e)))?;

        Ok(Registration {
            raw: self.u2f_raw.clone(),
            key_handle: self.u2f_key_handle.clone(),
            public_key,
        })
    }
}
