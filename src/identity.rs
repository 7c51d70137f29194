use std::path::{Path, PathBuf};

use nostr_sdk::prelude::*;
use serde::{Deserialize, Serialize};

const IDENTITY_FILE: &str = "nostr_identity.key";

/// Public half of the buyer identity, as shown in the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityResponse {
    pub pubkey_hex: String,
    pub npub: String,
}

impl IdentityResponse {
    pub fn from_keys(keys: &Keys) -> Result<Self, String> {
        Ok(Self {
            pubkey_hex: keys.public_key().to_hex(),
            npub: keys
                .public_key()
                .to_bech32()
                .map_err(|e| format!("bech32 error: {e}"))?,
        })
    }
}

fn key_path(app_data_dir: &Path) -> PathBuf {
    app_data_dir.join(IDENTITY_FILE)
}

/// Write `keys` to `<app_data_dir>/nostr_identity.key`.
pub fn save_keys(app_data_dir: &Path, keys: &Keys) -> Result<(), String> {
    std::fs::create_dir_all(app_data_dir)
        .map_err(|e| format!("failed to create data dir: {e}"))?;
    std::fs::write(key_path(app_data_dir), keys.secret_key().to_secret_hex())
        .map_err(|e| format!("failed to write key file: {e}"))
}

/// Keys saved in `<app_data_dir>/nostr_identity.key`, if any.
pub fn load_keys(app_data_dir: &Path) -> Result<Option<Keys>, String> {
    let path = key_path(app_data_dir);
    if !path.exists() {
        return Ok(None);
    }
    let hex_str =
        std::fs::read_to_string(&path).map_err(|e| format!("failed to read key file: {e}"))?;
    let secret_key = SecretKey::from_hex(hex_str.trim())
        .map_err(|e| format!("failed to parse secret key: {e}"))?;
    Ok(Some(Keys::new(secret_key)))
}

/// Load the saved keypair, generating and saving a fresh one on first run.
pub fn load_or_generate_keys(app_data_dir: &Path) -> Result<Keys, String> {
    if let Some(keys) = load_keys(app_data_dir)? {
        return Ok(keys);
    }
    let keys = Keys::generate();
    save_keys(app_data_dir, &keys)?;
    log::info!("generated new nostr identity {}", keys.public_key());
    Ok(keys)
}

/// Decode an `nsec` secret key. Nothing is written.
pub fn parse_nsec(nsec: &str) -> Result<Keys, String> {
    let secret_key =
        SecretKey::from_bech32(nsec.trim()).map_err(|e| format!("invalid nsec: {e}"))?;
    Ok(Keys::new(secret_key))
}

/// Remove the saved identity. A missing file is not an error.
pub fn delete_keys(app_data_dir: &Path) -> Result<(), String> {
    let path = key_path(app_data_dir);
    if path.exists() {
        std::fs::remove_file(&path).map_err(|e| format!("failed to delete key file: {e}"))?;
    }
    Ok(())
}
