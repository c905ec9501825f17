use serde::Deserialize;

use video_capture_core::models::error::TransferError;
use video_capture_core::traits::upload_transport::{CredentialStore, Credentials};

/// On-disk credential blob: `{"access_token": "..."}`.
///
/// Provisioned out of band; refreshing the token is not this crate's job.
#[derive(Deserialize)]
struct AccessToken {
    access_token: String,
}

/// Read a bearer token from `store`.
pub fn read_bearer_token(store: &CredentialStore) -> Result<Credentials, TransferError> {
    let blob = store.read_blob()?;
    parse_bearer_token(&blob).map_err(|reason| {
        TransferError::AuthUnavailable(format!("{}: {}", store.path().display(), reason))
    })
}

fn parse_bearer_token(blob: &[u8]) -> Result<Credentials, String> {
    let token: AccessToken = serde_json::from_slice(blob).map_err(|e| e.to_string())?;
    let secret = token.access_token.trim();
    if secret.is_empty() {
        return Err("access_token is empty".into());
    }
    Ok(Credentials::new(secret))
}
