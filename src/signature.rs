use anyhow::{anyhow, bail, Result};
use constant_time_eq::constant_time_eq;
use hmac::{Hmac, Mac};
use sha2::Sha256;

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";
pub const SIGNATURE_PREFIX: &str = "sha256=";

// Left in place by `.env.example` until someone runs the openssl command.
const SECRET_TEMPLATE_PREFIX: &str = "$(openssl";

/// `sha256=<lowercase hex HMAC-SHA256 of body>`
pub fn compute_signature(secret: &str, body: &[u8]) -> Result<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow!("Invalid webhook secret: {}", e))?;
    mac.update(body);
    let digest = mac.finalize().into_bytes();
    Ok(format!("{}{}", SIGNATURE_PREFIX, hex::encode(digest)))
}

/// Compares the full supplied header value against our own signature of the
/// raw body. A missing header never verifies.
pub fn verify_signature(secret: &str, body: &[u8], supplied: Option<&str>) -> bool {
    let Some(supplied) = supplied else {
        return false;
    };
    let Ok(expected) = compute_signature(secret, body) else {
        return false;
    };
    expected.len() == supplied.len() && constant_time_eq(expected.as_bytes(), supplied.as_bytes())
}

pub fn ensure_secret_configured(secret: &str) -> Result<()> {
    if secret.trim().is_empty() {
        bail!("WEBHOOK_SECRET must not be empty");
    }
    if secret.starts_with(SECRET_TEMPLATE_PREFIX) {
        bail!("Please change the WEBHOOK_SECRET in your environment variables");
    }
    Ok(())
}
