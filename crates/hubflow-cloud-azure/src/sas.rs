//! Shared-access-signature tokens for the device registry

use crate::error::{AzureError, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Build a `SharedAccessSignature` authorization value.
///
/// The signature is HMAC-SHA256 over `<url-encoded resource>\n<expiry>`,
/// keyed with the base64-decoded policy key.
pub fn generate_sas_token(
    resource_uri: &str,
    key: &str,
    policy_name: Option<&str>,
    expiry: i64,
) -> Result<String> {
    let encoded_uri = urlencoding::encode(resource_uri);
    let to_sign = format!("{}\n{}", encoded_uri, expiry);

    let key_bytes = STANDARD
        .decode(key)
        .map_err(|e| AzureError::InvalidKey(e.to_string()))?;
    let mut mac =
        HmacSha256::new_from_slice(&key_bytes).map_err(|e| AzureError::InvalidKey(e.to_string()))?;
    mac.update(to_sign.as_bytes());
    let signature = STANDARD.encode(mac.finalize().into_bytes());

    let mut token = format!(
        "SharedAccessSignature sr={}&sig={}&se={}",
        encoded_uri,
        urlencoding::encode(&signature),
        expiry
    );
    if let Some(policy) = policy_name {
        token.push_str("&skn=");
        token.push_str(policy);
    }
    Ok(token)
}
