//! Real-time endpoint composition.

use crate::envelope::ProtocolError;

/// Builds `<base>/<tenant_id>/<user_id>`.
///
/// Ids are percent-encoded as single path segments. The base must use the
/// `ws` or `wss` scheme.
pub fn endpoint_url(base: &str, tenant_id: &str, user_id: &str) -> Result<String, ProtocolError> {
    let base = base.trim().trim_end_matches('/');
    let rest = base
        .strip_prefix("ws://")
        .or_else(|| base.strip_prefix("wss://"))
        .ok_or_else(|| ProtocolError::InvalidEndpoint(format!("unsupported scheme in {base:?}")))?;
    if rest.is_empty() {
        return Err(ProtocolError::InvalidEndpoint(format!("missing host in {base:?}")));
    }
    if tenant_id.is_empty() || user_id.is_empty() {
        return Err(ProtocolError::InvalidEndpoint(
            "tenant and user ids must not be empty".into(),
        ));
    }
    Ok(format!(
        "{base}/{}/{}",
        urlencoding::encode(tenant_id),
        urlencoding::encode(user_id)
    ))
}
