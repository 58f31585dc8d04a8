//! Decoding of the image payload a drawing is submitted as: a data URI
//! such as `data:image/png;base64,iVBOR...` or just the base64 body.

use base64::Engine;

use crate::error::StoreError;

const BASE64_MARKER: &str = ";base64,";

/// Strips the `data:<mime>;base64,` scheme prefix when present.
pub fn strip_data_uri(payload: &str) -> Result<&str, StoreError>
{
	let payload = payload.trim();
	let Some(rest) = payload.strip_prefix("data:") else {
		return Ok(payload);
	};

	let (mime, body) = rest
		.split_once(BASE64_MARKER)
		.ok_or_else(|| StoreError::DecodeFailure("data URI is not base64-encoded".to_string()))?;

	if !mime.starts_with("image/")
	{
		return Err(StoreError::DecodeFailure(format!("unsupported media type {:?}", mime)));
	}

	Ok(body)
}

pub fn decode_payload(payload: &str) -> Result<Vec<u8>, StoreError>
{
	let body = strip_data_uri(payload)?;
	// Form encoding and copy-paste tend to leave line breaks in long payloads.
	let body: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
	if body.is_empty()
	{
		return Err(StoreError::DecodeFailure("empty image payload".to_string()));
	}

	base64::engine::general_purpose::STANDARD
		.decode(body.as_bytes())
		.map_err(|e| StoreError::DecodeFailure(format!("invalid base64: {}", e)))
}
