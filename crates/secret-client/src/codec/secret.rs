use crate::{error::Result, session::Session, value::SecretValue, wire::WireValue};

/// Encode a secret for transfer over `session`.
///
/// The wire form is a struct of the session parameters, the value bytes and the content
/// type. Encrypted sessions put a fresh IV in the parameters and the ciphertext in the value.
pub fn encode_secret(value: &SecretValue, session: &Session) -> Result<WireValue> {
    let (parameters, bytes) = match session.key() {
        Some(key) => {
            let payload = key.encrypt(value.get())?;
            (payload.iv, payload.ciphertext)
        }
        None => (Vec::new(), value.get().to_vec()),
    };

    Ok(WireValue::Struct(vec![
        WireValue::Bytes(parameters),
        WireValue::Bytes(bytes),
        WireValue::Str(value.content_type().to_owned()),
    ]))
}

/// Decode a secret received over `session`.
///
/// Returns `None` if the value does not have the expected shape, if a plain session carries
/// parameters, or if the ciphertext does not decrypt under the session key.
pub fn decode_secret(wire: &WireValue, session: &Session) -> Option<SecretValue> {
    let [parameters, bytes, content_type] = wire.as_struct()? else {
        return None;
    };
    let parameters = parameters.as_bytes()?;
    let bytes = bytes.as_bytes()?;
    let content_type = content_type.as_str()?;

    let secret = match session.key() {
        Some(key) => key.decrypt(parameters, bytes).ok()?,
        None if parameters.is_empty() => zeroize::Zeroizing::new(bytes.to_vec()),
        None => return None,
    };

    Some(SecretValue::from_zeroizing(secret, content_type.to_owned()))
}
