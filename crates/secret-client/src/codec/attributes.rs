use std::collections::HashMap;

use crate::{
    error::{Error, Result},
    wire::WireValue,
};

/// Lookup attributes of an item.
pub type Attributes = HashMap<String, String>;

/// Encode attributes as a string dictionary.
pub fn attributes_to_wire(attributes: &Attributes) -> WireValue {
    WireValue::Dict(
        attributes
            .iter()
            .map(|(key, value)| (key.clone(), WireValue::Str(value.clone())))
            .collect(),
    )
}

/// Decode an attribute dictionary.
///
/// Entries may be plain strings or variants; variant entries holding an object path, a
/// boolean or an integer are converted to their string form. Any other entry type is a
/// protocol error.
pub fn attributes_from_wire(wire: &WireValue) -> Result<Attributes> {
    let entries = wire.as_dict().ok_or_else(|| {
        Error::Protocol("Received invalid attributes from the secret storage".to_string())
    })?;

    entries
        .iter()
        .map(|(key, value)| Ok::<_, Error>((key.clone(), attribute_string(key, value)?)))
        .collect()
}

fn attribute_string(key: &str, value: &WireValue) -> Result<String> {
    let string = match value.unboxed() {
        WireValue::Str(s) | WireValue::ObjectPath(s) => s.clone(),
        WireValue::Bool(b) => b.to_string(),
        WireValue::I32(n) => n.to_string(),
        WireValue::U32(n) => n.to_string(),
        WireValue::I64(n) => n.to_string(),
        WireValue::U64(n) => n.to_string(),
        _ => {
            return Err(Error::Protocol(format!(
                "Attribute {key} has a value that is not a string"
            )))
        }
    };
    Ok(string)
}
