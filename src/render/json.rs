use serde::Serialize;

use crate::error::UniSearchError;

pub fn to_pretty<T: Serialize>(value: &T) -> Result<String, UniSearchError> {
    Ok(serde_json::to_string_pretty(value)?)
}
