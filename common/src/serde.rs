use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::file_format::FileFormat;

#[derive(Debug, thiserror::Error)]
pub enum SerdeError {
    #[error("YAML serialization failed")]
    Yaml(#[from] serde_yml::Error),
    #[error("JSON serialization failed")]
    Json(#[from] serde_json::Error),
    #[error("Binary encoding failed")]
    BinEncode(#[from] bincode::error::EncodeError),
    #[error("Binary decoding failed")]
    BinDecode(#[from] bincode::error::DecodeError),
    #[error("Binary payload decompression failed")]
    Decompress(#[from] lz4_flex::block::DecompressError),
    #[error("Text payload is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("Binary payload has {0} trailing bytes")]
    TrailingBytes(usize),
}

pub type Result<T> = std::result::Result<T, SerdeError>;

/// Encodes `value`; text formats always end with a single trailing newline.
pub fn serialize<T: Serialize>(value: &T, format: FileFormat) -> Result<Vec<u8>> {
    let mut text = match format {
        FileFormat::Yaml => serde_yml::to_string(value)?,
        FileFormat::Json => serde_json::to_string_pretty(value)?,
        FileFormat::Bin => {
            let encoded = bincode::serde::encode_to_vec(value, bincode::config::standard())?;
            return Ok(lz4_flex::compress_prepend_size(&encoded));
        }
    };

    if !text.ends_with('\n') {
        text.push('\n');
    }
    Ok(text.into_bytes())
}

pub fn deserialize<T: DeserializeOwned>(serialized: &[u8], format: FileFormat) -> Result<T> {
    match format {
        FileFormat::Yaml => {
            let text = std::str::from_utf8(serialized)?;
            Ok(serde_yml::from_str(text)?)
        }
        FileFormat::Json => {
            let text = std::str::from_utf8(serialized)?;
            Ok(serde_json::from_str(text)?)
        }
        FileFormat::Bin => {
            let decompressed = lz4_flex::decompress_size_prepended(serialized)?;
            let (decoded, read) =
                bincode::serde::decode_from_slice(&decompressed, bincode::config::standard())?;
            if read != decompressed.len() {
                return Err(SerdeError::TrailingBytes(decompressed.len() - read));
            }
            Ok(decoded)
        }
    }
}
