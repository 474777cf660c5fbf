use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use bytes::Bytes;

use crate::error::{TsdlError, TsdlResult};

pub const AES_128_KEY_SIZE: usize = 16;

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;

/// Transformation applied to the body of a downloaded segment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Codec {
    /// Segment is stored as fetched.
    #[default]
    Plain,
    /// AES-128-CBC with PKCS#7 padding.
    Aes128 { key: [u8; 16], iv: [u8; 16] },
}

impl Codec {
    pub fn aes128(key: &[u8], iv: &[u8]) -> TsdlResult<Self> {
        let key = key.try_into().map_err(|_| {
            TsdlError::DecodeFailed(format!(
                "AES-128 key must be {AES_128_KEY_SIZE} bytes, got {}",
                key.len()
            ))
        })?;
        let iv = iv.try_into().map_err(|_| {
            TsdlError::DecodeFailed(format!(
                "AES-128 IV must be {AES_128_KEY_SIZE} bytes, got {}",
                iv.len()
            ))
        })?;
        Ok(Self::Aes128 { key, iv })
    }

    pub fn decode(&self, data: Bytes) -> TsdlResult<Bytes> {
        match self {
            Codec::Plain => Ok(data),
            Codec::Aes128 { key, iv } => {
                let decryptor = Aes128CbcDec::new(key.into(), iv.into());
                let plain = decryptor
                    .decrypt_padded_vec_mut::<Pkcs7>(&data)
                    .map_err(|e| TsdlError::DecodeFailed(e.to_string()))?;
                Ok(Bytes::from(plain))
            }
        }
    }

    pub fn encode(&self, data: &[u8]) -> Bytes {
        match self {
            Codec::Plain => Bytes::copy_from_slice(data),
            Codec::Aes128 { key, iv } => {
                let encryptor = Aes128CbcEnc::new(key.into(), iv.into());
                Bytes::from(encryptor.encrypt_padded_vec_mut::<Pkcs7>(data))
            }
        }
    }
}

/// Parse the `IV` attribute of `#EXT-X-KEY`, a hexadecimal integer of up to 128 bits.
pub fn parse_iv(iv: &str) -> TsdlResult<[u8; 16]> {
    let hex_str = iv
        .strip_prefix("0x")
        .or_else(|| iv.strip_prefix("0X"))
        .unwrap_or(iv);

    let decoded = if hex_str.len() % 2 == 1 {
        hex::decode(format!("0{hex_str}"))
    } else {
        hex::decode(hex_str)
    }
    .map_err(|_| TsdlError::InvalidIv(iv.to_string()))?;

    if decoded.len() > 16 {
        return Err(TsdlError::InvalidIv(iv.to_string()));
    }

    let mut result = [0u8; 16];
    result[16 - decoded.len()..].copy_from_slice(&decoded);
    Ok(result)
}

/// IV used when a key declares none: the media sequence number as a big-endian 128-bit integer.
pub fn sequence_iv(media_sequence: u64) -> [u8; 16] {
    (media_sequence as u128).to_be_bytes()
}
