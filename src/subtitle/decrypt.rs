//! Subtitle payload decryption
//!
//! Payloads are zlib streams encrypted with AES-256-CBC. The ciphertext is
//! block aligned and carries no standard padding; anything after the end of
//! the zlib stream is ignored.

use super::key::derive_key;
use super::wire::Subtitle;
use super::SubtitleError;
use aes::Aes256;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use cbc::Decryptor;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, KeyIvInit};
use flate2::read::ZlibDecoder;
use std::io::Read;

type Aes256CbcDec = Decryptor<Aes256>;

/// Decrypts and inflates the payload of a subtitle track
///
/// Returns the serialized subtitle script (XML text).
pub fn decrypt(subtitle: &Subtitle) -> Result<String, SubtitleError> {
    let iv = STANDARD
        .decode(subtitle.iv.trim())
        .map_err(|e| SubtitleError::Decode(format!("initialization vector: {}", e)))?;
    let mut data = STANDARD
        .decode(subtitle.data.trim())
        .map_err(|e| SubtitleError::Decode(format!("payload: {}", e)))?;

    let key = derive_key(subtitle.id);
    let compressed = decrypt_blocks(&key, &iv, &mut data)?;

    inflate(compressed)
}

/// Runs AES-256-CBC over `data` in place and returns the decrypted bytes
fn decrypt_blocks<'a>(
    key: &[u8],
    iv: &[u8],
    data: &'a mut [u8],
) -> Result<&'a [u8], SubtitleError> {
    let cipher = Aes256CbcDec::new_from_slices(key, iv)
        .map_err(|e| SubtitleError::Decrypt(format!("invalid key or iv length: {}", e)))?;

    let plaintext = cipher
        .decrypt_padded_mut::<NoPadding>(data)
        .map_err(|_| {
            SubtitleError::Decrypt("ciphertext is not a whole number of blocks".to_string())
        })?;

    Ok(plaintext)
}

/// Inflates a zlib stream into UTF-8 text
fn inflate(compressed: &[u8]) -> Result<String, SubtitleError> {
    let mut decoder = ZlibDecoder::new(compressed);
    let mut text = String::new();
    decoder
        .read_to_string(&mut text)
        .map_err(|e| SubtitleError::Inflate(e.to_string()))?;

    if text.is_empty() {
        return Err(SubtitleError::Inflate("payload inflated to nothing".to_string()));
    }

    Ok(text)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SAMPLE_ID: i64 = 758912;
    pub(crate) const SAMPLE_IV: &str = "AAECAwQFBgcICQoLDA0ODw==";
    pub(crate) const SAMPLE_DATA: &str = "Btsv5Y0Rpj5xg4axcz5rQ/ShaF5I2RBLpoz3WfJL6JTguP+U/u5DPop6hQF19tcBTctlZukKe9BfTCGykYMCg+U+bLt13Ye9+PB+qgj5i77zOkKIvP5dU56BYVAIjgPCJJJ1b4ItxfSc2GEHy6bcgNJWVWbA4A2BB939jR1Kd8WpnJrCLOlBFxU1K7y+FXOZS1OTde5+uTi4444tAZ8scRI9/kNUdkswX02QMzuERBKq2cZnmsap1VDeKqeoTiaTkMPyJxbrrs6LvL7aQcp0VhMGPbAd/4subkkDD8rfSnjsrVAEL5+r6cjv+AU2Ofi8RNDSsBXGOsBOjm9LZCbGKQuScnSjPkuPLkZa01FT9wn1JpAq3mUyZMOiWLYNI79s9PdRDycRUe8Z/33chkPppY4HIonp9c2NMT54r6Vlq4NK5WWvZRqsQcdOZJ7whE3t3eF4hlNUe7KOJTX30mp29QHy77ODyLJh2WOq++jlEVVre53Tqp0HkxUed+3S/U9TAiCEkve3sIssWWn+jd4iFSWq/f7J+hk/cj9Z1F86CQwttg57/PKDyVDKUC+3lNXv+SWfNtF2Hnq2U/+WQ/W0PvOOVAiLtUm5ewe3+buJcMzRcNCNU9AJSquqD2qVPHssKi0Yyn5VfuMrud+Vl1cn2fca+ZVD9QNfqmnuuBiw6vY=";
    pub(crate) const SAMPLE_SCRIPT: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><subtitle_script id="758912" title="English (US)" play_res_x="656" play_res_y="368" lang_code="enUS" lang_string="English (US)" created="2016-07-01T10:00:00-07:00" progress_string="" status_string="" wrap_style="0"><styles><style id="1" name="Main" font_name="Trebuchet MS" font_size="24" primary_colour="&amp;H00FFFFFF" secondary_colour="&amp;H000000FF" outline_colour="&amp;H00000000" back_colour="&amp;H00000000" bold="1" italic="0" underline="0" strikeout="0" scale_x="100" scale_y="100" spacing="0" angle="0" border_style="1" outline="2" shadow="1" alignment="2" margin_l="0020" margin_r="0020" margin_v="0022" encoding="0"/></styles><events><event id="1" start="0:00:01.23" end="0:00:03.45" style="Main" name="" margin_l="0000" margin_r="0000" margin_v="0000" effect="" text="Hello there."/><event id="2" start="0:00:04.00" end="0:00:06.10" style="Main" name="Narrator" margin_l="0000" margin_r="0000" margin_v="0000" effect="" text="{\i1}Second line{\i0}\NWrapped."/></events></subtitle_script>"#;

    pub(crate) fn sample_subtitle() -> Subtitle {
        Subtitle {
            id: SAMPLE_ID,
            title: "[English (US)] English (US)".to_string(),
            iv: SAMPLE_IV.to_string(),
            data: SAMPLE_DATA.to_string(),
            ..Subtitle::default()
        }
    }

    #[test]
    fn test_decrypt_known_payload() {
        let plaintext = decrypt(&sample_subtitle()).unwrap();
        assert_eq!(plaintext, SAMPLE_SCRIPT);
    }

    #[test]
    fn test_decrypt_rejects_bad_base64() {
        let mut subtitle = sample_subtitle();
        subtitle.data = "not base64!!".to_string();
        assert!(matches!(decrypt(&subtitle), Err(SubtitleError::Decode(_))));
    }

    #[test]
    fn test_decrypt_rejects_short_iv() {
        let mut subtitle = sample_subtitle();
        subtitle.iv = "AAEC".to_string();
        assert!(matches!(decrypt(&subtitle), Err(SubtitleError::Decrypt(_))));
    }

    #[test]
    fn test_decrypt_rejects_unaligned_ciphertext() {
        let mut subtitle = sample_subtitle();
        subtitle.data = STANDARD.encode([1u8; 20]);
        assert!(matches!(decrypt(&subtitle), Err(SubtitleError::Decrypt(_))));
    }

    #[test]
    fn test_wrong_key_fails_to_inflate() {
        let mut subtitle = sample_subtitle();
        subtitle.id = SAMPLE_ID + 1;
        assert!(matches!(decrypt(&subtitle), Err(SubtitleError::Inflate(_))));
    }
}
