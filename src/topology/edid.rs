//! EDID identity decoding
//!
//! Only the identity fields are decoded: the three-letter manufacturer code,
//! the product (model name descriptor, or the numeric product code), and the
//! serial (serial descriptor, or the numeric serial). These are the values
//! the persisted layout store keys its monitor specs on.

use serde::Serialize;

/// Size of the EDID base block
const BASE_BLOCK_LEN: usize = 128;

/// First and past-the-end offsets of the four 18-byte descriptors
const DESCRIPTOR_START: usize = 0x36;
const DESCRIPTOR_END: usize = 0x7E;
const DESCRIPTOR_LEN: usize = 0x12;

const TAG_PRODUCT_NAME: u8 = 0xFC;
const TAG_SERIAL: u8 = 0xFF;

/// Decoded monitor identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EdidIdentity {
    /// PNP manufacturer id, e.g. "SHP"
    pub vendor: String,
    /// Model name, or the product code as `0x...`
    pub product: String,
    /// Serial string, or the serial number as `0x%08x`
    pub serial: String,
}

impl EdidIdentity {
    /// Decode the identity from a raw EDID blob
    ///
    /// Returns `None` when the blob is shorter than the base block or the
    /// manufacturer id is not made of letters.
    pub fn decode(edid: &[u8]) -> Option<Self> {
        if edid.len() < BASE_BLOCK_LEN {
            return None;
        }

        let vendor = decode_vendor(u16::from_be_bytes([edid[8], edid[9]]))?;

        let product_code = u16::from_le_bytes([edid[10], edid[11]]);
        let product = descriptor_text(edid, TAG_PRODUCT_NAME)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| format!("{:#x}", product_code));

        let serial_number = u32::from_le_bytes([edid[12], edid[13], edid[14], edid[15]]);
        let serial = descriptor_text(edid, TAG_SERIAL)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| format!("0x{:08x}", serial_number));

        Some(Self {
            vendor,
            product,
            serial,
        })
    }
}

/// Three packed 5-bit letters, 1 = 'A'
fn decode_vendor(packed: u16) -> Option<String> {
    [(packed >> 10) & 0x1F, (packed >> 5) & 0x1F, packed & 0x1F]
        .iter()
        .map(|&c| match c {
            1..=26 => Some(char::from(b'A' + (c as u8) - 1)),
            _ => None,
        })
        .collect()
}

/// Text of the last display descriptor carrying `tag`
fn descriptor_text(edid: &[u8], tag: u8) -> Option<String> {
    let mut found = None;

    for offset in (DESCRIPTOR_START..DESCRIPTOR_END).step_by(DESCRIPTOR_LEN) {
        let block = &edid[offset..offset + DESCRIPTOR_LEN];
        if block[0] != 0 || block[3] != tag {
            continue;
        }

        let text: Vec<u8> = block[5..]
            .iter()
            .take_while(|&&b| b != 0x0A)
            .copied()
            .collect();
        let text = String::from_utf8_lossy(&text)
            .trim_end_matches(['\0', ' '])
            .to_string();
        found = Some(text);
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_block() -> Vec<u8> {
        let mut edid = vec![0u8; BASE_BLOCK_LEN];
        edid[..8].copy_from_slice(&[0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00]);
        // "SHP"
        edid[8] = 0x4D;
        edid[9] = 0x10;
        // product 0x1476
        edid[10] = 0x76;
        edid[11] = 0x14;
        // serial 0x00000102
        edid[12] = 0x02;
        edid[13] = 0x01;
        edid
    }

    fn set_descriptor(edid: &mut [u8], slot: usize, tag: u8, text: &[u8]) {
        let offset = DESCRIPTOR_START + slot * DESCRIPTOR_LEN;
        edid[offset..offset + DESCRIPTOR_LEN].fill(0);
        edid[offset + 3] = tag;
        let body = &mut edid[offset + 5..offset + DESCRIPTOR_LEN];
        body.fill(b' ');
        body[..text.len()].copy_from_slice(text);
        if text.len() < body.len() {
            body[text.len()] = 0x0A;
        }
    }

    #[test]
    fn test_decode_numeric_fallbacks() {
        let id = EdidIdentity::decode(&base_block()).unwrap();
        assert_eq!(id.vendor, "SHP");
        assert_eq!(id.product, "0x1476");
        assert_eq!(id.serial, "0x00000102");
    }

    #[test]
    fn test_decode_descriptor_strings() {
        let mut edid = base_block();
        set_descriptor(&mut edid, 1, TAG_PRODUCT_NAME, b"DELL U2415");
        set_descriptor(&mut edid, 2, TAG_SERIAL, b"7MT0186R1FSL");

        let id = EdidIdentity::decode(&edid).unwrap();
        assert_eq!(id.product, "DELL U2415");
        assert_eq!(id.serial, "7MT0186R1FSL");
    }

    #[test]
    fn test_decode_full_width_name() {
        let mut edid = base_block();
        set_descriptor(&mut edid, 0, TAG_PRODUCT_NAME, b"ABCDEFGHIJKLM");

        let id = EdidIdentity::decode(&edid).unwrap();
        assert_eq!(id.product, "ABCDEFGHIJKLM");
    }

    #[test]
    fn test_short_blob_rejected() {
        assert!(EdidIdentity::decode(&[0u8; 64]).is_none());
    }

    #[test]
    fn test_invalid_vendor_rejected() {
        let mut edid = base_block();
        edid[8] = 0;
        edid[9] = 0;
        assert!(EdidIdentity::decode(&edid).is_none());
    }
}
