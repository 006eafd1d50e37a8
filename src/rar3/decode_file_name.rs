//! RAR3 stores non-ASCII filenames in a compact two-stream encoding:
//! the header carries `<ascii name> 0x00 <encoded data>`, where the
//! encoded part rebuilds the full UTF-16 name out of the ASCII part
//! plus correction bytes.
//!
//! The first encoded byte is a "high byte" template. The rest is driven
//! by 2-bit opcodes packed eight to a flag byte, high pair first:
//!
//! | Opcode | Meaning |
//! | ------ | ------- |
//! | 0 | next byte is a code unit with high byte 0 |
//! | 1 | next byte is a code unit with the template high byte |
//! | 2 | next two bytes are a full little-endian code unit |
//! | 3 | run: copy from the ASCII name, optionally shifted by a correction byte |

/// Decode the two-stream name into a string, replacing invalid UTF-16.
pub fn decode_file_name(std_name: &[u8], enc_data: &[u8]) -> String {
    let mut units: Vec<u16> = Vec::with_capacity(std_name.len());

    let Some((&hi, mut enc)) = enc_data.split_first() else {
        return String::from_utf8_lossy(std_name).into_owned();
    };
    let hi = hi as u16;

    let mut std_pos = 0;
    let mut flags = 0u8;
    let mut flag_bits = 0u8;

    fn next(enc: &mut &[u8]) -> Option<u8> {
        let (&b, rest) = enc.split_first()?;
        *enc = rest;
        Some(b)
    }

    loop {
        if flag_bits == 0 {
            flags = match next(&mut enc) {
                Some(b) => b,
                None => break,
            };
            flag_bits = 8;
        }
        flag_bits -= 2;

        match (flags >> flag_bits) & 0x03 {
            0 => {
                let Some(lo) = next(&mut enc) else { break };
                units.push(lo as u16);
                std_pos += 1;
            }
            1 => {
                let Some(lo) = next(&mut enc) else { break };
                units.push(lo as u16 | (hi << 8));
                std_pos += 1;
            }
            2 => {
                let (Some(lo), Some(hi2)) = (next(&mut enc), next(&mut enc)) else {
                    break;
                };
                units.push(lo as u16 | ((hi2 as u16) << 8));
                std_pos += 1;
            }
            _ => {
                let Some(n) = next(&mut enc) else { break };

                if n & 0x80 != 0 {
                    let Some(correction) = next(&mut enc) else { break };

                    for _ in 0..(n & 0x7f) + 2 {
                        let Some(&b) = std_name.get(std_pos) else { break };
                        units.push((b.wrapping_add(correction)) as u16 | (hi << 8));
                        std_pos += 1;
                    }
                } else {
                    for _ in 0..n + 2 {
                        let Some(&b) = std_name.get(std_pos) else { break };
                        units.push(b as u16);
                        std_pos += 1;
                    }
                }
            }
        }
    }

    String::from_utf16_lossy(&units)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_shift_jis_name() {
        let name = b"(\x88\xEA\x94\xCA\x83Q\x81[\x83\x80)\
                     [PC][DVD][050617] Ever17 -the out of infinity- PE DVD Edition(iso+mds)\
                     \\EVER17_DVD.iso";
        let enc = b"N\x1A(\x00,\x82\xB20\xA0\xFC0\xE00)[\x00PC]\
                    [\x03DVD\x00\x000506\x0017] \x00Ever\x0017 -\x00the \x00out \x00of \
                    i\x00nfin\x00ity-\x00 PE \x00DVD \x00Edit\x00ion(\x00iso+\x00mds)\
                    \x00\\EVE\x00R17_\x00DVD.\x00iso";

        assert_eq!(
            decode_file_name(name, enc),
            "(一般ゲーム)[PC][DVD][050617] Ever17 -the out of infinity- \
             PE DVD Edition(iso+mds)\\EVER17_DVD.iso"
        );
    }

    #[test]
    fn empty_encoded_data_falls_back_to_ascii() {
        assert_eq!(decode_file_name(b"test.rar", b""), "test.rar");
    }
}
