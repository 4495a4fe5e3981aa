//! WAV container helpers: canonical 44-byte PCM header, integer PCM encoding
//! and the RIFF `smpl` chunk carrying the sustain loop.

use crate::models::error::StorageError;
use crate::models::loop_result::LoopPoints;

/// Size of the standard WAV RIFF header in bytes.
pub const WAV_HEADER_SIZE: usize = 44;

/// Size of a `smpl` chunk body holding exactly one loop.
pub const SMPL_BODY_SIZE: usize = 36 + 24;

/// Size of a one-loop `smpl` chunk including its 8-byte chunk header.
pub const SMPL_CHUNK_SIZE: usize = 8 + SMPL_BODY_SIZE;

/// Generate a 44-byte WAV RIFF header.
///
/// Format: PCM (format code 1), little-endian.
///
/// Layout:
/// ```text
/// [0-3]    "RIFF"
/// [4-7]    file size - 8 (36 + data_size + trailing chunks, patched on close)
/// [8-11]   "WAVE"
/// [12-15]  "fmt "
/// [16-19]  16 (PCM format chunk size)
/// [20-21]  1 (PCM format code)
/// [22-23]  channels
/// [24-27]  sample_rate
/// [28-31]  byte_rate = sample_rate * channels * bit_depth / 8
/// [32-33]  block_align = channels * bit_depth / 8
/// [34-35]  bit_depth
/// [36-39]  "data"
/// [40-43]  data_size
/// ```
///
/// RIFF sizes are 32-bit. Long multichannel captures can overflow them, so
/// check with [`checked_data_size`] first.
pub fn generate_wav_header(sample_rate: u32, bit_depth: u16, channels: u16, data_size: u32) -> [u8; WAV_HEADER_SIZE] {
    let byte_rate = sample_rate * channels as u32 * bit_depth as u32 / 8;
    let block_align = channels * bit_depth / 8;
    let chunk_size = 36 + data_size;

    let mut header = [0u8; WAV_HEADER_SIZE];

    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&chunk_size.to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");

    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes());
    header[22..24].copy_from_slice(&channels.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&bit_depth.to_le_bytes());

    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_size.to_le_bytes());

    header
}

/// Size of the `data` chunk for `pcm_bytes` of audio, if the whole file
/// (header, padded data, `smpl`) still fits the RIFF size field.
pub fn checked_data_size(pcm_bytes: u64) -> Result<u32, StorageError> {
    let padded = pcm_bytes + pcm_bytes % 2;
    let riff_size = padded + (WAV_HEADER_SIZE + SMPL_CHUNK_SIZE) as u64 - 8;
    if riff_size > u32::MAX as u64 {
        return Err(StorageError::TooLarge(pcm_bytes));
    }
    Ok(pcm_bytes as u32)
}

/// Patch the file-size field at offset 4 (RIFF chunk size = file_size - 8).
pub fn patch_file_size(header: &mut [u8], total_file_size: u64) {
    let chunk_size = (total_file_size - 8) as u32;
    header[4..8].copy_from_slice(&chunk_size.to_le_bytes());
}

/// Convert f32 samples `[-1.0, 1.0]` to little-endian integer PCM.
///
/// Clamps out-of-range values. Supports 16, 24 and 32 bits.
pub fn encode_pcm(samples: &[f32], bit_depth: u16) -> Result<Vec<u8>, StorageError> {
    let bytes_per_sample = match bit_depth {
        16 | 24 | 32 => bit_depth as usize / 8,
        other => return Err(StorageError::UnsupportedBitDepth(other)),
    };
    let mut data = Vec::with_capacity(samples.len() * bytes_per_sample);
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0) as f64;
        match bit_depth {
            16 => data.extend_from_slice(&((clamped * i16::MAX as f64) as i16).to_le_bytes()),
            24 => {
                let value = (clamped * 8_388_607.0) as i32;
                data.extend_from_slice(&value.to_le_bytes()[..3]);
            }
            _ => data.extend_from_slice(&((clamped * i32::MAX as f64) as i32).to_le_bytes()),
        }
    }
    Ok(data)
}

/// Generate a `smpl` chunk with one forward loop.
///
/// Body layout (all u32 little-endian):
/// ```text
/// [0]   manufacturer        [4]  product
/// [8]   sample period (ns)  [12] MIDI unity note
/// [16]  MIDI pitch fraction [20] SMPTE format
/// [24]  SMPTE offset        [28] number of loops (1)
/// [32]  sampler data bytes
/// [36]  loop: cue id, type (0 = forward), start, end (inclusive), fraction, play count (0 = infinite)
/// ```
pub fn generate_smpl_chunk(sample_rate: u32, points: LoopPoints, midi_unity_note: u8) -> [u8; SMPL_CHUNK_SIZE] {
    let sample_period_ns = (1_000_000_000u64 / sample_rate.max(1) as u64) as u32;
    let inclusive_end = points.end_sample.saturating_sub(1) as u32;

    let fields: [u32; 15] = [
        0,
        0,
        sample_period_ns,
        midi_unity_note as u32,
        0,
        0,
        0,
        1,
        0,
        0,
        0,
        points.start_sample as u32,
        inclusive_end,
        0,
        0,
    ];

    let mut chunk = [0u8; SMPL_CHUNK_SIZE];
    chunk[0..4].copy_from_slice(b"smpl");
    chunk[4..8].copy_from_slice(&(SMPL_BODY_SIZE as u32).to_le_bytes());
    for (i, field) in fields.iter().enumerate() {
        let offset = 8 + i * 4;
        chunk[offset..offset + 4].copy_from_slice(&field.to_le_bytes());
    }
    chunk
}

/// Parse a `smpl` chunk body. Returns the first loop, with `end_sample`
/// one past the chunk's inclusive end.
pub fn parse_smpl_chunk(data: &[u8]) -> Result<Option<LoopPoints>, StorageError> {
    if data.len() < 36 {
        return Err(StorageError::MalformedChunk(format!(
            "smpl body too short for header: {} bytes",
            data.len()
        )));
    }
    let num_loops = read_u32(data, 28);
    if num_loops == 0 {
        return Ok(None);
    }
    if data.len() < SMPL_BODY_SIZE {
        return Err(StorageError::MalformedChunk(format!(
            "smpl body too short for one loop: {} bytes",
            data.len()
        )));
    }
    let start = read_u32(data, 36 + 8) as usize;
    let inclusive_end = read_u32(data, 36 + 12) as usize;
    Ok(Some(LoopPoints {
        start_sample: start,
        end_sample: inclusive_end + 1,
    }))
}

/// Locate a top-level chunk body inside a RIFF/WAVE file image.
pub fn find_chunk<'a>(file: &'a [u8], id: &[u8; 4]) -> Option<&'a [u8]> {
    if file.len() < 12 || &file[0..4] != b"RIFF" || &file[8..12] != b"WAVE" {
        return None;
    }
    let mut offset = 12;
    while offset + 8 <= file.len() {
        let size = read_u32(file, offset + 4) as usize;
        let body_start = offset + 8;
        let body_end = body_start.checked_add(size)?.min(file.len());
        if &file[offset..offset + 4] == id {
            return Some(&file[body_start..body_end]);
        }
        // chunks are word-aligned
        offset = body_start + size + (size & 1);
    }
    None
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_44khz_stereo_24bit() {
        let header = generate_wav_header(44100, 24, 2, 600);

        assert_eq!(&header[0..4], b"RIFF");
        assert_eq!(&header[8..12], b"WAVE");
        assert_eq!(&header[36..40], b"data");
        assert_eq!(read_u32(&header, 24), 44100);
        assert_eq!(read_u32(&header, 28), 264_600); // 44100 * 2 * 3
        assert_eq!(u16::from_le_bytes([header[32], header[33]]), 6);
        assert_eq!(u16::from_le_bytes([header[34], header[35]]), 24);
        assert_eq!(read_u32(&header, 40), 600);
        assert_eq!(read_u32(&header, 4), 636);
    }

    #[test]
    fn patch_size() {
        let mut header = generate_wav_header(48000, 16, 2, 0);
        patch_file_size(&mut header, 44 + 16 + SMPL_CHUNK_SIZE as u64);
        assert_eq!(read_u32(&header, 4), 36 + 16 + SMPL_CHUNK_SIZE as u32);
    }

    #[test]
    fn data_size_respects_riff_limit() {
        assert_eq!(checked_data_size(600), Ok(600));

        // Ten minutes of 8-channel 96 kHz 32-bit audio.
        let long_take = 600 * 96_000 * 8 * 4u64;
        assert_eq!(checked_data_size(long_take), Err(StorageError::TooLarge(long_take)));

        // Largest even payload; an odd one picks up a pad byte.
        let limit = (u32::MAX as u64 - (WAV_HEADER_SIZE + SMPL_CHUNK_SIZE) as u64 + 8) & !1;
        assert!(checked_data_size(limit).is_ok());
        assert!(checked_data_size(limit + 1).is_err());
    }

    #[test]
    fn pcm_16_bit() {
        let pcm = encode_pcm(&[0.0, 1.0, -1.0, 2.0], 16).unwrap();
        assert_eq!(pcm.len(), 8);
        assert_eq!(i16::from_le_bytes([pcm[0], pcm[1]]), 0);
        assert_eq!(i16::from_le_bytes([pcm[2], pcm[3]]), i16::MAX);
        assert_eq!(i16::from_le_bytes([pcm[4], pcm[5]]), -i16::MAX);
        assert_eq!(i16::from_le_bytes([pcm[6], pcm[7]]), i16::MAX); // clamped
    }

    #[test]
    fn pcm_24_bit() {
        let pcm = encode_pcm(&[1.0, -1.0], 24).unwrap();
        assert_eq!(pcm.len(), 6);
        assert_eq!(&pcm[0..3], &[0xFF, 0xFF, 0x7F]);
        assert_eq!(&pcm[3..6], &[0x01, 0x00, 0x80]);
    }

    #[test]
    fn pcm_rejects_unknown_depth() {
        assert_eq!(encode_pcm(&[0.0], 8), Err(StorageError::UnsupportedBitDepth(8)));
    }

    #[test]
    fn smpl_chunk_layout() {
        let points = LoopPoints {
            start_sample: 88_200,
            end_sample: 441_000,
        };
        let chunk = generate_smpl_chunk(44100, points, 60);

        assert_eq!(&chunk[0..4], b"smpl");
        assert_eq!(read_u32(&chunk, 4), 60);
        assert_eq!(read_u32(&chunk, 8 + 8), 22_675); // 1e9 / 44100
        assert_eq!(read_u32(&chunk, 8 + 12), 60);
        assert_eq!(read_u32(&chunk, 8 + 28), 1);
        assert_eq!(read_u32(&chunk, 8 + 36 + 4), 0); // forward loop
        assert_eq!(read_u32(&chunk, 8 + 36 + 8), 88_200);
        assert_eq!(read_u32(&chunk, 8 + 36 + 12), 440_999);
        assert_eq!(parse_smpl_chunk(&chunk[8..]).unwrap(), Some(points));
    }

    #[test]
    fn parse_smpl_without_loops() {
        let body = [0u8; 36];
        assert_eq!(parse_smpl_chunk(&body).unwrap(), None);
        assert!(parse_smpl_chunk(&body[..20]).is_err());
    }

    #[test]
    fn find_chunk_walks_riff() {
        let mut file = generate_wav_header(8000, 16, 1, 2).to_vec();
        file.extend_from_slice(&[0x10, 0x00]);
        let points = LoopPoints {
            start_sample: 0,
            end_sample: 1,
        };
        file.extend_from_slice(&generate_smpl_chunk(8000, points, 60));
        let total = file.len() as u64;
        patch_file_size(&mut file, total);

        assert_eq!(find_chunk(&file, b"data"), Some(&[0x10u8, 0x00][..]));
        let smpl = find_chunk(&file, b"smpl").unwrap();
        assert_eq!(parse_smpl_chunk(smpl).unwrap(), Some(points));
        assert_eq!(find_chunk(&file, b"cue "), None);
    }
}
