use super::commands::{FRAME_LENGTH, FRAME_SIZE, FRAME_START};

/// Advisory plausible desk travel range in centimeters. Readings outside it
/// are surfaced with a flag rather than dropped; telemetry right after
/// wake-up is known to be unreliable.
pub const MIN_PLAUSIBLE_CM: f64 = 60.0;
pub const MAX_PLAUSIBLE_CM: f64 = 120.0;

/// A height reading decoded from a status frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeightReading {
    pub raw: u16,
    pub cm: f64,
}

impl HeightReading {
    fn from_raw(raw: u16) -> Self {
        Self {
            raw,
            cm: f64::from(raw) / 10.0,
        }
    }

    pub fn is_plausible(&self) -> bool {
        (MIN_PLAUSIBLE_CM..=MAX_PLAUSIBLE_CM).contains(&self.cm)
    }
}

/// A recognized inbound status frame.
///
/// Checksum bytes are stored exactly as received; no checksum algorithm is
/// applied to them.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusFrame {
    pub frame_type: u8,
    pub payload: [u8; 2],
    pub checksum: [u8; 2],
    /// `None` when the height word is zero: the box reports zero before the
    /// wake-up command has taken effect, which means "no telemetry yet".
    pub height: Option<HeightReading>,
}

/// Decode a single received chunk as one status frame.
///
/// A frame is recognized only when the chunk is at least 8 bytes and starts
/// with the `9B 06` header at offset 0. Anything else is discarded, not
/// buffered toward a future chunk.
pub fn decode_chunk(chunk: &[u8]) -> Option<StatusFrame> {
    if chunk.len() < FRAME_SIZE {
        log::debug!("Dropping short chunk ({} bytes)", chunk.len());
        return None;
    }
    if chunk[0] != FRAME_START || chunk[1] != FRAME_LENGTH {
        log::debug!(
            "Dropping chunk without frame header: {:02X} {:02X}",
            chunk[0],
            chunk[1]
        );
        return None;
    }

    // The height word straddles bytes 4-5, as the control box transmits it.
    let raw = u16::from(chunk[4]) << 8 | u16::from(chunk[5]);
    let height = (raw != 0).then(|| HeightReading::from_raw(raw));

    Some(StatusFrame {
        frame_type: chunk[2],
        payload: [chunk[3], chunk[4]],
        checksum: [chunk[5], chunk[6]],
        height,
    })
}

/// Stateful decoder over the inbound chunk sequence.
///
/// The default mode mirrors the observed control-box behavior: each chunk is
/// decoded independently and frames split across chunk boundaries are lost.
/// [`FrameDecoder::reassembling`] opts into buffering bytes across chunks and
/// recovering every complete frame; that is a deliberate behavioral deviation
/// for slow or fragmented links.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    reassemble: bool,
    buf: Vec<u8>,
}

impl FrameDecoder {
    /// Chunk-aligned decoder (reference behavior).
    pub fn new() -> Self {
        Self::default()
    }

    /// Cross-chunk reassembling decoder (opt-in).
    pub fn reassembling() -> Self {
        Self {
            reassemble: true,
            buf: Vec::new(),
        }
    }

    /// Feed one received chunk, returning every frame it completes.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<StatusFrame> {
        if !self.reassemble {
            return decode_chunk(chunk).into_iter().collect();
        }

        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();
        loop {
            // Scan to the next header.
            let Some(start) = self
                .buf
                .windows(2)
                .position(|w| w[0] == FRAME_START && w[1] == FRAME_LENGTH)
            else {
                // Keep a possible lone start byte at the tail.
                let keep = usize::from(self.buf.last() == Some(&FRAME_START));
                let tail = self.buf.len() - keep;
                self.buf.drain(..tail);
                break;
            };
            self.buf.drain(..start);
            if self.buf.len() < FRAME_SIZE {
                break;
            }
            if let Some(frame) = decode_chunk(&self.buf[..FRAME_SIZE]) {
                frames.push(frame);
            }
            self.buf.drain(..FRAME_SIZE);
        }
        frames
    }

    /// Discard any partially accumulated frame bytes.
    pub fn reset(&mut self) {
        self.buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_and_headerless_chunks() {
        assert!(decode_chunk(&[0x9B, 0x06, 0x02]).is_none());
        assert!(decode_chunk(&[0x00; 8]).is_none());
        assert!(decode_chunk(&[0x9B, 0x07, 0x02, 0x00, 0x03, 0x84, 0x00, 0x9D]).is_none());
    }

    #[test]
    fn zero_height_word_is_suppressed() {
        let frame = decode_chunk(&[0x9B, 0x06, 0x02, 0x00, 0x00, 0x00, 0x6C, 0xA1, 0x9D])
            .expect("valid frame");
        assert!(frame.height.is_none());
    }

    #[test]
    fn decodes_height_in_decimeters() {
        // Height word 0x0384 = 900 -> 90.0 cm.
        let frame =
            decode_chunk(&[0x9B, 0x06, 0x02, 0x00, 0x03, 0x84, 0x00, 0x9D]).expect("valid frame");
        let height = frame.height.expect("height present");
        assert_eq!(height.raw, 900);
        assert_eq!(height.cm, 90.0);
        assert!(height.is_plausible());
    }

    #[test]
    fn out_of_range_reading_is_flagged_not_dropped() {
        // 0x0014 = 20 -> 2.0 cm, far below plausible travel.
        let frame =
            decode_chunk(&[0x9B, 0x06, 0x02, 0x00, 0x00, 0x14, 0x00, 0x9D]).expect("valid frame");
        let height = frame.height.expect("height present");
        assert!(!height.is_plausible());
    }

    #[test]
    fn chunk_aligned_mode_drops_split_frames() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push_chunk(&[0x9B, 0x06, 0x02, 0x00]).is_empty());
        assert!(decoder.push_chunk(&[0x03, 0x84, 0x00, 0x9D]).is_empty());
    }

    #[test]
    fn reassembling_mode_recovers_split_frames() {
        let mut decoder = FrameDecoder::reassembling();
        assert!(decoder.push_chunk(&[0x9B, 0x06, 0x02, 0x00]).is_empty());
        let frames = decoder.push_chunk(&[0x03, 0x84, 0x00, 0x9D]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].height.map(|h| h.cm), Some(90.0));
    }

    #[test]
    fn reassembling_mode_skips_noise_between_frames() {
        let mut decoder = FrameDecoder::reassembling();
        let mut bytes = vec![0xFF, 0x00];
        bytes.extend_from_slice(&[0x9B, 0x06, 0x02, 0x00, 0x03, 0x84, 0x00, 0x9D]);
        bytes.extend_from_slice(&[0x42]);
        bytes.extend_from_slice(&[0x9B, 0x06, 0x02, 0x00, 0x02, 0xDA, 0x00, 0x9D]);
        let frames = decoder.push_chunk(&bytes);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].height.map(|h| h.cm), Some(73.0));
    }
}
