//! Single-byte additive checksum shared by every frame
//!
//! The panel's programmer manual defines the checksum as the wrapping sum of
//! every byte after the sync byte. The sync byte at index 0 never contributes.

use tracing::trace;

/// Calculates the checksum over `bytes`, skipping the sync byte at index 0.
///
/// Inputs of one byte or less have nothing to sum and yield `0`.
pub fn compute(bytes: &[u8]) -> u8 {
    if bytes.len() <= 1 {
        return 0;
    }

    let checksum = bytes[1..]
        .iter()
        .fold(0u8, |acc, &byte| acc.wrapping_add(byte));
    trace!("Calculated checksum 0x{:02X} over {} bytes", checksum, bytes.len());
    checksum
}

/// Checks that the last byte of `frame` is the checksum of everything before it.
///
/// Frames shorter than two bytes cannot carry a checksum and never validate.
pub fn validate(frame: &[u8]) -> bool {
    if frame.len() < 2 {
        return false;
    }

    let (body, provided) = frame.split_at(frame.len() - 1);
    compute(body) == provided[0]
}

/// Returns `(provided, calculated)` for logging a failed validation.
pub fn mismatch(frame: &[u8]) -> Option<(u8, u8)> {
    let (&provided, body) = frame.split_last()?;
    let calculated = compute(body);
    (provided != calculated).then_some((provided, calculated))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_sync_byte() {
        assert_eq!(compute(&[0xFF, 0x01, 0x05, 0x5C]), 0x62);
        assert_eq!(compute(&[0x00, 0x01, 0x05, 0x5C]), 0x62);
    }

    #[test]
    fn short_inputs_are_zero() {
        assert_eq!(compute(&[]), 0);
        assert_eq!(compute(&[0xFF]), 0);
    }

    #[test]
    fn sum_wraps_modulo_256() {
        assert_eq!(compute(&[0xFF, 0xFF, 0x02]), 0x01);
        assert_eq!(compute(&[0xFF, 0x80, 0x80]), 0x00);
    }

    #[test]
    fn appended_checksum_always_validates() {
        let samples: [&[u8]; 5] = [
            &[0x00],
            &[0xFF, 0x01],
            &[0xFF, 0x01, 0x02, 0x55],
            &[0xFF, 0x01, 0x5C, 0x01, 0x00, 0x3F, 0x00],
            &[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF],
        ];

        for sample in samples {
            let mut frame = sample.to_vec();
            frame.push(compute(sample));
            assert!(validate(&frame), "frame {:02X?} should validate", frame);
        }
    }

    #[test]
    fn validate_rejects_short_and_corrupt_frames() {
        assert!(!validate(&[]));
        assert!(!validate(&[0xFF]));
        assert!(!validate(&[0xFF, 0x01, 0x05, 0x5C, 0x63]));
        assert!(validate(&[0xFF, 0x01, 0x05, 0x5C, 0x62]));
    }

    #[test]
    fn mismatch_reports_both_values() {
        assert_eq!(mismatch(&[0xFF, 0x01, 0x05, 0x5C, 0x63]), Some((0x63, 0x62)));
        assert_eq!(mismatch(&[0xFF, 0x01, 0x05, 0x5C, 0x62]), None);
        assert_eq!(mismatch(&[]), None);
    }
}
