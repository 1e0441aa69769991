// SPDX-FileCopyrightText: The patchio authors
// SPDX-License-Identifier: MPL-2.0

use proptest::prelude::*;

use super::*;

#[test]
fn nibble_pack_empty() {
    assert_eq!(vec![0x00], nibble_pack(&[]));
    assert_eq!(Ok(vec![]), nibble_unpack(&[0x00]));
}

#[test]
fn nibble_pack_low_nibble_first() {
    assert_eq!(vec![0x0f, 0x0a, 0x01, 0x00, 0x30], nibble_pack(&[0xaf, 0x01]));
}

#[test]
fn nibble_unpack_rejects_corrupted_checksum() {
    let mut packed = nibble_pack(&[0x12, 0x34, 0x56]);
    *packed.last_mut().unwrap() ^= 0x01;
    assert!(matches!(
        nibble_unpack(&packed),
        Err(Error::ChecksumMismatch { .. })
    ));
}

#[test]
fn nibble_unpack_rejects_invalid_input() {
    assert!(matches!(
        nibble_unpack(&[]),
        Err(Error::UnexpectedLength { .. })
    ));
    assert!(matches!(
        nibble_unpack(&[0x01, 0x01]),
        Err(Error::UnexpectedLength { .. })
    ));
    assert_eq!(
        Err(Error::InvalidEncodedByte {
            offset: 1,
            value: 0x10
        }),
        nibble_unpack(&[0x01, 0x10, 0x01])
    );
}

// The checksum is a 7-bit sum. Flipping any of the lower 7 bits of a
// single raw byte is detected, flipping the most significant bit is not.
#[test]
fn nibble_checksum_sensitivity_per_bit_position() {
    let data: Vec<u8> = (0..=255).collect();
    let packed = nibble_pack(&data);
    for index in 0..data.len() {
        for bit in 0..8 {
            let mut corrupted = packed.clone();
            let nibble_index = index * 2 + usize::from(bit >= 4);
            corrupted[nibble_index] ^= 1 << (bit % 4);
            let detected = nibble_unpack(&corrupted).is_err();
            assert_eq!(bit < 7, detected, "byte {index}, bit {bit}");
        }
    }
}

#[test]
fn escape_empty() {
    assert!(escape(&[]).is_empty());
    assert_eq!(Ok(vec![]), unescape(&[], 0));
}

#[test]
fn escape_collects_high_bits_in_leading_byte() {
    let data = [0x80, 0x01, 0xff, 0x7f, 0x00, 0x00, 0x81, 0x82];
    assert_eq!(
        vec![0b0100_0101, 0x00, 0x01, 0x7f, 0x7f, 0x00, 0x00, 0x01, 0b0000_0001, 0x02],
        escape(&data)
    );
    assert_eq!(10, escaped_len(data.len()));
}

#[test]
fn unescape_zero_pads_partial_group() {
    let escaped = escape(&[0x81, 0x02, 0x03]);
    assert_eq!(4, escaped.len());
    assert_eq!(
        Ok(vec![0x81, 0x02, 0x03, 0x00, 0x00]),
        unescape(&escaped, 5)
    );
}

#[test]
fn unescape_rejects_excess_data() {
    let escaped = escape(&[0x01, 0x02, 0x03]);
    assert!(matches!(
        unescape(&escaped, 2),
        Err(Error::UnexpectedLength {
            expected: 2,
            actual: 3
        })
    ));
    // Excess zero padding is tolerated
    let escaped = escape(&[0x01, 0x02, 0x00, 0x00]);
    assert_eq!(Ok(vec![0x01, 0x02]), unescape(&escaped, 2));
}

#[test]
fn unescape_rejects_8_bit_data() {
    assert_eq!(
        Err(Error::InvalidEncodedByte {
            offset: 2,
            value: 0x80
        }),
        unescape(&[0x00, 0x01, 0x80], 2)
    );
}

#[test]
fn bytes_from_values_rejects_out_of_range() {
    assert_eq!(Ok(vec![0, 127, 255]), bytes_from_values(&[0i32, 127, 255]));
    assert_eq!(
        Err(Error::ValueOutOfRange {
            offset: 1,
            value: 256
        }),
        bytes_from_values(&[0u16, 256])
    );
    assert_eq!(
        Err(Error::ValueOutOfRange {
            offset: 0,
            value: -1
        }),
        bytes_from_values(&[-1i32])
    );
}

#[test]
fn line_number_bytes_msb_first() {
    let line_number = LineNumber::from_logical(16383 + 200);
    assert_eq!(199, line_number.value());
    assert_eq!([0x01, 0x47], line_number.to_bytes());
    assert_eq!(line_number, LineNumber::from_bytes(0x01, 0x47));
    assert_eq!([0x7f, 0x7f], LineNumber::from_logical(16383).to_bytes());
    assert!(LineNumber::new(16384).is_none());
}

#[test]
fn split_into_frames_never_empty() {
    assert_eq!(vec![&[] as &[u8]], split_into_frames(&[], 4));
    assert_eq!(
        vec![&[1u8, 2, 3, 4][..], &[5u8][..]],
        split_into_frames(&[1, 2, 3, 4, 5], 4)
    );
}

#[test]
fn split_text_lines_bounded() {
    assert_eq!(Ok(vec![""]), split_text_lines("", MAX_LINE_LEN));
    assert_eq!(
        Ok(vec!["$rev R1", "$preset", ""]),
        split_text_lines("$rev R1\r\n$preset\n", MAX_LINE_LEN)
    );
    assert_eq!(
        Err(Error::LineTooLong {
            index: 1,
            len: 6,
            max_len: 5
        }),
        split_text_lines("abc\nabcdef", 5)
    );
    assert_eq!("a\nb", join_text_lines(["a", "b"]));
}

#[test]
fn encode_decode_line() {
    let prefix = [0x00, 0x20, 0x32, 0x7f, 0x15];
    let message = encode_line(&prefix, 0x20, LineNumber::from_logical(130), "$end").unwrap();
    assert_eq!(
        &[0xf0, 0x00, 0x20, 0x32, 0x7f, 0x15, 0x20, 0x01, 0x02, b'$', b'e', b'n', b'd', 0xf7],
        message.as_bytes()
    );
    assert_eq!(
        Some((LineNumber::from_logical(130), "$end".to_owned())),
        decode_line(&message, &prefix, 0x20)
    );
    assert_eq!(None, decode_line(&message, &prefix, 0x21));
    assert!(matches!(
        encode_line(&prefix, 0x20, LineNumber::default(), "gr\u{fc}n"),
        Err(Error::ValueOutOfRange { offset: 2, .. })
    ));
}

proptest! {
    #[test]
    fn nibble_round_trip(data in prop::collection::vec(any::<u8>(), 0..2048)) {
        let packed = nibble_pack(&data);
        prop_assert_eq!(nibble_packed_len(data.len()), packed.len());
        let (checksum, nibbles) = packed.split_last().unwrap();
        prop_assert!(*checksum <= 0x7f);
        prop_assert!(nibbles.iter().all(|&nibble| nibble <= 0x0f));
        prop_assert_eq!(Ok(data), nibble_unpack(&packed));
    }

    #[test]
    fn escape_round_trip(data in prop::collection::vec(any::<u8>(), 0..2048)) {
        let escaped = escape(&data);
        prop_assert_eq!(escaped_len(data.len()), escaped.len());
        prop_assert!(escaped.iter().all(|&byte| byte <= 0x7f));
        prop_assert_eq!(Ok(data.clone()), unescape(&escaped, data.len()));
    }
}
