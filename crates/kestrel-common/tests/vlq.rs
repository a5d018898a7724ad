use super::*;

#[test]
fn test_vlq_encode_known_values() {
    assert_eq!(encode(0), "A");
    assert_eq!(encode(1), "C");
    assert_eq!(encode(-1), "D");
    assert_eq!(encode(15), "e");
    assert_eq!(encode(16), "gB");
    assert_eq!(encode(-16), "hB");
    assert_eq!(encode(511), "+f");
}

#[test]
fn test_vlq_round_trip() {
    let interesting: &[i32] = &[
        0,
        1,
        -1,
        15,
        16,
        -16,
        31,
        32,
        255,
        -255,
        1 << 20,
        -(1 << 20),
        (1 << 30) - 1,
        1 << 30,
        -(1 << 30),
    ];
    for &value in interesting {
        let encoded = encode(value);
        let (decoded, used) = decode(encoded.as_bytes()).unwrap();
        assert_eq!(decoded, value, "round trip of {value}");
        assert_eq!(used, encoded.len());
    }
}

#[test]
fn test_vlq_round_trip_dense_range() {
    for value in -5000..5000 {
        let encoded = encode(value);
        let (decoded, _) = decode(encoded.as_bytes()).unwrap();
        assert_eq!(decoded, value);
    }
}

#[test]
fn test_vlq_decode_rejects_garbage() {
    assert!(decode(b"!").is_none());
    assert!(decode(b"").is_none());
    // Lone continuation digit with no terminator
    assert!(decode(b"g").is_none());
}
