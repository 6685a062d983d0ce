#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use tributary_core::Record;
use tributary_wire::{decode_batches, encode_batch};

fuzz_target!(|data: &[u8]| {
    // Fuzz record batch decoding with arbitrary bytes.
    // Tests handling of:
    // - Corrupt batch headers and CRCs
    // - Hostile record counts and lengths
    // - Truncated trailing batches
    let _ = decode_batches(data);

    // Try JSON deserialization of the core record type
    let _ = serde_json::from_slice::<Record>(data);

    // If we have enough bytes, build records from them and round-trip
    // through the batch codec
    if data.len() >= 16 {
        // wire offsets and timestamps are signed 64-bit, keep headroom
        // for the +1 below
        let offset = u64::from_le_bytes(data[0..8].try_into().unwrap()) & (i64::MAX as u64 >> 1);
        let timestamp = u64::from_le_bytes(data[8..16].try_into().unwrap()) & (i64::MAX as u64);
        let payload = Bytes::copy_from_slice(&data[16..]);

        let records = vec![
            Record::new(offset, timestamp, None, payload.clone()),
            Record::new(offset + 1, timestamp, Some(payload.clone()), payload),
        ];

        let encoded = encode_batch(&records);
        let decoded = decode_batches(&encoded).expect("own encoding must decode");
        assert_eq!(decoded, records);
    }
});
