#![no_main]
use libfuzzer_sys::fuzz_target;
use structbin::{EncodeOptions, StringEncoding};

fuzz_target!(|data: &[u8]| {
    if let Ok(json) = std::str::from_utf8(data) {
        for encoding in [StringEncoding::Utf8, StringEncoding::Utf16] {
            let options = EncodeOptions::default().with_string_encoding(encoding);
            if let Ok(bytes) = structbin::encode_json(json, &options) {
                assert_eq!(&bytes[..2], [0xC0, 0x01]);
                assert_eq!(bytes.last(), Some(&0x40));
            }
        }
    }
});
