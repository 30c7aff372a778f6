#![no_main]

use libfuzzer_sys::fuzz_target;
use restyle::{Root, parse};

fuzz_target!(|data: &[u8]| {
    let data = if data.len() > 256 * 1024 {
        &data[..256 * 1024]
    } else {
        data
    };

    let source = String::from_utf8_lossy(data);
    // A leading byte order mark is dropped by the parser.
    let expected = source.strip_prefix('\u{feff}').unwrap_or(source.as_ref());

    // Syntax errors are expected outcomes and should be reported as Err, not crashes.
    if let Ok(root) = parse(&source, &Default::default()) {
        // Any panic here is a bug we want the fuzzer to catch.
        assert_eq!(root.to_string(), expected, "parse must round-trip byte for byte");

        let json = root.to_json().expect("tree must serialize");
        let restored = Root::from_json(json).expect("serialized tree must load");
        assert_eq!(restored.to_string(), expected, "JSON form must round-trip");
    }
});
