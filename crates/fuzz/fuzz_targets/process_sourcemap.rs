#![no_main]

use libfuzzer_sys::fuzz_target;
use restyle::{MapOptions, PrevMap, ProcessOptions, Processor};

fuzz_target!(|data: &[u8]| {
    let data = if data.len() > 256 * 1024 {
        &data[..256 * 1024]
    } else {
        data
    };

    let source = String::from_utf8_lossy(data);
    let processor = Processor::default();

    for inline in [false, true] {
        let opts = ProcessOptions::default()
            .from("fuzz.css")
            .to("out.css")
            .map(MapOptions {
                inline: Some(inline),
                ..MapOptions::default()
            });

        let Ok(created) = processor.process(source.as_ref(), opts).into_result() else {
            continue;
        };
        let Ok(Some(map)) = created.map_json() else {
            continue;
        };
        // If creation succeeds, the sourcemap must be parseable JSON.
        let _ = serde_json::from_str::<serde_json::Value>(&map)
            .expect("sourcemap must be valid JSON when processing returns Ok");

        // Chain through the created map, then through a corrupted one.
        // (A bad previous map should return Err, but must never crash.)
        let mut half = map.len() / 2;
        while !map.is_char_boundary(half) {
            half -= 1;
        }
        let corrupted = if half > 1 {
            map[..half].to_string()
        } else {
            "{".to_string()
        };
        for prev in [map, corrupted] {
            let opts = ProcessOptions::default()
                .from("out.css")
                .to("final.css")
                .map(MapOptions {
                    prev: Some(PrevMap::Json(prev)),
                    inline: Some(false),
                    ..MapOptions::default()
                });
            let _ = processor.process(created.css.as_str(), opts).into_result();
        }
    }
});
