use std::{ops::ControlFlow, path::PathBuf};

use restyle::{MapOptions, NodeBag, NodeKind, Plugin, PrevMap, ProcessOptions, Processor, parse};

fn fixtures_dir() -> PathBuf {
    #[cfg(target_os = "wasi")]
    {
        PathBuf::from("/workspace/fixtures")
    }

    #[cfg(not(target_os = "wasi"))]
    {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../fixtures")
    }
}

fn read_fixture(name: &str) -> String {
    std::fs::read_to_string(fixtures_dir().join(name)).expect("read fixture")
}

const CASES: [(&str, &str); 4] = [
    ("simple.css", "simple.out.css"),
    ("complex.css", "complex.out.css"),
    ("unicode.css", "unicode.out.css"),
    ("crlf.css", "crlf.out.css"),
];

fn uppercase_colors() -> Plugin {
    Plugin::new("uppercase-colors").declaration_named("color", |ctx| {
        let value = ctx.root.node(ctx.node)?.value().unwrap_or_default().to_uppercase();
        ctx.root.set_value(ctx.node, value)
    })
}

#[test]
fn fixtures_round_trip_byte_for_byte() {
    for (input_name, _) in CASES {
        let input = read_fixture(input_name);
        let root = parse(&input, &Default::default()).unwrap();
        assert_eq!(root.to_string(), input, "round trip mismatch: {input_name}");
    }
}

#[test]
fn fixtures_match_expected_output() {
    let processor = Processor::new([uppercase_colors()]);
    for (input_name, expected_name) in CASES {
        let input = read_fixture(input_name);
        let expected = read_fixture(expected_name);

        let actual = processor
            .process(input, ProcessOptions::default())
            .into_result()
            .unwrap();
        assert_eq!(actual.css, expected, "fixture mismatch: {input_name}");

        // Idempotence: once processed, processing again should not change.
        let again = processor
            .process(actual.css.clone(), ProcessOptions::default())
            .into_result()
            .unwrap();
        assert_eq!(again.css, actual.css, "not idempotent: {input_name}");
    }
}

#[test]
fn fixtures_emit_parseable_sourcemaps() {
    let processor = Processor::new([uppercase_colors()]);
    for (input_name, _) in CASES {
        let input = read_fixture(input_name);
        let opts = ProcessOptions::default()
            .from(input_name)
            .to(format!("out/{input_name}"))
            .map(MapOptions {
                inline: Some(false),
                ..MapOptions::default()
            });
        let res = processor.process(input.clone(), opts).into_result().unwrap();

        let json = res.map_json().unwrap().expect("external map");
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["version"], 3, "{input_name}");

        let map = sourcemap::SourceMap::from_slice(json.as_bytes()).unwrap();
        assert_eq!(map.get_source(0), Some(format!("../{input_name}").as_str()));
        assert_eq!(map.get_source_contents(0), Some(input.as_str()));

        let lines = input.lines().count() as u32;
        for token in map.tokens() {
            assert!(token.get_src_line() < lines, "{input_name}: {token:?}");
        }
        assert!(
            res.css.ends_with(&format!("sourceMappingURL={input_name}.map */")),
            "{input_name}: missing annotation"
        );
    }
}

#[test]
fn maps_chain_across_runs() {
    let input = read_fixture("simple.css");
    let external = || MapOptions {
        inline: Some(false),
        ..MapOptions::default()
    };

    let first = Processor::default()
        .process(input, ProcessOptions::default().from("a.css").to("b.css").map(external()))
        .into_result()
        .unwrap();
    let first_map = first.map_json().unwrap().unwrap();

    let second = Processor::new([uppercase_colors()])
        .process(
            first.css.clone(),
            ProcessOptions::default().from("b.css").to("c.css").map(MapOptions {
                prev: Some(PrevMap::Json(first_map)),
                ..external()
            }),
        )
        .into_result()
        .unwrap();

    assert!(second.css.contains("color: RED"));
    let map = second.map.as_ref().unwrap();
    // `color` sits at line 2, column 3 in both a.css and c.css.
    let token = map.lookup_token(1, 2).unwrap();
    assert!(token.get_source().unwrap().ends_with("a.css"));
    assert_eq!((token.get_src_line(), token.get_src_col()), (1, 2));
}

#[test]
fn walk_survives_removal_and_insertion() {
    let mut root = parse(&read_fixture("simple.css"), &Default::default()).unwrap();
    let top = root.id();

    let mut visited = 0;
    let _ = root.walk(top, |root, id| {
        visited += 1;
        if root.kind(id) == Some(NodeKind::Comment) {
            root.remove(id).unwrap();
        }
        ControlFlow::<()>::Continue(())
    });
    // two rules, four declarations and the comment
    assert_eq!(visited, 7);
    assert!(!root.to_string().contains("/*"));

    let rule = root.last(top).unwrap();
    let mut seen = Vec::new();
    let _ = root.each(rule, |root, child, _| {
        seen.push(root.node(child).unwrap().prop().unwrap().to_string());
        root.insert_before(child, NodeBag::decl("x", "1")).unwrap();
        ControlFlow::<()>::Continue(())
    });
    assert_eq!(seen, ["margin", "color"]);
    assert_eq!(root.children(rule).len(), 4);
}

#[test]
fn plugins_run_in_registration_order() {
    fn swap(name: &str, from: &'static str, to: &'static str) -> Plugin {
        Plugin::new(name).once(move |ctx| {
            let mut decls = Vec::new();
            let _ = ctx.root.walk_decls(ctx.node, |_, id| {
                decls.push(id);
                ControlFlow::<()>::Continue(())
            });
            for id in decls {
                if ctx.root.node(id)?.value() == Some(from) {
                    ctx.root.set_value(id, to)?;
                }
            }
            Ok(())
        })
    }

    let css = "a { color: red }";
    let forward = Processor::new([swap("one", "red", "green"), swap("two", "green", "blue")]);
    let backward = Processor::new([swap("two", "green", "blue"), swap("one", "red", "green")]);
    let run = |processor: &Processor| {
        processor
            .process(css, ProcessOptions::default())
            .into_result()
            .unwrap()
            .css
    };
    assert_eq!(run(&forward), "a { color: blue }");
    assert_eq!(run(&backward), "a { color: green }");
}

#[test]
fn unclosed_string_reports_position() {
    let err = parse("a {\n  content: \"open\n}", &Default::default()).unwrap_err();
    let syntax = err.as_syntax().unwrap();
    assert_eq!(syntax.reason, "Unclosed string");
    assert_eq!((syntax.line, syntax.column), (Some(2), Some(12)));
    assert_eq!(err.to_string(), "<css input>:2:12: Unclosed string");
}
