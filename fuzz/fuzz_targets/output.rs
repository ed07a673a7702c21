#![no_main]

use libfuzzer_sys::fuzz_target;
use shadertest_core::inline_diff;
use shadertest_core::text::{extract_hashes, normalize_line_endings, parse_flags_header, substitute_root};

fuzz_target!(|data: &[u8]| {
    // Compiler output is decoded lossily, so arbitrary bytes are fair game
    let s = String::from_utf8_lossy(data);
    let out = substitute_root(&normalize_line_endings(&s), "/src");
    let (stripped, _hashes) = extract_hashes(&out);
    let _ = inline_diff(&out, &stripped);
    let _ = parse_flags_header(&s);
});
