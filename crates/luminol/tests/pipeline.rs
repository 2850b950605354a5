//! End-to-end pipeline scenarios.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use luminol::{deobfuscate, deobfuscate_with_progress, Error, Options};
use luminol_bytecode::validate::validate_image;
use luminol_bytecode::{Constant, Instruction, OpCode};
use luminol_syntax::lexer::Lexer;
use luminol_syntax::parser;
use luminol_vm::AnalyzeOptions;

fn reconstruct(src: &str) -> luminol_reconstruct::Reconstructed {
    let tokens = Lexer::scan_all(src.as_bytes());
    let chunk = parser::parse(&tokens).unwrap();
    let analysis = luminol_vm::analyze(&chunk, &AnalyzeOptions::default());
    luminol_reconstruct::reconstruct(&analysis, "@test.lua")
}

#[test]
fn not_luraph_gate() {
    let result = deobfuscate(b"print(\"hello\")\n", &Options::default());
    assert_eq!(result.unwrap_err(), Error::NotLuraph);
}

#[test]
fn empty_input_is_invalid_lua() {
    assert!(matches!(
        deobfuscate(b"", &Options::default()),
        Err(Error::InvalidLua { line: 1, col: 1, .. })
    ));
    assert!(matches!(
        deobfuscate(b"   \n\t  \n", &Options::default()),
        Err(Error::InvalidLua { .. })
    ));
}

#[test]
fn binary_input_is_invalid_lua() {
    let garbage: Vec<u8> = (0u8..=255).cycle().take(512).collect();
    assert!(matches!(
        deobfuscate(&garbage, &Options::default()),
        Err(Error::InvalidLua { .. })
    ));
}

#[test]
fn trivial_handler_recovery() {
    let src = "local function handler_1(...) R[0] = R[1] end\n";
    let result = deobfuscate(src.as_bytes(), &Options::default()).unwrap();
    assert_eq!(result.stats.handlers_processed, 1);
    assert!(result.stats.warnings.is_empty());

    let rec = reconstruct(src);
    let insn = &rec.proto.code[0];
    assert_eq!(insn.op, OpCode::Move);
    assert_eq!((insn.a, insn.b, insn.c), (0, 1, 0));
}

#[test]
fn loadk_via_constant_pool() {
    let src = "local K = { \"print\", \"a\", \"b\", 1, 2, 3 }\n\
               local function handler_1(...) R[0] = K[0] end\n";
    let rec = reconstruct(src);
    assert_eq!(rec.proto.constants[0], Constant::Str(b"print".to_vec()));
    let insn = &rec.proto.code[0];
    assert_eq!(insn.op, OpCode::LoadK);
    assert_eq!(insn.a, 0);
    assert_eq!(insn.bx, Some(0));

    let result = deobfuscate(src.as_bytes(), &Options::default()).unwrap();
    assert!(result
        .source_code
        .as_deref()
        .unwrap()
        .contains("R[0] = \"print\""));
}

#[test]
fn xor_v1_constant_decrypts_with_discovered_key() {
    // Cipher = "local x=1" XOR "0123456789ABCDEF", embedded as \xHH escapes
    // so the lexer classifies the literal as encrypted.
    let key = b"0123456789ABCDEF";
    let cipher = luminol_decrypt::encrypt(b"local x=1", key, luminol_decrypt::Method::XorV1).unwrap();
    let escaped: String = cipher.iter().map(|b| format!("\\x{:02X}", b)).collect();
    let src = format!(
        "local session = \"0123456789ABCDEF\"\n\
         local K = {{ \"{}\", \"a\", \"b\", \"c\", \"d\", \"e\" }}\n\
         local function handler_1(...) R[0] = K[0] end\n",
        escaped
    );
    let result = deobfuscate(src.as_bytes(), &Options::default()).unwrap();
    assert_eq!(result.stats.constants_decrypted, 1);
    assert!(result.stats.warnings.is_empty());
    assert!(result
        .source_code
        .as_deref()
        .unwrap()
        .contains("local x=1"));
}

#[test]
fn header_round_trip() {
    let src = "local function handler_1(...) R[0] = R[1] end\n";
    let result = deobfuscate(src.as_bytes(), &Options::default()).unwrap();
    let image = result.bytecode.unwrap();
    let header = validate_image(&image).unwrap();
    assert_eq!(&image[..4], b"\x1bLua");
    assert_eq!(header.version, 0x53);
    assert_eq!(header.int_check, 0x5678);
    assert_eq!(header.num_check, 370.5);
}

#[test]
fn partial_decryption_downgrades_to_warning() {
    // One encrypted constant with no usable key anywhere: it stays
    // ciphertext, the run still succeeds.
    let src = "local K = { \"a\", \"b\", \"c\", \"d\", \"e\", \"\\x01\\x02\\x03\\x04\\x05\\x06\" }\n\
               local function handler_1(...) R[0] = K[0] end\n";
    let result = deobfuscate(src.as_bytes(), &Options::default()).unwrap();
    assert!(result
        .stats
        .warnings
        .iter()
        .any(|w| w == "constant #5: decryption failed, kept ciphertext"));
}

#[test]
fn majority_decryption_failure_is_fatal() {
    // Four of six constants encrypted and undecryptable.
    let src = "local K = { \"a\", \"b\", \"\\x01\\x02\\x03\\x04\", \"\\x05\\x06\\x07\\x08\", \
               \"\\x09\\x01\\x02\\x03\", \"\\x04\\x05\\x06\\x07\" }\n\
               local function handler_1(...) R[0] = K[0] end\n";
    let result = deobfuscate(src.as_bytes(), &Options::default());
    assert_eq!(result.unwrap_err(), Error::DecryptionFailed);
}

#[test]
fn unrecognized_handler_warns_and_continues() {
    let src = "local function handler_1(...) R[0] = R[1] end\n\
               local function handler_2(...) mystery() end\n";
    let result = deobfuscate(src.as_bytes(), &Options::default()).unwrap();
    assert_eq!(result.stats.handlers_processed, 2);
    assert_eq!(result.stats.warnings.len(), 1);
    assert!(result.stats.warnings[0].contains("handler 2"));
}

#[test]
fn progress_steps_in_order_with_monotonic_fractions() {
    let src = "local function handler_1(...) R[0] = R[1] end\n";
    let mut events = Vec::new();
    deobfuscate_with_progress(src.as_bytes(), &Options::default(), &mut |e| events.push(e))
        .unwrap();
    let names: Vec<&str> = events.iter().map(|e| e.step).collect();
    assert_eq!(
        names,
        vec![
            "lex",
            "parse",
            "detect_vm",
            "find_encryption",
            "decrypt",
            "strip_antidecompile",
            "optimize",
            "emit"
        ]
    );
    let fractions: Vec<f64> = events.iter().map(|e| e.fraction).collect();
    assert!(fractions.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(*fractions.last().unwrap(), 1.0);
}

#[test]
fn cancellation_stops_at_stage_boundary() {
    let flag = Arc::new(AtomicBool::new(true));
    let options = Options {
        cancel: Some(flag.clone()),
        ..Default::default()
    };
    let mut events = Vec::new();
    let src = "local function handler_1(...) R[0] = R[1] end\n";
    let result = deobfuscate_with_progress(src.as_bytes(), &options, &mut |e| events.push(e));
    assert_eq!(result.unwrap_err(), Error::Cancelled);
    // The flag was set before the run: only the lex event fires.
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].step, "lex");
}

#[test]
fn deterministic_bytecode() {
    let src = "local K = { \"print\", \"a\", \"b\", 1, 2, 3 }\n\
               local function handler_1(...) R[0] = K[0] end\n\
               local function handler_2(...) R[1] = R[0] end\n";
    let first = deobfuscate(src.as_bytes(), &Options::default()).unwrap();
    let second = deobfuscate(src.as_bytes(), &Options::default()).unwrap();
    assert_eq!(first.bytecode, second.bytecode);
}

#[test]
fn emitted_instruction_words_decode_back() {
    let src = "local function handler_1(...) R[0] = R[1] end\n";
    let rec = reconstruct(src);
    for insn in &rec.proto.code {
        let decoded = Instruction::decode(insn.encode()).unwrap();
        assert_eq!(decoded.op, insn.op);
        assert_eq!(decoded.a, insn.a);
    }
}
