//! Luminol — a Luraph deobfuscator.
//!
//! Takes a Lua source protected by Luraph v11.5–v11.8.1 and recovers an
//! equivalent program: a readable listing plus a Lua 5.3 chunk a stock
//! interpreter can load. The pipeline is
//! lex → parse → gate → analyze → reconstruct → emit → validate, with
//! progress reported at each stage boundary and cancellation honored
//! between stages.

pub mod error;
pub mod progress;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use luminol_bytecode::validate;
use luminol_syntax::ast::Block;
use luminol_syntax::lexer::{Lexer, UNKNOWN_RATIO_LIMIT};
use luminol_syntax::parser;
use luminol_syntax::token::{Token, TokenKind};
use luminol_vm::AnalyzeOptions;

pub use error::Error;
pub use luminol_decrypt::{LuraphVersion, Method};
pub use progress::{ProgressEvent, Step};

/// Caller-supplied knobs. Everything is optional; the default is full
/// auto-detection.
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub method: Option<Method>,
    pub key: Option<Vec<u8>>,
    pub iv: Option<Vec<u8>>,
    pub version: Option<LuraphVersion>,
    /// Set from any thread to stop the pipeline at the next stage boundary.
    pub cancel: Option<Arc<AtomicBool>>,
}

/// Counters reported alongside a successful result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stats {
    pub handlers_processed: usize,
    pub instructions_reconstructed: usize,
    pub constants_decrypted: usize,
    pub warnings: Vec<String>,
}

/// A successful deobfuscation.
#[derive(Debug)]
pub struct Deobfuscated {
    /// Readable Lua-flavored listing of the recovered program.
    pub source_code: Option<String>,
    /// A complete Lua 5.3 chunk image.
    pub bytecode: Option<Vec<u8>>,
    pub stats: Stats,
}

/// Deobfuscate without progress reporting.
pub fn deobfuscate(source: &[u8], options: &Options) -> Result<Deobfuscated, Error> {
    deobfuscate_with_progress(source, options, &mut |_| {})
}

/// Deobfuscate, posting a [`ProgressEvent`] after each stage.
pub fn deobfuscate_with_progress(
    source: &[u8],
    options: &Options,
    sink: &mut dyn FnMut(ProgressEvent),
) -> Result<Deobfuscated, Error> {
    let text = String::from_utf8_lossy(source).into_owned();

    // Lex. Empty and whitespace-only inputs are not chunks.
    if text.trim().is_empty() {
        return Err(Error::InvalidLua {
            line: 1,
            col: 1,
            msg: "empty chunk".to_string(),
        });
    }
    let tokens = Lexer::scan_all(source);
    let unknown = Lexer::unknown_ratio(&tokens);
    if unknown > UNKNOWN_RATIO_LIMIT {
        let first = tokens
            .iter()
            .find(|t| t.kind == TokenKind::Unknown)
            .map(|t| t.span)
            .unwrap_or_default();
        return Err(Error::InvalidLua {
            line: first.line,
            col: first.column,
            msg: format!("not a Lua file ({:.0}% unrecognized bytes)", unknown * 100.0),
        });
    }
    sink(ProgressEvent::at(Step::Lex));
    check_cancel(options)?;

    // Parse.
    let chunk = parser::parse(&tokens).map_err(|e| Error::InvalidLua {
        line: e.line,
        col: e.column,
        msg: format!("expected {}, got {}", e.expected, e.got),
    })?;
    sink(ProgressEvent::at(Step::Parse));
    check_cancel(options)?;

    // Gate: refuse inputs with no Luraph fingerprint.
    if !looks_like_luraph(&text, &tokens, &chunk) {
        return Err(Error::NotLuraph);
    }

    // Analyze: handler discovery, key discovery, constant decryption.
    let analyze_options = AnalyzeOptions {
        method: options.method,
        key: options.key.clone(),
        iv: options.iv.clone(),
        version: options.version,
    };
    let mut analysis = luminol_vm::analyze(&chunk, &analyze_options);

    // No key in the AST: fall back to text-level candidates (hex runs,
    // Base64 runs, long local literals) and keep whichever decrypts most.
    if analysis.encryption.is_none() && analyze_options.key.is_none() {
        for key in luminol_decrypt::keyscan::candidate_keys(&text) {
            let retry_options = AnalyzeOptions {
                key: Some(key),
                ..analyze_options.clone()
            };
            let retry = luminol_vm::analyze(&chunk, &retry_options);
            if retry.constants_decrypted > analysis.constants_decrypted {
                analysis = retry;
            }
        }
    }
    sink(ProgressEvent::at(Step::DetectVm));
    check_cancel(options)?;
    sink(ProgressEvent::at(Step::FindEncryption));
    check_cancel(options)?;

    // Half the pool staying dark means the key or version is wrong; a few
    // stragglers are downgraded to warnings by the analyzer.
    if !analysis.constants.is_empty() && analysis.constants_failed * 2 >= analysis.constants.len()
    {
        return Err(Error::DecryptionFailed);
    }
    sink(ProgressEvent::at(Step::Decrypt));
    check_cancel(options)?;

    // Reconstruct. Handlers that defeat every lifting strategy become nops
    // here, which is also what strips anti-decompile junk handlers.
    let result = luminol_reconstruct::reconstruct(&analysis, "@deobfuscated.lua");
    sink(ProgressEvent::at(Step::StripAntidecompile));
    check_cancel(options)?;
    sink(ProgressEvent::at(Step::Optimize));
    check_cancel(options)?;

    // Emit and validate.
    let image = luminol_emit::write_image(&result.proto);
    validate::validate_image(&image).map_err(|msg| Error::EmitFailed { msg })?;
    let listing = luminol_emit::render_listing(&result.proto);
    sink(ProgressEvent::at(Step::Emit));

    let mut warnings = analysis.warnings.clone();
    warnings.extend(result.warnings.iter().cloned());
    log::info!(
        "deobfuscated: {} handlers, {} instructions, {} warnings",
        analysis.handlers.len(),
        result.proto.code.len(),
        warnings.len()
    );

    Ok(Deobfuscated {
        source_code: Some(listing),
        bytecode: Some(image),
        stats: Stats {
            handlers_processed: analysis.handlers.len(),
            instructions_reconstructed: result.proto.code.len(),
            constants_decrypted: analysis.constants_decrypted,
            warnings,
        },
    })
}

fn check_cancel(options: &Options) -> Result<(), Error> {
    match &options.cancel {
        Some(flag) if flag.load(Ordering::Relaxed) => Err(Error::Cancelled),
        _ => Ok(()),
    }
}

/// The Luraph fingerprint gate. Passes when any of:
/// (a) the text names the obfuscator;
/// (b) two distinct structural patterns appear (register/constant table
///     access, handler/vm naming, hex literals, very long identifiers);
/// (c) the AST carries both a VM handler and an encrypted string.
fn looks_like_luraph(text: &str, tokens: &[Token], chunk: &Block) -> bool {
    let lower = text.to_ascii_lowercase();
    if ["luraph", "lura.ph", "protected using luraph", "obfuscator"]
        .iter()
        .any(|marker| lower.contains(marker))
    {
        return true;
    }

    let mut distinct = 0;
    if text.contains("R[") {
        distinct += 1;
    }
    if text.contains("K[") {
        distinct += 1;
    }
    if has_prefixed_name(&lower, "handler_", u8::is_ascii_digit) {
        distinct += 1;
    }
    if has_prefixed_name(&lower, "vm_", |b| b.is_ascii_alphanumeric() || *b == b'_') {
        distinct += 1;
    }
    if has_hex_literal(tokens) {
        distinct += 1;
    }
    if tokens
        .iter()
        .any(|t| t.kind.is_name() && t.lexeme.len() > 15)
    {
        distinct += 1;
    }
    if distinct >= 2 {
        return true;
    }

    luminol_vm::handler_count(chunk) >= 1 && luminol_vm::encrypted_string_count(chunk) >= 1
}

fn has_prefixed_name(lower: &str, prefix: &str, follow: impl Fn(&u8) -> bool) -> bool {
    lower
        .match_indices(prefix)
        .any(|(i, _)| lower.as_bytes().get(i + prefix.len()).is_some_and(&follow))
}

fn has_hex_literal(tokens: &[Token]) -> bool {
    tokens.iter().any(|t| {
        t.kind == TokenKind::Number && (t.lexeme.starts_with("0x") || t.lexeme.starts_with("0X"))
    })
}
