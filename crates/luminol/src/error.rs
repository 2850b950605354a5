use thiserror::Error;

/// Pipeline error taxonomy.
///
/// Lex/parse errors abort immediately; analyzer and reconstructor failures
/// on individual handlers degrade to warnings instead of surfacing here.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// The input parses as Lua but shows no Luraph markers. Informational;
    /// retrying cannot help.
    #[error("input does not look like Luraph-protected Lua")]
    NotLuraph,

    /// The lexer or parser could not recover.
    #[error("invalid Lua at {line}:{col}: {msg}")]
    InvalidLua { line: u32, col: u32, msg: String },

    /// Most of the constant pool failed every decryption algorithm.
    #[error("decryption failed for at least half of the constant pool")]
    DecryptionFailed,

    /// The caller set the cancellation flag; cooperative, not a fault.
    #[error("cancelled at a stage boundary")]
    Cancelled,

    /// The emitted image failed read-back validation.
    #[error("emit failed: {msg}")]
    EmitFailed { msg: String },
}
