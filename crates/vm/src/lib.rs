//! VM analysis over the annotated AST.
//!
//! Three sub-passes: handler extraction, encryption discovery, and opcode
//! inference (name heuristics, body patterns, symbolic execution). All
//! state lives in a per-invocation [`Analysis`] bundle so concurrent
//! invocations cannot interfere.

pub mod infer;
pub mod serialize;
pub mod symbolic;

use std::hash::{Hash, Hasher};

use rustc_hash::{FxHashSet, FxHasher};

use luminol_bytecode::{Constant, OpCode};
use luminol_decrypt::{self as decrypt, EncryptionInfo, LuraphVersion, Method};
use luminol_syntax::ast::{Block, Expr, LuaValue, Stmt, TableKey};
use luminol_syntax::lexer::Lexer;
use luminol_syntax::parser;

use symbolic::Emission;

/// One VM dispatch handler. Identity is `index`.
#[derive(Debug, Clone)]
pub struct Handler {
    pub index: u32,
    pub name: String,
    /// Inferred Lua 5.3 opcode, when the cascade produced one.
    pub opcode: Option<OpCode>,
    /// Serialized body text, used by the reconstructor's pattern fallback.
    pub body_code: String,
    /// Whether the body carried encrypted string payloads.
    pub encrypted: bool,
    /// Decrypted body text, when decryption succeeded.
    pub decrypted_code: Option<String>,
    /// Operands recovered by symbolic execution.
    pub emission: Option<Emission>,
}

/// Caller-supplied analysis parameters.
#[derive(Debug, Clone, Default)]
pub struct AnalyzeOptions {
    pub method: Option<Method>,
    pub key: Option<Vec<u8>>,
    pub iv: Option<Vec<u8>>,
    pub version: Option<LuraphVersion>,
}

/// Result bundle of one analysis invocation.
#[derive(Debug, Default)]
pub struct Analysis {
    /// Handlers sorted by index, unique per index.
    pub handlers: Vec<Handler>,
    /// The recovered constant pool, dense from slot 0.
    pub constants: Vec<Constant>,
    pub encryption: Option<EncryptionInfo>,
    /// Encrypted constants successfully decrypted.
    pub constants_decrypted: usize,
    /// Encrypted constants that failed every algorithm.
    pub constants_failed: usize,
    pub warnings: Vec<String>,
}

/// Analyze a parsed chunk.
pub fn analyze(chunk: &Block, options: &AnalyzeOptions) -> Analysis {
    let mut analysis = Analysis::default();

    analysis.encryption = discover_encryption(chunk, options);
    extract_handlers(chunk, &mut analysis);
    extract_constants(chunk, &mut analysis);

    log::debug!(
        "analysis: {} handlers, {} constants ({} decrypted, {} failed)",
        analysis.handlers.len(),
        analysis.constants.len(),
        analysis.constants_decrypted,
        analysis.constants_failed
    );

    analysis
}

/// Number of `vm_handler`-marked function declarations in a chunk.
pub fn handler_count(chunk: &Block) -> usize {
    let mut count = 0;
    walk_stmts(chunk, &mut |stmt| {
        if matches!(stmt, Stmt::FunctionDecl { vm_handler: true, .. }) {
            count += 1;
        }
    });
    count
}

/// Number of encrypted string literals in a chunk.
pub fn encrypted_string_count(chunk: &Block) -> usize {
    let mut count = 0;
    walk_exprs(chunk, &mut |expr| {
        if matches!(expr, Expr::EncryptedString { .. }) {
            count += 1;
        }
    });
    count
}

/// Sub-pass 2 (run first, handlers need the key): find the session key.
///
/// An explicit key wins; otherwise the first key-shaped string literal in
/// the chunk becomes the key. The version, when known, refines the method
/// guess but never overrides an explicit choice.
fn discover_encryption(chunk: &Block, options: &AnalyzeOptions) -> Option<EncryptionInfo> {
    let key = match &options.key {
        Some(key) => key.clone(),
        None => {
            let mut found: Option<Vec<u8>> = None;
            walk_exprs(chunk, &mut |expr| {
                if found.is_some() {
                    return;
                }
                let bytes = match expr {
                    Expr::Literal {
                        value: LuaValue::Str(bytes),
                        ..
                    } => bytes,
                    Expr::EncryptedString { raw, .. } => raw,
                    _ => return,
                };
                if decrypt::keyscan::is_key_shaped(bytes) {
                    found = Some(bytes.clone());
                }
            });
            found?
        }
    };

    let version = options.version.or(match key.len() {
        16 => Some(LuraphVersion::V11_5),
        24 => Some(LuraphVersion::V11_6),
        32 => Some(LuraphVersion::V11_7),
        _ => None,
    });
    let method = options.method.unwrap_or(Method::Auto);

    log::debug!(
        "session key: {} bytes, method {}, version {:?}",
        key.len(),
        method.name(),
        version.map(LuraphVersion::name)
    );

    Some(EncryptionInfo {
        method,
        key,
        iv: options.iv.clone(),
        version,
    })
}

/// Sub-pass 1: collect every `vm_handler` function, derive indices, and run
/// opcode inference.
fn extract_handlers(chunk: &Block, analysis: &mut Analysis) {
    let mut seen = FxHashSet::default();
    let encryption = analysis.encryption.clone();

    walk_stmts(chunk, &mut |stmt| {
        let Stmt::FunctionDecl {
            name,
            body,
            vm_handler: true,
            handler_index,
            ..
        } = stmt
        else {
            return;
        };

        let index = handler_index.unwrap_or_else(|| derive_index(name));
        if !seen.insert(index) {
            analysis
                .warnings
                .push(format!("handler {}: duplicate index {}, dropped", name, index));
            return;
        }

        let body_code = serialize::body_to_string(&body.block);
        let encrypted = encrypted_string_count(&body.block) > 0;

        // Decrypt embedded payloads before inference; a decrypted body that
        // re-parses replaces the original for pattern matching.
        let decrypted_code = if encrypted {
            encryption.as_ref().and_then(|info| decrypt_body(&body.block, info))
        } else {
            None
        };
        let reparsed = decrypted_code.as_deref().and_then(|code| {
            let tokens = Lexer::scan_all(code.as_bytes());
            parser::parse(&tokens).ok()
        });
        let effective = reparsed.as_ref().unwrap_or(&body.block);

        let opcode = infer::infer_opcode(name, effective);
        let emission = symbolic::execute(effective);

        analysis.handlers.push(Handler {
            index,
            name: name.clone(),
            opcode,
            body_code,
            encrypted,
            decrypted_code,
            emission,
        });
    });

    analysis.handlers.sort_by_key(|h| h.index);
}

/// Handler index: the first decimal run in the name, else a stable hash.
fn derive_index(name: &str) -> u32 {
    let digits: String = name
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if let Ok(index) = digits.parse::<u32>() {
        return index;
    }
    let mut hasher = FxHasher::default();
    name.hash(&mut hasher);
    (hasher.finish() % 1000) as u32
}

/// Decrypt the encrypted string payloads of a handler body. Returns the
/// joined plaintexts when at least one payload decrypts.
fn decrypt_body(body: &Block, info: &EncryptionInfo) -> Option<String> {
    let mut pieces = Vec::new();
    walk_exprs(body, &mut |expr| {
        let Expr::EncryptedString { raw, method, .. } = expr else {
            return;
        };
        let info = with_method_hint(info, method.as_deref());
        let result = decrypt::decrypt(raw, &info);
        if result.ok && result.score > 0 {
            pieces.push(String::from_utf8_lossy(&result.plaintext).into_owned());
        }
    });
    if pieces.is_empty() {
        None
    } else {
        Some(pieces.join("; "))
    }
}

/// A per-node cipher hint overrides `auto`, never an explicit session method.
fn with_method_hint(info: &EncryptionInfo, hint: Option<&str>) -> EncryptionInfo {
    let mut info = info.clone();
    if info.method == Method::Auto {
        if let Some(method) = hint.and_then(Method::parse) {
            info.method = method;
        }
    }
    info
}

/// Sub-pass 3 companion: convert the first constant-table constructor into
/// the VM constant pool, decrypting string entries.
fn extract_constants(chunk: &Block, analysis: &mut Analysis) {
    let mut pool: Option<Vec<Expr>> = None;
    walk_exprs(chunk, &mut |expr| {
        if pool.is_some() {
            return;
        }
        if let Expr::Table {
            fields,
            constant_table: true,
            ..
        } = expr
        {
            pool = Some(fields.iter().map(|f| f.value.clone()).collect());
        }
    });

    let Some(values) = pool else { return };
    let encryption = analysis.encryption.clone();

    for (slot, value) in values.into_iter().enumerate() {
        let constant = match value {
            Expr::Literal { value, .. } => match value {
                LuaValue::Nil => Constant::Nil,
                LuaValue::Boolean(b) => Constant::Boolean(b),
                LuaValue::Int(i) => Constant::Integer(i),
                LuaValue::Float(f) => Constant::Float(f),
                LuaValue::Str(s) => Constant::Str(s),
            },
            Expr::EncryptedString { raw, method, .. } => match &encryption {
                Some(info) => {
                    let info = with_method_hint(info, method.as_deref());
                    let result = decrypt::decrypt(&raw, &info);
                    if result.ok && result.score > 0 {
                        analysis.constants_decrypted += 1;
                        Constant::Str(result.plaintext)
                    } else {
                        analysis.constants_failed += 1;
                        analysis.warnings.push(format!(
                            "constant #{}: decryption failed, kept ciphertext",
                            slot
                        ));
                        Constant::Str(raw)
                    }
                }
                None => {
                    analysis.constants_failed += 1;
                    analysis.warnings.push(format!(
                        "constant #{}: decryption failed, kept ciphertext",
                        slot
                    ));
                    Constant::Str(raw)
                }
            },
            // constant_table guarantees literal-or-encrypted fields.
            other => {
                analysis
                    .warnings
                    .push(format!("constant #{}: unexpected shape {:?}", slot, other.span()));
                Constant::Nil
            }
        };
        analysis.constants.push(constant);
    }
}

/// Depth-first statement walk, declarations before nested bodies.
fn walk_stmts(block: &Block, visit: &mut dyn FnMut(&Stmt)) {
    for stmt in &block.stmts {
        visit(stmt);
        match stmt {
            Stmt::Do { block, .. } => walk_stmts(block, visit),
            Stmt::While { body, .. } | Stmt::Repeat { body, .. } => walk_stmts(body, visit),
            Stmt::If { arms, else_block, .. } => {
                for (_, block) in arms {
                    walk_stmts(block, visit);
                }
                if let Some(block) = else_block {
                    walk_stmts(block, visit);
                }
            }
            Stmt::NumericFor { body, .. } | Stmt::GenericFor { body, .. } => {
                walk_stmts(body, visit)
            }
            Stmt::FunctionDecl { body, .. } => walk_stmts(&body.block, visit),
            _ => {}
        }
    }
}

/// Depth-first expression walk over a block, in source order.
fn walk_exprs(block: &Block, visit: &mut dyn FnMut(&Expr)) {
    for stmt in &block.stmts {
        match stmt {
            Stmt::Assign { targets, values, .. } => {
                for e in targets.iter().chain(values) {
                    walk_expr(e, visit);
                }
            }
            Stmt::Call { call, .. } => walk_expr(call, visit),
            Stmt::Do { block, .. } => walk_exprs(block, visit),
            Stmt::While { cond, body, .. } => {
                walk_expr(cond, visit);
                walk_exprs(body, visit);
            }
            Stmt::Repeat { body, cond, .. } => {
                walk_exprs(body, visit);
                walk_expr(cond, visit);
            }
            Stmt::If { arms, else_block, .. } => {
                for (cond, block) in arms {
                    walk_expr(cond, visit);
                    walk_exprs(block, visit);
                }
                if let Some(block) = else_block {
                    walk_exprs(block, visit);
                }
            }
            Stmt::NumericFor {
                start, stop, step, body, ..
            } => {
                walk_expr(start, visit);
                walk_expr(stop, visit);
                if let Some(step) = step {
                    walk_expr(step, visit);
                }
                walk_exprs(body, visit);
            }
            Stmt::GenericFor { exprs, body, .. } => {
                for e in exprs {
                    walk_expr(e, visit);
                }
                walk_exprs(body, visit);
            }
            Stmt::FunctionDecl { body, .. } => walk_exprs(&body.block, visit),
            Stmt::Return { exprs, .. } => {
                for e in exprs {
                    walk_expr(e, visit);
                }
            }
            Stmt::Break { .. } | Stmt::Goto { .. } | Stmt::Label { .. } => {}
        }
    }
}

fn walk_expr(expr: &Expr, visit: &mut dyn FnMut(&Expr)) {
    visit(expr);
    match expr {
        Expr::Unary { operand, .. } => walk_expr(operand, visit),
        Expr::Binary { lhs, rhs, .. } => {
            walk_expr(lhs, visit);
            walk_expr(rhs, visit);
        }
        Expr::Index { object, key, .. } => {
            walk_expr(object, visit);
            walk_expr(key, visit);
        }
        Expr::Call { callee, args, .. } => {
            walk_expr(callee, visit);
            for arg in args {
                walk_expr(arg, visit);
            }
        }
        Expr::MethodCall { object, args, .. } => {
            walk_expr(object, visit);
            for arg in args {
                walk_expr(arg, visit);
            }
        }
        Expr::Function { body, .. } => walk_exprs(&body.block, visit),
        Expr::Table { fields, .. } => {
            for field in fields {
                if let TableKey::Expr(key) = &field.key {
                    walk_expr(key, visit);
                }
                walk_expr(&field.value, visit);
            }
        }
        Expr::Literal { .. } | Expr::Name { .. } | Expr::Vararg { .. } | Expr::EncryptedString { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(src: &str) -> Block {
        let tokens = Lexer::scan_all(src.as_bytes());
        parser::parse(&tokens).expect("test chunk must parse")
    }

    #[test]
    fn test_handler_extraction_and_index() {
        let block = chunk(
            "local function handler_1(a) R[0] = R[1] end\n\
             local function handler_12(a) R[0] = K[0] end",
        );
        let analysis = analyze(&block, &AnalyzeOptions::default());
        assert_eq!(analysis.handlers.len(), 2);
        assert_eq!(analysis.handlers[0].index, 1);
        assert_eq!(analysis.handlers[1].index, 12);
        assert_eq!(analysis.handlers[0].opcode, Some(OpCode::Move));
        assert_eq!(analysis.handlers[1].opcode, Some(OpCode::LoadK));
    }

    #[test]
    fn test_hashed_index_is_stable() {
        let a = derive_index("no_digits_here_at_all");
        let b = derive_index("no_digits_here_at_all");
        assert_eq!(a, b);
        assert!(a < 1000);
    }

    #[test]
    fn test_duplicate_index_dropped_with_warning() {
        let block = chunk(
            "local function handler_5(a) R[0] = R[1] end\n\
             local function vm_5(a) R[0] = R[2] end",
        );
        let analysis = analyze(&block, &AnalyzeOptions::default());
        assert_eq!(analysis.handlers.len(), 1);
        assert_eq!(analysis.warnings.len(), 1);
    }

    #[test]
    fn test_key_discovery() {
        let block = chunk("local k = \"0123456789ABCDEF0123456789ABCDEF\"");
        let analysis = analyze(&block, &AnalyzeOptions::default());
        let info = analysis.encryption.expect("key should be discovered");
        assert_eq!(info.key, b"0123456789ABCDEF0123456789ABCDEF".to_vec());
        assert_eq!(info.method, Method::Auto);
    }

    #[test]
    fn test_explicit_key_wins() {
        let block = chunk("local k = \"0123456789ABCDEF0123456789ABCDEF\"");
        let options = AnalyzeOptions {
            key: Some(b"mykey".to_vec()),
            ..Default::default()
        };
        let analysis = analyze(&block, &options);
        assert_eq!(analysis.encryption.unwrap().key, b"mykey".to_vec());
    }

    #[test]
    fn test_constant_pool_extraction() {
        let block = chunk(r#"local K = { "print", "a", "b", 1, 2.5, true }"#);
        let analysis = analyze(&block, &AnalyzeOptions::default());
        assert_eq!(analysis.constants.len(), 6);
        assert_eq!(analysis.constants[0], Constant::Str(b"print".to_vec()));
        assert_eq!(analysis.constants[3], Constant::Integer(1));
        assert_eq!(analysis.constants[4], Constant::Float(2.5));
        assert_eq!(analysis.constants[5], Constant::Boolean(true));
    }

    #[test]
    fn test_undecryptable_constant_kept_with_warning() {
        // Six entries, one encrypted, no key anywhere: the encrypted entry
        // stays ciphertext and a warning is recorded.
        let block = chunk("local K = { \"a\", \"b\", \"c\", \"d\", \"e\", \"\\x01\\x02\\x03\\x04\\x05\\x06\" }");
        let analysis = analyze(&block, &AnalyzeOptions::default());
        assert_eq!(analysis.constants.len(), 6);
        assert_eq!(analysis.constants_failed, 1);
        assert!(analysis.warnings[0].starts_with("constant #5:"));
    }

    #[test]
    fn test_counters() {
        let block = chunk(
            "local function handler_2(x) R[0] = R[1] end\n\
             local s = \"\\x01\\x02\\x03\\x04\\x05\\x06\"",
        );
        assert_eq!(handler_count(&block), 1);
        assert_eq!(encrypted_string_count(&block), 1);
    }
}
