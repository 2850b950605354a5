//! Regex fallback over serialized handler bodies.
//!
//! Second-chance lifting for handlers symbolic execution could not decode.
//! The vocabulary mirrors the analyzer's body patterns; bodies that reach
//! this pass are usually short one-liners, where a regex is cheap and a
//! full re-parse buys nothing.

use std::sync::LazyLock;

use regex::Regex;

use luminol_bytecode::OpCode;
use luminol_vm::symbolic::Emission;

static MOVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^R\[(\d+)\]\s*=\s*R\[(\d+)\]$").unwrap());

static LOADK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^R\[(\d+)\]\s*=\s*K\[(\d+)\]$").unwrap());

static ARITH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^R\[(\d+)\]\s*=\s*R\[(\d+)\]\s*(\+|-|\*|/|%|\^|\.\.)\s*R\[(\d+)\]$").unwrap()
});

static CALL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^R\[(\d+)\]\((.*)\)$").unwrap());

static RETURN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^return\b").unwrap());

/// Match the serialized body text against the pattern vocabulary. The first
/// statement that matches decides, mirroring the analyzer's first-statement
/// rule.
pub fn match_body(code: &str) -> Option<Emission> {
    code.split(';').map(str::trim).find_map(match_statement)
}

fn match_statement(stmt: &str) -> Option<Emission> {
    if let Some(caps) = ARITH_RE.captures(stmt) {
        let op = match &caps[3] {
            "+" => OpCode::Add,
            "-" => OpCode::Sub,
            "*" => OpCode::Mul,
            "/" => OpCode::Div,
            "%" => OpCode::Mod,
            "^" => OpCode::Pow,
            ".." => OpCode::Concat,
            _ => return None,
        };
        return Some(Emission {
            op,
            a: caps[1].parse().ok()?,
            b: caps[2].parse().ok()?,
            c: caps[4].parse().ok()?,
        });
    }
    if let Some(caps) = MOVE_RE.captures(stmt) {
        return Some(Emission {
            op: OpCode::Move,
            a: caps[1].parse().ok()?,
            b: caps[2].parse().ok()?,
            c: 0,
        });
    }
    if let Some(caps) = LOADK_RE.captures(stmt) {
        return Some(Emission {
            op: OpCode::LoadK,
            a: caps[1].parse().ok()?,
            b: caps[2].parse().ok()?,
            c: 0,
        });
    }
    if let Some(caps) = CALL_RE.captures(stmt) {
        let args = caps[2].trim();
        let argc = if args.is_empty() {
            0
        } else {
            args.bytes().filter(|&b| b == b',').count() as i32 + 1
        };
        return Some(Emission {
            op: OpCode::Call,
            a: caps[1].parse().ok()?,
            b: argc + 1,
            c: 2,
        });
    }
    if RETURN_RE.is_match(stmt) {
        return Some(Emission {
            op: OpCode::Return,
            a: 0,
            b: 1,
            c: 0,
        });
    }
    None
}
