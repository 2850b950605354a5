use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

use luminol::{deobfuscate_with_progress, LuraphVersion, Method, Options};

#[derive(Debug, Parser)]
#[command(
    name = "luminol",
    about = "Recover runnable Lua 5.3 from Luraph-protected sources"
)]
struct Cli {
    /// Protected Lua source file.
    input: PathBuf,

    /// Where to write the compiled chunk. Defaults to the input path with a
    /// .luac extension.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Also write the readable listing to this path.
    #[arg(long)]
    source: Option<PathBuf>,

    /// Decryption method: xor_v1, xor_v2, aes_cbc, aes_cbc_v2,
    /// luraph_custom, or auto.
    #[arg(long)]
    method: Option<String>,

    /// Session key, as raw text or hex with a "hex:" prefix.
    #[arg(long)]
    key: Option<String>,

    /// AES IV as hex (16 bytes).
    #[arg(long)]
    iv: Option<String>,

    /// Luraph release the dump came from: 11.5, 11.6, 11.7, 11.8, 11.8.1.
    #[arg(long = "luraph-version")]
    luraph_version: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let method = match &cli.method {
        Some(name) => {
            Some(Method::parse(name).with_context(|| format!("unknown method '{}'", name))?)
        }
        None => None,
    };
    let version = match &cli.luraph_version {
        Some(name) => Some(
            LuraphVersion::parse(name).with_context(|| format!("unknown version '{}'", name))?,
        ),
        None => None,
    };
    let key = cli.key.as_deref().map(parse_key).transpose()?;
    let iv = cli.iv.as_deref().map(parse_hex).transpose()?;

    let options = Options {
        method,
        key,
        iv,
        version,
        cancel: None,
    };

    let data = fs::read(&cli.input)
        .with_context(|| format!("failed to read {}", cli.input.display()))?;

    let result = deobfuscate_with_progress(&data, &options, &mut |event| {
        log::info!("{} ({:.0}%)", event.step, event.fraction * 100.0);
    });

    let output = match result {
        Ok(output) => output,
        Err(e) => bail!("{}", e),
    };

    let out_path = cli
        .output
        .unwrap_or_else(|| cli.input.with_extension("luac"));
    if let Some(bytecode) = &output.bytecode {
        fs::write(&out_path, bytecode)
            .with_context(|| format!("failed to write {}", out_path.display()))?;
        println!("wrote {} ({} bytes)", out_path.display(), bytecode.len());
    }

    if let (Some(path), Some(listing)) = (&cli.source, &output.source_code) {
        fs::write(path, listing)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("wrote {}", path.display());
    }

    let stats = &output.stats;
    println!(
        "handlers: {}  instructions: {}  constants decrypted: {}",
        stats.handlers_processed, stats.instructions_reconstructed, stats.constants_decrypted
    );
    for warning in &stats.warnings {
        eprintln!("warning: {}", warning);
    }

    Ok(())
}

/// Keys are raw text unless prefixed with "hex:".
fn parse_key(text: &str) -> Result<Vec<u8>> {
    match text.strip_prefix("hex:") {
        Some(hex) => parse_hex(hex),
        None => Ok(text.as_bytes().to_vec()),
    }
}

fn parse_hex(text: &str) -> Result<Vec<u8>> {
    if text.len() % 2 != 0 || !text.bytes().all(|b| b.is_ascii_hexdigit()) {
        bail!("'{}' is not an even-length hex string", text);
    }
    Ok(text
        .as_bytes()
        .chunks_exact(2)
        .map(|pair| {
            let hi = (pair[0] as char).to_digit(16).unwrap() as u8;
            let lo = (pair[1] as char).to_digit(16).unwrap() as u8;
            (hi << 4) | lo
        })
        .collect())
}
