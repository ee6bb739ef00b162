use std::path::PathBuf;

use clap::Parser;

/// dotpatch - post-compilation .NET assembly patcher
#[derive(Debug, Parser)]
#[command(name = "dotpatch", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(flatten)]
    pub patch: PatchArgs,
}

/// Options shared by every invocation.
#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// Emit the patch report as JSON instead of human-readable text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose (debug-level) logging output.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// What to patch. Items given here are appended to those of the instruction file.
#[derive(Debug, Parser)]
pub struct PatchArgs {
    /// JSON instruction file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Candidate module file; may be repeated.
    #[arg(short, long = "source", value_name = "PATH")]
    pub sources: Vec<PathBuf>,

    /// Directory the patched modules are written to; overrides the instruction file.
    #[arg(short, long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Let FRIEND see the internals of ASM.
    #[arg(long = "grant", value_name = "ASM=FRIEND", value_parser = parse_grant)]
    pub grants: Vec<(String, String)>,

    /// Unseal the types of ASM matching PATTERNS (`;`-separated globs, default all).
    #[arg(long, value_name = "ASM[=PATTERNS]", value_parser = parse_target)]
    pub unseal: Vec<(String, Option<String>)>,

    /// Make the members of ASM matching PATTERNS virtual.
    #[arg(long, value_name = "ASM[=PATTERNS]", value_parser = parse_target)]
    pub virtualize: Vec<(String, Option<String>)>,

    /// Make the members of ASM matching PATTERNS public.
    #[arg(long, value_name = "ASM[=PATTERNS]", value_parser = parse_target)]
    pub publicize: Vec<(String, Option<String>)>,
}

fn parse_grant(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((assembly, friend)) if !assembly.is_empty() && !friend.is_empty() => {
            Ok((assembly.to_string(), friend.to_string()))
        }
        _ => Err(format!("expected ASM=FRIEND, got '{value}'")),
    }
}

fn parse_target(value: &str) -> Result<(String, Option<String>), String> {
    let (assembly, patterns) = match value.split_once('=') {
        Some((assembly, patterns)) => (assembly, Some(patterns.to_string())),
        None => (value, None),
    };

    if assembly.is_empty() {
        return Err(format!("expected ASM[=PATTERNS], got '{value}'"));
    }
    Ok((assembly.to_string(), patterns))
}
