use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use sicxe_asm::asm::encoding::{LiteralListing, ObjFileFormat, ObjectRecords, SymbolListing};
use sicxe_asm::asm::{AsmErr, Assembler, ObjectFile};
use sicxe_asm::err::{Error, Severity};
use sicxe_asm::inst::InstTable;

/// A two-pass SIC/XE assembler producing relocatable object records.
#[derive(Parser)]
#[command(version)]
struct Args {
    /// Assembly source to assemble
    #[arg(default_value = "input.txt")]
    input: PathBuf,

    /// Instruction specification (mnemonic, opcode, format, operand count per line)
    #[arg(long, default_value = "inst.data")]
    inst: PathBuf,

    /// Where to write the symbol tables
    #[arg(long, default_value = "symtab_0000")]
    symtab: PathBuf,

    /// Where to write the literal tables
    #[arg(long, default_value = "literaltab_0000")]
    littab: PathBuf,

    /// Where to write the object records
    #[arg(short, long, default_value = "output_0000")]
    output: PathBuf,

    /// Assemble each control section on its own thread
    #[arg(long)]
    parallel: bool,

    /// Log more (`-v` for debug events, `-vv` for trace events)
    #[arg(short, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Fail if any warning is reported
    #[arg(long)]
    deny_warnings: bool,
}

/// Assembly reported an error-severity diagnostic.
const EXIT_ASM_FAILED: u8 = 1;
/// The registry or the source could not be read.
const EXIT_NO_INPUT: u8 = 2;

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let table = match InstTable::from_file(&args.inst) {
        Ok(t) => t,
        Err(e) => {
            report(&e, &args.inst);
            if let Some(help) = e.help() {
                eprintln!("  {} {help}", "help:".cyan());
            }
            return ExitCode::from(EXIT_NO_INPUT);
        }
    };
    let src = match fs::read_to_string(&args.input) {
        Ok(s) => s,
        Err(e) => {
            report(&e, &args.input);
            return ExitCode::from(EXIT_NO_INPUT);
        }
    };

    file_message(MsgColor::Green, "Assembling", &args.input);
    let obj = Assembler::new(&table)
        .parallel(args.parallel)
        .assemble(&src);

    for diag in obj.diagnostics() {
        print_diagnostic(diag, &args.input);
    }

    if let Err(e) = write_outputs(&obj, &args) {
        eprintln!("{}: {e}", "error".red().bold());
        return ExitCode::from(EXIT_NO_INPUT);
    }

    let denied = args.deny_warnings && !obj.diagnostics().is_empty();
    if obj.has_errors() || denied {
        let count = obj.diagnostics().len();
        message(MsgColor::Red, "Failed", &format!("with {count} diagnostic(s)"));
        return ExitCode::from(EXIT_ASM_FAILED);
    }

    file_message(MsgColor::Green, "Finished", &args.input);
    ExitCode::SUCCESS
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sicxe_asm=warn")),
        1 => EnvFilter::new("sicxe_asm=debug"),
        _ => EnvFilter::new("sicxe_asm=trace"),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn write_outputs(obj: &ObjectFile, args: &Args) -> std::io::Result<()> {
    file_message(MsgColor::Cyan, "Writing", &args.output);
    fs::write(&args.output, ObjectRecords::serialize(obj))?;

    file_message(MsgColor::Cyan, "Writing", &args.symtab);
    fs::write(&args.symtab, SymbolListing::serialize(obj))?;

    file_message(MsgColor::Cyan, "Writing", &args.littab);
    fs::write(&args.littab, LiteralListing::serialize(obj))?;

    Ok(())
}

fn print_diagnostic(diag: &AsmErr, input: &Path) {
    let label = match diag.severity() {
        Severity::Warning => "warning".yellow().bold(),
        Severity::Error   => "error".red().bold(),
    };
    eprintln!("{label}: {diag}");
    if let Some(line) = diag.line() {
        eprintln!("  {} {}:{line}", "-->".blue(), input.display());
    }
    if let Some(help) = diag.help() {
        eprintln!("  {} {help}", "help:".cyan());
    }
}

fn report(e: &dyn std::fmt::Display, path: &Path) {
    eprintln!("{}: {}: {e}", "error".red().bold(), path.display());
}

enum MsgColor {
    Green,
    Cyan,
    Red,
}

fn file_message(color: MsgColor, left: &str, right: &Path) {
    let right = format!("target {}", right.display());
    message(color, left, &right);
}

fn message(color: MsgColor, left: &str, right: &str) {
    let left = match color {
        MsgColor::Green => left.green(),
        MsgColor::Cyan => left.cyan(),
        MsgColor::Red => left.red(),
    };
    println!("{left:>12} {right}");
}
