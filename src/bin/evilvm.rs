//! Evil VM command-line front end (§6).
//!
//! Parses the configuration flags the core exposes as [`evilvm::VmConfig`],
//! assembles the given source file, and runs it to completion against
//! stdin/stdout.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::error;

use evilvm::{assemble_and_load, AsmError, StdIoChannel, StopReason, VmConfig, VmFault};

/// A virtual machine for an invented, parametric architecture.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the assembly source file to assemble and run.
    source: PathBuf,

    /// Bits per memory cell.
    #[arg(long, default_value_t = 9)]
    char_bit: u32,

    /// Cells per machine word.
    #[arg(long, default_value_t = 7)]
    word_size: usize,

    /// Cells per memory address.
    #[arg(long, default_value_t = 5)]
    addr_size: usize,

    /// Size of the RAM space, in cells.
    #[arg(long, default_value_t = 1024)]
    ram_size: usize,

    /// Size of the call stack space, in cells.
    #[arg(long, default_value_t = 256)]
    stack_size: usize,

    /// Alias two logical spaces onto one backing array, e.g. `ram=program`.
    /// May be given multiple times.
    #[arg(long = "map-memory", value_name = "NAME=NAME")]
    map_memory: Vec<String>,

    /// Print a disassembly of the assembled program image instead of
    /// running it.
    #[arg(long)]
    disassemble: bool,
}

const EXIT_OK: u8 = 0;
const EXIT_FAULT: u8 = 1;
const EXIT_ASSEMBLY_ERROR: u8 = 2;
const EXIT_BAD_ARGS: u8 = 64;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("LOGLEVEL", "warn")).init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(EXIT_BAD_ARGS);
        }
    };
    let source = match std::fs::read_to_string(&args.source) {
        Ok(s) => s,
        Err(e) => {
            error!("could not read {}: {e}", args.source.display());
            return ExitCode::from(EXIT_BAD_ARGS);
        }
    };

    let mut aliases = Vec::new();
    for term in &args.map_memory {
        match VmConfig::parse_alias(term) {
            Some(pair) => aliases.push(pair),
            None => {
                eprintln!("invalid --map-memory term `{term}` (expected e.g. `ram=program`)");
                return ExitCode::from(EXIT_BAD_ARGS);
            }
        }
    }

    let config = VmConfig {
        char_bit: args.char_bit,
        word_size: args.word_size,
        addr_size: args.addr_size,
        ram_size: args.ram_size,
        stack_size: args.stack_size,
        program_size: 0,
        aliases,
    };

    if args.disassemble {
        disassemble(&source, config)
    } else {
        run(&source, config)
    }
}

fn run(source: &str, config: VmConfig) -> ExitCode {
    let mut machine = match assemble_and_load(source, config) {
        Ok(m) => m,
        Err(e) => {
            report_assembly_error(&e);
            return ExitCode::from(EXIT_ASSEMBLY_ERROR);
        }
    };

    let mut io = StdIoChannel::new();
    match machine.run(&mut io) {
        Ok(StopReason::Halted) => ExitCode::from(EXIT_OK),
        Err(fault) => {
            report_fault(&fault);
            ExitCode::from(EXIT_FAULT)
        }
    }
}

fn disassemble(source: &str, config: VmConfig) -> ExitCode {
    let table = evilvm::isa::build_table();
    let image = match evilvm::asm::assemble(source, &config, &table) {
        Ok(image) => image,
        Err(e) => {
            report_assembly_error(&e);
            return ExitCode::from(EXIT_ASSEMBLY_ERROR);
        }
    };
    let map = evilvm::memmap::MemoryMap::build(
        config.ram_size,
        image.len(),
        config.stack_size,
        config.char_bit,
        &config.aliases,
    );
    map.space(evilvm::memmap::SpaceName::Program)
        .store_bytes(0, &image)
        .expect("image fits freshly sized program space");
    for line in evilvm::disasm::disassemble(
        &map,
        &table,
        config.word_size,
        config.addr_size,
        config.char_bit,
        image.len() as u64,
    ) {
        println!("{line}");
    }
    ExitCode::from(EXIT_OK)
}

fn report_assembly_error(e: &AsmError) {
    eprintln!("assembly error: {e}");
}

fn report_fault(e: &VmFault) {
    eprintln!("VM fault at ip={}: {e}", e.ip());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_program_runs_without_panicking() {
        // SP stands in as the cursor register: this program never calls or
        // pushes, so nothing else touches it.
        let src = "\
            msg: db 'H', 'i', 0x0a\n\
            movw.i2r c, 3\n\
            movw.i2r sp, msg\n\
            top:\n\
            lpb a, sp\n\
            out\n\
            add.w sp, 1\n\
            loop top\n\
            halt\n\
        ";
        let config = VmConfig {
            char_bit: 8,
            word_size: 2,
            addr_size: 2,
            ram_size: 64,
            stack_size: 32,
            program_size: 0,
            aliases: Vec::new(),
        };
        let _code = run(src, config);
    }

    #[test]
    fn disassemble_does_not_panic_on_a_valid_program() {
        let src = "movw.i2r a, 5\nhalt\n";
        let config = VmConfig {
            char_bit: 8,
            word_size: 2,
            addr_size: 2,
            ram_size: 16,
            stack_size: 16,
            program_size: 0,
            aliases: Vec::new(),
        };
        let _code = disassemble(src, config);
    }
}
