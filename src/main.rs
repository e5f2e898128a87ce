use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use brainvm::{compile, Program, VmConfig, BYTECODE_EXTENSION, TAPE_LEN, VM};

#[derive(Parser)]
#[command(name = "brainvm", version, about = "Compile and run tape-machine programs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile and execute a program (source or .bfc)
    Run {
        /// Path to a source or .bfc file
        file: PathBuf,
        /// Number of tape cells
        #[arg(long, default_value_t = TAPE_LEN, value_parser = parse_tape_len)]
        tape_len: usize,
        /// Stop with an error after this many instructions
        #[arg(long)]
        max_steps: Option<u64>,
        /// Print a JSON run summary to stderr
        #[arg(long)]
        stats: bool,
    },
    /// Compile a source file to .bfc bytecode
    Compile {
        /// Path to source file
        file: PathBuf,
        /// Output path (defaults to the input with a .bfc extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the instruction listing
    Disasm {
        /// Path to a source or .bfc file
        file: PathBuf,
        /// Emit the listing as JSON
        #[arg(long)]
        json: bool,
    },
}

fn parse_tape_len(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("tape length must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(format!("invalid tape length '{}': {}", s, e)),
    }
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "brainvm=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    let exit_code = match cli.command {
        Commands::Run {
            file,
            tape_len,
            max_steps,
            stats,
        } => cmd_run(&file, VmConfig { tape_len, max_steps }, stats),
        Commands::Compile { file, output } => cmd_compile(&file, output),
        Commands::Disasm { file, json } => cmd_disasm(&file, json),
    };
    process::exit(exit_code);
}

const MAX_SOURCE_SIZE: u64 = 10 * 1024 * 1024; // 10 MB

fn read_input(path: &Path) -> Result<Vec<u8>, i32> {
    let filename = path.display();

    match std::fs::metadata(path) {
        Ok(meta) => {
            if meta.len() > MAX_SOURCE_SIZE {
                eprintln!(
                    "Error: file {} is too large ({} bytes, max {} bytes)",
                    filename,
                    meta.len(),
                    MAX_SOURCE_SIZE
                );
                return Err(1);
            }
        }
        Err(e) => {
            eprintln!("Error: cannot read file {}: {}", filename, e);
            return Err(1);
        }
    }

    std::fs::read(path).map_err(|e| {
        eprintln!("Error: cannot read file {}: {}", filename, e);
        1
    })
}

/// Load a program from source text, or from bytecode for `.bfc` paths.
fn load_program(path: &Path) -> Result<Program, i32> {
    let data = read_input(path)?;
    debug!(path = %path.display(), bytes = data.len(), "loading program");

    brainvm::load_program(path, &data).map_err(|e| {
        eprintln!("Error: {}", e);
        1
    })
}

#[derive(Serialize)]
struct RunSummary {
    instructions: usize,
    steps: u64,
    data_pointer: usize,
    instruction_pointer: usize,
    output_bytes: u64,
}

/// Counts bytes on their way to the real sink.
struct CountingWriter<W> {
    inner: W,
    written: u64,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

fn cmd_run(path: &Path, config: VmConfig, stats: bool) -> i32 {
    let program = match load_program(path) {
        Ok(p) => p,
        Err(code) => return code,
    };

    let stdout = io::stdout();
    let mut out = CountingWriter {
        inner: io::BufWriter::new(stdout.lock()),
        written: 0,
    };

    let mut vm = VM::with_config(program, config);
    let result = vm.run_with_output(&mut out);
    // Whatever was produced before a failure still belongs on stdout.
    let flushed = out.flush();

    if stats {
        let summary = RunSummary {
            instructions: vm.program().len(),
            steps: vm.steps(),
            data_pointer: vm.data_pointer(),
            instruction_pointer: vm.instruction_pointer(),
            output_bytes: out.written,
        };
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => eprintln!("{}", json),
            Err(e) => eprintln!("Error: cannot encode run summary: {}", e),
        }
    }

    if let Err(e) = result {
        eprintln!("Runtime error: {}", e);
        return 1;
    }
    if let Err(e) = flushed {
        eprintln!("Error: cannot write output: {}", e);
        return 1;
    }
    info!(steps = vm.steps(), "run complete");
    0
}

fn cmd_compile(path: &Path, output: Option<PathBuf>) -> i32 {
    let source = match read_input(path) {
        Ok(s) => s,
        Err(code) => return code,
    };

    let program = match compile(&source) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Compile error: {}", e);
            return 1;
        }
    };

    let bytes = match program.serialize() {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Bytecode error: {}", e);
            return 1;
        }
    };

    let out_path = output.unwrap_or_else(|| path.with_extension(BYTECODE_EXTENSION));
    if let Err(e) = std::fs::write(&out_path, &bytes) {
        eprintln!("Error: cannot write {}: {}", out_path.display(), e);
        return 1;
    }

    println!(
        "{}: {} instructions, {} bytes",
        out_path.display(),
        program.len(),
        bytes.len()
    );
    0
}

fn cmd_disasm(path: &Path, json: bool) -> i32 {
    let program = match load_program(path) {
        Ok(p) => p,
        Err(code) => return code,
    };

    if json {
        match serde_json::to_string_pretty(&program.listing()) {
            Ok(s) => println!("{}", s),
            Err(e) => {
                eprintln!("Error: cannot encode listing: {}", e);
                return 1;
            }
        }
    } else {
        print!("{}", program);
    }
    0
}
