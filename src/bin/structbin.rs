//! structbin CLI: JSON -> wire format conversion.

use base64::Engine;
use clap::{Args, Parser, Subcommand};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;
use structbin::{EncodeOptions, StringEncoding, TypeRegistry};

#[derive(Parser)]
#[command(name = "structbin", about = "Encode JSON documents into the structbin wire format")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Encode JSON
    Encode(EncodeArgs),
}

#[derive(Args)]
struct EncodeArgs {
    /// Input JSON file
    #[arg(short, long)]
    input: String,

    /// Output file (default: input with .bin/.b64 extension; - = stdout)
    #[arg(short, long)]
    output: Option<String>,

    /// Encode strings as UTF-16 instead of UTF-8
    #[arg(long)]
    utf16: bool,

    /// Write the output base64-encoded (standard alphabet, with padding)
    #[arg(long)]
    base64: bool,
}

impl EncodeArgs {
    fn to_options(&self) -> EncodeOptions {
        let encoding = if self.utf16 { StringEncoding::Utf16 } else { StringEncoding::Utf8 };
        EncodeOptions::default().with_string_encoding(encoding)
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Fehler: {e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), String> {
    match cli.command {
        Command::Encode(args) => run_encode(args),
    }
}

fn run_encode(args: EncodeArgs) -> Result<(), String> {
    let json = fs::read_to_string(&args.input)
        .map_err(|e| format!("Lesefehler '{}': {e}", args.input))?;
    let value = structbin::parse_json(&json).map_err(|e| e.to_string())?;

    let registry = TypeRegistry::new();
    let options = args.to_options();
    let target = Target::resolve(args.output.as_deref(), &args.input, args.base64)?;

    target.write(|writer| {
        if args.base64 {
            let bytes = structbin::encode(&value, &registry, &options)
                .map_err(|e| format!("Encode-Fehler: {e}"))?;
            let text = base64::engine::general_purpose::STANDARD.encode(bytes);
            writeln!(writer, "{text}").map_err(|e| format!("Schreibfehler: {e}"))
        } else {
            structbin::encode_to_writer(&value, &registry, &options, writer)
                .map(|_| ())
                .map_err(|e| format!("Encode-Fehler: {e}"))
        }
    })
}

/// Ziel der Ausgabe: stdout (`-o -`) oder eine Datei.
enum Target {
    Stdout,
    File(PathBuf),
}

impl Target {
    /// Ohne `-o` landet die Ausgabe neben der Eingabe, mit `.bin` bzw. `.b64`.
    fn resolve(explicit: Option<&str>, input: &str, base64: bool) -> Result<Self, String> {
        match explicit {
            Some("-") => Ok(Self::Stdout),
            Some(path) => Ok(Self::File(PathBuf::from(path))),
            None => Ok(Self::File(
                Path::new(input).with_extension(if base64 { "b64" } else { "bin" }),
            )),
        }
    }

    /// Dateien werden ueber `<ziel>.tmp` geschrieben und erst bei Erfolg umbenannt.
    fn write(
        self,
        write_fn: impl FnOnce(&mut dyn Write) -> Result<(), String>,
    ) -> Result<(), String> {
        let path = match self {
            Self::Stdout => {
                let mut out = BufWriter::new(io::stdout().lock());
                write_fn(&mut out)?;
                return out.flush().map_err(|e| format!("Schreibfehler: {e}"));
            }
            Self::File(path) => path,
        };

        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        let result = File::create(&tmp)
            .map_err(|e| format!("Schreibfehler '{}': {e}", tmp.display()))
            .and_then(|file| {
                let mut out = BufWriter::new(file);
                write_fn(&mut out)?;
                out.flush().map_err(|e| format!("Schreibfehler: {e}"))
            });
        if let Err(e) = result {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        fs::rename(&tmp, &path).map_err(|e| format!("Rename-Fehler: {e}"))
    }
}
