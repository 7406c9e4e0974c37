use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use flate2::Compression;
use slate_archive::{
    FileType, Result, decode_base64_checked, encode_base64, encode_base64_url, gzip_compress_with,
    gzip_decompress, list, pack, unpack,
};
use tracing_subscriber::EnvFilter;

/// Pack, unpack and transcode configuration bundles
#[derive(Debug, Parser)]
#[command(name = "slate-archive", version)]
struct App {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create a tar archive (.tar or .tar.gz)
    Pack {
        tarfile: String,
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Extract a tar archive
    Unpack { tarfile: String, directory: PathBuf },
    /// List files in a tar archive
    List { tarfile: String },
    /// Base64 transcoding from stdin to stdout
    Base64 {
        #[command(subcommand)]
        op: Base64Op,
    },
    /// Gzip transcoding from stdin to stdout
    Gzip {
        #[command(subcommand)]
        op: GzipOp,
    },
}

#[derive(Debug, Subcommand)]
enum Base64Op {
    Encode {
        /// Use the URL- and filename-safe alphabet
        #[arg(long)]
        url: bool,
    },
    Decode,
}

#[derive(Debug, Subcommand)]
enum GzipOp {
    Compress {
        /// Compression level, 0-9
        #[arg(long, default_value_t = 6, value_parser = clap::value_parser!(u32).range(0..=9))]
        level: u32,
    },
    Decompress,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let app = App::parse();
    match run(app.cmd) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cmd: Command) -> Result<()> {
    match cmd {
        Command::Pack { tarfile, paths } => {
            pack(&tarfile, &paths)?;
            println!("Created tar archive: {}", tarfile);
        }
        Command::Unpack { tarfile, directory } => {
            unpack(&tarfile, &directory)?;
            println!("Extraction complete to: {}", directory.display());
        }
        Command::List { tarfile } => {
            let entries = list(&tarfile)?;
            println!("Files in {}:", tarfile);
            println!("{:>4}  {:>6}  {:>10}  {}", "Type", "Mode", "Size", "Name");
            println!("{}", "-".repeat(50));
            for entry in &entries {
                println!(
                    "{:>4}  {:>6o}  {:>10}  {}",
                    type_letter(entry.file_type),
                    entry.mode,
                    entry.size,
                    entry.name
                );
            }
            println!("\nTotal: {} file(s)", entries.len());
        }
        Command::Base64 { op } => {
            let mut input = Vec::new();
            io::stdin().lock().read_to_end(&mut input)?;
            let mut out = io::stdout().lock();
            match op {
                Base64Op::Encode { url } => {
                    let text = if url {
                        encode_base64_url(&input)
                    } else {
                        encode_base64(&input)
                    };
                    writeln!(out, "{}", text)?;
                }
                Base64Op::Decode => {
                    let text = String::from_utf8_lossy(&input);
                    out.write_all(&decode_base64_checked(text.trim_end())?)?;
                }
            }
            out.flush()?;
        }
        Command::Gzip { op } => {
            let mut input = io::stdin().lock();
            let mut out = io::stdout().lock();
            match op {
                GzipOp::Compress { level } => {
                    gzip_compress_with(&mut input, &mut out, Compression::new(level))?;
                }
                GzipOp::Decompress => {
                    gzip_decompress(&mut input, &mut out)?;
                }
            }
        }
    }
    Ok(())
}

fn type_letter(file_type: FileType) -> char {
    match file_type {
        FileType::RegularFile | FileType::Reserved => '-',
        FileType::HardLink => 'h',
        FileType::SymbolicLink => 'l',
        FileType::CharacterDevice => 'c',
        FileType::BlockDevice => 'b',
        FileType::Directory => 'd',
        FileType::Fifo => 'p',
    }
}
