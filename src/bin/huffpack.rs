use clap::{Args, Parser, Subcommand};
use huffpack::compress::{ratio_to_string, Cfg, Compressor};
use huffpack::decompress::{DecompressCfg, Decompressor};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "huffpack", version, about = "Huffman multi-file archiver")]
struct Cli {
    #[command(flatten)]
    common: Common,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Common {
    /// More logging (-v debug, -vv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log warnings and errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Skip fsync of written files.
    #[arg(long, global = true, default_value_t = false)]
    no_fsync: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Archive every regular file directly inside a directory.
    Compress {
        input_dir: PathBuf,
        archive: PathBuf,

        /// Compression worker threads (defaults to CPU count).
        #[arg(long)]
        workers: Option<usize>,

        /// Tasks buffered ahead of the workers (defaults to 2 x workers).
        #[arg(long)]
        queue_capacity: Option<usize>,
    },
    /// Restore every file of an archive into a directory.
    Decompress {
        archive: PathBuf,
        output_dir: PathBuf,

        /// Cap extraction threads. Without it each file gets its own thread.
        #[arg(long)]
        max_workers: Option<usize>,
    },
    /// Print the entries of an archive.
    List { archive: PathBuf },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.common);

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(common: &Common) {
    let level = match (common.quiet, common.verbose) {
        (true, _) => log::LevelFilter::Warn,
        (false, 0) => log::LevelFilter::Info,
        (false, 1) => log::LevelFilter::Debug,
        (false, _) => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_env(env_logger::Env::default())
        .filter_level(level)
        .init();
}

// Ok(false) means the run finished but some files were not processed.
fn run(cli: Cli) -> huffpack::Result<bool> {
    match cli.command {
        Commands::Compress {
            input_dir,
            archive,
            workers,
            queue_capacity,
        } => {
            let mut cfg = match workers {
                Some(n) => Cfg::with_workers(n),
                None => Cfg::default(),
            };
            if let Some(cap) = queue_capacity {
                cfg.queue_capacity = cap.max(1);
            }
            cfg.no_fsync = cli.common.no_fsync;

            let summary = Compressor::new(cfg, archive).compress_directory(&input_dir)?;
            for failure in &summary.failures {
                log::warn!("skipped {}", failure);
            }
            println!(
                "{} files, {} -> {} bytes (ratio {})",
                summary.files_written,
                summary.input_bytes,
                summary.archive_bytes,
                ratio_to_string(summary.ratio)
            );
            Ok(summary.failures.is_empty())
        }
        Commands::Decompress {
            archive,
            output_dir,
            max_workers,
        } => {
            let cfg = DecompressCfg {
                max_workers,
                no_fsync: cli.common.no_fsync,
                ..DecompressCfg::default()
            };
            let summary = Decompressor::open(&archive, cfg)?.extract_all(&output_dir)?;
            for failure in &summary.failures {
                log::error!("failed {}", failure);
            }
            if summary.missing_records > 0 {
                log::error!("{} records could not be located", summary.missing_records);
            }
            println!("{} files, {} bytes restored", summary.files_restored, summary.bytes_restored);
            Ok(summary.is_complete())
        }
        Commands::List { archive } => {
            let dec = Decompressor::open(&archive, DecompressCfg::default())?;
            println!("{:>5}  {:>12}  {:>12}  {:>10}  name", "#", "size", "offset", "packed");
            for e in dec.entries() {
                println!(
                    "{:>5}  {:>12}  {:>12}  {:>10}  {}{}",
                    e.index,
                    e.original_size,
                    e.data_offset,
                    e.data_len,
                    e.name,
                    if e.defect.is_some() { "  (damaged)" } else { "" }
                );
            }
            let missing = dec.index().missing_records();
            if missing > 0 {
                println!("{} records missing", missing);
            }
            Ok(missing == 0 && dec.entries().iter().all(|e| e.defect.is_none()))
        }
    }
}
