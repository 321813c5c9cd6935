use clap::{Parser, Subcommand};
use log::LevelFilter;
use simple_logger::SimpleLogger;
use std::path::PathBuf;

use structgen::{config, generate, group, svd, StructgenResult, SvdConfig, TypeRegistry};

#[derive(Parser, Debug)]
#[command(
  name = "structgen",
  author,
  version,
  about = "Generate endianness-aware Rust codecs from record declarations and SVD files"
)]
struct Cli {
  /// Change to DIR before doing anything else
  #[arg(short = 'C', long = "directory", value_name = "DIR")]
  directory: Option<PathBuf>,

  /// More log output (repeatable)
  #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
  verbose: u8,

  /// Less log output (repeatable)
  #[arg(short = 'q', long = "quiet", action = clap::ArgAction::Count)]
  quiet: u8,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Generate Rust sources from a JSON or TOML declaration file
  Gen {
    #[arg(short = 'c', long = "config", value_name = "FILE", default_value = "structgen.json")]
    config: PathBuf,

    #[arg(short = 'o', long = "output", value_name = "DIR", default_value = "generated")]
    output: PathBuf,

    /// Worker threads; defaults to the available parallelism
    #[arg(short = 'j', long = "jobs", value_name = "N")]
    jobs: Option<usize>,
  },

  /// Lower a CMSIS-SVD file into declaration files
  Svd {
    #[arg(value_name = "FILE")]
    file: PathBuf,

    #[arg(short = 'o', long = "output", value_name = "DIR", default_value = ".")]
    output: PathBuf,

    /// Merge structurally identical peripherals and clusters
    #[arg(long = "prune")]
    prune: bool,

    /// Reuse identical enumerations within a peripheral
    #[arg(long = "prune-enums")]
    prune_enums: bool,

    /// Narrower bit-fields stay raw integers
    #[arg(long = "min-enum-width", value_name = "N", default_value_t = 2)]
    min_enum_width: u32,

    /// Peripheral to leave out (repeatable)
    #[arg(long = "ignore", value_name = "NAME")]
    ignore: Vec<String>,
  },
}

fn level(verbose: u8, quiet: u8) -> LevelFilter {
  match i16::from(verbose) - i16::from(quiet) {
    i16::MIN..=-2 => LevelFilter::Error,
    -1 => LevelFilter::Warn,
    0 => LevelFilter::Info,
    1 => LevelFilter::Debug,
    _ => LevelFilter::Trace,
  }
}

fn run(command: Command) -> StructgenResult<()> {
  match command {
    Command::Gen {
      config,
      output,
      jobs,
    } => {
      let declarations = config::load(&config)?;
      let registry = TypeRegistry::from_config(&declarations)?;
      let jobs = jobs.unwrap_or_else(|| {
        std::thread::available_parallelism()
          .map(|n| n.get())
          .unwrap_or(1)
      });

      generate(&registry, &output, jobs)?;
    }
    Command::Svd {
      file,
      output,
      prune,
      prune_enums,
      min_enum_width,
      ignore,
    } => {
      let options = SvdConfig {
        prune_structs: prune,
        prune_enums,
        min_enum_width,
        ignore,
      };

      let model = svd::ingest_file(&file)?;
      group::build(&model, &options)?.write(&output)?;
    }
  }

  Ok(())
}

fn main() {
  let cli = Cli::parse();

  if let Err(e) = SimpleLogger::new()
    .with_level(level(cli.verbose, cli.quiet))
    .init()
  {
    eprintln!("Failed to initialise logging: {}", e);
  }

  if let Some(dir) = &cli.directory {
    if let Err(e) = std::env::set_current_dir(dir) {
      eprintln!("Failed to change to '{}': {}", dir.display(), e);
      std::process::exit(1);
    }
  }

  if let Err(e) = run(cli.command) {
    eprintln!("structgen: {}", e);
    std::process::exit(1);
  }
}
