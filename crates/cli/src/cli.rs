use crate::tracing::{LogLevel, TracingFormat};
use buildstash_cache::{ExpectedFile, ExpectedFiles, validate_file_id};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "buildstash")]
#[command(about = "Two-tier cache for build tool outputs")]
#[command(long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        short = 'l',
        long,
        global = true,
        help = "Set logging level",
        default_value = "warn",
        value_enum
    )]
    pub level: LogLevel,

    #[arg(
        long,
        global = true,
        help = "Log output format",
        default_value = "compact",
        value_enum
    )]
    pub log_format: TracingFormat,

    #[arg(long, global = true, help = "Output logs in JSON format")]
    pub json: bool,

    #[arg(long, global = true, help = "Cache root directory (overrides BUILDSTASH_DIR)")]
    pub dir: Option<PathBuf>,
}

impl Cli {
    /// Log format after applying `--json`
    #[must_use]
    pub fn tracing_format(&self) -> TracingFormat {
        if self.json {
            TracingFormat::Json
        } else {
            self.log_format
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Show local cache statistics")]
    Stats,
    #[command(about = "Reset local cache statistics")]
    ZeroStats,
    #[command(about = "Remove all entries from the local cache")]
    Clear,
    #[command(about = "Print the effective configuration as JSON")]
    Config,
    #[command(about = "Look up a cached result and restore its outputs")]
    Lookup(LookupArgs),
    #[command(about = "Store a tool run's outputs in the cache")]
    Store(StoreArgs),
}

/// A `<id>=<path>` command line argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileArg {
    pub id: String,
    pub path: PathBuf,
}

/// Parse `<id>=<path>`
pub fn parse_file_arg(value: &str) -> Result<FileArg, String> {
    let Some((id, path)) = value.split_once('=') else {
        return Err(format!("expected <id>=<path>, got '{value}'"));
    };
    validate_file_id(id).map_err(|e| e.to_string())?;
    if path.is_empty() {
        return Err(format!("missing path for file '{id}'"));
    }
    Ok(FileArg {
        id: id.to_string(),
        path: PathBuf::from(path),
    })
}

/// Outputs a lookup must restore or a store must capture
#[derive(Args, Debug, Clone, Default)]
pub struct OutputArgs {
    #[arg(long = "file", value_name = "ID=PATH", value_parser = parse_file_arg, help = "Required output file")]
    pub files: Vec<FileArg>,

    #[arg(long = "optional", value_name = "ID=PATH", value_parser = parse_file_arg, help = "Output file the tool may not produce")]
    pub optional: Vec<FileArg>,

    #[arg(long = "directory", value_name = "ID=PATH", value_parser = parse_file_arg, help = "Output directory")]
    pub directories: Vec<FileArg>,
}

impl OutputArgs {
    /// The expected files these arguments describe
    ///
    /// Fails when the same id is given twice.
    pub fn expected_files(&self) -> Result<ExpectedFiles, String> {
        let mut expected = ExpectedFiles::new();
        let all = self
            .files
            .iter()
            .map(|f| (f, ExpectedFile::new(&f.path)))
            .chain(
                self.optional
                    .iter()
                    .map(|f| (f, ExpectedFile::new(&f.path).optional())),
            )
            .chain(
                self.directories
                    .iter()
                    .map(|f| (f, ExpectedFile::directory(&f.path))),
            );
        for (arg, file) in all {
            if expected.insert(arg.id.clone(), file).is_some() {
                return Err(format!("file id '{}' given more than once", arg.id));
            }
        }
        Ok(expected)
    }
}

#[derive(Args, Debug)]
pub struct LookupArgs {
    #[arg(help = "Content hash, or direct hash with --direct")]
    pub hash: String,

    #[command(flatten)]
    pub outputs: OutputArgs,

    #[arg(long, help = "Treat the hash as a direct hash")]
    pub direct: bool,

    #[arg(long, help = "Hard link restored files from the local cache")]
    pub hard_links: bool,

    #[arg(long, help = "Do not create missing parent directories of outputs")]
    pub no_create_dirs: bool,
}

#[derive(Args, Debug)]
pub struct StoreArgs {
    #[arg(help = "Content hash of the tool run")]
    pub hash: String,

    #[command(flatten)]
    pub outputs: OutputArgs,

    #[arg(long, default_value_t = 0, allow_negative_numbers = true, help = "Return code of the tool run")]
    pub return_code: i32,

    #[arg(long, value_name = "PATH", help = "File holding the tool's captured stdout")]
    pub stdout_file: Option<PathBuf>,

    #[arg(long, value_name = "PATH", help = "File holding the tool's captured stderr")]
    pub stderr_file: Option<PathBuf>,

    #[arg(long, help = "Hard link outputs into the local cache")]
    pub hard_links: bool,

    #[arg(long, value_name = "HASH", help = "Also map this direct hash to the content hash")]
    pub direct_hash: Option<String>,

    #[arg(long = "implicit", value_name = "PATH", requires = "direct_hash", help = "Implicit input of the direct hash")]
    pub implicit: Vec<PathBuf>,
}

pub fn parse() -> Cli {
    Cli::parse()
}
