#![allow(clippy::print_stdout)]
use std::{
    fs::{self, File},
    io::{BufReader, Write},
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

use jsonnorm::{
    check_recursion, CachingRetriever, Error, FetchCache, NormalizeOptions, Recursion,
    RepositoryKind,
};

#[derive(Parser)]
#[command(name = "jsonnorm", version)]
/// Normalize distributed JSON Schemas and classify their recursion.
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Normalize schemas and write `<name>_Normalized.json` documents.
    Normalize {
        #[command(flatten)]
        input: InputArgs,

        /// Write normalized documents here instead of next to their inputs.
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Normalize schemas in memory and write a recursion report.
    Recursion {
        #[command(flatten)]
        input: InputArgs,

        /// Path of the report CSV.
        #[arg(long, default_value = "report.csv")]
        report: PathBuf,
    },
    /// Compare sizes of original and normalized schema directories.
    Stats {
        /// Directory of unnormalized schemas.
        #[arg(long)]
        original: PathBuf,

        /// Directory of their normalized counterparts.
        #[arg(long)]
        normalized: PathBuf,
    },
}

#[derive(Args)]
struct InputArgs {
    /// A directory of `.json` schemas to process.
    #[arg(long, conflicts_with = "corpus")]
    dir: Option<PathBuf>,

    /// A corpus index of space-separated `filename url` rows; rows marked
    /// `deleted` are skipped. Implies the hosted-corpus fetch fallback.
    #[arg(long)]
    corpus: Option<PathBuf>,

    /// Allow fetching schemas that are not local to their document.
    #[arg(long)]
    allow_remote: bool,

    /// Cache directory for fetched schemas.
    #[arg(long, default_value = jsonnorm::cache::DEFAULT_STORE_DIR)]
    store_dir: PathBuf,

    /// Cache index file.
    #[arg(long, default_value = jsonnorm::cache::DEFAULT_INDEX_FILE)]
    index: PathBuf,

    /// Remap `http://localhost:1234/...` to this directory (test-suite runs).
    #[arg(long)]
    testsuite_remap: Option<PathBuf>,
}

/// One schema to process: where it lives and the identifier it resolves under.
struct Task {
    path: PathBuf,
    base: Option<Url>,
}

impl InputArgs {
    fn tasks(&self) -> Result<Vec<Task>, Box<dyn std::error::Error>> {
        if let Some(corpus) = &self.corpus {
            return corpus_tasks(corpus);
        }
        let Some(dir) = &self.dir else {
            return Err("either --dir or --corpus is required".into());
        };
        let mut tasks = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let name = path.file_name().and_then(|name| name.to_str()).unwrap_or("");
            if name.ends_with(".json") && !name.ends_with("_Normalized.json") {
                tasks.push(Task { path, base: None });
            }
        }
        tasks.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(tasks)
    }

    fn options(&self) -> Result<NormalizeOptions, Box<dyn std::error::Error>> {
        let kind = if self.testsuite_remap.is_some() {
            RepositoryKind::TestSuite
        } else if self.corpus.is_some() {
            RepositoryKind::Corpus
        } else {
            RepositoryKind::Normal
        };
        let cache = FetchCache::open(&self.store_dir, &self.index)?;
        let mut retriever = CachingRetriever::new(cache, kind);
        if let Some(remap) = &self.testsuite_remap {
            retriever = retriever.testsuite_root(remap);
        }
        Ok(NormalizeOptions::new()
            .allow_remote(self.allow_remote)
            .retriever(Arc::new(retriever)))
    }
}

fn corpus_tasks(corpus: &Path) -> Result<Vec<Task>, Box<dyn std::error::Error>> {
    let mut tasks = Vec::new();
    for line in fs::read_to_string(corpus)?.lines() {
        let mut fields = line.split_whitespace();
        let Some(path) = fields.next() else {
            continue;
        };
        if path == "deleted" {
            continue;
        }
        let base = match fields.next() {
            Some("deleted") | None => None,
            Some(url) => Some(jsonnorm::uri::parse(url)?),
        };
        tasks.push(Task {
            path: PathBuf::from(path),
            base,
        });
    }
    Ok(tasks)
}

fn read_json(path: &Path) -> Result<serde_json::Result<Value>, Box<dyn std::error::Error>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    Ok(serde_json::from_reader(reader))
}

fn base_identifier(task: &Task) -> Result<Url, Box<dyn std::error::Error>> {
    if let Some(base) = &task.base {
        return Ok(base.clone());
    }
    let absolute = task.path.canonicalize()?;
    Ok(Url::from_file_path(&absolute)
        .map_err(|()| format!("cannot express {} as a URL", absolute.display()))?)
}

/// One CSV row of the batch report.
#[derive(Default)]
struct Report {
    recursive: bool,
    unguarded: bool,
    invalid_reference: bool,
    illegal_draft: bool,
}

fn process(task: &Task, options: &NormalizeOptions) -> (Option<Value>, Report) {
    let mut report = Report::default();
    let name = task.path.display();
    let contents = match read_json(&task.path) {
        Ok(Ok(contents)) => contents,
        Ok(Err(parse_error)) => {
            error!(schema = %name, error = %parse_error, "schema is not valid JSON");
            return (None, report);
        }
        Err(io_error) => {
            error!(schema = %name, error = %io_error, "schema cannot be read");
            return (None, report);
        }
    };
    let base = match base_identifier(task) {
        Ok(base) => base,
        Err(base_error) => {
            error!(schema = %name, error = %base_error, "schema has no usable identifier");
            return (None, report);
        }
    };
    match options.normalize(&contents, &base) {
        Ok(normalized) => (Some(normalized), report),
        Err(Error::InvalidReference { reference, .. }) => {
            warn!(schema = %name, %reference, "reference target cannot be obtained");
            report.invalid_reference = true;
            (None, report)
        }
        Err(Error::DraftValidation { draft, .. }) => {
            warn!(schema = %name, %draft, "schema is not valid against its draft");
            report.illegal_draft = true;
            (None, report)
        }
        Err(Error::DistributedSchema { identifier }) => {
            warn!(schema = %name, %identifier, "remote document needed, schema skipped");
            (None, report)
        }
        Err(other) => {
            error!(schema = %name, error = %other, "normalization aborted");
            (None, report)
        }
    }
}

fn normalized_name(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match name.strip_suffix(".json") {
        Some(stem) => format!("{stem}_Normalized.json"),
        None => format!("{name}_Normalized.json"),
    };
    path.with_file_name(name)
}

fn run_normalize(
    input: &InputArgs,
    out_dir: Option<&Path>,
) -> Result<bool, Box<dyn std::error::Error>> {
    let options = input.options()?;
    let mut success = true;
    for task in input.tasks()? {
        let (normalized, _) = process(&task, &options);
        let Some(normalized) = normalized else {
            success = false;
            continue;
        };
        let mut target = normalized_name(&task.path);
        if let Some(out_dir) = out_dir {
            if let Some(name) = target.file_name() {
                target = out_dir.join(name);
            }
        }
        fs::write(&target, serde_json::to_vec_pretty(&normalized)?)?;
        info!(schema = %task.path.display(), output = %target.display(), "normalized");
    }
    Ok(success)
}

fn run_recursion(input: &InputArgs, report: &Path) -> Result<bool, Box<dyn std::error::Error>> {
    let options = input.options()?;
    let mut out = File::create(report)?;
    writeln!(
        out,
        "name,recursiv,unguarded_recursiv,invalid_reference,illegal_draft"
    )?;
    let mut success = true;
    for task in input.tasks()? {
        let (normalized, mut row) = process(&task, &options);
        if let Some(normalized) = normalized {
            match check_recursion(&normalized) {
                Ok(kind) => {
                    row.recursive = kind != Recursion::None;
                    row.unguarded = kind == Recursion::Unguarded;
                }
                // A failed check is recorded, the batch continues.
                Err(check_error) => {
                    error!(schema = %task.path.display(), error = %check_error, "recursion check failed");
                    success = false;
                }
            }
        } else {
            success = false;
        }
        writeln!(
            out,
            "{},{},{},{},{}",
            task.path.display(),
            csv_flag(row.recursive),
            csv_flag(row.unguarded),
            csv_flag(row.invalid_reference),
            csv_flag(row.illegal_draft),
        )?;
    }
    Ok(success)
}

fn csv_flag(set: bool) -> &'static str {
    if set {
        "TRUE"
    } else {
        ""
    }
}

fn run_stats(original: &Path, normalized: &Path) -> Result<bool, Box<dyn std::error::Error>> {
    let mut pairs = Vec::new();
    let mut missing = 0usize;
    for entry in fs::read_dir(original)? {
        let path = entry?.path();
        let name = path.file_name().and_then(|name| name.to_str()).unwrap_or("");
        if !name.ends_with(".json") || name.ends_with("_Normalized.json") {
            continue;
        }
        let counterpart = match normalized_name(&path).file_name() {
            Some(name) => normalized.join(name),
            None => continue,
        };
        match fs::metadata(&counterpart) {
            Ok(meta) => pairs.push((name.to_string(), path.metadata()?.len(), meta.len())),
            Err(_) => missing += 1,
        }
    }
    pairs.sort();

    let mut original_total = 0u64;
    let mut normalized_total = 0u64;
    println!("name,original_bytes,normalized_bytes,blowup");
    for (name, before, after) in &pairs {
        original_total += before;
        normalized_total += after;
        println!(
            "{name},{before},{after},{:.2}",
            *after as f64 / (*before).max(1) as f64
        );
    }
    println!(
        "total,{original_total},{normalized_total},{:.2}",
        normalized_total as f64 / original_total.max(1) as f64
    );
    if missing > 0 {
        warn!(missing, "schemas without a normalized counterpart");
    }
    Ok(missing == 0)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let outcome = match &cli.command {
        Command::Normalize { input, out_dir } => run_normalize(input, out_dir.as_deref()),
        Command::Recursion { input, report } => run_recursion(input, report),
        Command::Stats {
            original,
            normalized,
        } => run_stats(original, normalized),
    };
    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(fatal) => {
            error!(error = %fatal, "aborted");
            ExitCode::FAILURE
        }
    }
}
