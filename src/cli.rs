// Command-line front end for hgrevlog.
//
// Every command works on one revlog index file; the data file of a split
// revlog is found next to it.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process;

use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};

use crate::filelog::{self, ManifestEntry};
use crate::revlog::verify::{self, RevisionCheck};
use crate::revlog::{
    BuilderOptions, FileBuilder, Index, MemoryCache, Record, RevisionSpec, RevlogError,
};

const BUF_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// Mercurial revlog reader.
#[derive(Parser, Debug)]
#[command(
    name = "hgrevlog",
    version,
    about = "Read, resolve and verify Mercurial revlogs",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Force overwrite existing output files.
    #[arg(short = 'f', long, global = true)]
    force: bool,

    /// Quiet mode (suppress non-error output).
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode (use multiple times for more detail).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Print results as JSON on stdout.
    #[arg(long = "json", global = true)]
    json_output: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Write the content of one revision.
    Cat(CatArgs),
    /// List the revisions of a revlog.
    Log(IndexArgs),
    /// Reconstruct and check every revision.
    Verify(VerifyArgs),
    /// Decide whether the file of a filelog exists at a changeset.
    Exists(ExistsArgs),
}

#[derive(Args, Debug)]
struct IndexArgs {
    /// Revlog index file (`*.i`).
    #[arg(value_hint = ValueHint::FilePath)]
    index: PathBuf,
}

#[derive(Args, Debug)]
struct CatArgs {
    #[command(flatten)]
    index: IndexArgs,

    /// Revision number (negative counts from the end), node id prefix,
    /// `tip` or `null`.
    #[arg(
        short = 'r',
        long,
        default_value = "tip",
        allow_hyphen_values = true,
        conflicts_with = "link"
    )]
    rev: RevisionSpec,

    /// Latest revision linked to changeset N or earlier.
    #[arg(long, value_name = "N", allow_hyphen_values = true)]
    link: Option<i64>,

    /// Output file (default: stdout).
    #[arg(short = 'o', long, value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,

    /// Keep the data file open between chunk reads.
    #[arg(long = "keep-open")]
    keep_open: bool,
}

#[derive(Args, Debug)]
struct VerifyArgs {
    #[command(flatten)]
    index: IndexArgs,

    /// Cache decompressed chunks across revisions.
    #[arg(long)]
    cache: bool,

    /// Check revisions on all cores (needs the `parallel` feature).
    #[arg(long, conflicts_with = "cache")]
    parallel: bool,
}

#[derive(Args, Debug)]
struct ExistsArgs {
    #[command(flatten)]
    index: IndexArgs,

    /// Changeset number to check.
    #[arg(long, value_name = "N", allow_hyphen_values = true)]
    link: i64,

    /// Node id the changeset's manifest records for the file.
    #[arg(long = "manifest-node", value_name = "HEX", conflicts_with = "manifest")]
    manifest_node: Option<String>,

    /// Manifest index file to consult when needed.
    #[arg(long, value_hint = ValueHint::FilePath, requires_all = ["path", "changelog"])]
    manifest: Option<PathBuf>,

    /// Changelog index file naming each changeset's manifest.
    #[arg(long, value_hint = ValueHint::FilePath, requires = "manifest")]
    changelog: Option<PathBuf>,

    /// Path of the file within the repository.
    #[arg(long)]
    path: Option<String>,
}

// ---------------------------------------------------------------------------
// Resolved options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Cat,
    Log,
    Verify,
    Exists,
}

#[derive(Debug)]
struct Options {
    command: Command,
    index_file: PathBuf,
    rev: RevisionSpec,
    output_file: Option<PathBuf>,
    force: bool,
    quiet: bool,
    verbose: u8,
    json_output: bool,
    keep_open: bool,
    use_cache: bool,
    parallel: bool,
    outer_rev: i64,
    manifest_node: Option<String>,
    manifest_file: Option<PathBuf>,
    changelog_file: Option<PathBuf>,
    path: Option<String>,
}

impl Options {
    fn new(command: Command, index_file: PathBuf, cli: &Cli) -> Self {
        Self {
            command,
            index_file,
            rev: RevisionSpec::Tip,
            output_file: None,
            force: cli.force,
            quiet: cli.quiet,
            verbose: cli.verbose.min(2),
            json_output: cli.json_output,
            keep_open: false,
            use_cache: false,
            parallel: false,
            outer_rev: 0,
            manifest_node: None,
            manifest_file: None,
            changelog_file: None,
            path: None,
        }
    }
}

fn resolve_options(cli: Cli) -> Options {
    match &cli.command {
        Cmd::Cat(args) => {
            let mut opts = Options::new(Command::Cat, args.index.index.clone(), &cli);
            opts.rev = match args.link {
                Some(n) => RevisionSpec::LinkRev(n),
                None => args.rev.clone(),
            };
            opts.output_file = args.output.clone();
            opts.keep_open = args.keep_open;
            opts
        }
        Cmd::Log(args) => Options::new(Command::Log, args.index.clone(), &cli),
        Cmd::Verify(args) => {
            let mut opts = Options::new(Command::Verify, args.index.index.clone(), &cli);
            opts.use_cache = args.cache;
            opts.parallel = args.parallel;
            opts
        }
        Cmd::Exists(args) => {
            let mut opts = Options::new(Command::Exists, args.index.index.clone(), &cli);
            opts.outer_rev = args.link;
            opts.manifest_node = args.manifest_node.clone();
            opts.manifest_file = args.manifest.clone();
            opts.changelog_file = args.changelog.clone();
            opts.path = args.path.clone();
            opts
        }
    }
}

#[cfg(any(test, feature = "fuzzing"))]
pub fn fuzz_try_parse_args(args: &[String]) {
    let argv: Vec<String> = std::iter::once("hgrevlog".to_string())
        .chain(args.iter().cloned())
        .collect();
    if let Ok(cli) = Cli::try_parse_from(argv) {
        let _ = resolve_options(cli);
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn open_index(opts: &Options) -> Option<Index> {
    match Index::open(&opts.index_file) {
        Ok(index) => Some(index),
        Err(e) => {
            eprintln!("hgrevlog: {}: {e}", opts.index_file.display());
            None
        }
    }
}

fn open_output(opts: &Options) -> Option<Box<dyn Write>> {
    let Some(path) = &opts.output_file else {
        return Some(Box::new(BufWriter::with_capacity(
            BUF_SIZE,
            io::stdout().lock(),
        )));
    };
    if path.exists() && !opts.force {
        eprintln!(
            "hgrevlog: output file exists, use -f to overwrite: {}",
            path.display()
        );
        return None;
    }
    match File::create(path) {
        Ok(f) => Some(Box::new(BufWriter::with_capacity(BUF_SIZE, f))),
        Err(e) => {
            eprintln!("hgrevlog: output file: {}: {e}", path.display());
            None
        }
    }
}

fn record_json(index: &Index, r: &Record) -> serde_json::Value {
    serde_json::json!({
        "rev": r.rev(),
        "link_rev": r.link_rev(),
        "node": r.node().to_hex(),
        "p1": r.p1(),
        "p2": r.p2(),
        "length": r.file_len(),
        "delta_base": index.delta_parent(r).map(Record::rev),
        "flags": r.flags().bits(),
        "leaf": r.is_leaf(),
    })
}

// ---------------------------------------------------------------------------
// Cat command
// ---------------------------------------------------------------------------

fn cmd_cat(opts: &Options) -> i32 {
    let Some(index) = open_index(opts) else {
        return 1;
    };
    let r = match opts.rev.lookup(&index) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("hgrevlog: revision {}: {e}", opts.rev);
            return 1;
        }
    };

    let mut fb = FileBuilder::with_options(BuilderOptions {
        keep_data_open: opts.keep_open,
        ..BuilderOptions::default()
    });
    let built = fb.prepare_patch(&index, r).and_then(|mut fp| {
        let meta = fp.metadata();
        fp.apply(None).map(|n| (n, meta))
    });
    fb.close_data();
    let (n, meta): (usize, BTreeMap<String, String>) = match built {
        Ok(v) => v,
        Err(e) => {
            eprintln!("hgrevlog: rev {}: {e}", r.rev());
            return 1;
        }
    };

    let Some(mut out) = open_output(opts) else {
        return 1;
    };
    if let Err(e) = out.write_all(fb.bytes()).and_then(|()| out.flush()) {
        eprintln!("hgrevlog: write error: {e}");
        return 1;
    }

    if opts.verbose > 0 && !opts.quiet {
        eprintln!(
            "hgrevlog: rev {} node {}: {n} bytes",
            r.rev(),
            r.node().short()
        );
        for (k, v) in &meta {
            eprintln!("hgrevlog: meta {k}: {v}");
        }
    }
    0
}

// ---------------------------------------------------------------------------
// Log command
// ---------------------------------------------------------------------------

fn cmd_log(opts: &Options) -> i32 {
    let Some(index) = open_index(opts) else {
        return 1;
    };

    if opts.json_output {
        let revs: Vec<_> = index
            .records()
            .iter()
            .map(|r| record_json(&index, r))
            .collect();
        println!("{:#}", serde_json::Value::Array(revs));
        return 0;
    }

    let stdout = io::stdout();
    let mut out = BufWriter::with_capacity(BUF_SIZE, stdout.lock());
    let mut res = writeln!(
        out,
        "{:>6} {:>6} {:<12} {:>6} {:>6} {:>9} {:>6}",
        "rev", "link", "node", "p1", "p2", "length", "delta"
    );
    for r in index.records() {
        if res.is_err() {
            break;
        }
        let delta = match index.delta_parent(r) {
            Some(d) => d.rev().to_string(),
            None => "-".to_string(),
        };
        res = writeln!(
            out,
            "{:>6} {:>6} {:<12} {:>6} {:>6} {:>9} {:>6}",
            r.rev(),
            r.link_rev(),
            r.node().short(),
            r.p1(),
            r.p2(),
            r.file_len(),
            delta
        );
    }
    if let Err(e) = res.and_then(|()| out.flush()) {
        eprintln!("hgrevlog: write error: {e}");
        return 1;
    }
    0
}

// ---------------------------------------------------------------------------
// Verify command
// ---------------------------------------------------------------------------

#[cfg(feature = "parallel")]
fn parallel_checks(index: &Index) -> Vec<RevisionCheck> {
    verify::verify_all_parallel(index)
}

#[cfg(not(feature = "parallel"))]
fn parallel_checks(index: &Index) -> Vec<RevisionCheck> {
    log::warn!("built without the `parallel` feature; verifying sequentially");
    verify::verify_all(index)
}

fn cmd_verify(opts: &Options) -> i32 {
    let Some(index) = open_index(opts) else {
        return 1;
    };

    let checks = if opts.parallel {
        parallel_checks(&index)
    } else {
        let mut fb = FileBuilder::new();
        if opts.use_cache {
            fb.set_data_cache(MemoryCache::new());
        }
        verify::verify_with(&index, &mut fb)
    };
    let errors = verify::failures(&checks);

    if opts.json_output {
        let failures: Vec<_> = checks
            .iter()
            .filter_map(|(rev, res)| {
                res.as_ref().err().map(|e| {
                    serde_json::json!({ "rev": rev, "error": e.to_string() })
                })
            })
            .collect();
        let json = serde_json::json!({
            "command": "verify",
            "revisions": checks.len(),
            "errors": errors,
            "failures": failures,
        });
        println!("{json:#}");
    } else if !opts.quiet {
        for (rev, res) in &checks {
            match res {
                Err(e) => eprintln!("hgrevlog: rev {rev}: {e}"),
                Ok(n) if opts.verbose > 1 => eprintln!("hgrevlog: rev {rev}: ok, {n} bytes"),
                Ok(_) => {}
            }
        }
        eprintln!(
            "hgrevlog: checked {} revisions, {errors} errors",
            checks.len()
        );
    }

    if errors > 0 { 1 } else { 0 }
}

// ---------------------------------------------------------------------------
// Exists command
// ---------------------------------------------------------------------------

fn manifest_lookup(opts: &Options) -> Result<ManifestEntry, RevlogError> {
    if let Some(hex) = &opts.manifest_node {
        return Ok(ManifestEntry {
            path: opts.path.clone().unwrap_or_default(),
            node_hex: hex.clone(),
            flags: String::new(),
        });
    }
    match (&opts.manifest_file, &opts.changelog_file, &opts.path) {
        (Some(manifest), Some(changelog), Some(path)) => {
            let manifest = Index::open(manifest)?;
            let changelog = Index::open(changelog)?;
            filelog::changeset_manifest_entry(&changelog, &manifest, opts.outer_rev, path)
        }
        _ => Err(RevlogError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            "the manifest must be consulted: pass --manifest-node, or --manifest and --changelog with --path",
        ))),
    }
}

fn cmd_exists(opts: &Options) -> i32 {
    let Some(index) = open_index(opts) else {
        return 1;
    };

    match filelog::lookup_file(&index, opts.outer_rev, || manifest_lookup(opts)) {
        Ok(r) => {
            if opts.json_output {
                let mut json = record_json(&index, r);
                json["exists"] = serde_json::Value::Bool(true);
                println!("{json:#}");
            } else if !opts.quiet {
                println!(
                    "present at {}: rev {} node {}",
                    opts.outer_rev,
                    r.rev(),
                    r.node()
                );
            }
            0
        }
        Err(e) => {
            if opts.json_output {
                let json = serde_json::json!({ "exists": false, "error": e.to_string() });
                println!("{json:#}");
            }
            eprintln!("hgrevlog: exists at {}: {e}", opts.outer_rev);
            1
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Main CLI entry point. Parses arguments via clap, dispatches commands.
pub fn run() -> ! {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let cli = Cli::parse();
    let opts = resolve_options(cli);

    let exit_code = match opts.command {
        Command::Cat => cmd_cat(&opts),
        Command::Log => cmd_log(&opts),
        Command::Verify => cmd_verify(&opts),
        Command::Exists => cmd_exists(&opts),
    };

    process::exit(exit_code);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
