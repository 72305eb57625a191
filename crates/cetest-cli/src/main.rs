//! cetest - find the oldest compilers that still accept a C++ snippet
//!
//! ## Commands
//!
//! - `compilers`: show the compiler catalog grouped by family, platform and series
//! - `libraries`: show the library catalog
//! - `flatten`: inline quoted includes into one translation unit
//! - `companion`: find the source file whose build flags suit a header
//! - `probe`: binary-search the selected groups for their support boundary
//! - `report`: print a saved probe report

use anyhow::{bail, Context, Result};
use ce_client::{CancellationToken, CeClient, CompileService, CompilerRecord};
use cetest_core::{
    group_compilers, render_group_line, spawn_catalog_load, spawn_probe, CatalogOutcome,
    CetestConfig, CompilerGroups, ProbeEvent, ProbeJob, ProbeReport, ProbeRequest,
};
use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tu_flatten::{find_companion_source, flatten, read_source, FlattenOptions};

#[derive(Parser)]
#[command(name = "cetest")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Probe which compiler releases accept a C++ snippet", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Configuration file (TOML)
    #[arg(long, global = true, env = "CETEST_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the compiler catalog as family / platform / series
    Compilers {
        /// Only keep compilers whose name or id contains TEXT
        #[arg(long, value_name = "TEXT")]
        filter: Option<String>,
    },

    /// Show the library catalog
    Libraries,

    /// Inline quoted includes of ROOT into one translation unit
    Flatten {
        root: PathBuf,

        #[command(flatten)]
        flatten: FlattenArgs,

        /// Write the result here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print flatten statistics as JSON on stderr
        #[arg(long)]
        stats: bool,
    },

    /// Find the source file whose build flags fit HEADER
    Companion {
        header: PathBuf,

        /// compile_commands.json to search
        #[arg(long = "compile-commands", value_name = "DB")]
        compile_commands: PathBuf,
    },

    /// Find, per compiler group, the oldest release accepting SOURCE
    Probe {
        source: PathBuf,

        /// Language standard, e.g. c++20
        #[arg(long, default_value = "c++17")]
        std: String,

        /// Group selector: family, family|platform or family|platform|series
        #[arg(short, long = "group", value_name = "SEL")]
        groups: Vec<String>,

        /// Flatten SOURCE before sending it
        #[arg(long)]
        flatten: bool,

        #[command(flatten)]
        flatten_args: FlattenArgs,

        /// Save the report as JSON
        #[arg(long, value_name = "OUT")]
        report: Option<PathBuf>,
    },

    /// Print a saved probe report
    Report {
        file: PathBuf,

        /// Print the raw JSON instead of a table
        #[arg(long = "as-json")]
        as_json: bool,
    },
}

/// Flatten switches shared by `flatten` and `probe`; they override config.
#[derive(Args, Debug, Clone, Default)]
struct FlattenArgs {
    /// Extra quoted-include search directory (repeatable)
    #[arg(short = 'I', long = "include-dir", value_name = "DIR")]
    include_dirs: Vec<PathBuf>,

    /// compile_commands.json supplying include directories
    #[arg(long = "compile-commands", value_name = "DB")]
    compile_commands: Option<PathBuf>,

    /// File to look up in the build database instead of the root
    #[arg(long = "db-file", value_name = "FILE")]
    db_file: Option<PathBuf>,

    /// Inline a header again each time it is included
    #[arg(long)]
    no_inline_once: bool,

    /// Keep `#pragma once` lines
    #[arg(long)]
    keep_pragma_once: bool,

    /// Do not emit #line directives
    #[arg(long)]
    no_line_directives: bool,

    /// Emit begin/end markers around inlined files
    #[arg(long)]
    debug_comments: bool,
}

impl FlattenArgs {
    fn apply(&self, base: &FlattenOptions) -> FlattenOptions {
        let mut options = base.clone();
        options
            .extra_include_dirs
            .extend(self.include_dirs.iter().cloned());
        if let Some(db) = &self.compile_commands {
            options.build_database = Some(db.clone());
        }
        if let Some(file) = &self.db_file {
            options.build_database_file = Some(file.clone());
        }
        if self.no_inline_once {
            options.inline_once = false;
        }
        if self.keep_pragma_once {
            options.strip_pragma_once = false;
        }
        if self.no_line_directives {
            options.emit_line_directives = false;
        }
        if self.debug_comments {
            options.include_debug_comments = true;
        }
        options
    }
}

/// How a probe run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RunEnd {
    Finished,
    Aborted,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    cetest_core::init_tracing(cli.json, level);

    let config = CetestConfig::load_or_default(cli.config.as_deref())
        .context("Failed to load configuration")?;

    match cli.command {
        Commands::Compilers { filter } => cmd_compilers(&config, filter.as_deref()).await,
        Commands::Libraries => cmd_libraries(&config).await,
        Commands::Flatten {
            root,
            flatten,
            output,
            stats,
        } => cmd_flatten(&config, &root, &flatten, output.as_deref(), stats),
        Commands::Companion {
            header,
            compile_commands,
        } => cmd_companion(&header, &compile_commands),
        Commands::Probe {
            source,
            std: standard,
            groups,
            flatten,
            flatten_args,
            report,
        } => {
            let end = cmd_probe(
                &config,
                &source,
                &standard,
                &groups,
                flatten.then_some(&flatten_args),
                report.as_deref(),
            )
            .await?;
            if end == RunEnd::Aborted {
                std::process::exit(130);
            }
            Ok(())
        }
        Commands::Report { file, as_json } => cmd_report(&file, as_json),
    }
}

fn make_client(config: &CetestConfig) -> Result<Arc<CeClient>> {
    let client = CeClient::new(config.to_client_config())
        .context("Failed to create compilation service client")?;
    Ok(Arc::new(client))
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            token.cancel();
        }
    });
}

async fn load_catalog(
    service: Arc<dyn CompileService>,
    cancel: CancellationToken,
) -> Result<Vec<CompilerRecord>> {
    let outcome = spawn_catalog_load(service, cancel)
        .await
        .context("Catalog loader stopped unexpectedly")?;
    match outcome {
        CatalogOutcome::Loaded(records) => Ok(records),
        CatalogOutcome::Failed(e) => bail!("Failed to load compiler catalog: {}", e),
        CatalogOutcome::Aborted => bail!("Compiler catalog load aborted"),
    }
}

/// Show the grouped compiler catalog
async fn cmd_compilers(config: &CetestConfig, filter: Option<&str>) -> Result<()> {
    let client = make_client(config)?;
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let mut records = load_catalog(client, cancel).await?;
    if let Some(text) = filter.map(str::to_lowercase).filter(|t| !t.is_empty()) {
        records.retain(|r| {
            r.name.to_lowercase().contains(&text) || r.id.to_lowercase().contains(&text)
        });
    }

    let groups = group_compilers(&records);
    let mut stdout = std::io::stdout().lock();
    print_catalog_tree(&groups, &mut stdout)?;
    Ok(())
}

fn print_catalog_tree(groups: &CompilerGroups, out: &mut impl Write) -> Result<()> {
    let stats = groups.stats();
    let mut families: Vec<_> = groups.tree().into_iter().collect();
    families.sort_by_key(|(f, _)| cetest_core::family_sort_key(f));

    for (family, platforms) in families {
        let count = stats.per_family.get(&family).copied().unwrap_or(0);
        writeln!(out, "{} ({})", family, count)?;
        for (platform, series) in platforms {
            writeln!(out, "  {}", platform)?;
            for (name, n) in series {
                writeln!(out, "    {:<40} {:>4}", name, n)?;
            }
        }
    }
    writeln!(
        out,
        "{} compilers in {} groups across {} platforms",
        stats.compilers, stats.groups, stats.platforms
    )?;
    Ok(())
}

/// Show the library catalog
async fn cmd_libraries(config: &CetestConfig) -> Result<()> {
    let client = make_client(config)?;
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let libraries = client
        .list_libraries(&cancel)
        .await
        .context("Failed to load library catalog")?;

    if libraries.is_empty() {
        println!("No libraries available");
        return Ok(());
    }
    for lib in libraries {
        let shown: Vec<&str> = lib.versions.iter().take(6).map(String::as_str).collect();
        let more = lib.versions.len().saturating_sub(shown.len());
        let suffix = if more > 0 {
            format!(" (+{} more)", more)
        } else {
            String::new()
        };
        println!("{:<24} {:<32} {}{}", lib.id, lib.name, shown.join(", "), suffix);
    }
    Ok(())
}

/// Flatten a file to stdout or OUTPUT
fn cmd_flatten(
    config: &CetestConfig,
    root: &Path,
    args: &FlattenArgs,
    output: Option<&Path>,
    stats: bool,
) -> Result<()> {
    let options = args.apply(&config.flatten);
    let flattened =
        flatten(root, &options).context(format!("Failed to flatten {}", root.display()))?;

    match output {
        Some(path) => {
            std::fs::write(path, &flattened.text)
                .context(format!("Failed to write {}", path.display()))?;
            info!(
                path = %path.display(),
                files = flattened.stats.files_inlined,
                "flattened source written"
            );
        }
        None => print!("{}", flattened.text),
    }

    if stats {
        eprintln!("{}", serde_json::to_string_pretty(&flattened.stats)?);
    }
    Ok(())
}

/// Find the companion source of a header
fn cmd_companion(header: &Path, compile_commands: &Path) -> Result<()> {
    let lookup = find_companion_source(compile_commands, header)
        .context("Failed to read build database")?;
    match &lookup.companion {
        Some(path) => println!(
            "{} (score {}, {} candidates)",
            path.display(),
            lookup.score,
            lookup.candidates_considered
        ),
        None => println!(
            "No companion source for {} ({} candidates)",
            header.display(),
            lookup.candidates_considered
        ),
    }
    Ok(())
}

/// Resolve group selectors into probe jobs.
fn select_jobs(groups: &CompilerGroups, selectors: &[String]) -> Result<Vec<ProbeJob>> {
    if selectors.is_empty() {
        bail!("No groups selected; pass --group (see `cetest compilers` for names)");
    }
    let keys = groups.select(selectors);
    if keys.is_empty() {
        bail!("No compiler group matches {:?}", selectors);
    }
    Ok(groups.jobs(&keys))
}

fn load_probe_source(
    config: &CetestConfig,
    source: &Path,
    flatten_args: Option<&FlattenArgs>,
) -> Result<String> {
    match flatten_args {
        Some(args) => {
            let options = args.apply(&config.flatten);
            let flattened = flatten(source, &options)
                .context(format!("Failed to flatten {}", source.display()))?;
            info!(
                files = flattened.stats.files_inlined,
                unresolved = flattened.stats.include_lines_unresolved,
                "source flattened"
            );
            Ok(flattened.text)
        }
        None => read_source(source).context(format!("Failed to read {}", source.display())),
    }
}

/// Probe the selected groups
async fn cmd_probe(
    config: &CetestConfig,
    source: &Path,
    standard: &str,
    selectors: &[String],
    flatten_args: Option<&FlattenArgs>,
    report_path: Option<&Path>,
) -> Result<RunEnd> {
    let text = load_probe_source(config, source, flatten_args)?;
    let client = make_client(config)?;
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let records = load_catalog(client.clone(), cancel.clone()).await?;
    let groups = group_compilers(&records);
    let jobs = select_jobs(&groups, selectors)?;

    let request = ProbeRequest {
        source: text,
        std: standard.to_string(),
        extra_flags: config.flags.clone(),
        library_rules: config.libraries.clone(),
        jobs,
    };

    let mut stdout = std::io::stdout().lock();
    let (report, end) = run_probe(client.clone(), request, cancel, &mut stdout).await?;

    let m = client.metrics().snapshot();
    writeln!(
        stdout,
        "{} requests, {} retries, {} compiles, {} cache hits",
        m.requests_sent, m.retries, m.compiles, m.cache_hits
    )?;
    client.metrics().flush();

    if let Some(path) = report_path {
        report
            .write_to(path)
            .context(format!("Failed to write report {}", path.display()))?;
        writeln!(stdout, "Report saved to {}", path.display())?;
    }
    Ok(end)
}

/// Drive a probe run, printing each group as it completes.
async fn run_probe(
    service: Arc<dyn CompileService>,
    request: ProbeRequest,
    cancel: CancellationToken,
    out: &mut impl Write,
) -> Result<(ProbeReport, RunEnd)> {
    let mut report = ProbeReport::new(request.std.clone());
    writeln!(
        out,
        "Probing {} group(s) with -std={}",
        request.jobs.len(),
        request.std
    )?;

    let (handle, mut events) = spawn_probe(service, request, cancel);
    let mut end = None;
    while let Some(event) = events.recv().await {
        match event {
            ProbeEvent::GroupCompleted(summary) => {
                writeln!(out, "{}", render_group_line(&summary))?;
                report.push(summary);
            }
            ProbeEvent::Finished => end = Some(RunEnd::Finished),
            ProbeEvent::Aborted => end = Some(RunEnd::Aborted),
            ProbeEvent::Failed(e) => bail!("Probe failed: {}", e),
        }
    }
    handle.await.context("Probe task stopped unexpectedly")?;

    let end = end.context("Probe ended without a result")?;
    match (&end, report.overall_lowest()) {
        (RunEnd::Aborted, _) => writeln!(out, "Probe aborted by user")?,
        (RunEnd::Finished, Some(a)) => writeln!(
            out,
            "Overall lowest supported: {} [{}|{}]",
            a.label(),
            a.family,
            a.platform
        )?,
        (RunEnd::Finished, None) => writeln!(out, "No conclusive supported compiler found")?,
    }
    Ok((report, end))
}

/// Print a saved report
fn cmd_report(file: &Path, as_json: bool) -> Result<()> {
    let report =
        ProbeReport::read_from(file).context(format!("Failed to read report {}", file.display()))?;
    if as_json {
        println!("{}", report.to_json_pretty()?);
    } else {
        print!("{}", report.render_text());
    }
    Ok(())
}
