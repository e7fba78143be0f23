mod commands;
mod logging;
mod progress;
mod report;

use std::path::Path;
use std::process;

use anyhow::{bail, Context, Result};
use backsync_core::config::load_configuration;
use backsync_core::{AppConfig, DuplicatesSummary, ExecutionMode, ExecutionReport, SyncEngine};
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{resolve_root, Cli, Commands, RunFlags, Side};
use dotenv::dotenv;
use indicatif::HumanBytes;
use progress::CliReporter;
use tracing::{error, info, warn};

fn main() {
    dotenv().ok();

    let args = Cli::parse();
    let verbose = match &args.command {
        Some(Commands::Backup { flags, .. })
        | Some(Commands::Duplicates { flags, .. })
        | Some(Commands::Cleanup { flags, .. })
        | Some(Commands::DelOldDuplicates { flags, .. }) => flags.verbose,
        _ => false,
    };

    let config = load_configuration();
    let _guard = logging::init_logger(verbose || config.as_ref().map_or(false, |c| c.verbose));

    let config = match config {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    if let Err(err) = run(args, config) {
        error!("Error: {:#}", err);
        process::exit(1);
    }
}

fn run(args: Cli, mut config: AppConfig) -> Result<()> {
    match args.command {
        Some(Commands::Backup {
            source,
            destination,
            no_deletion,
            no_overriding,
            flags,
        }) => {
            flags.apply_to(&mut config);
            config.source_root = source.or(config.source_root);
            config.destination_root = destination.or(config.destination_root);
            config.no_deletion |= no_deletion;
            config.no_overriding |= no_overriding;
            run_backup(config, &flags)
        }
        Some(Commands::Duplicates {
            target,
            path,
            flags,
        }) => {
            flags.apply_to(&mut config);
            let root = resolve_root(&config, target, path)
                .with_context(|| format!("no {} root configured", side_name(target)))?;
            run_duplicates(config, &root)
        }
        Some(Commands::Cleanup {
            target,
            path,
            flags,
        }) => {
            flags.apply_to(&mut config);
            let root = resolve_root(&config, target, path)
                .with_context(|| format!("no {} root configured", side_name(target)))?;
            run_cleanup(config, &root, &flags)
        }
        Some(Commands::DelOldDuplicates {
            source,
            destination,
            flags,
        }) => {
            flags.apply_to(&mut config);
            config.source_root = source.or(config.source_root);
            config.destination_root = destination.or(config.destination_root);
            run_del_old_duplicates(config, &flags)
        }
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:#?}", config);
            Ok(())
        }
        None => {
            Cli::command().print_long_help()?;
            Ok(())
        }
    }
}

fn side_name(side: Side) -> &'static str {
    match side {
        Side::Src => "source",
        Side::Dst => "destination",
    }
}

fn both_roots(config: &AppConfig) -> Result<(String, String)> {
    let source = config
        .source_root
        .clone()
        .context("no source root configured (use --source or BACKSYNC_SOURCE_ROOT)")?;
    let destination = config
        .destination_root
        .clone()
        .context("no destination root configured (use --destination or BACKSYNC_DESTINATION_ROOT)")?;
    Ok((source, destination))
}

fn finish(report: &ExecutionReport) -> Result<()> {
    report::print_execution_report(report);
    if !report.is_success() {
        bail!("{} operation(s) failed", report.failures.len());
    }
    Ok(())
}

fn run_backup(config: AppConfig, flags: &RunFlags) -> Result<()> {
    let (source, destination) = both_roots(&config)?;
    let (source, destination) = (Path::new(&source), Path::new(&destination));
    let no_overriding = config.no_overriding;
    let no_deletion = config.no_deletion;
    let dry_run = config.dry_run;

    let engine = SyncEngine::new(config)?;
    let reporter = CliReporter::new();

    let source_tree = engine
        .load_tree(source, true, true, &reporter)
        .context("failed to read the source tree")?;
    let destination_tree = engine
        .load_tree(destination, false, true, &reporter)
        .context("failed to read the destination tree")?;
    info!(
        "Source: {} entries ({}), destination: {} entries ({})",
        source_tree.entries.len(),
        HumanBytes(source_tree.total_size()),
        destination_tree.entries.len(),
        HumanBytes(destination_tree.total_size())
    );

    let plan = engine.plan_backup(&source_tree, &destination_tree);
    if plan.is_empty() {
        info!("{}", "Source and destination are already in sync.".green());
        report::print_unreadable(source_tree.unreadable());
        return Ok(());
    }

    report::print_plan(&plan, no_overriding, no_deletion);
    report::print_plan_summary(&plan.summary());

    let mode = if flags.yes || dry_run {
        ExecutionMode::Full
    } else {
        match report::prompt_backup_mode(plan.has_moves())? {
            Some(mode) => mode,
            None => {
                info!("Backup cancelled.");
                return Ok(());
            }
        }
    };

    if dry_run {
        warn!("Dry run: no changes will be made");
    }
    let execution = engine.execute(&plan, source, destination, mode, &reporter)?;

    report::print_unreadable(source_tree.unreadable());
    finish(&execution)
}

fn run_duplicates(config: AppConfig, root: &str) -> Result<()> {
    let engine = SyncEngine::new(config)?;
    let reporter = CliReporter::new();

    let tree = engine.load_tree(Path::new(root), true, true, &reporter)?;
    let result = engine.find_duplicates(&tree);

    report::print_duplicates(&result);
    if !result.is_empty() {
        report::print_duplicates_summary(&DuplicatesSummary::from(&result));
    }
    report::print_unreadable(tree.unreadable());
    Ok(())
}

fn run_cleanup(mut config: AppConfig, root: &str, flags: &RunFlags) -> Result<()> {
    config.no_deletion = false;
    let engine = SyncEngine::new(config)?;
    let reporter = CliReporter::new();
    let root = Path::new(root);

    let tree = engine.load_tree(root, true, false, &reporter)?;
    let plan = engine.plan_cleanup(&tree);
    if plan.is_empty() {
        info!("{}", "Nothing to clean up.".green());
        return Ok(());
    }
    report::print_cleanup_plan(&plan);

    let dry_run = engine.config().dry_run;
    if !flags.yes && !dry_run && !report::prompt_confirm("Delete these items?", Some(false))? {
        info!("Cleanup cancelled.");
        return Ok(());
    }

    let execution = engine.execute(
        &plan.into_action_plan(),
        root,
        root,
        ExecutionMode::Full,
        &reporter,
    )?;
    finish(&execution)
}

fn run_del_old_duplicates(mut config: AppConfig, flags: &RunFlags) -> Result<()> {
    config.no_deletion = false;
    let (source, destination) = both_roots(&config)?;
    let (source, destination) = (Path::new(&source), Path::new(&destination));
    let engine = SyncEngine::new(config)?;
    let reporter = CliReporter::new();

    let source_tree = engine.load_tree(source, true, true, &reporter)?;
    let destination_tree = engine.load_tree(destination, true, true, &reporter)?;
    let plan = engine.plan_stale_duplicates(&source_tree, &destination_tree);
    if plan.is_empty() {
        info!("{}", "No source files are duplicated in the destination.".green());
        return Ok(());
    }
    report::print_stale_plan(&plan);

    let dry_run = engine.config().dry_run;
    if !flags.yes
        && !dry_run
        && !report::prompt_confirm("Delete these items from the SOURCE?", Some(false))?
    {
        info!("Deletion cancelled.");
        return Ok(());
    }

    let execution = engine.execute(
        &plan.into_action_plan(),
        source,
        source,
        ExecutionMode::Full,
        &reporter,
    )?;
    finish(&execution)
}
