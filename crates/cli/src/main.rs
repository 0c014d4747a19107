use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use geotag_renamer_core::{
    app_paths, apply_plan, build_client, generate_plan, load_config, load_config_from, save_config,
    save_config_to, undo_last, AppConfig, ApplyOptions, ApplyReport, ApplyStatus,
    CommandCompositor, Compositor, GeocodingResolver, MapOverlayCompositor, MapSize, MapZoom,
    PlanAction, PlanOptions, RenamePlan,
};
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "geotag-renamer-cli", version)]
#[command(about = "Rename photos to <timestamp>_<counter>_<City>_<CC> using EXIF date and GPS")]
struct Cli {
    /// Use this config file instead of the one in the OS config directory
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Plan renames for a directory; nothing changes without --apply
    Rename(RenameArgs),
    /// Revert the last applied run
    Undo,
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
struct ConfigArgs {
    #[command(subcommand)]
    action: ConfigAction,
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    Show,
    /// Write the current settings to the config file
    Init {
        /// Overwrite an existing file
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

#[derive(Debug, Args)]
struct RenameArgs {
    directory: PathBuf,
    #[arg(long, default_value_t = false)]
    recursive: bool,
    #[arg(long, default_value_t = false)]
    apply: bool,
    #[arg(long, default_value_t = false)]
    no_geocoding: bool,
    /// LocationIQ key, used after Nominatim fails
    #[arg(long)]
    api_key: Option<String>,
    /// Also rename files that already carry a processed name
    #[arg(long, default_value_t = false)]
    no_skip: bool,
    #[arg(long)]
    separator: Option<char>,
    /// Requires --compositor-cmd
    #[arg(long, default_value_t = false)]
    watermark: bool,
    #[arg(long, default_value_t = false)]
    map: bool,
    #[arg(long)]
    map_size: Option<MapSize>,
    #[arg(long)]
    map_opacity: Option<u8>,
    #[arg(long)]
    map_zoom: Option<MapZoom>,
    /// Add the map overlay to processed files that lack it
    #[arg(long, default_value_t = false)]
    reprocess_map: bool,
    /// External program that draws the watermark and map
    #[arg(long)]
    compositor_cmd: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    let config = match cli.config.as_deref() {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    match cli.command {
        Commands::Rename(args) => cmd_rename(args, &config),
        Commands::Undo => cmd_undo(),
        Commands::Config(config_args) => match config_args.action {
            ConfigAction::Show => cmd_config_show(&config, cli.config.as_deref()),
            ConfigAction::Init { force } => cmd_config_init(&config, cli.config.as_deref(), force),
        },
    }
}

fn cmd_rename(args: RenameArgs, config: &AppConfig) -> Result<()> {
    let watermark = args.watermark || config.watermark;
    if watermark && args.compositor_cmd.is_none() {
        bail!("--watermark needs --compositor-cmd; the built-in compositor only draws maps");
    }

    let map = AppConfig {
        map: args.map || args.reprocess_map || config.map,
        map_size: args.map_size.unwrap_or(config.map_size),
        map_opacity: args.map_opacity.unwrap_or(config.map_opacity),
        map_zoom: args.map_zoom.unwrap_or(config.map_zoom),
        ..config.clone()
    }
    .map_options();

    let mut settings = config.geocode_settings();
    settings.separator = args.separator.unwrap_or(config.separator);
    if args.api_key.is_some() {
        settings.api_key = args.api_key.clone();
    }

    let options = PlanOptions {
        root: args.directory.clone(),
        recursive: args.recursive || config.recursive_default,
        geocoding: !args.no_geocoding && config.geocoding,
        skip_processed: !args.no_skip && config.skip_processed,
        separator: settings.separator,
        watermark,
        map,
        reprocess_map: args.reprocess_map,
    };

    let mut resolver = if options.geocoding {
        GeocodingResolver::standard(&settings)?
    } else {
        GeocodingResolver::disabled(settings.separator)
    };
    log::debug!("geocoding providers: {:?}", resolver.provider_names());

    let plan = generate_plan(&options, &mut resolver)?;
    log::debug!("geocoding network calls: {}", resolver.network_calls());

    if !args.apply {
        match args.output {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plan)?),
            OutputFormat::Table => print_table(&plan),
        }
        eprintln!("dry run: no files were changed. Pass --apply to rename.");
        return Ok(());
    }

    let compositor: Option<Box<dyn Compositor>> = match args.compositor_cmd {
        Some(program) => Some(Box::new(CommandCompositor::new(program, Vec::new()))),
        None if options.map.is_some() => Some(Box::new(MapOverlayCompositor::new(build_client(
            settings.timeout,
            &settings.user_agent,
        )?))),
        None => None,
    };

    let report = apply_plan(
        &plan,
        &ApplyOptions {
            dry_run: false,
            compositor: compositor.as_deref(),
            undo_path: Some(app_paths()?.undo_path),
        },
    )?;

    match args.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Table => {
            print_table(&plan);
            print_failures(&report);
        }
    }
    eprintln!(
        "applied: {} (unchanged {}, skipped {}, failed {})",
        report.applied, report.unchanged, report.skipped, report.failed
    );

    Ok(())
}

fn cmd_undo() -> Result<()> {
    let result = undo_last()?;
    println!("restored: {}", result.restored);
    Ok(())
}

fn cmd_config_show(config: &AppConfig, override_path: Option<&Path>) -> Result<()> {
    let paths = app_paths()?;
    let path = override_path.unwrap_or(&paths.config_path);
    println!("config file: {}", path.display());
    println!("undo journal: {}", paths.undo_path.display());
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

fn cmd_config_init(config: &AppConfig, override_path: Option<&Path>, force: bool) -> Result<()> {
    let path = match override_path {
        Some(path) => path.to_path_buf(),
        None => app_paths()?.config_path,
    };
    if path.exists() && !force {
        bail!("{} already exists; pass --force to overwrite", path.display());
    }
    match override_path {
        Some(path) => save_config_to(path, config)?,
        None => save_config(config)?,
    }
    println!("wrote {}", path.display());
    Ok(())
}

fn display_relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

fn print_table(plan: &RenamePlan) {
    println!("source -> target");
    for entry in &plan.entries {
        let source = display_relative(&plan.root, &entry.source);
        match &entry.action {
            PlanAction::Rename { target, .. } => {
                println!("{source} -> {}", display_relative(&plan.root, target))
            }
            PlanAction::AddMap { target } => {
                println!("{source} -> {} (map)", display_relative(&plan.root, target))
            }
            PlanAction::Unchanged => println!("{source} (unchanged)"),
            PlanAction::Skip { reason } => println!("{source} skipped: {reason}"),
        }
    }

    if !plan.videos.is_empty() {
        println!("\nvideos (not renamed):");
        for video in &plan.videos {
            println!(
                "{} ({:.1} MB)",
                display_relative(&plan.root, &video.path),
                video.size_bytes as f64 / (1024.0 * 1024.0)
            );
        }
    }

    for ledger in &plan.ledgers {
        if ledger.highest_after != ledger.highest_before {
            println!(
                "counter {}: {:04} -> {:04}",
                display_relative(&plan.root, &ledger.directory),
                ledger.highest_before,
                ledger.highest_after
            );
        }
    }

    let stats = &plan.stats;
    println!(
        "\nsummary: scanned={} photos={} videos={} unsupported={} hidden={} planned={} map={} unchanged={} skipped={} geocoded={} unresolved={}",
        stats.scanned_files,
        stats.photos,
        stats.videos,
        stats.unsupported,
        stats.hidden,
        stats.planned,
        stats.map_additions,
        stats.unchanged,
        stats.skipped,
        stats.geocoded,
        stats.unresolved
    );
}

fn print_failures(report: &ApplyReport) {
    for outcome in &report.outcomes {
        if let ApplyStatus::Failed(reason) = &outcome.status {
            println!("failed: {}: {reason}", outcome.source.display());
        }
    }
}
