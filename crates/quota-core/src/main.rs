use anyhow::Context;
use clap::{Arg, ArgAction, Command};
use quota_core::{inspect, EditorConfig, Snapshot};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Command::new("quota-plan")
        .version(quota_core::VERSION)
        .about("Inspect weighting plan snapshots")
        .subcommand_required(true)
        .subcommand(
            Command::new("inspect")
                .about("Print the projected tree, shape issues and quota cells")
                .arg(
                    Arg::new("snapshot")
                        .long("snapshot")
                        .required(true)
                        .help("JSON file with the root and catalog"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .help("TOML editor configuration"),
                )
                .arg(
                    Arg::new("strict")
                        .long("strict")
                        .action(ArgAction::SetTrue)
                        .help("Exit non-zero when issues are found"),
                ),
        );

    let matches = cli.get_matches();

    match matches.subcommand() {
        Some(("inspect", args)) => {
            let snapshot_path = args
                .get_one::<String>("snapshot")
                .context("--snapshot is required")?;
            let config = match args.get_one::<String>("config") {
                Some(path) => EditorConfig::load(path)
                    .with_context(|| format!("reading config {path}"))?,
                None => EditorConfig::default(),
            };
            let snapshot = Snapshot::load(snapshot_path)
                .with_context(|| format!("reading snapshot {snapshot_path}"))?;

            let report = inspect(&snapshot, &config);
            print!("{report}");

            if args.get_flag("strict") && !report.is_healthy() {
                std::process::exit(1);
            }
        }
        _ => unreachable!("subcommand is required"),
    }
    Ok(())
}
