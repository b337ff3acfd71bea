use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use profilesync::*;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();

    let config = match matches.get_one::<String>("config") {
        Some(path) => parse_config_file(path).await?,
        None => SyncConfig::default(),
    };
    init_tracing(&config.log_level);

    match matches.subcommand() {
        Some(("load", sub_matches)) => load_command(&matches, sub_matches, &config).await?,
        Some(("apply", sub_matches)) => apply_command(&matches, sub_matches, &config).await?,
        Some(("normalize", sub_matches)) => normalize_command(sub_matches),
        _ => {
            build_cli().print_help()?;
            std::process::exit(1);
        }
    }

    Ok(())
}

fn build_cli() -> Command {
    Command::new("profilesync")
        .version("0.1.0")
        .about("Load and reconcile creator profiles against PostgreSQL")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .global(true)
                .help("YAML configuration file"),
        )
        .arg(
            Arg::new("database-url")
                .short('d')
                .long("database-url")
                .value_name("URL")
                .global(true)
                .help("PostgreSQL connection URL (overrides DATABASE_URL and the config file)"),
        )
        .arg(
            Arg::new("memory")
                .long("memory")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Use an empty in-memory store instead of PostgreSQL (dry run)"),
        )
        .subcommand(
            Command::new("load")
                .about("Print the canonical profile of an owner as YAML")
                .arg(owner_arg()),
        )
        .subcommand(
            Command::new("apply")
                .about("Submit a partial profile update and print the result")
                .arg(owner_arg())
                .arg(
                    Arg::new("file")
                        .short('f')
                        .long("file")
                        .value_name("FILE")
                        .help("YAML file with the update (fields, wallet_methods, social_links, goals)")
                        .required(true),
                ),
        )
        .subcommand(
            Command::new("normalize")
                .about("Print the canonical form of social platform names")
                .arg(
                    Arg::new("platform")
                        .value_name("PLATFORM")
                        .num_args(1..)
                        .required(true),
                ),
        )
}

fn owner_arg() -> Arg {
    Arg::new("owner")
        .short('o')
        .long("owner")
        .value_name("UUID")
        .help("Profile owner id")
        .required(true)
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn owner(matches: &ArgMatches) -> Result<OwnerId> {
    let raw = matches
        .get_one::<String>("owner")
        .context("Missing --owner")?;
    Uuid::parse_str(raw).with_context(|| format!("Owner '{}' is not a valid UUID", raw))
}

async fn open_gateway(global: &ArgMatches, config: &SyncConfig) -> Result<Arc<dyn PersistenceGateway>> {
    if global.get_flag("memory") {
        tracing::info!("using in-memory store, nothing is persisted");
        return Ok(Arc::new(MemoryGateway::new()));
    }

    let explicit = global.get_one::<String>("database-url").map(String::as_str);
    let database_url = config
        .resolve_database_url(explicit)
        .context("No database URL: pass --database-url, set DATABASE_URL, or set database_url in the config file")?;

    let gateway = PostgresGateway::connect(&database_url, config.tables.clone(), config.pool_size).await?;
    Ok(Arc::new(gateway))
}

async fn load_command(global: &ArgMatches, matches: &ArgMatches, config: &SyncConfig) -> Result<()> {
    let owner = owner(matches)?;
    let gateway = open_gateway(global, config).await?;

    let canonical = RefreshLoader::new(gateway).load(owner).await?;
    for target in &canonical.missing {
        eprintln!("warning: storage for {} does not exist", target);
    }
    print!("{}", serde_yaml::to_string(&canonical.draft)?);
    Ok(())
}

async fn apply_command(global: &ArgMatches, matches: &ArgMatches, config: &SyncConfig) -> Result<()> {
    let owner = owner(matches)?;
    let file = matches.get_one::<String>("file").context("Missing --file")?;
    let update = parse_update_file(file).await?;
    let gateway = open_gateway(global, config).await?;

    let report = Reconciler::new(gateway.clone())
        .reconcile(owner, &update)
        .await
        .with_context(|| format!("Update of profile {} failed", owner))?;

    println!("Outcome: {:?}", report.outcome());
    print_report(&report);

    let canonical = RefreshLoader::new(gateway).load(owner).await?;
    println!();
    print!("{}", serde_yaml::to_string(&canonical.draft)?);

    if !report.rejections().is_empty() {
        std::process::exit(2);
    }
    Ok(())
}

fn print_report(report: &SyncReport) {
    for (collection, result) in &report.collections {
        match result {
            CollectionResult::Committed(committed) => println!(
                "  {}: {} rows stored ({} kept their id, {} pruned)",
                collection,
                committed.rows.len(),
                committed.preserved,
                committed.pruned
            ),
            CollectionResult::Skipped => println!("  {}: skipped, storage does not exist", collection),
            CollectionResult::Rejected(fault) => println!("  {}: rejected, {}", collection, fault),
        }
    }
    match &report.fields {
        Some(FieldsResult::Committed) => println!("  profile fields: stored"),
        Some(FieldsResult::Skipped) => println!("  profile fields: skipped, storage does not exist"),
        Some(FieldsResult::Rejected(fault)) => println!("  profile fields: rejected, {}", fault),
        None => {}
    }
}

fn normalize_command(matches: &ArgMatches) {
    for raw in matches.get_many::<String>("platform").into_iter().flatten() {
        println!("{} -> {}", raw, normalize_platform(raw));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        build_cli().debug_assert();
    }

    #[test]
    fn test_owner_must_be_uuid() {
        let matches = build_cli()
            .try_get_matches_from(["profilesync", "load", "--owner", "not-a-uuid"])
            .unwrap();
        let (_, sub) = matches.subcommand().unwrap();
        assert!(owner(sub).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let matches = build_cli()
            .try_get_matches_from(["profilesync", "normalize", "IG", "x", "--memory"])
            .unwrap();
        assert!(matches.get_flag("memory"));
    }
}
