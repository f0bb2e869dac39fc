//! Command-line frontend for the collection engine
//!
//! Operates on a JSON collection file (an array of items, as produced by a
//! scanner) and prints plain-text reports. State-changing commands write
//! the file back.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use collection::{
    CancellationToken, CheckConfig, CollectionController, EnableAction, Item, ItemId, ItemStore,
    Loader, PlanEntry, Provider, ProviderClient, ProviderRegistry, SearchArgs,
};

#[derive(Parser)]
#[command(name = "collection", about = "Mod collection manager", version)]
struct Cli {
    /// Path to the collection file
    #[arg(long, default_value = "collection.json", global = true)]
    file: PathBuf,

    /// Game version constraint, repeatable
    #[arg(long = "game-version", global = true)]
    game_versions: Vec<String>,

    /// Mod loader constraint, repeatable
    #[arg(long, global = true)]
    loaders: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check the collection (or a selection) for updates
    Check {
        /// Item ids to check; all items when omitted
        ids: Vec<String>,
    },
    /// Enable, disable, or toggle items, cascading through dependencies
    Set {
        #[arg(value_enum)]
        action: Action,
        /// Item ids to act on
        #[arg(required = true)]
        ids: Vec<String>,
        /// Apply the dependency cascade instead of the selection only
        #[arg(long)]
        cascade: bool,
    },
    /// Remove items from the collection
    Remove {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Show one item with its dependency relations
    Show { id: String },
    /// Fetch a remote project's info from a provider
    Info {
        #[arg(value_enum)]
        provider: ProviderArg,
        project_id: String,
    },
    /// Search a provider's catalog
    Search {
        #[arg(value_enum)]
        provider: ProviderArg,
        query: String,
        /// Sorting method name; provider-specific
        #[arg(long)]
        sort: Option<String>,
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Action {
    Enable,
    Disable,
    Toggle,
}

impl From<Action> for EnableAction {
    fn from(action: Action) -> Self {
        match action {
            Action::Enable => EnableAction::Enable,
            Action::Disable => EnableAction::Disable,
            Action::Toggle => EnableAction::Toggle,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ProviderArg {
    Modrinth,
    Flame,
}

impl From<ProviderArg> for Provider {
    fn from(provider: ProviderArg) -> Self {
        match provider {
            ProviderArg::Modrinth => Provider::Modrinth,
            ProviderArg::Flame => Provider::Flame,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = build_config(&cli)?;
    let registry = Arc::new(ProviderRegistry::with_default_providers(&config)?);

    match cli.command {
        Command::Check { ids } => {
            let controller = load_controller(&cli.file, config, registry)?;
            let selection = item_ids(&ids);
            let report = controller
                .check_updates(selection.as_deref())
                .await?;

            for (id, outcome) in report.outcomes.iter() {
                println!("{id}: {outcome:?}");
            }
            let plan = report.into_plan();
            if plan.is_empty() {
                println!("nothing to update");
            } else {
                println!("\nplan:");
                for entry in &plan {
                    match entry {
                        PlanEntry::Direct(update) => println!(
                            "  update {} {} -> {}",
                            update.name, update.old_version, update.version.name
                        ),
                        PlanEntry::Dependency(dep) => println!(
                            "  install {} ({}) for {}",
                            dep.name.as_deref().unwrap_or(&dep.project_id),
                            dep.version.name,
                            dep.required_by
                                .iter()
                                .map(ItemId::as_str)
                                .collect::<Vec<_>>()
                                .join(", ")
                        ),
                    }
                }
            }
        }
        Command::Set { action, ids, cascade } => {
            let decision = if cascade {
                collection::CascadeDecision::ApplyCascade
            } else {
                collection::CascadeDecision::DirectOnly
            };
            let mut controller = load_controller(&cli.file, config, registry)?
                .with_confirmer(Arc::new(collection::PolicyConfirmer::new(decision)));
            let changed = controller
                .set_enabled(&item_ids(&ids).unwrap_or_default(), action.into())
                .await;
            for id in &changed {
                let state = controller
                    .get(id)
                    .map(|item| if item.enabled { "enabled" } else { "disabled" })
                    .unwrap_or("missing");
                println!("{id}: {state}");
            }
            save_store(&cli.file, controller.store())?;
        }
        Command::Remove { ids } => {
            let mut controller = load_controller(&cli.file, config, registry)?;
            let removed = controller.delete(&item_ids(&ids).unwrap_or_default());
            for id in &removed {
                println!("removed {id}");
            }
            save_store(&cli.file, controller.store())?;
        }
        Command::Show { id } => {
            let controller = load_controller(&cli.file, config, registry)?;
            let id = ItemId::from(id);
            let Some(item) = controller.get(&id) else {
                bail!("no item '{id}' in the collection");
            };
            println!(
                "{} ({}) {}",
                item.name,
                item.id,
                if item.enabled { "enabled" } else { "disabled" }
            );
            if let Some(metadata) = &item.metadata {
                println!(
                    "  {} project {} file {} version {}",
                    metadata.provider, metadata.project_id, metadata.file_id, metadata.version
                );
            }
            for name in controller.requires_names(&id) {
                println!("  requires {name}");
            }
            for name in controller.required_by_names(&id) {
                println!("  required by {name}");
            }
        }
        Command::Info { provider, project_id } => {
            let project = registry
                .fetch_project(provider.into(), &project_id, &CancellationToken::new())
                .await?;
            println!("{}  {}", project.id, project.name);
            if let Some(slug) = &project.slug {
                println!("  slug: {slug}");
            }
            if let Some(description) = &project.description {
                println!("  {description}");
            }
        }
        Command::Search { provider, query, sort, limit } => {
            let provider: Provider = provider.into();
            let sorting = match &sort {
                Some(name) => {
                    let client = registry
                        .get(provider)
                        .context("provider is not registered")?;
                    Some(
                        client
                            .sorting_methods()
                            .iter()
                            .find(|m| m.name.eq_ignore_ascii_case(name))
                            .copied()
                            .with_context(|| format!("unknown sorting method '{name}'"))?,
                    )
                }
                None => None,
            };
            let args = SearchArgs {
                query: Some(query),
                sorting,
                loaders: config.loaders.clone(),
                game_versions: config.game_versions.clone(),
                offset: 0,
                limit,
            };
            let results = registry
                .search(provider, &args, &CancellationToken::new())
                .await?;
            for project in results {
                println!(
                    "{}  {}  {}",
                    project.id,
                    project.name,
                    project.description.as_deref().unwrap_or("")
                );
            }
        }
    }

    Ok(())
}

fn build_config(cli: &Cli) -> Result<CheckConfig> {
    let mut config = CheckConfig::default();
    for version in &cli.game_versions {
        config = config.with_game_version(version.as_str());
    }
    for loader in &cli.loaders {
        let loader =
            Loader::parse(loader).with_context(|| format!("unknown loader '{loader}'"))?;
        config = config.with_loader(loader);
    }
    Ok(config)
}

fn load_controller(
    file: &Path,
    config: CheckConfig,
    registry: Arc<ProviderRegistry>,
) -> Result<CollectionController> {
    let data = std::fs::read_to_string(file)
        .with_context(|| format!("reading collection file {}", file.display()))?;
    let items: Vec<Item> = serde_json::from_str(&data)
        .with_context(|| format!("parsing collection file {}", file.display()))?;
    Ok(CollectionController::new(
        ItemStore::from_items(items),
        config,
        registry,
    ))
}

fn save_store(file: &Path, store: &ItemStore) -> Result<()> {
    let mut items: Vec<&Item> = store.iter().collect();
    items.sort_by(|a, b| a.id.cmp(&b.id));
    let data = serde_json::to_string_pretty(&items)?;
    std::fs::write(file, data)
        .with_context(|| format!("writing collection file {}", file.display()))
}

fn item_ids(ids: &[String]) -> Option<Vec<ItemId>> {
    if ids.is_empty() {
        return None;
    }
    let unique: HashSet<&String> = ids.iter().collect();
    let mut out: Vec<ItemId> = unique.into_iter().map(|s| ItemId::from(s.clone())).collect();
    out.sort();
    Some(out)
}
