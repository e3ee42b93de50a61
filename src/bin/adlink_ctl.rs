use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;

use adlink::client::{AdsApi, HttpAdsClient};
use adlink::config::Client as ClientCfg;
use adlink::model::{AdItem, LinkState, LinkStatus};
use adlink::workflow::filter::{advertiser_options, screen_options};
use adlink::workflow::{AdsFilter, Reconciler, SuggestionPanel, SuggestionView, Tone};

const DEFAULT_SERVER: &str = "http://127.0.0.1:8080/";

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Review and reconcile media-to-advertiser links"
)]
struct Args {
    /// Path to YAML config file (reads only `client`)
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// API base URL; overrides `client.base_url`
    #[arg(long)]
    server: Option<String>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// List media items with their link state
    List {
        #[arg(long)]
        include_archived: bool,
        #[arg(long)]
        search: Option<String>,
        /// unlinked, linked or archived
        #[arg(long)]
        status: Option<String>,
        /// Advertiser id
        #[arg(long)]
        advertiser: Option<String>,
        /// Screen id
        #[arg(long)]
        screen: Option<i64>,
    },
    /// Show one item with its suggestions
    Show { id: i64 },
    /// Accept a suggestion (best match by default)
    Accept {
        id: i64,
        /// 1-based position in the suggestion list
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        rank: Option<u64>,
    },
    /// Link manually to an advertiser
    Link { id: i64, advertiser_id: String },
    Unlink { id: i64 },
    Archive { id: i64 },
    Unarchive { id: i64 },
    /// List advertisers available for manual linking
    Advertisers,
}

#[derive(Debug, Default, serde::Deserialize)]
struct ClientOnlyConfig {
    #[serde(default)]
    client: Option<ClientCfg>,
}

fn resolve_server(args: &Args) -> Result<String> {
    if let Some(server) = &args.server {
        return Ok(server.clone());
    }
    if !args.config.exists() {
        return Ok(DEFAULT_SERVER.to_string());
    }
    let raw = fs::read_to_string(&args.config)
        .with_context(|| format!("failed to read {}", args.config.display()))?;
    let cfg: ClientOnlyConfig = serde_yaml::from_str(&raw)
        .with_context(|| format!("invalid config {}", args.config.display()))?;
    Ok(cfg
        .client
        .map(|c| c.base_url)
        .unwrap_or_else(|| DEFAULT_SERVER.to_string()))
}

fn parse_status(raw: &str) -> Result<LinkStatus> {
    LinkStatus::parse_status(&raw.trim().to_ascii_lowercase())
        .ok_or_else(|| anyhow!("unknown status '{}'", raw))
}

/// Best match, or the suggestion at 1-based `rank`.
fn pick_suggestion(
    id: i64,
    best: Option<SuggestionView>,
    items: Vec<SuggestionView>,
    rank: Option<u64>,
) -> Result<SuggestionView> {
    match rank {
        None => best.ok_or_else(|| anyhow!("no suggestion for media {}", id)),
        Some(0) => bail!("rank starts at 1"),
        Some(rank) => usize::try_from(rank - 1)
            .ok()
            .and_then(|index| items.into_iter().nth(index))
            .ok_or_else(|| anyhow!("no suggestion at rank {}", rank)),
    }
}

fn describe_link(item: &AdItem) -> String {
    let name = |id: &str| item.advertiser_name.clone().unwrap_or_else(|| id.to_string());
    match &item.link {
        LinkState::Unlinked => "-".to_string(),
        LinkState::Linked(link) => match link.method.confidence() {
            Some(c) => format!(
                "{} ({}, {:.2})",
                name(&link.advertiser_id),
                link.method.match_type(),
                c.value()
            ),
            None => format!("{} ({})", name(&link.advertiser_id), link.method.match_type()),
        },
        LinkState::Archived { previous, .. } => match previous {
            Some(link) => format!("was {}", link.advertiser_id),
            None => "-".to_string(),
        },
    }
}

fn print_item(item: &AdItem) {
    println!(
        "{:>8}  {:<9} {:<40} screens:{}/{}  {}",
        item.external_id(),
        item.status(),
        item.media.name,
        item.media.online_screens(),
        item.media.screens_count(),
        describe_link(item)
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let server = resolve_server(&args)?;
    let session = Reconciler::new(HttpAdsClient::new(&server)?);

    match args.command {
        Cmd::List {
            include_archived,
            search,
            status,
            advertiser,
            screen,
        } => {
            let view = session.ads_view(include_archived).await?;
            let filter = AdsFilter {
                search: search.unwrap_or_default(),
                status: status.as_deref().map(parse_status).transpose()?,
                advertiser_id: advertiser,
                screen_id: screen,
            };
            let shown = filter.apply(&view.items);
            for item in &shown {
                print_item(item);
            }
            let s = view.summary;
            println!(
                "total {}  linked {}  unlinked {}  archived {}",
                s.total, s.linked, s.unlinked, s.archived
            );
            if filter.is_active() {
                println!("showing {} of {} (filtered)", shown.len(), view.items.len());
                if shown.is_empty() {
                    let advertisers = advertiser_options(&view.items);
                    let screens = screen_options(&view.items);
                    println!(
                        "known advertisers: {}",
                        advertisers
                            .iter()
                            .map(|(id, name)| format!("{}={}", id, name))
                            .collect::<Vec<_>>()
                            .join(", ")
                    );
                    println!(
                        "known screens: {}",
                        screens
                            .iter()
                            .map(|(id, name)| format!("{}={}", id, name))
                            .collect::<Vec<_>>()
                            .join(", ")
                    );
                }
            }
        }
        Cmd::Show { id } => {
            let detail = session.open_detail(id).await?;
            print_item(&detail.item);
            for screen in &detail.item.media.screens {
                println!(
                    "          screen {} {} [{}]{}",
                    screen.screen_display_id,
                    screen.screen_name,
                    if screen.is_online { "online" } else { "offline" },
                    screen
                        .location_name
                        .as_deref()
                        .map(|l| format!(" @ {}", l))
                        .unwrap_or_default()
                );
            }
            match &detail.suggestions {
                SuggestionPanel::NotApplicable => println!("suggestions: n/a (archived)"),
                SuggestionPanel::Unavailable(message) => {
                    println!("suggestions unavailable: {}", message)
                }
                SuggestionPanel::Ready { items, .. } if items.is_empty() => {
                    println!("no suggestion")
                }
                SuggestionPanel::Ready { items, .. } => {
                    for (rank, view) in items.iter().enumerate() {
                        let marker = match view.tone {
                            Tone::Affirmative => "+",
                            Tone::Cautionary => "?",
                        };
                        println!(
                            "  {} #{} {:>3}  {} ({})",
                            marker,
                            rank + 1,
                            view.suggestion.score.value(),
                            view.suggestion.advertiser_name,
                            view.suggestion.advertiser_id
                        );
                    }
                }
            }
            let actions: Vec<_> = detail.actions.iter().map(|a| a.as_str()).collect();
            println!("actions: {}", actions.join(", "));
        }
        Cmd::Accept { id, rank } => {
            let detail = session.open_detail(id).await?;
            let chosen = match detail.suggestions {
                SuggestionPanel::Ready { best, items } => pick_suggestion(id, best, items, rank)?,
                SuggestionPanel::NotApplicable => bail!("media {} is archived", id),
                SuggestionPanel::Unavailable(message) => bail!(message),
            };
            println!("{}", session.accept_suggestion(id, &chosen.suggestion).await?);
        }
        Cmd::Link { id, advertiser_id } => {
            println!("{}", session.link_manual(id, &advertiser_id).await?);
        }
        Cmd::Unlink { id } => println!("{}", session.unlink(id).await?),
        Cmd::Archive { id } => println!("{}", session.archive(id).await?),
        Cmd::Unarchive { id } => println!("{}", session.unarchive(id).await?),
        Cmd::Advertisers => {
            for advertiser in session.api().advertisers().await? {
                println!("{:<38} {}", advertiser.id, advertiser.name);
            }
        }
    }
    Ok(())
}
