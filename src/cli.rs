use std::env::Args;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use log::{info, warn};
use uuid::Uuid;

use crate::auth::AccessToken;
use crate::callback::CallbackListener;
use crate::client::PocketClient;
use crate::config::Config;
use crate::items::{ContentType, DetailType, ItemQuery, Sort, State};

const MISSING_CONSUMER_KEY: &str = "Consumer key is required. It must be specified with the environment variable POCKET_CONSUMER_KEY or the option -c.";
const MISSING_ACCESS_TOKEN: &str = "Access token is required. It must be specified with the environment variable POCKET_ACCESS_TOKEN or the option -a.";

#[derive(Parser)]
#[command(name = "pocket", version, about = "A client for the Pocket API", long_about = None)]
pub struct CLI {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Authenticate and obtain an access token
    Auth(AuthArgs),

    /// Retrieve saved items
    Get(GetArgs),
}

#[derive(clap::Args)]
struct AuthArgs {
    /// The consumer key for your application
    #[arg(short, long, env = "POCKET_CONSUMER_KEY", hide_env_values = true)]
    consumer_key: Option<String>,

    /// A string of metadata used by your application; a UUID when omitted
    #[arg(short, long)]
    state: Option<String>,

    /// HTTP server port for receiving the authentication callback
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,
}

#[derive(clap::Args)]
struct GetArgs {
    /// The consumer key for your application
    #[arg(short, long, env = "POCKET_CONSUMER_KEY", hide_env_values = true)]
    consumer_key: Option<String>,

    /// The access token obtained with `pocket auth`
    #[arg(short, long, env = "POCKET_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    #[arg(long, value_enum)]
    state: Option<State>,

    /// Only favorited (true) or only unfavorited (false) items
    #[arg(long)]
    favorite: Option<bool>,

    /// Only items with this tag; `_untagged_` for items without tags
    #[arg(long)]
    tag: Option<String>,

    #[arg(long, value_enum)]
    content_type: Option<ContentType>,

    #[arg(long, value_enum)]
    sort: Option<Sort>,

    #[arg(long, value_enum)]
    detail_type: Option<DetailType>,

    /// Only items whose title or URL contains this text
    #[arg(long)]
    search: Option<String>,

    #[arg(long)]
    domain: Option<String>,

    /// Only items modified since this unix timestamp
    #[arg(long)]
    since: Option<i64>,

    #[arg(long)]
    count: Option<u32>,

    #[arg(long)]
    offset: Option<u32>,
}

impl GetArgs {
    fn query(&self) -> ItemQuery {
        ItemQuery {
            state: self.state,
            favorite: self.favorite,
            tag: self.tag.clone(),
            content_type: self.content_type,
            sort: self.sort,
            detail_type: self.detail_type,
            search: self.search.clone(),
            domain: self.domain.clone(),
            since: self.since,
            count: self.count,
            offset: self.offset,
        }
    }
}

pub async fn run(args: Args) -> Result<()> {
    let cli = CLI::parse_from(args);
    let config = Config::load().await?;
    let client = PocketClient::with_base_url(&config.base_url).context("configure client")?;

    match cli.command {
        Command::Auth(args) => auth(&client, args, &config).await,
        Command::Get(args) => get(&client, args, &config).await,
    }
}

/// Everything `auth` needs once flags, environment and config are merged
#[derive(Debug)]
struct AuthSettings {
    consumer_key: String,
    state: String,
    port: u16,
}

impl AuthSettings {
    fn resolve(args: AuthArgs, config: &Config) -> Result<Self> {
        Ok(Self {
            consumer_key: resolve_consumer_key(args.consumer_key, config)?,
            state: args.state.unwrap_or_else(|| Uuid::new_v4().to_string()),
            port: args.port.unwrap_or(config.port),
        })
    }
}

async fn auth(client: &PocketClient, args: AuthArgs, config: &Config) -> Result<()> {
    let settings = AuthSettings::resolve(args, config)?;

    let listener = CallbackListener::bind(settings.port)
        .await
        .with_context(|| format!("bind callback listener on port {}", settings.port))?;

    let token = handshake(client, listener, &settings.consumer_key, &settings.state).await?;

    println!("{}\n", "User authentication was successful!!".green().bold());
    println!("Access Token: {}", token.token);
    println!("Username: {}", token.username);
    println!("State: {}", settings.state);

    Ok(())
}

/// Runs the three legs of the handshake around an already bound listener
async fn handshake(
    client: &PocketClient,
    listener: CallbackListener,
    consumer_key: &str,
    state: &str,
) -> Result<AccessToken> {
    let request_token = client
        .fetch_request_token(consumer_key, &listener.redirect_uri(), Some(state))
        .await
        .context("fetch request token")?;

    if request_token.state.as_deref() != Some(state) {
        warn!("request token did not echo the state that was sent");
    }

    println!("Please access the following URL with your browser for authorization.\n");
    println!("{}", request_token.authorization_url.underline());

    info!("waiting for the authorization redirect");

    let token = listener
        .serve_once(state, |_| {
            client.fetch_access_token(consumer_key, &request_token.code)
        })
        .await
        .context("complete authorization callback")?;

    Ok(token)
}

async fn get(client: &PocketClient, args: GetArgs, config: &Config) -> Result<()> {
    let query = args.query();
    let consumer_key = resolve_consumer_key(args.consumer_key, config)?;
    let Some(access_token) = args.access_token else {
        bail!(MISSING_ACCESS_TOKEN);
    };

    let items = client
        .get_items(&consumer_key, &access_token, &query)
        .await
        .context("get items")?;

    println!("{}", serde_json::to_string_pretty(&items)?);

    Ok(())
}

fn resolve_consumer_key(flag: Option<String>, config: &Config) -> Result<String> {
    match flag.or_else(|| config.consumer_key.clone()) {
        Some(key) if !key.is_empty() => Ok(key),
        _ => bail!(MISSING_CONSUMER_KEY),
    }
}
