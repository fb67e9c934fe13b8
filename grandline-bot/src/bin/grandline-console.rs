//! Console host for trying the plugin without a chat service.
//!
//! Each stdin line is `<guild> <channel> <user> <text>`. Text starting with
//! the command prefix is a command; anything else is a plain message (and
//! may answer a prompt). Presence is driven by meta lines:
//!
//! ```text
//! :join <guild> <user> <name>
//! :leave <guild> <user>
//! :quit
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use grandline_bot::{BotEvent, CommandInvocation, GrandlinePlugin};
use grandline_core::store::{Backend, MemoryBackend, SqliteBackend};
use grandline_core::world::Directory;
use grandline_core::{ChannelId, GrandlineConfig, GuildId, UserId};

fn load_config() -> Result<GrandlineConfig> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("GRANDLINE_CONFIG").ok())
        .map(PathBuf::from);
    match path {
        Some(path) => GrandlineConfig::from_file(&path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(GrandlineConfig::default()),
    }
}

fn open_backend(config: &GrandlineConfig) -> Result<Arc<dyn Backend>> {
    let storage = &config.storage;
    let backend: Arc<dyn Backend> = match storage.backend.as_str() {
        "memory" => Arc::new(MemoryBackend::new()),
        "sqlite" => Arc::new(
            SqliteBackend::open(&storage.path, storage)
                .with_context(|| format!("opening {}", storage.path))?,
        ),
        other => bail!("unknown storage backend `{other}`"),
    };
    Ok(backend)
}

fn parse_id(word: Option<&str>, what: &str) -> Result<u64> {
    word.with_context(|| format!("missing {what}"))?
        .parse()
        .with_context(|| format!("{what} must be a number"))
}

fn parse_line(line: &str, plugin: &GrandlinePlugin) -> Result<Option<BotEvent>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    if let Some(meta) = line.strip_prefix(':') {
        let mut words = meta.split_whitespace();
        return Ok(Some(match words.next() {
            Some("join") => BotEvent::MemberJoined {
                guild: GuildId(parse_id(words.next(), "guild")?),
                user: UserId(parse_id(words.next(), "user")?),
                name: words.collect::<Vec<_>>().join(" "),
            },
            Some("leave") => BotEvent::MemberLeft {
                guild: GuildId(parse_id(words.next(), "guild")?),
                user: UserId(parse_id(words.next(), "user")?),
            },
            Some(other) => bail!("unknown meta command `{other}`"),
            None => return Ok(None),
        }));
    }

    let mut words = line.splitn(4, char::is_whitespace);
    let guild = GuildId(parse_id(words.next(), "guild")?);
    let channel = ChannelId(parse_id(words.next(), "channel")?);
    let author = UserId(parse_id(words.next(), "user")?);
    let text = words.next().unwrap_or_default().to_string();

    let ctx = plugin.context();
    if !ctx.directory.has_member(guild, author) {
        ctx.directory.join(guild, author, format!("pirate#{author}"));
    }
    let name = ctx.directory.name_of(guild, author);
    let prefix = &ctx.config.general.command_prefix;
    Ok(Some(
        match CommandInvocation::parse(prefix, &text, guild, channel, author, name) {
            Some(inv) => BotEvent::Command(inv),
            None => BotEvent::Message {
                guild,
                channel,
                author,
                text,
            },
        },
    ))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = load_config()?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let backend = open_backend(&config)?;
    let (tx, mut rx) = mpsc::channel(64);
    let plugin = GrandlinePlugin::load(config, backend, tx)?;

    let printer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            println!("{msg}");
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim() == ":quit" {
            break;
        }
        match parse_line(&line, &plugin) {
            Ok(Some(event)) => {
                plugin.dispatch(event);
            }
            Ok(None) => {}
            Err(e) => eprintln!("?? {e:#}"),
        }
    }

    plugin.unload().await;
    printer.abort();
    Ok(())
}
