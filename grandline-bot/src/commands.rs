//! The command surface: parse an invocation, load records, act, reply.
//!
//! Handlers commit their record changes before they start narrating, so a
//! failed or slow reply never leaves a half-applied result behind.

use rand::Rng;
use tracing::{debug, info, warn};

use grandline_core::actions::{self, Attribute};
use grandline_core::combat::{BattleMode, BattleOutcome, MoveCategory, Side, StatusKind, base_damage};
use grandline_core::world::{Directory, transforms};
use grandline_core::{
    ChannelId, Combatant, GlobalRecord, GrandlineError, GuildId, GuildRecord, MemberRecord,
    RecordKey, Result, Scope, UserId, UserRecord,
};

use crate::context::GameContext;
use crate::events::{CommandInvocation, parse_mention};
use crate::prompt::{Question, await_choice};

/// A parsed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List the commands.
    Help,
    /// Show a wanted poster; defaults to the author.
    Profile(Option<UserId>),
    /// Recover health.
    Rest,
    /// Spend berries on a stat.
    Train(Attribute),
    /// Fight another member.
    Duel {
        /// Who is challenged.
        opponent: UserId,
        /// Use the special-move table.
        moves: bool,
    },
    /// Set sail and see what happens.
    Explore,
    /// Guild bounty leaderboard.
    Bounties,
    /// Guild weather.
    Weather,
    /// Market prices.
    Market,
    /// Buy from the market.
    Buy {
        /// Item name.
        item: String,
        /// How many.
        quantity: u32,
    },
    /// Show the special-move table.
    Moves,
}

impl Command {
    /// Parse an invocation.
    ///
    /// # Errors
    /// `InvalidArgument` for unknown commands or malformed arguments.
    pub fn parse(inv: &CommandInvocation) -> Result<Self> {
        let arg = |i: usize| inv.args.get(i).map(String::as_str);
        let invalid = |msg: &str| GrandlineError::InvalidArgument(msg.to_string());

        match inv.name.as_str() {
            "help" => Ok(Self::Help),
            "profile" | "poster" => match arg(0) {
                None => Ok(Self::Profile(None)),
                Some(a) => parse_mention(a)
                    .map(|u| Self::Profile(Some(u)))
                    .ok_or_else(|| invalid("mention someone to see their poster")),
            },
            "rest" => Ok(Self::Rest),
            "train" => {
                let attr = arg(0).ok_or_else(|| invalid("train what? strength, defense, speed or hp"))?;
                Ok(Self::Train(attr.parse()?))
            }
            "duel" | "fight" => {
                let opponent = arg(0)
                    .and_then(parse_mention)
                    .ok_or_else(|| invalid("mention who you want to duel"))?;
                let moves = arg(1).is_some_and(|a| a.eq_ignore_ascii_case("moves"));
                Ok(Self::Duel { opponent, moves })
            }
            "explore" | "sail" => Ok(Self::Explore),
            "bounties" | "leaderboard" => Ok(Self::Bounties),
            "weather" => Ok(Self::Weather),
            "market" | "shop" => Ok(Self::Market),
            "buy" => {
                let item = arg(0).ok_or_else(|| invalid("buy what? check the market"))?;
                let quantity = match arg(1) {
                    None => 1,
                    Some(q) => q.parse().map_err(|_| invalid("quantity must be a whole number"))?,
                };
                Ok(Self::Buy {
                    item: item.to_string(),
                    quantity,
                })
            }
            "moves" => Ok(Self::Moves),
            other => Err(GrandlineError::InvalidArgument(format!(
                "unknown command `{other}`, try help"
            ))),
        }
    }
}

/// Run a parsed command to completion.
///
/// # Errors
/// Whatever the handler hit; records are unchanged on error.
pub async fn execute(ctx: &GameContext, inv: &CommandInvocation, command: Command) -> Result<()> {
    debug!(command = ?command, guild = %inv.guild, author = %inv.author, "executing command");
    match command {
        Command::Help => help(ctx, inv).await,
        Command::Profile(target) => profile(ctx, inv, target).await,
        Command::Rest => rest(ctx, inv).await,
        Command::Train(attribute) => train(ctx, inv, attribute).await,
        Command::Duel { opponent, moves } => duel(ctx, inv, opponent, moves).await,
        Command::Explore => explore(ctx, inv).await,
        Command::Bounties => bounties(ctx, inv).await,
        Command::Weather => weather(ctx, inv).await,
        Command::Market => market(ctx, inv).await,
        Command::Buy { item, quantity } => buy(ctx, inv, &item, quantity).await,
        Command::Moves => moves(ctx, inv).await,
    }
}

fn member_key(guild: GuildId, user: UserId) -> RecordKey {
    RecordKey::Member(guild, user)
}

// ---------------------------------------------------------------------------
// Read-only commands
// ---------------------------------------------------------------------------

async fn help(ctx: &GameContext, inv: &CommandInvocation) -> Result<()> {
    let p = &ctx.config.general.command_prefix;
    let fields = [
        ("profile [@user]", "wanted poster"),
        ("rest", "recover some HP"),
        ("train <stat>", "strength, defense, speed or hp"),
        ("duel <@user> [moves]", "fight a crewmate"),
        ("explore", "set sail"),
        ("bounties", "most wanted in this guild"),
        ("weather", "current weather"),
        ("market", "prices"),
        ("buy <item> [qty]", "shop"),
        ("moves", "special moves"),
    ]
    .into_iter()
    .map(|(cmd, what)| (format!("{p}{cmd}"), what.to_string()))
    .collect();
    ctx.sink.card(inv.channel, "Grand Line commands", fields).await
}

async fn profile(ctx: &GameContext, inv: &CommandInvocation, target: Option<UserId>) -> Result<()> {
    let user = target.unwrap_or(inv.author);
    let name = if user == inv.author {
        inv.author_name.clone()
    } else {
        ctx.directory.name_of(inv.guild, user)
    };
    let m: MemberRecord = ctx.store.get(&member_key(inv.guild, user))?;
    let totals: UserRecord = ctx.store.get(&RecordKey::User(user))?;

    let inventory = if m.inventory.is_empty() {
        "empty".to_string()
    } else {
        m.inventory
            .iter()
            .map(|(item, n)| format!("{item} x{n}"))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let fields = vec![
        ("Bounty".into(), format!("{} berries", m.bounty)),
        ("Wallet".into(), format!("{} berries", m.berries)),
        ("HP".into(), format!("{}/{}", m.hp, m.max_hp)),
        ("Strength".into(), m.strength.to_string()),
        ("Defense".into(), m.defense.to_string()),
        ("Speed".into(), m.speed.to_string()),
        ("Haki".into(), m.haki_level.to_string()),
        ("Record".into(), format!("{}W / {}L", m.wins, m.losses)),
        ("All seas".into(), format!("{} of {} won", totals.total_wins, totals.total_battles)),
        ("Inventory".into(), inventory),
    ];
    ctx.sink.card(inv.channel, format!("WANTED: {name}"), fields).await
}

async fn bounties(ctx: &GameContext, inv: &CommandInvocation) -> Result<()> {
    let mut board = Vec::new();
    for key in ctx.store.list_keys(Scope::Member)? {
        let RecordKey::Member(guild, user) = key else {
            continue;
        };
        if guild != inv.guild || !ctx.directory.has_member(guild, user) {
            continue;
        }
        let m: MemberRecord = ctx.store.get(&key)?;
        board.push((m.bounty, user));
    }
    board.sort_unstable_by(|a, b| b.cmp(a));
    board.truncate(ctx.config.interaction.leaderboard_size);

    if board.is_empty() {
        return ctx.sink.text(inv.channel, "No bounties posted in these waters yet.").await;
    }
    let fields = board
        .into_iter()
        .enumerate()
        .map(|(i, (bounty, user))| {
            (
                format!("{}. {}", i + 1, ctx.directory.name_of(inv.guild, user)),
                format!("{bounty} berries"),
            )
        })
        .collect();
    ctx.sink.card(inv.channel, "Most wanted", fields).await
}

async fn weather(ctx: &GameContext, inv: &CommandInvocation) -> Result<()> {
    let guild: GuildRecord = ctx.store.get(&RecordKey::Guild(inv.guild))?;
    ctx.sink
        .text(inv.channel, format!("The sea around here: {}.", guild.weather))
        .await
}

async fn market(ctx: &GameContext, inv: &CommandInvocation) -> Result<()> {
    let global: GlobalRecord = ctx.store.get(&RecordKey::Global)?;
    let fields = global
        .market
        .iter()
        .map(|(item, price)| (item.clone(), format!("{price} berries")))
        .collect();
    ctx.sink.card(inv.channel, "Market", fields).await
}

async fn moves(ctx: &GameContext, inv: &CommandInvocation) -> Result<()> {
    let BattleMode::Moves(table) = BattleMode::standard_moves() else {
        return Ok(());
    };
    let cfg = &ctx.config.battle;
    let fields = table
        .into_iter()
        .map(|m| {
            let effect = match m.category {
                MoveCategory::Normal => String::new(),
                MoveCategory::Special(StatusKind::Burn) => {
                    format!(", {:.0}% burn", cfg.burn_chance * 100.0)
                }
                MoveCategory::Special(StatusKind::Stun) => {
                    format!(", {:.0}% stun", cfg.stun_chance * 100.0)
                }
            };
            (m.name, format!("{}% power{effect}", m.power))
        })
        .collect();
    ctx.sink.card(inv.channel, "Special moves (duel <@user> moves)", fields).await
}

// ---------------------------------------------------------------------------
// Single-member actions
// ---------------------------------------------------------------------------

async fn rest(ctx: &GameContext, inv: &CommandInvocation) -> Result<()> {
    let key = member_key(inv.guild, inv.author);
    let _lock = ctx.store.locks().acquire(key).await;
    let now = chrono::Utc::now();
    let outcome = ctx.store.try_scoped_update(&key, |m: &mut MemberRecord| {
        actions::rest(m, &mut *ctx.rng.lock(), now, &ctx.config.rest)
    })?;
    ctx.sink
        .text(
            inv.channel,
            format!(
                "{} rests and recovers {} HP ({} HP now).",
                inv.author_name, outcome.healed, outcome.hp
            ),
        )
        .await
}

async fn train(ctx: &GameContext, inv: &CommandInvocation, attribute: Attribute) -> Result<()> {
    let key = member_key(inv.guild, inv.author);
    let _lock = ctx.store.locks().acquire(key).await;
    let gain = ctx.store.try_scoped_update(&key, |m: &mut MemberRecord| {
        actions::train(m, attribute, &mut *ctx.rng.lock(), &ctx.config.training)
    })?;
    ctx.sink
        .text(
            inv.channel,
            format!("{} trains hard: {attribute} +{gain}.", inv.author_name),
        )
        .await
}

async fn buy(ctx: &GameContext, inv: &CommandInvocation, item: &str, quantity: u32) -> Result<()> {
    let key = member_key(inv.guild, inv.author);
    let _lock = ctx.store.locks().acquire(key).await;
    let global: GlobalRecord = ctx.store.get(&RecordKey::Global)?;
    let cost = ctx
        .store
        .try_scoped_update(&key, |m: &mut MemberRecord| actions::buy(m, &global, item, quantity))?;
    ctx.sink
        .text(
            inv.channel,
            format!("{} buys {quantity} {item} for {cost} berries.", inv.author_name),
        )
        .await
}

// ---------------------------------------------------------------------------
// Battles
// ---------------------------------------------------------------------------

/// Post the turn log one line at a time, pausing between lines.
async fn narrate(ctx: &GameContext, channel: ChannelId, outcome: &BattleOutcome) -> Result<()> {
    let delay = ctx.config.interaction.turn_delay();
    for line in outcome.lines() {
        tokio::time::sleep(delay).await;
        ctx.sink.text(channel, line).await?;
    }
    Ok(())
}

fn bump_totals(ctx: &GameContext, user: UserId, won: bool) {
    let result = ctx.store.scoped_update(&RecordKey::User(user), |u: &mut UserRecord| {
        u.total_battles += 1;
        if won {
            u.total_wins += 1;
        }
    });
    if let Err(e) = result {
        warn!(user = %user, error = %e, "failed to update cross-guild totals");
    }
}

async fn duel(ctx: &GameContext, inv: &CommandInvocation, opponent: UserId, moves: bool) -> Result<()> {
    if opponent == inv.author {
        return Err(GrandlineError::InvalidArgument("you can't duel yourself".into()));
    }
    if !ctx.directory.has_member(inv.guild, opponent) {
        return Err(GrandlineError::not_found("member", opponent));
    }
    let battle = ctx.battles.begin(inv.channel)?;
    let (a, b) = (member_key(inv.guild, inv.author), member_key(inv.guild, opponent));
    let _locks = ctx.store.locks().acquire_many(&[a, b]).await;

    let name_a = inv.author_name.clone();
    let name_b = ctx.directory.name_of(inv.guild, opponent);
    let mode = if moves { BattleMode::standard_moves() } else { BattleMode::Plain };
    let cfg = &ctx.config.battle;

    let (outcome, payout) = ctx.store.update_pair(&a, &b, |ra: &mut MemberRecord, rb: &mut MemberRecord| {
        for (name, m) in [(&name_a, &*ra), (&name_b, &*rb)] {
            if !m.is_standing() {
                return Err(GrandlineError::InvalidArgument(format!(
                    "{name} is too battered to fight, rest first"
                )));
            }
        }
        let outcome = ctx.resolver.resolve(
            Combatant::from_member(name_a.as_str(), ra, cfg),
            Combatant::from_member(name_b.as_str(), rb, cfg),
            &mode,
            &mut *ctx.rng.lock(),
        );
        let payout = match outcome.winner {
            Side::Challenger => actions::apply_battle_result(ra, rb, &outcome, cfg),
            Side::Defender => actions::apply_battle_result(rb, ra, &outcome, cfg),
        };
        Ok((outcome, payout))
    })?;

    let challenger_won = outcome.winner == Side::Challenger;
    bump_totals(ctx, inv.author, challenger_won);
    bump_totals(ctx, opponent, !challenger_won);
    if let Err(e) = ctx
        .store
        .scoped_update(&RecordKey::Guild(inv.guild), |g: &mut GuildRecord| g.battles_fought += 1)
    {
        warn!(guild = %inv.guild, error = %e, "failed to count guild battle");
    }
    info!(
        battle = %battle.id(),
        winner = %outcome.winner().name,
        turns = outcome.turns,
        reason = ?outcome.reason,
        "duel resolved"
    );

    ctx.sink
        .text(inv.channel, format!("{name_a} challenges {name_b} to a duel!"))
        .await?;
    narrate(ctx, inv.channel, &outcome).await?;
    ctx.sink
        .text(
            inv.channel,
            format!(
                "{} wins in {} turns! +{} berries, bounty +{}.",
                outcome.winner().name,
                outcome.turns,
                payout.berries,
                payout.bounty
            ),
        )
        .await
}

async fn explore(ctx: &GameContext, inv: &CommandInvocation) -> Result<()> {
    let key = member_key(inv.guild, inv.author);
    let _lock = ctx.store.locks().acquire(key).await;
    let member: MemberRecord = ctx.store.get(&key)?;
    if !member.is_standing() {
        return Err(GrandlineError::InvalidArgument(
            "you're too battered to set sail, rest first".into(),
        ));
    }
    let weather = ctx.store.get::<GuildRecord>(&RecordKey::Guild(inv.guild))?.weather;

    let (hostile, encounter, enemy) = {
        let mut rng = ctx.rng.lock();
        let hostile = rng.gen_bool(0.5);
        (
            hostile,
            transforms::pick_encounter(weather, &mut *rng),
            actions::sea_enemy(&member, &mut *rng),
        )
    };

    if !hostile {
        ctx.store
            .scoped_update(&key, |m: &mut MemberRecord| encounter.apply(m))?;
        return ctx
            .sink
            .text(inv.channel, format!("{} {encounter}.", inv.author_name))
            .await;
    }

    let _battle = ctx.battles.begin(inv.channel)?;
    let text = format!("{}, a {} blocks your course!", inv.author_name, enemy.name);
    let choice = await_choice(
        &ctx.prompts,
        &ctx.sink,
        Question {
            channel: inv.channel,
            user: inv.author,
            text: &text,
            options: &["fight", "run"],
            timeout: ctx.config.interaction.prompt_timeout(),
        },
        &ctx.rng,
    )
    .await?;
    if choice.timed_out {
        ctx.sink
            .text(inv.channel, format!("No answer... {} decides to {}.", inv.author_name, choice.option))
            .await?;
    }

    if choice.option == "run" {
        let hit = ctx.store.scoped_update(&key, |m: &mut MemberRecord| {
            if ctx.rng.lock().gen_bool(0.5) {
                return None;
            }
            let damage = base_damage(enemy.strength, m.defense);
            m.hp -= damage;
            m.clamp_hp();
            Some(damage)
        })?;
        let msg = match hit {
            None => format!("{} slips away cleanly.", inv.author_name),
            Some(d) => format!("{} escapes, but takes a parting blow for {d} damage.", inv.author_name),
        };
        return ctx.sink.text(inv.channel, msg).await;
    }

    let cfg = &ctx.config.battle;
    let (outcome, payout) = ctx.store.try_scoped_update(&key, |m: &mut MemberRecord| {
        let outcome = ctx.resolver.resolve(
            Combatant::from_member(inv.author_name.as_str(), m, cfg),
            enemy.clone(),
            &BattleMode::Plain,
            &mut *ctx.rng.lock(),
        );
        let payout = actions::settle_sea_battle(m, &outcome, cfg);
        Ok((outcome, payout))
    })?;
    bump_totals(ctx, inv.author, payout.is_some());

    narrate(ctx, inv.channel, &outcome).await?;
    let msg = match payout {
        Some(p) => format!(
            "{} defeats the {}! +{} berries, bounty +{}.",
            inv.author_name, enemy.name, p.berries, p.bounty
        ),
        None => format!("{} is beaten by the {} and drifts home.", inv.author_name, enemy.name),
    };
    ctx.sink.text(inv.channel, msg).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inv(text: &str) -> CommandInvocation {
        CommandInvocation::parse("!", text, GuildId(1), ChannelId(1), UserId(1), "Luffy").expect("command")
    }

    #[test]
    fn parses_every_command() {
        assert_eq!(Command::parse(&inv("!profile")).expect("profile"), Command::Profile(None));
        assert_eq!(Command::parse(&inv("!profile <@2>")).expect("profile"), Command::Profile(Some(UserId(2))));
        assert_eq!(Command::parse(&inv("!train str")).expect("train"), Command::Train(Attribute::Strength));
        assert_eq!(
            Command::parse(&inv("!duel <@2> moves")).expect("duel"),
            Command::Duel {
                opponent: UserId(2),
                moves: true
            }
        );
        assert_eq!(
            Command::parse(&inv("!buy sake 3")).expect("buy"),
            Command::Buy {
                item: "sake".into(),
                quantity: 3
            }
        );
        assert_eq!(Command::parse(&inv("!market")).expect("market"), Command::Market);
    }

    #[test]
    fn bad_arguments_are_invalid() {
        for text in ["!dance", "!train", "!train charm", "!duel nobody", "!buy", "!buy meat lots"] {
            let err = Command::parse(&inv(text)).expect_err(text);
            assert!(matches!(err, GrandlineError::InvalidArgument(_)), "{text}");
        }
    }
}
