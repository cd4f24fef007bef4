//! Command effects: parsed at invocation, applied when the cast resolves.
//!
//! A [`CommandSpec`](crate::registry::CommandSpec) names an [`EffectKind`].
//! Invoking the command parses its arguments into an [`Effect`] value up
//! front, so malformed arguments are rejected before any cost is paid. The
//! parsed effect travels by value inside the scheduled task and is applied
//! through one exhaustive `match` when the task fires.
//!
//! Effects resolve against the game state at fire time, not at invocation
//! time.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::game::{Enemy, GameState, SHIELD_CAP};
use crate::ledger::{Ledger, Resource};
use crate::map::NodeKind;
use crate::output::OutputSink;

// ---------------------------------------------------------------------------
// EffectError
// ---------------------------------------------------------------------------

/// A failure raised by an effect at fire time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EffectError {
    /// The effect needs an active encounter.
    #[error("no enemy engaged")]
    NoEnemy,

    /// `breach` while an encounter is already running.
    #[error("already engaged with {0}")]
    AlreadyEngaged(String),
}

// ---------------------------------------------------------------------------
// EffectKind
// ---------------------------------------------------------------------------

/// The unparsed effect a command spec refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    /// Start an encounter with the target's ICE.
    Breach,
    /// Scan the enemy.
    Scan,
    /// Damage the enemy (`--payload leak|burn`, `--stack N`).
    Inject,
    /// Raise the shield (`up` for the strong variant).
    Firewall,
    /// Slow the enemy's telegraph.
    Lag,
    /// Overclock the rig.
    Overclock,
    /// Vent heat. The vent itself is the command's negative heat cost.
    Cool,
    /// Write a fixed message. Useful for synthetic command sets.
    Notice(String),
}

impl EffectKind {
    /// Parse command arguments into an applicable [`Effect`].
    ///
    /// Returns a human-readable reason when the arguments are malformed.
    pub fn parse(&self, args: &[String]) -> Result<Effect, String> {
        match self {
            EffectKind::Breach => Ok(Effect::Breach),
            EffectKind::Scan => Ok(Effect::Scan),
            EffectKind::Inject => parse_inject(args),
            EffectKind::Firewall => Ok(Effect::Firewall {
                up: args.first().map_or(true, |a| a == "up"),
            }),
            EffectKind::Lag => Ok(Effect::Lag),
            EffectKind::Overclock => Ok(Effect::Overclock),
            EffectKind::Cool => Ok(Effect::Cool),
            EffectKind::Notice(text) => Ok(Effect::Notice(text.clone())),
        }
    }
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Result<Option<&'a str>, String> {
    match args.iter().position(|a| a == flag) {
        None => Ok(None),
        Some(i) => args
            .get(i + 1)
            .map(|v| Some(v.as_str()))
            .ok_or_else(|| format!("{flag} needs a value")),
    }
}

fn parse_inject(args: &[String]) -> Result<Effect, String> {
    let payload = match flag_value(args, "--payload")? {
        None | Some("leak") => Payload::Leak,
        Some("burn") => Payload::Burn,
        Some(other) => return Err(format!("unknown payload '{other}' (expected leak or burn)")),
    };
    let stacks = match flag_value(args, "--stack")? {
        None => 1,
        Some(raw) => {
            let n = raw
                .parse::<i64>()
                .map_err(|_| format!("--stack expects a number, got '{raw}'"))?;
            u32::try_from(n.max(1)).unwrap_or(u32::MAX)
        }
    };
    Ok(Effect::Inject { payload, stacks })
}

// ---------------------------------------------------------------------------
// Effect
// ---------------------------------------------------------------------------

/// Injection payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    /// 4 + stacks damage.
    Leak,
    /// 6 + 2 × stacks damage.
    Burn,
}

impl Payload {
    /// Damage dealt at the given stack count.
    pub fn damage(self, stacks: u32) -> i64 {
        let stacks = i64::from(stacks);
        match self {
            Payload::Leak => 4 + stacks,
            Payload::Burn => 6 + stacks * 2,
        }
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Payload::Leak => "leak",
            Payload::Burn => "burn",
        })
    }
}

/// A parsed, ready-to-apply effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    /// See [`EffectKind::Breach`].
    Breach,
    /// See [`EffectKind::Scan`].
    Scan,
    /// See [`EffectKind::Inject`].
    Inject {
        /// Damage profile.
        payload: Payload,
        /// Stack count, at least 1.
        stacks: u32,
    },
    /// See [`EffectKind::Firewall`].
    Firewall {
        /// Strong variant (+6 instead of +4).
        up: bool,
    },
    /// See [`EffectKind::Lag`].
    Lag,
    /// See [`EffectKind::Overclock`].
    Overclock,
    /// See [`EffectKind::Cool`].
    Cool,
    /// See [`EffectKind::Notice`].
    Notice(String),
}

/// What an effect may touch when it fires.
pub struct EffectContext<'a> {
    /// Current virtual time.
    pub now: Duration,
    /// Game state.
    pub game: &'a mut GameState,
    /// Resource gauges, read-only: costs were settled at invocation.
    pub ledger: &'a Ledger,
    /// Output destination.
    pub out: &'a mut dyn OutputSink,
}

impl Effect {
    /// Apply the effect.
    pub fn apply(&self, ctx: &mut EffectContext<'_>) -> Result<(), EffectError> {
        match self {
            Effect::Breach => {
                if let Some(enemy) = &ctx.game.enemy {
                    return Err(EffectError::AlreadyEngaged(enemy.name.clone()));
                }
                let hp = 18 + i64::from(ctx.game.roll(8));
                ctx.game.enemy = Some(Enemy {
                    name: "ICE".to_owned(),
                    hp,
                });
                ctx.out.write(&format!(
                    "breach -> {} (enemy HP: {hp})",
                    ctx.game.target().name
                ));
            }
            Effect::Scan => {
                ctx.out
                    .write("scanned: a vulnerability window opens briefly");
            }
            Effect::Inject { payload, stacks } => {
                let damage = payload.damage(*stacks);
                let enemy = ctx.game.enemy.as_mut().ok_or(EffectError::NoEnemy)?;
                enemy.hp -= damage;
                let remaining = enemy.hp;
                ctx.out.write(&format!(
                    "inject {payload} x{stacks} -> {damage} damage (enemy HP: {})",
                    remaining.max(0)
                ));
                if remaining <= 0 {
                    win(ctx);
                }
            }
            Effect::Firewall { up } => {
                let gain = if *up { 6 } else { 4 };
                let player = &mut ctx.game.player;
                player.shield = (player.shield + gain).min(SHIELD_CAP);
                ctx.out
                    .write(&format!("shield +{gain} (total: {})", player.shield));
            }
            Effect::Lag => {
                if ctx.game.enemy.is_none() {
                    return Err(EffectError::NoEnemy);
                }
                ctx.out.write("enemy telegraph slowed");
            }
            Effect::Overclock => {
                ctx.out.write("overclocked: next cast primed");
            }
            Effect::Cool => {
                ctx.out.write(&format!(
                    "cooled: heat {:.1}",
                    ctx.ledger.value(Resource::Heat)
                ));
            }
            Effect::Notice(text) => ctx.out.write(text),
        }
        Ok(())
    }
}

/// Pay out the encounter and clear it.
///
/// Vault wins inside the weak window pay 1.5× and raise a toast.
fn win(ctx: &mut EffectContext<'_>) {
    let mut gain = 25 + u64::from(ctx.game.roll(25));
    let target = ctx.game.target();
    if target.kind == NodeKind::Vault && target.weak_window.is_open(ctx.now) {
        gain = gain * 3 / 2;
        ctx.out
            .toast(&format!("{}: ambush bonus! credits x1.5", target.name));
    }
    let player = &mut ctx.game.player;
    player.credits += gain;
    ctx.out.write(&format!(
        "victory! credits +{gain} (total {})",
        player.credits
    ));
    ctx.game.enemy = None;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::NodeMap;
    use crate::output::RecordingSink;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_owned()).collect()
    }

    fn apply_at(
        effect: &Effect,
        game: &mut GameState,
        now: Duration,
    ) -> (Result<(), EffectError>, RecordingSink) {
        let ledger = Ledger::default();
        let mut sink = RecordingSink::new();
        let result = {
            let mut ctx = EffectContext {
                now,
                game,
                ledger: &ledger,
                out: &mut sink,
            };
            effect.apply(&mut ctx)
        };
        (result, sink)
    }

    // -- parsing --------------------------------------------------------------

    #[test]
    fn inject_defaults_to_single_leak() {
        let effect = EffectKind::Inject.parse(&[]).unwrap();
        assert_eq!(
            effect,
            Effect::Inject {
                payload: Payload::Leak,
                stacks: 1
            }
        );
    }

    #[test]
    fn inject_parses_flags() {
        let effect = EffectKind::Inject
            .parse(&args(&["--payload", "burn", "--stack", "3"]))
            .unwrap();
        assert_eq!(
            effect,
            Effect::Inject {
                payload: Payload::Burn,
                stacks: 3
            }
        );
    }

    #[test]
    fn inject_rejects_bad_arguments() {
        assert!(EffectKind::Inject
            .parse(&args(&["--payload", "worm"]))
            .unwrap_err()
            .contains("unknown payload"));
        assert!(EffectKind::Inject
            .parse(&args(&["--stack", "many"]))
            .unwrap_err()
            .contains("expects a number"));
        assert!(EffectKind::Inject
            .parse(&args(&["--payload"]))
            .unwrap_err()
            .contains("needs a value"));
    }

    #[test]
    fn non_positive_stacks_become_one() {
        for raw in ["0", "-2"] {
            let effect = EffectKind::Inject.parse(&args(&["--stack", raw])).unwrap();
            assert_eq!(
                effect,
                Effect::Inject {
                    payload: Payload::Leak,
                    stacks: 1
                }
            );
        }
    }

    #[test]
    fn firewall_variants() {
        assert_eq!(
            EffectKind::Firewall.parse(&[]).unwrap(),
            Effect::Firewall { up: true }
        );
        assert_eq!(
            EffectKind::Firewall.parse(&args(&["low"])).unwrap(),
            Effect::Firewall { up: false }
        );
    }

    // -- application ----------------------------------------------------------

    #[test]
    fn breach_spawns_enemy_once() {
        let mut game = GameState::new(7, NodeMap::demo());
        let (result, sink) = apply_at(&Effect::Breach, &mut game, Duration::ZERO);
        result.unwrap();
        let hp = game.enemy.as_ref().unwrap().hp;
        assert!((18..26).contains(&hp));
        assert!(sink.has_line_containing("breach -> Entry"));

        let (result, _) = apply_at(&Effect::Breach, &mut game, Duration::ZERO);
        assert_eq!(result, Err(EffectError::AlreadyEngaged("ICE".to_owned())));
    }

    #[test]
    fn inject_without_enemy_fails() {
        let mut game = GameState::new(7, NodeMap::demo());
        let effect = Effect::Inject {
            payload: Payload::Leak,
            stacks: 1,
        };
        let (result, _) = apply_at(&effect, &mut game, Duration::ZERO);
        assert_eq!(result, Err(EffectError::NoEnemy));
    }

    #[test]
    fn killing_blow_pays_credits() {
        let mut game = GameState::new(7, NodeMap::demo());
        game.enemy = Some(Enemy {
            name: "ICE".to_owned(),
            hp: 5,
        });
        let effect = Effect::Inject {
            payload: Payload::Burn,
            stacks: 1,
        };
        let (result, sink) = apply_at(&effect, &mut game, Duration::ZERO);
        result.unwrap();

        assert!(game.enemy.is_none());
        assert!((25..50).contains(&game.player.credits));
        assert!(sink.has_line_containing("enemy HP: 0"));
        assert!(sink.has_line_containing("victory!"));
        assert!(sink.toasts().is_empty());
    }

    #[test]
    fn vault_win_in_weak_window_gets_bonus() {
        let mut plain = GameState::new(11, NodeMap::demo().starting_at("node-b").unwrap());
        let mut bonus = GameState::new(11, NodeMap::demo().starting_at("node-b").unwrap());
        for game in [&mut plain, &mut bonus] {
            game.enemy = Some(Enemy {
                name: "ICE".to_owned(),
                hp: 1,
            });
        }
        let effect = Effect::Inject {
            payload: Payload::Leak,
            stacks: 1,
        };

        // Window for vault-alpha is open in [8s, 12s) of every 16s cycle.
        let (_, plain_sink) = apply_at(&effect, &mut plain, Duration::from_secs(1));
        let (_, bonus_sink) = apply_at(&effect, &mut bonus, Duration::from_secs(9));

        assert_eq!(bonus.player.credits, plain.player.credits * 3 / 2);
        assert!(plain_sink.toasts().is_empty());
        assert_eq!(bonus_sink.toasts().len(), 1);
        assert!(bonus_sink.toasts()[0].contains("ambush bonus"));
    }

    #[test]
    fn firewall_caps_shield() {
        let mut game = GameState::new(1, NodeMap::demo());
        for _ in 0..10 {
            let (result, _) = apply_at(&Effect::Firewall { up: true }, &mut game, Duration::ZERO);
            result.unwrap();
        }
        assert_eq!(game.player.shield, SHIELD_CAP);
    }

    #[test]
    fn lag_requires_enemy() {
        let mut game = GameState::new(1, NodeMap::demo());
        let (result, _) = apply_at(&Effect::Lag, &mut game, Duration::ZERO);
        assert_eq!(result, Err(EffectError::NoEnemy));
    }

    #[test]
    fn notice_writes_text() {
        let mut game = GameState::new(1, NodeMap::demo());
        let (_, sink) = apply_at(&Effect::Notice("ping".to_owned()), &mut game, Duration::ZERO);
        assert_eq!(sink.lines(), vec!["ping"]);
    }
}
