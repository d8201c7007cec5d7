//! The command parser (spec.md §4.5). `parse` is a pure function: no
//! engine state, no I/O, just text in and a typed `Command` out. Dispatch to
//! handlers lives in `ambonmud-engine`, which is the thing that actually
//! owns registries, buses, and a clock.

use crate::world::Direction;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Move(Direction),
    Look(Option<String>),

    Say(String),
    Tell { target: String, message: String },
    Gossip(String),
    Emote(String),
    Whisper { target: String, message: String },
    Shout(String),
    Ooc(String),
    GroupTell(String),

    Get(String),
    Drop(String),
    Wear(String),
    Remove(String),
    Inventory,
    Equipment,
    Use(String),
    Give { target: String, item: String },

    Kill(String),
    Flee,
    Cast { spell: String, target: Option<String> },

    Score,
    Balance,
    Achievements,
    Effects,
    Spells,
    QuestLog,

    Buy(String),
    Sell(String),
    ListWares,

    Invite(String),
    Accept(String),
    LeaveGroup,
    Kick(String),
    GroupTellAlias(String),

    Talk(String),
    Choice(u32),

    Who,
    Goto(String),
    Transfer { target: String, destination: String },
    Spawn(String),
    Smite(String),
    StaffKick(String),
    Shutdown,

    Help(Option<String>),
    Clear,
    Colors,
    Ansi(Option<bool>),
    Phase(String),

    /// Recognized verb, but arguments don't match its required shape.
    Invalid { usage: &'static str },
    /// Not a recognized verb at all.
    Unknown(String),
    /// Blank input, or whitespace only.
    Noop,
}

pub fn parse(line: &str) -> Command {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Command::Noop;
    }

    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let verb = parts.next().unwrap_or("").to_ascii_lowercase();
    let rest = parts.next().unwrap_or("").trim().to_string();

    if let Some(direction) = Direction::from_token(&verb) {
        return Command::Move(direction);
    }

    match verb.as_str() {
        "look" | "l" => Command::Look(non_empty(rest)),

        "say" | "'" => non_empty(rest).map(Command::Say).unwrap_or(Command::Invalid {
            usage: "say <message>",
        }),
        "tell" => parse_target_message(&rest, "tell <player> <message>", |target, message| {
            Command::Tell { target, message }
        }),
        "gossip" => non_empty(rest)
            .map(Command::Gossip)
            .unwrap_or(Command::Invalid {
                usage: "gossip <message>",
            }),
        "emote" => non_empty(rest)
            .map(Command::Emote)
            .unwrap_or(Command::Invalid {
                usage: "emote <action>",
            }),
        "whisper" => parse_target_message(&rest, "whisper <player> <message>", |target, message| {
            Command::Whisper { target, message }
        }),
        "shout" => non_empty(rest)
            .map(Command::Shout)
            .unwrap_or(Command::Invalid {
                usage: "shout <message>",
            }),
        "ooc" => non_empty(rest).map(Command::Ooc).unwrap_or(Command::Invalid {
            usage: "ooc <message>",
        }),
        "gtell" => non_empty(rest)
            .map(Command::GroupTellAlias)
            .unwrap_or(Command::Invalid {
                usage: "gtell <message>",
            }),

        "get" | "take" => non_empty(rest).map(Command::Get).unwrap_or(Command::Invalid {
            usage: "get <item>",
        }),
        "drop" => non_empty(rest).map(Command::Drop).unwrap_or(Command::Invalid {
            usage: "drop <item>",
        }),
        "wear" | "wield" => non_empty(rest).map(Command::Wear).unwrap_or(Command::Invalid {
            usage: "wear <item>",
        }),
        "remove" => non_empty(rest)
            .map(Command::Remove)
            .unwrap_or(Command::Invalid {
                usage: "remove <item>",
            }),
        "inventory" | "inv" | "i" => Command::Inventory,
        "equipment" | "eq" => Command::Equipment,
        "use" => non_empty(rest).map(Command::Use).unwrap_or(Command::Invalid {
            usage: "use <item>",
        }),
        "give" => parse_target_message(&rest, "give <player> <item>", |target, item| {
            Command::Give { target, item }
        }),

        "kill" | "attack" | "k" => non_empty(rest).map(Command::Kill).unwrap_or(Command::Invalid {
            usage: "kill <target>",
        }),
        "flee" => Command::Flee,
        "cast" => parse_cast(&rest),

        "score" | "sc" => Command::Score,
        "balance" | "bal" => Command::Balance,
        "achievements" => Command::Achievements,
        "effects" => Command::Effects,
        "spells" => Command::Spells,
        "questlog" | "quests" => Command::QuestLog,

        "buy" => non_empty(rest).map(Command::Buy).unwrap_or(Command::Invalid {
            usage: "buy <item>",
        }),
        "sell" => non_empty(rest).map(Command::Sell).unwrap_or(Command::Invalid {
            usage: "sell <item>",
        }),
        "list" => Command::ListWares,

        "invite" => non_empty(rest)
            .map(Command::Invite)
            .unwrap_or(Command::Invalid {
                usage: "invite <player>",
            }),
        "accept" => non_empty(rest)
            .map(Command::Accept)
            .unwrap_or(Command::Invalid {
                usage: "accept <player>",
            }),
        "leave" => Command::LeaveGroup,
        "kick" => non_empty(rest).map(Command::Kick).unwrap_or(Command::Invalid {
            usage: "kick <player>",
        }),

        "talk" => non_empty(rest).map(Command::Talk).unwrap_or(Command::Invalid {
            usage: "talk <npc>",
        }),
        "choice" => rest
            .parse::<u32>()
            .map(Command::Choice)
            .unwrap_or(Command::Invalid {
                usage: "choice <number>",
            }),

        "who" => Command::Who,
        "goto" => non_empty(rest).map(Command::Goto).unwrap_or(Command::Invalid {
            usage: "goto <room-id>",
        }),
        "transfer" => parse_target_message(&rest, "transfer <player> <room-id>", |target, destination| {
            Command::Transfer { target, destination }
        }),
        "spawn" => non_empty(rest).map(Command::Spawn).unwrap_or(Command::Invalid {
            usage: "spawn <template-id>",
        }),
        "smite" => non_empty(rest).map(Command::Smite).unwrap_or(Command::Invalid {
            usage: "smite <target>",
        }),
        "staffkick" => non_empty(rest)
            .map(Command::StaffKick)
            .unwrap_or(Command::Invalid {
                usage: "staffkick <player>",
            }),
        "shutdown" => Command::Shutdown,

        "help" => Command::Help(non_empty(rest)),
        "clear" | "cls" => Command::Clear,
        "colors" | "colours" => Command::Colors,
        "ansi" => match rest.to_ascii_lowercase().as_str() {
            "" => Command::Ansi(None),
            "on" => Command::Ansi(Some(true)),
            "off" => Command::Ansi(Some(false)),
            _ => Command::Invalid {
                usage: "ansi [on|off]",
            },
        },
        "phase" => non_empty(rest).map(Command::Phase).unwrap_or(Command::Invalid {
            usage: "phase <name>",
        }),

        _ => Command::Unknown(verb),
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn parse_target_message(
    rest: &str,
    usage: &'static str,
    build: impl Fn(String, String) -> Command,
) -> Command {
    let mut parts = rest.splitn(2, char::is_whitespace);
    match (parts.next(), parts.next()) {
        (Some(target), Some(message)) if !target.is_empty() && !message.trim().is_empty() => {
            build(target.to_string(), message.trim().to_string())
        }
        _ => Command::Invalid { usage },
    }
}

fn parse_cast(rest: &str) -> Command {
    if rest.is_empty() {
        return Command::Invalid {
            usage: "cast <spell> [target]",
        };
    }
    let mut parts = rest.splitn(2, char::is_whitespace);
    let spell = parts.next().unwrap_or("").to_string();
    let target = parts.next().map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    Command::Cast { spell, target }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_input_is_noop() {
        assert_eq!(parse(""), Command::Noop);
        assert_eq!(parse("   "), Command::Noop);
    }

    #[test]
    fn unrecognized_verb_is_unknown() {
        assert_eq!(parse("frobnicate"), Command::Unknown("frobnicate".into()));
    }

    #[test]
    fn direction_tokens_normalize_to_move() {
        assert_eq!(parse("north"), Command::Move(Direction::North));
        assert_eq!(parse("n"), Command::Move(Direction::North));
        assert_eq!(parse("SOUTH"), Command::Move(Direction::South));
    }

    #[test]
    fn look_with_and_without_target() {
        assert_eq!(parse("look"), Command::Look(None));
        assert_eq!(parse("look sword"), Command::Look(Some("sword".into())));
    }

    #[test]
    fn say_requires_a_message() {
        assert_eq!(parse("say hello there"), Command::Say("hello there".into()));
        assert_eq!(
            parse("say"),
            Command::Invalid {
                usage: "say <message>"
            }
        );
    }

    #[test]
    fn tell_requires_target_and_message() {
        assert_eq!(
            parse("tell Bob hi there"),
            Command::Tell {
                target: "Bob".into(),
                message: "hi there".into()
            }
        );
        assert_eq!(
            parse("tell Bob"),
            Command::Invalid {
                usage: "tell <player> <message>"
            }
        );
    }

    #[test]
    fn kill_parses_target() {
        assert_eq!(parse("kill rat"), Command::Kill("rat".into()));
    }

    #[test]
    fn cast_with_and_without_target() {
        assert_eq!(
            parse("cast fireball rat"),
            Command::Cast {
                spell: "fireball".into(),
                target: Some("rat".into())
            }
        );
        assert_eq!(
            parse("cast heal"),
            Command::Cast {
                spell: "heal".into(),
                target: None
            }
        );
    }

    #[test]
    fn ansi_accepts_on_off_or_bare() {
        assert_eq!(parse("ansi on"), Command::Ansi(Some(true)));
        assert_eq!(parse("ansi off"), Command::Ansi(Some(false)));
        assert_eq!(parse("ansi"), Command::Ansi(None));
        assert_eq!(
            parse("ansi maybe"),
            Command::Invalid {
                usage: "ansi [on|off]"
            }
        );
    }

    #[test]
    fn choice_parses_number() {
        assert_eq!(parse("choice 2"), Command::Choice(2));
        assert_eq!(
            parse("choice two"),
            Command::Invalid {
                usage: "choice <number>"
            }
        );
    }

    #[test]
    fn verb_is_case_insensitive() {
        assert_eq!(parse("KILL rat"), Command::Kill("rat".into()));
    }
}
