use clap::Subcommand;
use dosetap_core::Config;
use serde_json::json;

use super::{parse_at, print_json, CliResult};

#[derive(Subcommand)]
pub enum SessionAction {
    /// Session key of the night containing an instant
    Key {
        /// RFC 3339 instant (default: now)
        #[arg(long)]
        at: Option<String>,
    },
    /// Session key a pre-sleep entry made at an instant is filed under
    PreSleepKey {
        #[arg(long)]
        at: Option<String>,
    },
    /// Next rollover strictly after an instant
    NextRollover {
        #[arg(long)]
        after: Option<String>,
    },
}

pub fn run(action: SessionAction) -> CliResult {
    let config = Config::load()?;
    let rules = config.session_rules()?;

    match action {
        SessionAction::Key { at } => {
            let at = parse_at(at.as_deref())?;
            print_json(&json!({
                "at": at,
                "timezone": config.session.timezone,
                "rollover_hour": config.session.rollover_hour.hour(),
                "session_key": rules.key_for(at),
            }))
        }
        SessionAction::PreSleepKey { at } => {
            let at = parse_at(at.as_deref())?;
            print_json(&json!({
                "at": at,
                "pre_sleep_key": rules.pre_sleep_key_for(at),
            }))
        }
        SessionAction::NextRollover { after } => {
            let after = parse_at(after.as_deref())?;
            let next = rules.next_rollover_after(after);
            print_json(&json!({
                "after": after,
                "next_rollover": next,
                "next_session_key": rules.key_for(next),
            }))
        }
    }
}
