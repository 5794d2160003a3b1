use dosetap_core::window::evaluate;
use serde_json::json;

use super::{parse_at, print_json, App, CliResult};

pub fn run(at: Option<&str>) -> CliResult {
    let app = App::open()?;
    let now = parse_at(at)?;
    let (key, facts) = app.night(now)?;
    let ctx = evaluate(&facts, &app.config.window, now);

    print_json(&json!({
        "session_key": key,
        "now": now,
        "phase": ctx.phase,
        "primary": ctx.primary,
        "snooze": ctx.snooze,
        "skip": ctx.skip,
        "elapsed_secs": ctx.elapsed_since_dose1_secs,
        "remaining_secs": ctx.remaining_display_secs(),
        "snooze_count": ctx.snooze_count,
        "errors": ctx.errors,
        "facts": facts,
    }))
}
