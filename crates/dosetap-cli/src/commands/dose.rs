use clap::Subcommand;
use dosetap_core::window::{closes_at, evaluate, plan_snooze, target_at};
use dosetap_core::DoseAction;
use serde_json::json;

use super::{parse_at, print_json, ActionReport, App, CliResult};

#[derive(Subcommand)]
pub enum DoseCommand {
    /// Take dose 1 and open tonight's window
    Take1 {
        #[arg(long)]
        at: Option<String>,
    },
    /// Take dose 2
    Take2 {
        /// Take it even though the window has closed
        #[arg(long = "override")]
        override_window: bool,
        #[arg(long)]
        at: Option<String>,
    },
    /// Skip dose 2 tonight
    Skip {
        #[arg(long)]
        at: Option<String>,
    },
    /// Push the dose 2 reminder back by one snooze step
    Snooze {
        #[arg(long)]
        at: Option<String>,
    },
}

/// Validate, forward, then fold into the stored night.
fn record(app: &App, action: &DoseAction, detail: serde_json::Value) -> CliResult {
    let (key, mut facts) = app.night(action.at())?;
    action.validate(&facts, &app.config.window)?;

    let delivery = app.submit(action.clone())?;
    action.apply_to(&mut facts);
    app.db.save_facts(&key, &facts)?;

    let ctx = evaluate(&facts, &app.config.window, action.at());
    let mut detail = detail;
    detail["phase"] = serde_json::to_value(ctx.phase)?;
    print_json(&ActionReport {
        session_key: &key,
        action,
        delivery,
        detail,
    })
}

pub fn run(command: DoseCommand) -> CliResult {
    let app = App::open()?;
    let window = app.config.window;

    match command {
        DoseCommand::Take1 { at } => {
            let at = parse_at(at.as_deref())?;
            let action = DoseAction::TakeDose1 { at };
            let detail = json!({
                "remind_at": target_at(at, &window),
                "window_closes_at": closes_at(at, &window),
            });
            record(&app, &action, detail)
        }
        DoseCommand::Take2 { override_window, at } => {
            let action = DoseAction::TakeDose2 {
                at: parse_at(at.as_deref())?,
                override_window,
            };
            record(&app, &action, json!({}))
        }
        DoseCommand::Skip { at } => {
            let action = DoseAction::SkipDose {
                at: parse_at(at.as_deref())?,
            };
            record(&app, &action, json!({}))
        }
        DoseCommand::Snooze { at } => {
            let at = parse_at(at.as_deref())?;
            let (_, facts) = app.night(at)?;
            let plan = plan_snooze(&facts, &window, at)?;
            let action = DoseAction::Snooze {
                at,
                minutes: window.snooze_step_minutes,
            };
            record(&app, &action, serde_json::to_value(&plan)?)
        }
    }
}

pub fn wake(at: Option<&str>) -> CliResult {
    let app = App::open()?;
    let action = DoseAction::WakeFinal { at: parse_at(at)? };
    record(&app, &action, json!({}))
}

pub fn check_in(at: Option<&str>) -> CliResult {
    let app = App::open()?;
    let action = DoseAction::CheckIn { at: parse_at(at)? };
    record(&app, &action, json!({}))
}
