use dosetap_core::{DoseAction, ValidationError};
use serde_json::json;

use super::{parse_at, print_json, ActionReport, App, CliResult, Delivery};

pub fn run(event: &str, at: Option<&str>) -> CliResult {
    let name = event.trim().to_lowercase();
    if name.is_empty() {
        return Err(ValidationError::InvalidValue {
            field: "event".into(),
            message: "event name is empty".into(),
        }
        .into());
    }

    let app = App::open()?;
    let at = parse_at(at)?;
    let key = app.rules.key_for(at);
    let action = DoseAction::LogEvent {
        at,
        name: name.clone(),
    };

    let delivery = app.submit(action.clone())?;
    if delivery != Delivery::RateLimited {
        app.db.record_event(&name, at, &key)?;
    }

    let logged_tonight = app.db.events_for_session(&key)?.len();
    print_json(&ActionReport {
        session_key: &key,
        action: &action,
        delivery,
        detail: json!({ "events_tonight": logged_tonight }),
    })
}
