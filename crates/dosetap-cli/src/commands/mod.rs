pub mod config;
pub mod dose;
pub mod log;
pub mod session;
pub mod status;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dosetap_core::queue::AlwaysOnline;
use dosetap_core::{
    ActionQueue, Config, Database, DoseAction, DoseFacts, DosingFacade, FlushStatus,
    HttpTransport, PerformOutcome, SessionRules, SystemClock,
};
use serde::Serialize;

pub type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Parse `--at`, defaulting to now.
pub fn parse_at(at: Option<&str>) -> CliResult<DateTime<Utc>> {
    match at {
        Some(s) => Ok(DateTime::parse_from_rfc3339(s)
            .map_err(|e| format!("invalid --at '{s}': {e}"))?
            .with_timezone(&Utc)),
        None => Ok(Utc::now()),
    }
}

/// How an action left this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    /// No remote configured; stored locally only.
    Local,
    Delivered,
    /// First attempt failed, a retry got through.
    DeliveredAfterRetry,
    /// Every attempt failed; stored locally only.
    Undelivered,
    RateLimited,
}

/// Loaded config, session rules and database.
pub struct App {
    pub config: Config,
    pub rules: SessionRules,
    pub db: Database,
}

impl App {
    pub fn open() -> CliResult<Self> {
        let config = Config::load()?;
        config.validate()?;
        let rules = config.session_rules()?;
        let db = Database::open()?;
        Ok(Self { config, rules, db })
    }

    /// Session key and stored facts for the night containing `at`.
    pub fn night(&self, at: DateTime<Utc>) -> CliResult<(String, DoseFacts)> {
        let key = self.rules.key_for(at);
        let facts = self.db.load_facts(&key)?;
        Ok((key, facts))
    }

    /// Rate-limit and forward `action` to the remote, if one is configured.
    pub fn submit(&self, action: DoseAction) -> CliResult<Delivery> {
        let limiter = Arc::new(self.config.rate_limiter());
        self.db.seed_limiter(&limiter)?;

        let Some(transport) = HttpTransport::from_config(&self.config.remote)? else {
            tracing::debug!(kind = action.kind(), "no remote configured, keeping action local");
            if let DoseAction::LogEvent { name, at } = &action {
                if !limiter.should_allow(name, *at) {
                    return Ok(Delivery::RateLimited);
                }
            }
            return Ok(Delivery::Local);
        };

        let facade = DosingFacade::new(
            Arc::new(transport),
            limiter,
            Arc::new(ActionQueue::new(self.config.queue, Arc::new(AlwaysOnline))),
            Arc::new(SystemClock),
        );

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let delivery = runtime.block_on(async {
            match facade.perform(action).await {
                PerformOutcome::Delivered => Delivery::Delivered,
                PerformOutcome::RateLimited => Delivery::RateLimited,
                PerformOutcome::Queued => {
                    // The queue lives only as long as this process.
                    let report = facade.flush_pending().await;
                    if report.status == FlushStatus::Completed && report.dropped.is_empty() {
                        Delivery::DeliveredAfterRetry
                    } else {
                        Delivery::Undelivered
                    }
                }
            }
        });
        Ok(delivery)
    }
}

/// JSON printed after a recorded action.
#[derive(Serialize)]
pub struct ActionReport<'a, T: Serialize> {
    pub session_key: &'a str,
    pub action: &'a DoseAction,
    pub delivery: Delivery,
    #[serde(flatten)]
    pub detail: T,
}

pub fn print_json<T: Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
