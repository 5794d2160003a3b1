mod identity;

pub use identity::{
    next_rollover, parse_timezone, pre_sleep_key, session_key, tonight_key, RolloverHour,
    SessionRules,
};
