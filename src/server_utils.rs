use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{SecondsFormat, Utc};

use crate::constants::{CHAT_MAX_CHARS, DEFAULT_RACER_NAME, NAME_MAX_CHARS};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub fn make_id(prefix: &str) -> String {
    let seq = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{seq}")
}

pub fn sanitize_name(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return DEFAULT_RACER_NAME.to_string();
    }
    trimmed.chars().take(NAME_MAX_CHARS).collect()
}

pub fn sanitize_chat(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(CHAT_MAX_CHARS).collect())
}

pub fn hsl_color(hue: f32) -> String {
    format!("hsl({}, 70%, 50%)", hue.rem_euclid(360.0).floor() as u32)
}

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
