//! One-shot messages carried across a redirect in a cookie.

use serde::{Deserialize, Serialize};
use tower_cookies::{cookie::SameSite, Cookie, Cookies};

pub const FLASH_COOKIE: &str = "eservices_flash";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashLevel {
    Success,
    Info,
    Warning,
    Danger,
}

impl FlashLevel {
    pub fn css_class(&self) -> &'static str {
        match self {
            Self::Success => "alert-success",
            Self::Info => "alert-info",
            Self::Warning => "alert-warning",
            Self::Danger => "alert-danger",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashMessage {
    pub level: FlashLevel,
    pub message: String,
}

fn encode(messages: &[FlashMessage]) -> String {
    let json = serde_json::to_string(messages).unwrap_or_else(|_| "[]".to_string());
    urlencoding::encode(&json).into_owned()
}

fn decode(value: &str) -> Vec<FlashMessage> {
    urlencoding::decode(value)
        .ok()
        .and_then(|json| serde_json::from_str(&json).ok())
        .unwrap_or_default()
}

fn peek(cookies: &Cookies) -> Vec<FlashMessage> {
    cookies
        .get(FLASH_COOKIE)
        .map(|c| decode(c.value()))
        .unwrap_or_default()
}

pub fn push(cookies: &Cookies, level: FlashLevel, message: impl Into<String>) {
    let mut messages = peek(cookies);
    messages.push(FlashMessage {
        level,
        message: message.into(),
    });
    let cookie = Cookie::build((FLASH_COOKIE, encode(&messages)))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();
    cookies.add(cookie);
}

/// Drains the pending messages; they are shown exactly once.
pub fn take(cookies: &Cookies) -> Vec<FlashMessage> {
    let messages = peek(cookies);
    if cookies.get(FLASH_COOKIE).is_some() {
        cookies.remove(Cookie::build(FLASH_COOKIE).path("/").build());
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_value_round_trip() {
        let messages = vec![
            FlashMessage {
                level: FlashLevel::Success,
                message: "Ticket created! Your ticket number is ICT-2025-0001.".into(),
            },
            FlashMessage {
                level: FlashLevel::Danger,
                message: "Invalid; \"quoted\" & spaced".into(),
            },
        ];
        let encoded = encode(&messages);
        assert!(!encoded.contains(';'));
        assert!(!encoded.contains(' '));
        assert_eq!(decode(&encoded), messages);
    }

    #[test]
    fn test_garbage_cookie_yields_nothing() {
        assert!(decode("%%%not-json").is_empty());
    }

    #[test]
    fn test_push_and_take() {
        let cookies = Cookies::default();
        push(&cookies, FlashLevel::Success, "Saved");
        push(&cookies, FlashLevel::Warning, "Careful");
        let taken = take(&cookies);
        assert_eq!(taken.len(), 2);
        assert_eq!(taken[1].level, FlashLevel::Warning);
        assert!(take(&cookies).is_empty());
    }
}
