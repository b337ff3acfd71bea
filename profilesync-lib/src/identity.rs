//! Platform normalization and natural-key matching for social links.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::records::SocialLinkRecord;

/// Closed set of social platforms the editor knows about.
///
/// Anything outside the alias table normalizes to [`Platform::Custom`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Instagram,
    Twitter,
    Facebook,
    Tiktok,
    Youtube,
    Linkedin,
    Github,
    Twitch,
    Discord,
    Snapchat,
    Pinterest,
    Reddit,
    Threads,
    Spotify,
    Patreon,
    Website,
    Custom,
}

/// Alias table, keyed by lowercase trimmed input
const ALIASES: &[(&str, Platform)] = &[
    ("instagram", Platform::Instagram),
    ("ig", Platform::Instagram),
    ("insta", Platform::Instagram),
    ("instagram.com", Platform::Instagram),
    ("twitter", Platform::Twitter),
    ("x", Platform::Twitter),
    ("x.com", Platform::Twitter),
    ("twitter.com", Platform::Twitter),
    ("facebook", Platform::Facebook),
    ("fb", Platform::Facebook),
    ("facebook.com", Platform::Facebook),
    ("tiktok", Platform::Tiktok),
    ("tik tok", Platform::Tiktok),
    ("tt", Platform::Tiktok),
    ("tiktok.com", Platform::Tiktok),
    ("youtube", Platform::Youtube),
    ("yt", Platform::Youtube),
    ("youtube.com", Platform::Youtube),
    ("linkedin", Platform::Linkedin),
    ("li", Platform::Linkedin),
    ("linkedin.com", Platform::Linkedin),
    ("github", Platform::Github),
    ("gh", Platform::Github),
    ("github.com", Platform::Github),
    ("twitch", Platform::Twitch),
    ("twitch.tv", Platform::Twitch),
    ("discord", Platform::Discord),
    ("snapchat", Platform::Snapchat),
    ("snap", Platform::Snapchat),
    ("pinterest", Platform::Pinterest),
    ("reddit", Platform::Reddit),
    ("threads", Platform::Threads),
    ("spotify", Platform::Spotify),
    ("patreon", Platform::Patreon),
    ("website", Platform::Website),
    ("web", Platform::Website),
    ("site", Platform::Website),
];

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Instagram => "instagram",
            Platform::Twitter => "twitter",
            Platform::Facebook => "facebook",
            Platform::Tiktok => "tiktok",
            Platform::Youtube => "youtube",
            Platform::Linkedin => "linkedin",
            Platform::Github => "github",
            Platform::Twitch => "twitch",
            Platform::Discord => "discord",
            Platform::Snapchat => "snapchat",
            Platform::Pinterest => "pinterest",
            Platform::Reddit => "reddit",
            Platform::Threads => "threads",
            Platform::Spotify => "spotify",
            Platform::Patreon => "patreon",
            Platform::Website => "website",
            Platform::Custom => "custom",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Normalize loosely typed platform input ("IG", " instagram ", "x.com")
pub fn normalize_platform(raw: &str) -> Platform {
    let key = raw.trim().to_lowercase();
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == key)
        .map(|(_, platform)| *platform)
        .unwrap_or(Platform::Custom)
}

/// Find the first persisted row with the same natural key.
///
/// URLs are compared verbatim: no scheme, trailing slash or query
/// normalization is applied.
pub fn find_match<'a>(
    platform: Platform,
    url: &str,
    persisted: &'a [SocialLinkRecord],
) -> Option<&'a SocialLinkRecord> {
    persisted
        .iter()
        .find(|row| row.url == url && normalize_platform(&row.platform) == platform)
}
