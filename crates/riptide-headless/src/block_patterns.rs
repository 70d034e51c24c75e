//! URL/resource classification regexes used by the route interceptor (§6).

use once_cell::sync::Lazy;
use regex::Regex;

/// Analytics/ads CDNs plus video-preview extensions, matched against the
/// full request URL, case-insensitively.
pub static BLOCK_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)google-analytics\.com|googletagmanager\.com|facebook\.(com|net)|doubleclick\.net|analytics\.|hotjar\.com|clarity\.ms|sentry\.io|segment\.(com|io)|mixpanel\.com|amplitude\.com|newrelic\.com|bugsnag\.com|datadog|ads\.|adserver\.|pagead|prebid|adsystem|adservice|\.(mp4|webm)(\?|$)",
    )
    .expect("block pattern is a valid regex")
});

/// Substrings that mark a script URL as belonging to the video player,
/// exempting it from the block pattern.
pub static PLAYER_ALLOWLIST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)player|jwplayer|plyr|video|embed|hls|dash|stream")
        .expect("player allowlist is a valid regex")
});

/// Telemetry beacons fired via xhr/fetch.
pub static TELEMETRY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)analytics|tracking|beacon|metrics|telemetry|collect|log|event")
        .expect("telemetry pattern is a valid regex")
});

/// Ordered play-button selectors, coaxed in this order until one is clicked.
pub const PLAY_BUTTON_SELECTORS: &[&str] = &[
    ".jw-icon-playback",
    ".jw-display-icon-container",
    ".vjs-big-play-button",
    "[aria-label=\"Play\"]",
    ".play-button",
    ".plyr__control--overlaid",
    "video",
    "[class*=\"play\"]",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_known_analytics_hosts() {
        assert!(BLOCK_PATTERN.is_match("https://www.google-analytics.com/collect"));
        assert!(BLOCK_PATTERN.is_match("https://stats.doubleclick.net/x"));
        assert!(BLOCK_PATTERN.is_match("https://cdn.example.com/preview.mp4?x=1"));
    }

    #[test]
    fn does_not_block_manifest_or_player_assets() {
        assert!(!BLOCK_PATTERN.is_match("https://cdn.example.com/stream.m3u8"));
        assert!(!BLOCK_PATTERN.is_match("https://cdn.example.com/jwplayer.js"));
    }

    #[test]
    fn player_allowlist_matches_expected_substrings() {
        assert!(PLAYER_ALLOWLIST.is_match("https://cdn.example.com/jwplayer.js"));
        assert!(PLAYER_ALLOWLIST.is_match("https://cdn.example.com/hls.min.js"));
        assert!(!PLAYER_ALLOWLIST.is_match("https://cdn.example.com/app.js"));
    }

    #[test]
    fn telemetry_pattern_matches_common_beacon_paths() {
        assert!(TELEMETRY_PATTERN.is_match("https://cdn.example.com/collect?x=1"));
        assert!(TELEMETRY_PATTERN.is_match("https://cdn.example.com/beacon"));
        assert!(!TELEMETRY_PATTERN.is_match("https://cdn.example.com/api/data"));
    }

    #[test]
    fn play_button_selectors_are_ordered_per_spec() {
        assert_eq!(PLAY_BUTTON_SELECTORS[0], ".jw-icon-playback");
        assert_eq!(PLAY_BUTTON_SELECTORS.last(), Some(&"[class*=\"play\"]"));
    }
}
