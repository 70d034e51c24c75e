use rand::seq::SliceRandom;

/// Recent, plausible Chrome-on-Windows user-agent strings. A small pool is
/// enough to avoid always presenting the exact same fingerprint without
/// pretending to model a full device/UA corpus.
const STEALTH_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
];

/// Picks one stealth user-agent at random for a new extraction context.
pub fn stealth_user_agent() -> &'static str {
    STEALTH_USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(STEALTH_USER_AGENTS[0])
}
