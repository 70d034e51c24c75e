//! Fixed browser launch flag set (§6). Kept as a flat list so the adapter
//! has nothing to decide at launch time beyond the optional Chrome binary
//! path.

pub const LAUNCH_ARGS: &[&str] = &[
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--disable-webgl",
    "--disable-accelerated-2d-canvas",
    "--disable-3d-apis",
    "--disable-blink-features=AutomationControlled",
    "--disable-extensions",
    "--disable-background-networking",
    "--disable-sync",
    "--disable-translate",
    "--disable-default-apps",
    "--no-first-run",
    "--disable-component-update",
    "--disable-domain-reliability",
    "--disable-client-side-phishing-detection",
    "--mute-audio",
    "--renderer-process-limit=1",
    "--disable-site-isolation-trials",
    // Explicitly NOT throttling background timers or backgrounding the
    // renderer: the embed page must keep ticking while the controlling
    // window is hidden, or the manifest request may never fire.
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-renderer-backgrounding",
    "--js-flags=--max-old-space-size=128",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disables_sandbox_and_gpu() {
        assert!(LAUNCH_ARGS.contains(&"--no-sandbox"));
        assert!(LAUNCH_ARGS.contains(&"--disable-gpu"));
        assert!(LAUNCH_ARGS.contains(&"--mute-audio"));
    }
}
