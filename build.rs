// UartTelemetryBridge - Build Script
//
// Emits version info for the User-Agent and sets up the ESP-IDF environment
// when cross-compiling for the device.

use std::process::Command;

fn main() {
    // ESP-IDF environment setup (only meaningful for the device target)
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("espidf") {
        embuild::espidf::sysenv::output();
    }

    // Get git version info
    let version = env!("CARGO_PKG_VERSION");
    let git_hash = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=GIT_HASH={}", git_hash);
    println!("cargo:rustc-env=VERSION_STRING=uart-bridge/{}-g{}", version, git_hash);

    // Collector settings are baked in at build time
    for key in [
        "BRIDGE_COLLECTOR_HOST",
        "BRIDGE_COLLECTOR_PORT",
        "BRIDGE_COLLECTOR_PATH",
        "BRIDGE_TOKEN",
        "BRIDGE_WIFI_SSID",
        "BRIDGE_WIFI_PASSWORD",
        "BRIDGE_HOSTNAME",
    ] {
        println!("cargo:rerun-if-env-changed={}", key);
    }

    // Rebuild if git HEAD changes
    println!("cargo:rerun-if-changed=.git/HEAD");
}
