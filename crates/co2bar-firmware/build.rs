fn main() {
    load_access_point_config();

    // make sure linkall.x is the last linker script (otherwise might cause problems with flip-link)
    println!("cargo:rustc-link-arg=-Tlinkall.x");
}

/// Inject the access point credentials from `.env` or the environment.
/// Environment variables take priority over `.env` values.
fn load_access_point_config() {
    use std::env;
    use std::path::Path;

    println!("cargo:rerun-if-changed=.env");
    println!("cargo:rerun-if-env-changed=AP_SSID");
    println!("cargo:rerun-if-env-changed=AP_PASSWORD");

    if Path::new(".env").exists() {
        match dotenvy::dotenv() {
            Ok(_) => println!("cargo:warning=Loaded .env file"),
            Err(e) => println!("cargo:warning=Failed to load .env file: {}", e),
        }
    }

    let ssid = env::var("AP_SSID")
        .map(|s| s.trim().to_string())
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "co2bar".to_string());
    let password = env::var("AP_PASSWORD")
        .map(|s| s.trim().to_string())
        .unwrap_or_default();

    println!("cargo:rustc-env=AP_SSID={}", ssid);
    println!("cargo:rustc-env=AP_PASSWORD={}", password);

    if password.is_empty() {
        println!("cargo:warning=AP_PASSWORD is empty - access point '{}' will be open", ssid);
    } else if password.len() < 8 {
        println!("cargo:warning=AP_PASSWORD shorter than 8 characters - WPA2 will reject it");
    }
}
