use std::time::{SystemTime, UNIX_EPOCH};

fn main() {
    println!("cargo:rerun-if-changed=.env");

    // Simulator settings may come from an optional .env file
    if let Ok(vars) = dotenvy::dotenv_iter() {
        for (key, value) in vars.flatten() {
            if key.starts_with("METEO_") {
                println!("cargo:rustc-env={key}={value}");
            }
        }
    }

    // Written to the simulated RTC when it reports a power loss
    let build_unix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default();
    println!("cargo:rustc-env=METEO_BUILD_UNIX={build_unix}");
}
