//! Headless scouter.
//!
//! Usage:
//!   scouter <image.jpg>                  Scan one image
//!   scouter <image.jpg> --rotate 90      Rotate clockwise before scanning
//!   scouter --save-key <key>             Store the API key in the OS keychain

use scouter_lib::session::SessionState;
use scouter_lib::settings::{self, Settings};

fn usage() -> ! {
    eprintln!("Usage:");
    eprintln!("  scouter <image.jpg> [--rotate DEG]");
    eprintln!("  scouter --save-key <key>");
    std::process::exit(2);
}

#[tokio::main]
async fn main() {
    scouter_lib::init_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        usage();
    }

    if args[0] == "--save-key" {
        let Some(key) = args.get(1) else { usage() };
        match settings::save_api_key(key) {
            Ok(()) => println!("API key saved to keychain"),
            Err(e) => {
                eprintln!("Failed to save API key: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    let path = &args[0];
    let mut rotation = 0i32;
    let mut rest = args[1..].iter();
    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "--rotate" => {
                rotation = match rest.next().and_then(|v| v.parse().ok()) {
                    Some(deg) => deg,
                    None => usage(),
                };
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                usage();
            }
        }
    }

    let settings = match Settings::from_env() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    if settings.api_key.is_empty() {
        log::warn!("[STARTUP] No API key configured — the request will likely be rejected");
    }

    let snapshot = match scouter_lib::scan_file(path, rotation, &settings).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Scan failed: {}", e);
            std::process::exit(1);
        }
    };

    match snapshot.state {
        SessionState::Settled(_) => {
            println!("{}", snapshot.label);
            println!("Battle power: {}", snapshot.score);
            if !snapshot.rationale.is_empty() {
                println!("{}", snapshot.rationale);
            }
        }
        SessionState::Failed => {
            eprintln!("Scan failed — score {}", snapshot.score);
            std::process::exit(1);
        }
        _ => {
            eprintln!("Could not capture a frame from {}", path);
            std::process::exit(1);
        }
    }
}
