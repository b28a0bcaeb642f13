//! Poke at an InstantBackend project from the command line.
//!
//! Loads `.env` automatically if present, otherwise reads from the environment.
//! Commands other than `login`, `password` and `decode` need
//! `INSTANTBACKEND_TOKEN` (print one with `login`).
//!
//! ```bash
//! cargo run --example dashboard -- login ada 'Str0ng!Passw0rd'
//! cargo run --example dashboard -- usage
//! cargo run --example dashboard -- collections
//! cargo run --example dashboard -- plan
//! cargo run --example dashboard -- password 'hunter2'
//! cargo run --example dashboard -- decode eyJhbG...
//! ```

use std::sync::Arc;

use instantbackend::{
    decode_jwt, list_collections, password_checks, upgrade_targets, usage::fetch_usage,
    ClientConfig, MemoryTokenStore, Session, UsageView,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Load .env if present; silently ignore if absent.
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "instantbackend=info".into()))
        .init();

    let config = ClientConfig::from_env().expect("INSTANTBACKEND_BASE_URL must be a valid URL");

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        usage();
    }

    let store = match std::env::var("INSTANTBACKEND_TOKEN") {
        Ok(token) if !token.is_empty() => MemoryTokenStore::with_token(token),
        _ => MemoryTokenStore::new(),
    };
    let session = Session::new(config, Arc::new(store));

    match args[0].as_str() {
        "login" => {
            let (Some(user), Some(pass)) = (args.get(1), args.get(2)) else { usage() };
            match session.login(user, pass).await {
                Ok(_) => {
                    println!("Signed in as {}\n", session.username().unwrap_or_default());
                    println!("{}", session.token().unwrap_or_default());
                }
                Err(e) if instantbackend::is_email_not_verified(&e) => fail("email not verified, check your inbox"),
                Err(e) => fail(e),
            }
        }
        "usage" => {
            let config = session.config().clone();
            let usage = session
                .run(|client| async move { fetch_usage(&client, &config).await })
                .await
                .unwrap_or_else(|e| fail(e));
            let status = session.refresh_subscription_status(None).await;
            let plan = status.as_ref().and_then(|s| s.resolve_plan(&session.config().plans));
            let view = UsageView::compute(&usage, plan, &session.config().plans);

            println!("  plan     : {}", plan.map(|p| p.to_string()).unwrap_or_else(|| "unknown".into()));
            println!("  requests : {} ({}%)", usage.requests_used, view.requests_percent);
            if let Some(bytes) = usage.storage_bytes_used {
                println!("  storage  : {bytes} bytes ({}%)", view.storage_percent);
            }
            if let Some(cost) = usage.total_cost {
                println!("  cost     : {cost:.4}");
            }
        }
        "collections" => {
            let collections = session
                .run(|client| async move { list_collections(&client).await })
                .await
                .unwrap_or_else(|e| fail(e));
            for c in collections {
                match c.count {
                    Some(n) => println!("  {} ({n})", c.name),
                    None => println!("  {}", c.name),
                }
            }
        }
        "plan" => {
            let Some(status) = session.refresh_subscription_status(None).await else {
                fail(session.take_redirect().map_or("subscription status unavailable".into(), |to| {
                    format!("not signed in, go to {to}")
                }));
            };
            let plan = status.resolve_plan(&session.config().plans);
            println!("  plan     : {}", plan.map(|p| p.to_string()).unwrap_or_else(|| "unknown".into()));
            if let Some(end) = status.current_period_end {
                println!("  renews   : {}", end.format("%Y-%m-%d"));
            }
            let upgrades: Vec<String> = upgrade_targets(plan).iter().map(|p| p.to_string()).collect();
            println!("  upgrades : {}", upgrades.join(", "));
        }
        "password" => {
            let password = args.get(1).unwrap_or_else(|| usage());
            for check in password_checks(password) {
                println!("  [{}] {}", if check.passed { "x" } else { " " }, check.label);
            }
        }
        "decode" => {
            let token = args.get(1).unwrap_or_else(|| usage());
            match decode_jwt(token) {
                Some(c) => {
                    println!("  username : {}", c.username().unwrap_or("-"));
                    println!("  api key  : {}", c.api_key().unwrap_or("-"));
                    if let Some(exp) = c.exp {
                        println!("  exp      : {exp}");
                    }
                }
                None => fail("not a decodable JWT"),
            }
        }
        _ => usage(),
    }
}

fn fail(e: impl std::fmt::Display) -> ! {
    eprintln!("Failed: {e}");
    std::process::exit(1);
}

fn usage() -> ! {
    eprintln!("Usage:");
    eprintln!("  cargo run --example dashboard -- login <username> <password>");
    eprintln!("  cargo run --example dashboard -- usage | collections | plan");
    eprintln!("  cargo run --example dashboard -- password <candidate>");
    eprintln!("  cargo run --example dashboard -- decode <token>");
    std::process::exit(1);
}
