//! Process entry point.
//!
//! Wires a storage backend (PostgreSQL, or an in-memory store under
//! `test_mode`) to the functional core and the transaction coordinator,
//! replays the durable log, and either runs the `test_mode` self-check or
//! serves indefinitely.
//!
//! ## Exit codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | Clean shutdown, or `test_mode` self-check passed |
//! | 1 | Fatal storage error (see [`txn_coordinator::ProcessExitHandler`]) |
//! | 2 | Configuration error (missing `DATABASE_URL` outside `test_mode`) |
//! | 3 | `test_mode` self-check failed |

mod config;
mod self_check;

use std::sync::Arc;

use config::Config;
use subscriptions_demo::effect::NoopEmailSender;
use txn_coordinator::{recover, Coordinator, ProcessExitHandler};
use txn_lss_postgres::PgLss;
use txn_testing::InMemoryLss;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    let config = Config::load();

    let exit_code = if config.test_mode {
        run_test_mode().await
    } else {
        run_server(&config).await
    };

    std::process::exit(exit_code);
}

async fn run_test_mode() -> i32 {
    tracing::info!("starting in test_mode: running self-check against an in-memory store");

    let lss = InMemoryLss::new();
    let mut core = subscriptions_demo::build_core();
    if let Err(err) = recover(&mut core, &lss).await {
        tracing::error!(error = %err, "recovery failed");
        return 1;
    }

    let fatal = Arc::new(ProcessExitHandler);
    let effects = subscriptions_demo::build_effects(NoopEmailSender);
    let (coordinator, handle) = Coordinator::new(core, Box::new(lss), fatal, effects);
    tokio::spawn(coordinator.run());

    match self_check::run(&handle).await {
        Ok(()) => {
            tracing::info!("self-check passed");
            0
        }
        Err(err) => {
            tracing::error!(error = %err, "self-check failed");
            3
        }
    }
}

async fn run_server(config: &Config) -> i32 {
    let Some(database_url) = &config.database_url else {
        tracing::error!("DATABASE_URL is required outside test_mode");
        return 2;
    };

    let lss = match PgLss::connect(database_url).await {
        Ok(lss) => lss,
        Err(err) => {
            tracing::error!(error = %err, "failed to connect to storage");
            return 1;
        }
    };

    let mut core = subscriptions_demo::build_core();
    if let Err(err) = recover(&mut core, &lss).await {
        tracing::error!(error = %err, "recovery failed");
        return 1;
    }

    if config.sendgrid_api_key.is_none() {
        tracing::warn!("SENDGRID_API_KEY not set, outbound email delivery is a no-op");
    }
    // Outbound transport is intentionally not implemented here - see the
    // module doc on `subscriptions_demo::effect::EmailSender`. A real
    // deployment provides its own `EmailSender` wired to SendGrid (or
    // whatever it actually uses) in place of `NoopEmailSender`.
    let fatal = Arc::new(ProcessExitHandler);
    let effects = subscriptions_demo::build_effects(NoopEmailSender);

    let (coordinator, _handle) = Coordinator::new(core, Box::new(lss), fatal, effects);
    tracing::info!("recovery complete, serving");
    coordinator.run().await;
    0
}
