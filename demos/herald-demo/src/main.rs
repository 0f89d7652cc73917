//! Herald Demo Application
//!
//! Demonstrates:
//! - One manager per feature behind a process-wide service holder
//! - Independent observers rendering the same ordered outcomes
//! - Fail-fast validation, backend failures and recovery
//!
//! Configuration comes from an optional JSON file given as the first
//! argument, then `HERALD_*` environment overrides.

mod backend;

use std::fmt::Debug;
use std::sync::Arc;

use herald_runtime::{
    init_logging, observer_fn, spawn_observer, AuthStatus, Credentials, RuntimeConfig, Services,
    ViewModel, ViewState,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use backend::{SimulatedAuth, SimulatedStrings};

fn load_config() -> Result<RuntimeConfig, Box<dyn std::error::Error>> {
    let mut config = match std::env::args().nth(1) {
        Some(path) => RuntimeConfig::from_json_str(&std::fs::read_to_string(path)?)?,
        None => RuntimeConfig::default(),
    };
    config.apply_env()?;
    Ok(config)
}

fn describe<V: Debug>(state: &ViewState<V>) -> String {
    match (&state.value, &state.error) {
        (_, Some(error)) => format!("error: {error}"),
        (Some(value), None) if state.loading => format!("loading... (showing {value:?})"),
        (None, None) if state.loading => "loading...".to_string(),
        (Some(value), None) => format!("{value:?}"),
        (None, None) => "-".to_string(),
    }
}

/// Print every state the view publishes until it goes away
fn render<V>(name: &'static str, mut rx: watch::Receiver<ViewState<V>>) -> JoinHandle<()>
where
    V: Debug + Send + Sync + 'static,
{
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let line = describe(&rx.borrow_and_update());
            println!("  [{name:>8}] {line}");
        }
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    init_logging(&config.log)?;

    println!("╔════════════════════════════════════════════════════════════╗");
    println!("║           Herald Demo - Multicast State Managers           ║");
    println!("╚════════════════════════════════════════════════════════════╝");
    println!();

    let services = Services::install(Services::new(
        Arc::new(SimulatedAuth::new(20..120)),
        Arc::new(SimulatedStrings::new(10..80)),
        &config,
    )?)?;

    // Two renderers over auth, one over strings, plus a log-only observer
    let auth_view = ViewModel::<AuthStatus>::new();
    let header_view = ViewModel::<AuthStatus>::new();
    let greeting_view = ViewModel::<String>::new();
    let renderers = vec![
        render("auth", auth_view.watch()),
        render("header", header_view.watch()),
        render("greeting", greeting_view.watch()),
    ];
    let auth_task = spawn_observer(services.auth.manager(), auth_view);
    let header_task = spawn_observer(services.auth.manager(), header_view);
    let greeting_task = spawn_observer(services.strings.manager(), greeting_view);
    let audit_task = spawn_observer(
        services.auth.manager(),
        observer_fn(|outcome: &herald_core::Outcome<AuthStatus>| {
            info!(outcome = %outcome.kind(), "auth outcome");
        }),
    );

    println!("Restoring session...");
    services.auth.restore().await;

    println!("Signing in without a password...");
    services.auth.sign_in(Credentials::new("ada", "")).await;

    println!("Signing in with the wrong password...");
    services.auth.sign_in(Credentials::new("ada", "difference")).await;

    println!("Signing in...");
    let outcome = services.auth.sign_in(Credentials::new("ada", "analytical")).await;
    if let Some(session) = outcome.value().and_then(AuthStatus::session) {
        println!("Signed in as {}", session.user);
    }

    println!("Fetching strings...");
    services.strings.fetch().await;
    services.strings.fetch_key("farewell").await;
    services.strings.fetch_key("missing").await;

    // The header view leaves early; the others keep receiving
    header_task.shutdown().await;

    println!("Restoring session again...");
    services.auth.restore().await;

    println!("Signing out...");
    services.auth.sign_out().await;

    // Shutdown closes every stream; the observer loops end on their own
    services.shutdown();
    auth_task.join().await;
    greeting_task.join().await;
    audit_task.join().await;
    for renderer in renderers {
        renderer.await?;
    }

    println!("Goodbye!");
    Ok(())
}
