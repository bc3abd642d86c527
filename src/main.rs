mod pbt_config;
mod pbt_controllers;
mod pbt_fetch;
mod pbt_geocalcs;
mod pbt_models;
mod pbt_queue;
mod pbt_views;

#[cfg(test)]
mod pbt_testing;

use anyhow::Context;
use clap::Parser;
use pbt_config::Config;
use pbt_controllers::{FixedGeolocator, PBTControllers, Trigger};
use pbt_fetch::HttpTransitApi;
use pbt_views::ConsoleTransport;
use std::io::{self, BufRead};
use tokio::sync::mpsc::{self, UnboundedSender};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Set up panic hook for better error messages
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("\n{}", "═".repeat(70));
        eprintln!("PBT crashed");
        eprintln!("{}", "═".repeat(70));
        eprintln!("{}", panic_info);
        eprintln!("\nRe-run with RUST_LOG=debug and report the output if it happens again.");
    }));

    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::parse();
    config.validate().context("Invalid configuration")?;

    let api = HttpTransitApi::new(&config.api_base, config.client_timeout())?;
    let geolocator = FixedGeolocator::new(config.location()?);
    let mut session = PBTControllers::new(api, geolocator, ConsoleTransport, config.session_settings());

    if !config.stops.is_empty() {
        session.handle(Trigger::Ready).await;
        for stop in config.stops {
            session.handle(Trigger::ServiceRequest(stop)).await;
        }
        return Ok(());
    }

    let (triggers, incoming) = mpsc::unbounded_channel();
    triggers
        .send(Trigger::Ready)
        .context("Trigger channel closed before start")?;

    // Blocking stdin reads stay off the runtime thread
    std::thread::spawn(move || read_triggers(triggers));

    session.run(incoming).await;
    Ok(())
}

/// One trigger per stdin line: "ready" for a stop search, anything else is a
/// stop identifier to list services for.
fn read_triggers(triggers: UnboundedSender<Trigger>) {
    for line in io::stdin().lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                log::error!("Failed to read stdin: {}", e);
                break;
            }
        };

        let trigger = match line.trim() {
            "" => continue,
            "ready" => Trigger::Ready,
            text => match text.parse() {
                Ok(identifier) => Trigger::ServiceRequest(identifier),
                Err(e) => {
                    log::warn!("{}", e);
                    continue;
                }
            },
        };

        if triggers.send(trigger).is_err() {
            break;
        }
    }
}
