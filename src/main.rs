//! feedboard - View normalized feeds from external data services
//!
//! A command-line application that prints one page of a feed as JSON. Live
//! feeds are fetched per command; Instagram media is served from the local
//! cache and refreshed explicitly or by the `watch` job.

use std::error::Error;
use std::io::{self, Write};
use std::time::Duration;

use clap::Parser;
use serde::Serialize;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use feedboard::cli::{Cli, Command, Settings};
use feedboard::data::{AttendedShowsQuery, PlaylistQuery, RecentTracksQuery};
use feedboard::refresh::{RefreshConfig, RefreshHandle, RefreshMessage};
use feedboard::{respond, serve_cached, Dashboard, OverviewRequest};

/// Sets up logging to stderr so stdout only carries JSON
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("feedboard=info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

/// Writes `value` to stdout as pretty JSON followed by a newline
fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn Error>> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}

async fn run(settings: Settings, command: Command) -> Result<(), Box<dyn Error>> {
    match command {
        Command::Tracks { user, paging } => {
            let query = RecentTracksQuery::new(user)
                .with_page(paging.page)
                .with_limit(paging.page_size);
            let result = settings.lastfm()?.recent_tracks(&query).await;
            print_json(&respond(result, paging.page, paging.page_size, "tracks"))?;
        }
        Command::Shows {
            user,
            page,
            remember_cities,
        } => {
            let query = AttendedShowsQuery::new(user).with_page(page);
            let result = settings.setlist()?.attended_shows(&query).await;
            let response = respond(result, page, 0, "shows");
            print_json(&response)?;

            if remember_cities && !response.envelope.items.is_empty() {
                let mut history = settings.visit_history()?;
                // Oldest first so the newest show ends up at the front
                for show in response.envelope.items.iter().rev() {
                    history.record_show(show)?;
                }
            }
        }
        Command::Videos {
            playlist,
            page_token,
            paging,
        } => {
            let query = PlaylistQuery::new(playlist)
                .with_page_token(page_token, paging.page)
                .with_page_size(paging.page_size);
            let result = settings.youtube()?.playlist_items(&query).await;
            print_json(&respond(result, paging.page, paging.page_size, "videos"))?;
        }
        Command::Media { paging } => {
            let cache = settings.media_cache()?;
            print_json(&serve_cached(&cache, paging.page, paging.page_size))?;
        }
        Command::RefreshMedia => {
            let outcome = settings.media_cache()?.refresh().await;
            print_json(&outcome)?;
            if !outcome.success {
                return Err(outcome.message.into());
            }
        }
        Command::Watch { interval_secs } => {
            watch(settings, Duration::from_secs(interval_secs.max(1))).await?;
        }
        Command::Visit { city, country } => {
            let mut history = settings.visit_history()?;
            history.record_visit(&city, &country)?;
            print_json(&history.list())?;
        }
        Command::Visits => {
            print_json(&settings.visit_history()?.list())?;
        }
        Command::Overview {
            lastfm_user,
            setlist_user,
            playlist,
            paging,
        } => {
            let dashboard = Dashboard::new(&settings)?;
            let request = OverviewRequest {
                tracks: RecentTracksQuery::new(lastfm_user)
                    .with_page(paging.page)
                    .with_limit(paging.page_size),
                shows: AttendedShowsQuery::new(setlist_user).with_page(paging.page),
                videos: PlaylistQuery::new(playlist).with_page_size(paging.page_size),
                media_page: paging.page,
                media_page_size: paging.page_size,
            };
            print_json(&dashboard.overview(&request).await)?;
        }
    }
    Ok(())
}

/// Refreshes the media cache on an interval until Ctrl-C
async fn watch(settings: Settings, interval: Duration) -> Result<(), Box<dyn Error>> {
    let cache = std::sync::Arc::new(settings.media_cache()?);
    let mut handle = RefreshHandle::spawn(
        cache,
        RefreshConfig {
            interval,
            enabled: true,
        },
    );
    info!(interval_secs = interval.as_secs(), "watching media feed");

    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);

    loop {
        tokio::select! {
            message = handle.receiver.recv() => match message {
                Some(RefreshMessage::RefreshStarted) => {}
                Some(RefreshMessage::RefreshCompleted(outcome)) if outcome.success => {
                    info!(message = %outcome.message, "refresh completed");
                }
                Some(RefreshMessage::RefreshCompleted(outcome)) => {
                    warn!(message = %outcome.message, "refresh failed, retrying next interval");
                }
                None => break,
            },
            signal = &mut interrupted => {
                signal?;
                info!("interrupted, stopping");
                break;
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();

    let cli = Cli::parse();
    let settings = Settings::from_cli(&cli);

    if let Err(err) = run(settings, cli.command).await {
        error!(error = %err, "command failed");
        return Err(err);
    }
    Ok(())
}
