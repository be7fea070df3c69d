//! Command-line entry point: wires the real adapters into a sync session.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use camino::Utf8PathBuf;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use mockable::DefaultClock;
use ortho_config::OrthoConfig;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use prayer_sync::domain::ports::{GeoFix, GeolocationProvider};
use prayer_sync::domain::{
    LocationRecord, ProxyCommand, SessionPorts, StartupReport, SyncEvent, SyncEventKind,
    SyncSession,
};
use prayer_sync::outbound::connectivity::SharedConnectivity;
use prayer_sync::outbound::geolocation::{FixedGeolocation, UnsupportedGeolocation};
use prayer_sync::outbound::http::ReqwestTransport;
use prayer_sync::outbound::region_catalogue::CatalogueRegions;
use prayer_sync::outbound::response_cache::DirResponseCache;
use prayer_sync::outbound::storage::FileStorage;
use prayer_sync::settings::Settings;

const STORE_DIR: &str = "store";
const RESPONSES_DIR: &str = "responses";

/// Offline-resilient prayer schedule sync.
#[derive(Debug, Parser)]
#[command(name = "prayer-sync", version)]
struct Cli {
    /// Start offline: stored schedules are served whatever their age.
    #[arg(long, global = true)]
    offline: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print today's schedule for the resolved location.
    Today {
        /// Skip memory and cache.
        #[arg(long)]
        refresh: bool,
    },
    /// Print the next and current prayer.
    Next,
    /// Print every day of a month.
    Month { month: u32, year: i32 },
    /// Print the Hijri date for a Gregorian date (default: today).
    Hijri { date: Option<NaiveDate> },
    /// Pin a region and print its schedule.
    Region { id: String },
    /// Run the countdown until interrupted.
    Watch,
    /// Print the offline cache inventory.
    CacheStatus,
    /// Delete every offline cache.
    InvalidateCaches,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .with_writer(io::stderr)
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let cli = Cli::parse();
    // Subcommands are clap's; settings come from env and config files only.
    let settings = Settings::load_from_iter([std::ffi::OsString::from("prayer-sync")])?;
    let session = Arc::new(build_session(&settings, !cli.offline)?);

    match cli.command {
        Command::Today { refresh } => {
            let report = if refresh {
                session.start_refreshed().await
            } else {
                session.start().await
            };
            emit(&startup_view(&report))?;
        }
        Command::Next => {
            let report = session.start().await;
            if let Some(error) = &report.error {
                warn!(code = ?error.code(), reason = %error.message(), "schedule unavailable");
            }
            emit(&json!({
                "location": location_view(&report.location),
                "next": session.schedule().get_next_prayer(),
                "current": session.schedule().get_current_prayer(),
            }))?;
        }
        Command::Month { month, year } => {
            session.start().await;
            let days = session
                .schedule()
                .fetch_monthly_schedule(month, year)
                .await?;
            emit(&days)?;
        }
        Command::Hijri { date } => {
            session.start().await;
            let date = date.unwrap_or_else(|| {
                session
                    .schedule()
                    .current_schedule()
                    .map(|schedule| schedule.gregorian())
                    .unwrap_or_else(|| chrono::Local::now().date_naive())
            });
            let hijri = session.schedule().fetch_hijri_date(date).await?;
            emit(&hijri)?;
        }
        Command::Region { id } => {
            session.start().await;
            let schedule = session.select_region(&id).await?;
            emit(&json!({
                "location": location_view(&session.locations().get_location_fast()),
                "schedule": schedule,
            }))?;
        }
        Command::Watch => watch(&session).await?,
        Command::CacheStatus => {
            session.proxy().activate().await?;
            emit(&session.proxy().status().await?)?;
        }
        Command::InvalidateCaches => {
            let reply = session
                .proxy()
                .handle_command(ProxyCommand::InvalidateAllCaches)
                .await?;
            emit(&reply)?;
        }
    }

    let revalidated = session.proxy().flush_background().await;
    if revalidated > 0 {
        info!(revalidated, "background revalidations finished");
    }
    Ok(())
}

fn build_session(settings: &Settings, online: bool) -> Result<SyncSession> {
    let config = settings.to_session_config()?;
    let storage_dir = utf8_dir(settings.storage_dir())?;
    let region_dir = utf8_dir(settings.region_data_dir())?;

    let geolocation: Arc<dyn GeolocationProvider> = match settings.device_coordinate()? {
        Some(coordinate) => Arc::new(FixedGeolocation::new(GeoFix::new(coordinate))),
        None => Arc::new(UnsupportedGeolocation),
    };
    let ports = SessionPorts {
        transport: Arc::new(ReqwestTransport::new(settings.request_timeout())?),
        storage: Arc::new(FileStorage::open(
            &storage_dir.join(STORE_DIR),
            settings.storage_quota_bytes(),
        )?),
        geolocation,
        regions: Arc::new(CatalogueRegions::from_dir(&region_dir)?),
        connectivity: Arc::new(SharedConnectivity::new(online)),
        response_cache: Arc::new(DirResponseCache::open(&storage_dir.join(RESPONSES_DIR))?),
        clock: Arc::new(DefaultClock),
    };
    Ok(SyncSession::assemble(ports, config))
}

async fn watch(session: &Arc<SyncSession>) -> Result<()> {
    let report = session.start().await;
    if let Some(error) = &report.error {
        warn!(code = ?error.code(), reason = %error.message(), "starting without a schedule");
    }
    let ticks = session
        .events()
        .subscribe(SyncEventKind::CountdownTick, |event| {
            if let SyncEvent::CountdownTick(next) = event {
                info!(
                    prayer = %next.name,
                    at = %next.time,
                    seconds = next.remaining.total_seconds(),
                    "countdown"
                );
            }
            Ok(())
        });
    let reactor = session.spawn_reactor();
    let countdown = session.start_countdown();
    let retried = session.retry_gps_after_render().await;
    if let Some(location) = retried {
        info!(location = %location.display_name(), "location refined after start");
    }

    tokio::signal::ctrl_c().await?;
    countdown.stop();
    reactor.stop();
    session.events().unsubscribe(ticks);
    Ok(())
}

fn utf8_dir(path: PathBuf) -> Result<Utf8PathBuf> {
    Utf8PathBuf::from_path_buf(path)
        .map_err(|path| eyre!("directory {} is not valid UTF-8", path.display()))
}

fn location_view(location: &LocationRecord) -> serde_json::Value {
    json!({
        "name": location.display_name(),
        "source": location.source(),
        "coordinates": location.coordinates(),
        "regencyId": location.regency().map(|region| region.id.clone()),
    })
}

fn startup_view(report: &StartupReport) -> serde_json::Value {
    json!({
        "location": location_view(&report.location),
        "schedule": report.schedule,
        "nextPrayer": report.next_prayer,
        "error": report.error,
    })
}

fn emit<T: Serialize>(value: &T) -> Result<()> {
    let mut out = io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}
