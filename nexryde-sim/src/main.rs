use std::{sync::Arc, time::Duration};

use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use log::{error, info};
use uuid::Uuid;

use nexryde_logic::{
    FALLBACK_CENTER, LivePositionSet, Location, LocationStore, MarkerReconciler, MatchQuery,
    ProviderCandidate, Role, TrackingScope, TrackingSession, TrackingSettings, VehicleClass,
    directions_url, rank_drivers,
};
use nexryde_sim::{LogSender, LogSurface, SimGeo, demo_details, prelude::*};
use nexryde_store::RestStore;

#[derive(Parser)]
#[command(about = "Exercise the live tracking stack against a position store")]
struct Cli {
    /// Track within a single trip instead of the global feed
    #[arg(long)]
    trip: Option<Uuid>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum Vehicle {
    Pragia,
    Taxi,
    Shuttle,
}

impl From<Vehicle> for VehicleClass {
    fn from(value: Vehicle) -> Self {
        match value {
            Vehicle::Pragia => VehicleClass::Pragia,
            Vehicle::Taxi => VehicleClass::Taxi,
            Vehicle::Shuttle => VehicleClass::Shuttle,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate a fleet of drivers circling the city center
    Fleet {
        /// Number of drivers to simulate
        #[arg(long, default_value_t = 3)]
        drivers: u32,
        /// Vehicle class the fleet drives
        #[arg(long, value_enum, default_value = "taxi")]
        vehicle: Vehicle,
    },
    /// Request a pickup and print the ranked drivers
    Request {
        #[arg(long, allow_hyphen_values = true, default_value_t = FALLBACK_CENTER.lat)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true, default_value_t = FALLBACK_CENTER.lng)]
        lng: f64,
        /// Preferred vehicle class
        #[arg(long, value_enum)]
        vehicle: Option<Vehicle>,
        /// Enforce a hard service radius in km instead of soft penalties
        #[arg(long)]
        radius: Option<f64>,
    },
    /// Follow the live position set and narrate marker updates
    Watch {
        /// How long to watch, in seconds
        #[arg(long, default_value_t = 30)]
        seconds: u64,
    },
}

#[tokio::main]
async fn main() -> Result {
    colog::init();

    let cli = Cli::parse();
    let scope = cli
        .trip
        .map(TrackingScope::Trip)
        .unwrap_or(TrackingScope::Global);

    match cli.command {
        Commands::Fleet { drivers, vehicle } => run_fleet(scope, drivers, vehicle.into()).await,
        Commands::Request {
            lat,
            lng,
            vehicle,
            radius,
        } => run_request(scope, Location::new(lat, lng), vehicle.map(Into::into), radius).await,
        Commands::Watch { seconds } => run_watch(scope, seconds).await,
    }
}

fn vehicle_label(vehicle: VehicleClass, slot: u32) -> String {
    format!("{vehicle:?} UH-{:02}", slot + 1)
}

async fn run_fleet(scope: TrackingScope, drivers: u32, vehicle: VehicleClass) -> Result {
    let mut sessions = Vec::with_capacity(drivers as usize);
    let mut handles = Vec::with_capacity(drivers as usize);

    for slot in 0..drivers {
        let id = Uuid::new_v4();
        let store = RestStore::connect(id, scope)?;

        // Spread the circuits out so drivers rank differently
        let center = Location::new(
            FALLBACK_CENTER.lat + slot as f64 * 0.004,
            FALLBACK_CENTER.lng - slot as f64 * 0.003,
        );
        let geo = SimGeo::circuit(center, 0.002);

        let session = Arc::new(TrackingSession::new(
            TrackingSettings::default(),
            scope,
            Role::Driver,
            Some(vehicle_label(vehicle, slot)),
            store,
            geo,
            LogSender,
        ));

        info!("Driver {id} on the road as {}", vehicle_label(vehicle, slot));
        sessions.push(session.clone());
        handles.push(tokio::spawn(async move {
            if let Err(why) = session.main_loop().await {
                error!("Driver session failed: {why:?}");
            }
        }));
    }

    info!("Press Ctrl-C to send the fleet home");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown")?;

    for session in &sessions {
        session.stop_tracking().await;
    }
    for handle in handles {
        handle.await.ok();
    }

    Ok(())
}

async fn run_request(
    scope: TrackingScope,
    rider: Location,
    wanted: Option<VehicleClass>,
    radius: Option<f64>,
) -> Result {
    let store = RestStore::connect(Uuid::new_v4(), scope)?;
    let records = store.fetch_all(&scope).await?;
    store.disconnect().await;

    let candidates = records
        .into_iter()
        .filter(|r| r.role == Role::Driver)
        .enumerate()
        .map(|(slot, record)| {
            let vehicle = record
                .vehicle_label
                .as_deref()
                .and_then(VehicleClass::from_label)
                .unwrap_or(VehicleClass::Taxi);
            ProviderCandidate {
                details: demo_details(vehicle, slot as u32),
                record,
            }
        })
        .collect::<Vec<_>>();

    let mut query = MatchQuery::new(rider);
    if let Some(wanted) = wanted {
        query = query.wanting(wanted);
    }
    if let Some(radius) = radius {
        query = query.within(radius);
    }

    let ranked = rank_drivers(&query, &candidates, Utc::now())?;

    if ranked.is_empty() {
        info!("No drivers available right now");
        return Ok(());
    }

    for (i, driver) in ranked.iter().enumerate() {
        info!(
            "#{} {} ({:?}) {:.2} km, score {:.1}",
            i + 1,
            driver
                .candidate
                .record
                .vehicle_label
                .as_deref()
                .unwrap_or("unmarked"),
            driver.candidate.details.vehicle,
            driver.distance_km,
            driver.score,
        );
    }

    let best = &ranked[0];
    info!(
        "Pickup navigation: {}",
        directions_url(best.candidate.record.location(), rider, &[])
    );

    Ok(())
}

async fn run_watch(scope: TrackingScope, seconds: u64) -> Result {
    let store = RestStore::connect(Uuid::new_v4(), scope)?;
    let session = Arc::new(TrackingSession::new(
        TrackingSettings::default(),
        scope,
        Role::Passenger,
        None,
        store,
        SimGeo::circuit(FALLBACK_CENTER, 0.0005),
        LogSender,
    ));

    let handle = tokio::spawn({
        let session = session.clone();
        async move { session.main_loop().await }
    });

    let mut surface = LogSurface;
    let mut markers = MarkerReconciler::new();
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let mut last_health = None;

    for _ in 0..seconds {
        ticker.tick().await;

        let snapshot = session.snapshot().await;
        if last_health != Some(snapshot.health) {
            info!("Status: {:?}", snapshot.health);
            last_health = Some(snapshot.health);
        }

        let viewer = viewer_location(&snapshot.positions, snapshot.my_id);
        markers.sync(&snapshot.positions, viewer, &mut surface);
    }

    session.stop_tracking().await;
    handle.await.context("Session task failed")??;

    Ok(())
}

fn viewer_location(positions: &LivePositionSet, my_id: Uuid) -> Option<Location> {
    positions.get(&my_id).map(|r| r.location())
}
