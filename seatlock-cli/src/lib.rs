use anyhow::Context;
use seatlock_core::{DispatchReport, Dispatcher, RequesterDirectory, SeatAllocator, SeatStore, TripId};
use seatlock_store::app_config::Config;
use seatlock_store::{Availability, DbClient, PgRequesterDirectory, PgSeatStore, Provisioner};
use std::sync::Arc;
use tracing::warn;

pub mod report;

/// What a run hands to the report: the claims plus the trip's seat counts
/// read after every claim finished.
#[derive(Debug)]
pub struct RunSummary {
    pub trip_id: TripId,
    pub report: DispatchReport,
    pub availability: Option<Availability>,
}

/// One full run against PostgreSQL. Errors returned here are fatal to the
/// process; per-requester failures are carried inside the report.
pub async fn run(config: &Config) -> anyhow::Result<RunSummary> {
    let db = DbClient::new(&config.database)
        .await
        .context("Failed to connect to database")?;
    db.migrate().await.context("Failed to run migrations")?;

    if let Some(seed) = &config.seed {
        seed_database(&db, config.allocation.trip_id, seed.requesters, seed.seats).await?;
    }

    let directory = PgRequesterDirectory::new(db.pool.clone());
    let trip_id = config.allocation.trip_id;
    let seats = PgSeatStore::new(db.pool.clone());
    let allocator = SeatAllocator::new(seats.clone(), trip_id)
        .with_strategy(config.allocation.lock_strategy);

    let report = allocate_all(&directory, Arc::new(allocator), config.allocation.max_in_flight).await?;

    // The claims are already committed; a failed count only loses a report line.
    let availability = match seats.availability(trip_id).await {
        Ok(availability) => Some(availability),
        Err(e) => {
            warn!(trip_id, "Failed to read seat availability: {}", e);
            None
        }
    };

    Ok(RunSummary { trip_id, report, availability })
}

/// Lists every requester, then claims one seat for each of them concurrently.
pub async fn allocate_all<D, S>(
    directory: &D,
    allocator: Arc<SeatAllocator<S>>,
    max_in_flight: Option<usize>,
) -> anyhow::Result<DispatchReport>
where
    D: RequesterDirectory,
    S: SeatStore + 'static,
{
    let requesters = directory
        .list_requesters()
        .await
        .map_err(|e| anyhow::anyhow!(e))
        .context("Failed to list requesters")?;

    let report = Dispatcher::new(allocator)
        .with_max_in_flight(max_in_flight)
        .run(requesters)
        .await;
    Ok(report)
}

async fn seed_database(db: &DbClient, trip_id: i64, requesters: usize, seats: usize) -> anyhow::Result<()> {
    let provisioner = Provisioner::new(db.pool.clone());
    let names: Vec<String> = (1..=requesters).map(|i| format!("passenger-{}", i)).collect();
    provisioner
        .provision_requesters(&names)
        .await
        .context("Failed to provision requesters")?;
    provisioner
        .provision_seats(trip_id, seats)
        .await
        .context("Failed to provision seats")?;
    Ok(())
}
