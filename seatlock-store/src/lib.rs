pub mod app_config;
pub mod database;
pub mod provision;
pub mod requester_repo;
pub mod seat_repo;

pub use database::DbClient;
pub use provision::Provisioner;
pub use requester_repo::PgRequesterDirectory;
pub use seat_repo::{Availability, PgSeatStore, PgSeatTransaction};
