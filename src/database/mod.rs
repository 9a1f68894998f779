pub mod connection;
pub mod models;
pub mod repository;

pub use connection::DatabaseConnection;
pub use models::OpportunityRow;
pub use repository::PgOpportunityStore;
