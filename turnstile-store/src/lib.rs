pub mod app_config;
pub mod database;
pub mod event_directory;
pub mod memory;
pub mod order_repo;
pub mod ticket_type_repo;

pub use app_config::Config;
pub use database::DbClient;
pub use event_directory::PgEventDirectory;
pub use memory::InMemoryStore;
pub use order_repo::PgOrderRepository;
pub use ticket_type_repo::PgTicketTypeRepository;
