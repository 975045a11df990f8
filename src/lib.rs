pub mod aggregate;
pub mod backfill;
pub mod catalog;
pub mod config;
pub mod db;
pub mod enrich;
pub mod feedback;
pub mod fetch;
pub mod http;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod reconcile;

pub use catalog::Catalog;
pub use db::Database;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_accessible_from_crate_root() {
        let db = Database::in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn catalog_accessible_from_crate_root() {
        let catalog = Catalog::new(Database::in_memory().unwrap());
        assert_eq!(catalog.song_count().unwrap(), 0);
    }
}
