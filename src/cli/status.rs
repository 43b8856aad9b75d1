use crate::db::get_connection;
use crate::error::Result;
use crate::fmt::format_bytes;
use crate::settings::{load_settings, settings_path};
use crate::store::SqliteStore;

pub fn run() -> Result<()> {
    let settings = load_settings();
    let db_path = settings.db_path();
    let not_set = |s: &str| if s.is_empty() { "(not set)".to_string() } else { s.to_string() };

    println!("Owner:      {}", not_set(&settings.owner_id));
    println!("Email:      {}", not_set(&settings.owner_email));
    println!("Settings:   {}", settings_path().display());
    println!("Data dir:   {}", settings.data_dir);
    println!("Database:   {}", db_path.display());
    println!(
        "Batching:   {} per batch, {} ms pause, {} retries",
        settings.batch_size, settings.batch_pause_ms, settings.batch_retries
    );

    if db_path.exists() {
        let size = std::fs::metadata(&db_path)?.len();
        println!("DB size:    {}", format_bytes(size));

        let store = SqliteStore::new(get_connection(&db_path)?);
        println!();
        for (collection, count) in store.collection_counts()? {
            println!("{collection:<22} {count}");
        }
    } else {
        println!();
        println!("Database not found. Run `penny init` to set up.");
    }

    Ok(())
}
