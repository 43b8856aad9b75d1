use std::path::PathBuf;

use crate::db::{get_connection, init_db};
use crate::error::Result;
use crate::settings::{load_settings, save_settings, shellexpand_path};

pub fn run(
    data_dir: Option<String>,
    owner_id: Option<String>,
    owner_email: Option<String>,
) -> Result<()> {
    let mut settings = load_settings();

    if let Some(dir) = data_dir {
        settings.data_dir = shellexpand_path(&dir);
    }
    if let Some(id) = owner_id {
        settings.owner_id = id.trim().to_string();
    }
    if let Some(email) = owner_email {
        settings.owner_email = email.trim().to_string();
    }

    save_settings(&settings)?;

    let resolved = PathBuf::from(&settings.data_dir);
    std::fs::create_dir_all(&resolved)?;

    let conn = get_connection(&settings.db_path())?;
    init_db(&conn)?;

    println!("Initialized penny at {}", resolved.display());
    if settings.owner_id.is_empty() {
        println!("No owner set yet. Pass --owner-id before importing.");
    }
    Ok(())
}
