use tracing::{error, info};

use folio::{Config, Database, FileRepository, FolderRepository, FolderSort, FsBlobStore};

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::load_with_env("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = folio::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        folio::logging::init_console_only(&config.logging.level);
    }

    if let Err(e) = run(&config).await {
        error!("Startup failed: {e}");
        std::process::exit(1);
    }
}

async fn run(config: &Config) -> folio::Result<()> {
    config.validate()?;

    info!("Folio - nested folder/file library");

    let db = Database::open(&config.database.path, config.database.max_connections).await?;
    let blobs = FsBlobStore::new(&config.files.storage_path)
        .await?
        .with_base_url(&config.files.public_base_url);

    let roots = FolderRepository::new(db.pool())
        .list_by_parent(None, FolderSort::default())
        .await?;
    let root_files = FileRepository::new(db.pool()).count_by_folder(None).await?;
    let removed = blobs.cleanup_empty_dirs().await?;

    info!(
        database = %config.database.path,
        schema_version = db.schema_version().await?,
        storage = %blobs.base_path().display(),
        root_folders = roots.len(),
        root_files,
        empty_shards_removed = removed,
        max_upload_mb = config.files.max_upload_size_mb,
        max_folder_depth = config.library.max_folder_depth,
        "library ready"
    );

    db.close().await;
    Ok(())
}
