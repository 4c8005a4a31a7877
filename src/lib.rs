pub mod config;
pub mod cuisine;
pub mod errors;
pub mod model;
pub mod notion;
pub mod photos;
pub mod pipeline;
pub mod places;
pub mod resolver;
pub mod runlog;
pub mod trigger;

use once_cell::sync::OnceCell;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use config::{AppConfig, PublicAppConfig};
pub use errors::{AppError, AppResult};
pub use model::{DatabaseEntry, EntryTarget, PlaceRecord, PriceTier};
pub use notion::{PageUpdate, SyncAction};
pub use pipeline::{BatchReport, Pipeline};
pub use runlog::RunLog;

pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,gastropath=debug"));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
}
