mod bootstrap;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use cgm_core::models::{GlucoseRange, TimeWindow};
use cgm_core::settings::{Command, Settings};
use cgm_core::time_utils::TimezoneHandler;
use cgm_data::jsonl_store::JsonlStore;
use cgm_data::normalizer::RecordNormalizer;
use cgm_runtime::service::GlucoseService;
use serde::Serialize;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load_with_last_used();

    bootstrap::ensure_directories()?;
    bootstrap::setup_logging(&settings.log_level, settings.log_file.as_ref())?;

    tracing::info!("CGM Trace v{} starting", env!("CARGO_PKG_VERSION"));

    let tz = TimezoneHandler::new(&settings.timezone);
    let normalizer = RecordNormalizer::new(tz);
    let data_dir = settings.resolved_data_dir();
    tracing::info!("Store: {}, Timezone: {}", data_dir.display(), tz.default_tz());

    let store = JsonlStore::open(&data_dir)
        .with_context(|| format!("opening store at {}", data_dir.display()))?;
    let service = GlucoseService::new(Arc::new(store), normalizer)
        .with_deadline(settings.deadline_secs.map(Duration::from_secs));

    let window = |start: &Option<String>, end: &Option<String>| -> Result<TimeWindow> {
        Ok(TimeWindow::new(
            start.as_deref().map(|s| normalizer.parse_bound(s)).transpose()?,
            end.as_deref().map(|s| normalizer.parse_bound(s)).transpose()?,
        ))
    };

    match &settings.command {
        Command::Ingest {
            user,
            file,
            start,
            end,
        } => {
            let payload = std::fs::read(file)
                .with_context(|| format!("reading upload {}", file.display()))?;
            let report = service
                .ingest(user, payload, start.as_deref(), end.as_deref())
                .await?;
            print_json(&report)?;
        }

        Command::Points {
            user,
            start,
            end,
            limit,
        } => {
            let page = service
                .points(user, window(start, end)?, Some(*limit))
                .await?;
            print_json(&page)?;
        }

        Command::Summary {
            user,
            start,
            end,
            lower,
            upper,
        } => {
            let range = GlucoseRange::new(*lower, *upper)?;
            let summary = service
                .summary(user, window(start, end)?, Some(range))
                .await?;
            print_json(&summary)?;
        }

        Command::Recommend {
            user,
            method,
            lookback,
        } => {
            let assessment = service.recommend(user, method, Some(*lookback)).await?;
            print_json(&assessment)?;
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
