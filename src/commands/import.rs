use crate::cancel::CancellationToken;
use crate::commands::{AppState, CommandError};
use crate::import::{run_import, ActivitySource, ImportOptions, IntervalsSource};
use crate::intervals::IntervalsClient;
use crate::paste::{parse_activity_csv, parse_data_json};
use crate::reconcile::import_records;
use crate::store::ImportGuard;

/// ---------------------------------------------------------------------------
/// intervals.icu Import
/// ---------------------------------------------------------------------------

fn import_options(state: &AppState) -> ImportOptions {
  ImportOptions {
    request_timeout: state.config.http_timeout,
    backoff: state.config.retry_backoff,
    ..ImportOptions::default()
  }
}

/// Import rides from intervals.icu using the configured credentials
pub async fn import_intervals(
  state: &AppState,
  cancel: &CancellationToken,
) -> Result<String, CommandError> {
  let intervals = state
    .config
    .intervals
    .as_ref()
    .ok_or(CommandError::NotConfigured("intervals.icu"))?;
  let client = IntervalsClient::new(intervals, state.config.http_timeout)?;
  let source = IntervalsSource::new(client, intervals.oldest);

  import_from(state, &source, cancel).await
}

/// Run one import from `source` and merge what it produced. A second
/// import or paste started while this one runs is rejected.
pub async fn import_from(
  state: &AppState,
  source: &dyn ActivitySource,
  cancel: &CancellationToken,
) -> Result<String, CommandError> {
  let guard = state.store.begin_import().await?;
  let result = fetch_and_merge(state, source, cancel).await;
  finish_import(guard).await;
  result
}

async fn fetch_and_merge(
  state: &AppState,
  source: &dyn ActivitySource,
  cancel: &CancellationToken,
) -> Result<String, CommandError> {
  let (history, ftp) = state
    .store
    .read(|s| (s.snapshot().history.clone(), s.ftp()))
    .await;

  let mut summary = run_import(source, &history, ftp, import_options(state), cancel).await?;

  let staged = std::mem::take(&mut summary.outcome);
  summary.outcome = state.store.update(|s| Ok(s.apply_import(staged))).await?;
  tracing::info!(
    added = summary.imported(),
    fetch_errors = summary.fetch_errors,
    "Import finished"
  );

  Ok(summary.message(ftp))
}

async fn finish_import(guard: ImportGuard) {
  if let Err(e) = guard.release().await {
    tracing::warn!(error = %e, "Failed to release import lock");
  }
}

/// ---------------------------------------------------------------------------
/// Paste Import
/// ---------------------------------------------------------------------------

/// Import pasted text: a JSON data document replaces levels and/or history,
/// anything else is read as an activity CSV and reconciled. Rejected while
/// another import runs.
pub async fn import_paste(state: &AppState, raw: &str) -> Result<String, CommandError> {
  let guard = state.store.begin_import().await?;
  let result = paste_into_store(state, raw).await;
  finish_import(guard).await;
  result
}

async fn paste_into_store(state: &AppState, raw: &str) -> Result<String, CommandError> {
  if raw.trim_start().starts_with('{') {
    let patch = parse_data_json(raw)?;
    let rides = patch.history.as_ref().map(Vec::len);
    let has_levels = patch.levels.is_some();
    state.store.update(|s| s.apply_paste(patch)).await?;

    return Ok(match (rides, has_levels) {
      (Some(n), true) => format!("Data imported: levels and {} rides", n),
      (Some(n), false) => format!("Data imported: {} rides", n),
      _ => "Data imported: levels".to_string(),
    });
  }

  let parsed = parse_activity_csv(raw)?;
  let skipped_rows = parsed.skipped_rows;

  let applied = state
    .store
    .update(|s| {
      let outcome = import_records(parsed.candidates, &s.snapshot().history, s.ftp());
      Ok(s.apply_import(outcome))
    })
    .await?;

  Ok(format!(
    "Imported {} activities from CSV. Skipped: {} rows missing values, {} without power, {} duplicates.",
    applied.accepted.len(),
    skipped_rows,
    applied.skipped.no_power,
    applied.skipped.duplicate
  ))
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
