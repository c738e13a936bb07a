//! # Extraction Pipeline
//!
//! One run per profile: snapshot, optional recovery, read, normalize. Runs for
//! different profiles share nothing and execute on scoped worker threads; a
//! failing profile only fails its own outcome.

use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use crossbeam_channel::unbounded;
use tracing::{info, warn};

use crate::browser::{BrowserKind, BrowserProfile, HistoryRecord};
use crate::error::{ExtractError, Result};
use crate::locate;
use crate::normalize::{DateRange, normalize};
use crate::reader;
use crate::recover::{self, RawRecoverer};
use crate::snapshot::{self, Snapshot};

#[derive(Debug, Clone, Copy)]
pub struct ExtractionRequest {
    pub kind: BrowserKind,
    pub range: DateRange,
    pub include_deleted: bool,
    pub keep_working_files: bool,
}

impl ExtractionRequest {
    /// Build a request from calendar dates in local time. An inverted range
    /// fails here, before any store is located or copied.
    pub fn from_dates(
        kind: BrowserKind,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        include_deleted: bool,
    ) -> Result<Self> {
        Ok(Self {
            kind,
            range: DateRange::from_dates(start, end, &Local)?,
            include_deleted,
            keep_working_files: false,
        })
    }
}

pub struct EngineContext<'a> {
    pub working_dir: PathBuf,
    pub recoverer: &'a dyn RawRecoverer,
}

#[derive(Debug, Clone, Default)]
pub struct StoreLocations {
    pub webkit_history: Option<PathBuf>,
    pub gecko_profiles_root: Option<PathBuf>,
    pub gecko_store_file_name: String,
}

#[derive(Debug, Clone)]
pub struct ProfileExtraction {
    pub profile: BrowserProfile,
    pub records: Vec<HistoryRecord>,
    pub recovered: bool,
    pub snapshot_sha256: String,
}

#[derive(Debug)]
pub struct ProfileOutcome {
    pub kind: BrowserKind,
    /// `None` when no store was found at all.
    pub store_path: Option<PathBuf>,
    pub result: Result<ProfileExtraction>,
}

pub fn discover(kind: BrowserKind, locations: &StoreLocations) -> Vec<BrowserProfile> {
    match kind {
        BrowserKind::WebKit => locations
            .webkit_history
            .as_deref()
            .and_then(locate::locate_webkit_profile)
            .into_iter()
            .collect(),
        BrowserKind::Gecko => match locations.gecko_profiles_root.as_deref() {
            Some(root) => {
                locate::locate_gecko_profiles(root, &locations.gecko_store_file_name).collect()
            }
            None => Vec::new(),
        },
    }
}

/// Locate every store for the requested browser and extract each one.
pub fn run(
    request: &ExtractionRequest,
    ctx: &EngineContext<'_>,
    locations: &StoreLocations,
    workers: usize,
) -> Vec<ProfileOutcome> {
    let profiles = discover(request.kind, locations);
    if profiles.is_empty() {
        let searched = match request.kind {
            BrowserKind::WebKit => locations.webkit_history.as_deref(),
            BrowserKind::Gecko => locations.gecko_profiles_root.as_deref(),
        };
        let what = searched
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "no conventional location on this platform".to_string());
        return vec![ProfileOutcome {
            kind: request.kind,
            store_path: None,
            result: Err(ExtractError::NotFound(format!(
                "{} history database ({what})",
                request.kind.display_name()
            ))),
        }];
    }
    info!(
        "found {} {} profile(s)",
        profiles.len(),
        request.kind.display_name()
    );
    extract_all(profiles, request, ctx, workers)
}

/// Extract `profiles` on up to `workers` threads. Outcomes keep input order.
pub fn extract_all(
    profiles: Vec<BrowserProfile>,
    request: &ExtractionRequest,
    ctx: &EngineContext<'_>,
    workers: usize,
) -> Vec<ProfileOutcome> {
    let total = profiles.len();
    let workers = workers.clamp(1, total.max(1));
    let (job_tx, job_rx) = unbounded::<(usize, BrowserProfile)>();
    let (result_tx, result_rx) = unbounded::<(usize, ProfileOutcome)>();
    for job in profiles.into_iter().enumerate() {
        let _ = job_tx.send(job);
    }
    drop(job_tx);

    std::thread::scope(|scope| {
        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            scope.spawn(move || {
                for (index, profile) in job_rx {
                    let result = extract_profile(&profile, request, ctx);
                    if let Err(err) = &result {
                        warn!("{} failed: {err}", profile.store_path.display());
                    }
                    let outcome = ProfileOutcome {
                        kind: profile.kind,
                        store_path: Some(profile.store_path),
                        result,
                    };
                    let _ = result_tx.send((index, outcome));
                }
            });
        }
    });
    drop(result_tx);

    let mut outcomes: Vec<_> = result_rx.into_iter().collect();
    outcomes.sort_by_key(|(index, _)| *index);
    outcomes.into_iter().map(|(_, outcome)| outcome).collect()
}

/// One complete extraction run for a single store.
pub fn extract_profile(
    profile: &BrowserProfile,
    request: &ExtractionRequest,
    ctx: &EngineContext<'_>,
) -> Result<ProfileExtraction> {
    let snap = snapshot::snapshot(&profile.store_path, profile.kind, &ctx.working_dir)?;
    let result = snap
        .sha256()
        .and_then(|sha256| read_snapshot(&snap, profile.kind, request, ctx).map(|r| (sha256, r)));
    if !request.keep_working_files {
        discard(snap.remove(), &snap.working_path);
    }
    let (snapshot_sha256, (records, recovered)) = result?;

    info!(
        "{} {}: {} record(s){} snapshot_sha256={}",
        profile.kind.display_name(),
        profile.store_path.display(),
        records.len(),
        if recovered { " incl. recovered" } else { "" },
        snapshot_sha256
    );
    Ok(ProfileExtraction {
        profile: profile.clone(),
        records,
        recovered,
        snapshot_sha256,
    })
}

fn read_snapshot(
    snap: &Snapshot,
    kind: BrowserKind,
    request: &ExtractionRequest,
    ctx: &EngineContext<'_>,
) -> Result<(Vec<HistoryRecord>, bool)> {
    if !request.include_deleted {
        let rows = reader::read_rows(&snap.working_path, kind)?;
        return Ok((normalize(rows, kind, &request.range).collect(), false));
    }

    let store = recover::recover(snap, ctx.recoverer)?;
    let rows = reader::read_rows(&store.store_path, kind);
    if !request.keep_working_files {
        discard(store.remove(), &store.store_path);
    }
    Ok((normalize(rows?, kind, &request.range).collect(), true))
}

fn discard(result: Result<()>, path: &Path) {
    if let Err(err) = result {
        warn!("could not remove working file {}: {err}", path.display());
    }
}

/// Interleave per-profile sequences (each newest first) into one sequence,
/// newest first. Ties keep profile order.
pub fn merge_newest_first(per_profile: Vec<Vec<HistoryRecord>>) -> Vec<HistoryRecord> {
    if per_profile.len() == 1 {
        return per_profile.into_iter().flatten().collect();
    }
    let mut merged: Vec<_> = per_profile.into_iter().flatten().collect();
    merged.sort_by(|a, b| b.visited_at.cmp(&a.visited_at));
    merged
}
