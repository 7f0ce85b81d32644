//! The sync run.
//!
//! One run walks `Init → LoadState → Scan → per file (Hash → CompareRemote →
//! Skip | ExtractDelta → Upload → UpdateState) → PersistState`. Files are
//! processed one at a time in scan order. A failing session is counted and
//! left for the next run; only credential, scan and state errors stop the
//! run.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{ApiError, HistoryApi, SyncRequest};
use crate::auth::CredentialProvider;
use crate::sync::delta::extract_delta;
use crate::sync::hash::{has_changed, hash_session};
use crate::sync::normalize::read_messages;
use crate::sync::scanner::scan;
use crate::sync::state::SyncState;
use crate::sync::types::{LogFile, SyncError, SyncResult, SyncSummary};

/// Inputs for a run, resolved from configuration.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Root of the conversation logs.
    pub data_dir: PathBuf,
    pub exclude_patterns: Vec<String>,
    pub machine_id: String,
    pub state_path: PathBuf,
    /// Compute deltas without uploading or saving state.
    pub dry_run: bool,
}

/// Progress notifications, for live output.
#[derive(Debug)]
pub enum SyncEvent<'e> {
    Scanning { root: &'e Path },
    Found { files: usize },
    /// Remote hash count, `None` if the listing failed.
    RemoteHashes { count: Option<usize> },
    Synced { session_id: &'e str, messages: usize },
    WouldSync { session_id: &'e str, messages: usize },
    Failed { session_id: &'e str, error: &'e SyncError },
}

/// What happened to one file.
#[derive(Debug)]
enum FileOutcome {
    Synced { messages: usize },
    Skipped,
    Unchanged,
    Failed(SyncError),
    Cancelled,
}

type ProgressFn<'a> = Box<dyn Fn(&SyncEvent<'_>) + 'a>;

/// Orchestrates a sync run against a [`HistoryApi`].
pub struct SyncEngine<'a, A> {
    api: &'a A,
    credentials: &'a dyn CredentialProvider,
    options: SyncOptions,
    cancel: CancellationToken,
    progress: Option<ProgressFn<'a>>,
}

impl<'a, A: HistoryApi> SyncEngine<'a, A> {
    #[must_use]
    pub fn new(
        api: &'a A,
        credentials: &'a dyn CredentialProvider,
        options: SyncOptions,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            api,
            credentials,
            options,
            cancel,
            progress: None,
        }
    }

    /// Report progress through `f`.
    #[must_use]
    pub fn with_progress(mut self, f: impl Fn(&SyncEvent<'_>) + 'a) -> Self {
        self.progress = Some(Box::new(f));
        self
    }

    #[must_use]
    pub const fn options(&self) -> &SyncOptions {
        &self.options
    }

    fn emit(&self, event: &SyncEvent<'_>) {
        if let Some(progress) = &self.progress {
            progress(event);
        }
    }

    /// Run one sync pass.
    ///
    /// State is saved at the end even when sessions failed; after an
    /// interrupt the save is best effort and the summary is marked
    /// `cancelled`. Dry runs never save.
    ///
    /// # Errors
    ///
    /// Returns the fatal [`SyncError`] that stopped the run: no credentials,
    /// unreadable scan root or state file, cancellation before any file was
    /// processed, or a failed final save.
    pub async fn run(&self) -> SyncResult<SyncSummary> {
        let token = self.credentials.bearer_token()?;

        let mut state = SyncState::load(&self.options.state_path)?;
        debug!(
            sessions = state.sessions.len(),
            path = %self.options.state_path.display(),
            "Loaded sync state"
        );

        self.emit(&SyncEvent::Scanning {
            root: &self.options.data_dir,
        });
        let files = scan(&self.options.data_dir, &self.options.exclude_patterns)?;
        info!(files = files.len(), "Scan complete");
        self.emit(&SyncEvent::Found { files: files.len() });

        let remote = self.remote_hashes(&token).await?;

        let mut summary = SyncSummary {
            scanned: files.len(),
            dry_run: self.options.dry_run,
            ..SyncSummary::default()
        };

        for file in &files {
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            match self.sync_file(file, &remote, &mut state, &token).await {
                FileOutcome::Synced { messages } => {
                    summary.synced += 1;
                    summary.messages += messages;
                }
                FileOutcome::Skipped => summary.skipped += 1,
                FileOutcome::Unchanged => summary.unchanged += 1,
                FileOutcome::Failed(error) => {
                    warn!(session_id = %file.session_id, path = %file.path.display(), %error, "Session not synced");
                    self.emit(&SyncEvent::Failed {
                        session_id: &file.session_id,
                        error: &error,
                    });
                    summary.errors += 1;
                }
                FileOutcome::Cancelled => {
                    summary.cancelled = true;
                    break;
                }
            }
        }

        if self.options.dry_run {
            return Ok(summary);
        }

        if summary.cancelled {
            if let Err(error) = state.save(&self.options.state_path) {
                warn!(%error, "Could not save sync state after interrupt");
            }
            return Ok(summary);
        }

        state.save(&self.options.state_path)?;
        info!(
            synced = summary.synced,
            skipped = summary.skipped,
            errors = summary.errors,
            "Sync complete"
        );
        Ok(summary)
    }

    /// Server hashes by session id. A failed listing is not fatal: every
    /// session then falls back to its watermark.
    async fn remote_hashes(&self, token: &str) -> SyncResult<HashMap<String, String>> {
        match self.api.conversation_hashes(token).await {
            Ok(hashes) => {
                debug!(count = hashes.len(), "Fetched remote hashes");
                self.emit(&SyncEvent::RemoteHashes {
                    count: Some(hashes.len()),
                });
                Ok(hashes)
            }
            Err(ApiError::Cancelled) => Err(SyncError::Cancelled),
            Err(error) => {
                warn!(%error, "Could not fetch remote hashes, syncing by watermark only");
                self.emit(&SyncEvent::RemoteHashes { count: None });
                Ok(HashMap::new())
            }
        }
    }

    async fn sync_file(
        &self,
        file: &LogFile,
        remote: &HashMap<String, String>,
        state: &mut SyncState,
        token: &str,
    ) -> FileOutcome {
        let messages = match read_messages(&file.path) {
            Ok(messages) => messages,
            Err(e) => return FileOutcome::Failed(e),
        };

        let local_hash = match hash_session(&file.session_id, &file.project_path, &messages) {
            Ok(hash) => hash,
            Err(e) => return FileOutcome::Failed(e),
        };

        if !has_changed(&local_hash, remote.get(&file.session_id).map(String::as_str)) {
            debug!(session_id = %file.session_id, "Unchanged on server, skipping");
            return FileOutcome::Skipped;
        }

        let Some(delta) = extract_delta(file, &messages, state.last_synced_uuid(&file.session_id))
        else {
            debug!(session_id = %file.session_id, "No messages past watermark");
            return FileOutcome::Unchanged;
        };

        if self.options.dry_run {
            self.emit(&SyncEvent::WouldSync {
                session_id: &delta.session_id,
                messages: delta.messages.len(),
            });
            return FileOutcome::Synced {
                messages: delta.messages.len(),
            };
        }

        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let request = SyncRequest::from_delta(&delta, &self.options.machine_id, timestamp);

        match self.api.upload(token, &request).await {
            Ok(response) if response.success => {
                state.update_session(&delta.session_id, &delta.new_last_uuid, response.processed);
                self.emit(&SyncEvent::Synced {
                    session_id: &delta.session_id,
                    messages: response.processed,
                });
                FileOutcome::Synced {
                    messages: response.processed,
                }
            }
            Ok(_) => FileOutcome::Failed(SyncError::Rejected(delta.session_id)),
            Err(ApiError::Cancelled) => FileOutcome::Cancelled,
            Err(source) => FileOutcome::Failed(SyncError::Delivery {
                session_id: delta.session_id,
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::SyncResponse;
    use crate::auth::{AuthError, StaticToken};
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeApi {
        hashes: HashMap<String, String>,
        fail_listing: bool,
        reject: bool,
        /// Session whose upload cancels the run and waits on it.
        hang_on: Option<String>,
        cancel: CancellationToken,
        uploads: Mutex<Vec<SyncRequest>>,
    }

    impl HistoryApi for FakeApi {
        async fn conversation_hashes(
            &self,
            _token: &str,
        ) -> Result<HashMap<String, String>, ApiError> {
            if self.fail_listing {
                return Err(ApiError::Http {
                    status: 500,
                    body: "down".into(),
                });
            }
            Ok(self.hashes.clone())
        }

        async fn upload(
            &self,
            _token: &str,
            request: &SyncRequest,
        ) -> Result<SyncResponse, ApiError> {
            self.uploads.lock().unwrap().push(request.clone());
            if self.hang_on.as_deref() == Some(request.session_id.as_str()) {
                self.cancel.cancel();
                self.cancel.cancelled().await;
                return Err(ApiError::Cancelled);
            }
            Ok(SyncResponse {
                success: !self.reject,
                processed: request.messages.len(),
                session_id: request.session_id.clone(),
            })
        }
    }

    struct NoCredentials;

    impl CredentialProvider for NoCredentials {
        fn bearer_token(&self) -> Result<String, AuthError> {
            Err(AuthError::NotFound)
        }

        fn source(&self) -> &str {
            "none"
        }
    }

    fn line(uuid: &str, role: &str, text: &str) -> String {
        format!(
            r#"{{"uuid":"{uuid}","timestamp":"2025-01-01T00:00:00Z","type":"{role}","message":{{"role":"{role}","content":"{text}"}}}}"#
        )
    }

    fn write_session(root: &Path, project: &str, session: &str, lines: &[String]) {
        let dir = root.join(project);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{session}.jsonl")), lines.join("\n")).unwrap();
    }

    fn options(dir: &TempDir) -> SyncOptions {
        SyncOptions {
            data_dir: dir.path().join("projects"),
            exclude_patterns: Vec::new(),
            machine_id: "test-machine".into(),
            state_path: dir.path().join("state").join("state.json"),
            dry_run: false,
        }
    }

    fn block_on<F: std::future::Future>(f: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(f)
    }

    #[test]
    fn test_first_run_uploads_everything() {
        let dir = TempDir::new().unwrap();
        let opts = options(&dir);
        write_session(
            &opts.data_dir,
            "proj",
            "s1",
            &[line("m1", "user", "hi"), line("m2", "assistant", "hello")],
        );

        let api = FakeApi::default();
        let creds = StaticToken::new("tok");
        let engine = SyncEngine::new(&api, &creds, opts.clone(), CancellationToken::new());
        let summary = block_on(engine.run()).unwrap();

        assert_eq!(summary.scanned, 1);
        assert_eq!(summary.synced, 1);
        assert_eq!(summary.messages, 2);

        let uploads = api.uploads.lock().unwrap();
        assert_eq!(uploads[0].machine_id, "test-machine");
        assert_eq!(uploads[0].project_path, "/proj");
        assert_eq!(uploads[0].messages.len(), 2);

        let state = SyncState::load(&opts.state_path).unwrap();
        assert_eq!(state.last_synced_uuid("s1"), "m2");
        assert_eq!(state.sessions["s1"].message_count, 2);
    }

    #[test]
    fn test_second_run_sends_only_new_messages() {
        let dir = TempDir::new().unwrap();
        let opts = options(&dir);
        write_session(&opts.data_dir, "proj", "s1", &[line("m1", "user", "hi")]);

        let api = FakeApi::default();
        let creds = StaticToken::new("tok");
        block_on(SyncEngine::new(&api, &creds, opts.clone(), CancellationToken::new()).run())
            .unwrap();

        write_session(
            &opts.data_dir,
            "proj",
            "s1",
            &[line("m1", "user", "hi"), line("m2", "assistant", "yo")],
        );
        let summary =
            block_on(SyncEngine::new(&api, &creds, opts, CancellationToken::new()).run()).unwrap();

        assert_eq!(summary.synced, 1);
        let uploads = api.uploads.lock().unwrap();
        assert_eq!(uploads.len(), 2);
        assert_eq!(uploads[1].messages.len(), 1);
        assert_eq!(uploads[1].messages[0].uuid, "m2");

        let state = SyncState::load(&options(&dir).state_path).unwrap();
        assert_eq!(state.last_synced_uuid("s1"), "m2");
        assert_eq!(state.sessions["s1"].message_count, 1);
    }

    #[test]
    fn test_cancel_during_upload_saves_earlier_sessions() {
        let dir = TempDir::new().unwrap();
        let opts = options(&dir);
        write_session(&opts.data_dir, "proj", "a", &[line("a1", "user", "one")]);
        write_session(&opts.data_dir, "proj", "b", &[line("b1", "user", "two")]);
        write_session(&opts.data_dir, "proj", "c", &[line("c1", "user", "three")]);

        let cancel = CancellationToken::new();
        let api = FakeApi {
            hang_on: Some("b".to_string()),
            cancel: cancel.clone(),
            ..FakeApi::default()
        };
        let creds = StaticToken::new("tok");
        let summary =
            block_on(SyncEngine::new(&api, &creds, opts.clone(), cancel).run()).unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.synced, 1);
        assert_eq!(api.uploads.lock().unwrap().len(), 2);

        let state = SyncState::load(&opts.state_path).unwrap();
        assert_eq!(state.last_synced_uuid("a"), "a1");
        assert_eq!(state.last_synced_uuid("b"), "");
        assert_eq!(state.last_synced_uuid("c"), "");
    }

    #[test]
    fn test_matching_remote_hash_skips() {
        let dir = TempDir::new().unwrap();
        let opts = options(&dir);
        let lines = [line("m1", "user", "hi")];
        write_session(&opts.data_dir, "proj", "s1", &lines);

        let messages = read_messages(&opts.data_dir.join("proj").join("s1.jsonl")).unwrap();
        let hash = hash_session("s1", "/proj", &messages).unwrap();
        let api = FakeApi {
            hashes: HashMap::from([("s1".to_string(), hash)]),
            ..FakeApi::default()
        };

        let creds = StaticToken::new("tok");
        let summary =
            block_on(SyncEngine::new(&api, &creds, opts, CancellationToken::new()).run()).unwrap();

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.synced, 0);
        assert!(api.uploads.lock().unwrap().is_empty());
    }

    #[test]
    fn test_up_to_date_watermark_is_unchanged() {
        let dir = TempDir::new().unwrap();
        let opts = options(&dir);
        write_session(&opts.data_dir, "proj", "s1", &[line("m1", "user", "hi")]);

        let mut state = SyncState::default();
        state.update_session("s1", "m1", 1);
        state.save(&opts.state_path).unwrap();

        let api = FakeApi::default();
        let creds = StaticToken::new("tok");
        let summary =
            block_on(SyncEngine::new(&api, &creds, opts, CancellationToken::new()).run()).unwrap();

        assert_eq!(summary.unchanged, 1);
        assert!(api.uploads.lock().unwrap().is_empty());
    }

    #[test]
    fn test_rejected_upload_keeps_watermark() {
        let dir = TempDir::new().unwrap();
        let opts = options(&dir);
        write_session(&opts.data_dir, "proj", "s1", &[line("m1", "user", "hi")]);

        let api = FakeApi {
            reject: true,
            ..FakeApi::default()
        };
        let creds = StaticToken::new("tok");
        let summary =
            block_on(SyncEngine::new(&api, &creds, opts.clone(), CancellationToken::new()).run())
                .unwrap();

        assert_eq!(summary.errors, 1);
        let state = SyncState::load(&opts.state_path).unwrap();
        assert_eq!(state.last_synced_uuid("s1"), "");
        assert!(!state.last_sync_at.is_empty());
    }

    #[test]
    fn test_empty_session_counts_as_error() {
        let dir = TempDir::new().unwrap();
        let opts = options(&dir);
        write_session(&opts.data_dir, "proj", "empty", &["not json".to_string()]);
        write_session(&opts.data_dir, "proj", "s1", &[line("m1", "user", "hi")]);

        let api = FakeApi::default();
        let creds = StaticToken::new("tok");
        let summary =
            block_on(SyncEngine::new(&api, &creds, opts, CancellationToken::new()).run()).unwrap();

        assert_eq!(summary.errors, 1);
        assert_eq!(summary.synced, 1);
    }

    #[test]
    fn test_listing_failure_falls_back_to_watermark() {
        let dir = TempDir::new().unwrap();
        let opts = options(&dir);
        write_session(&opts.data_dir, "proj", "s1", &[line("m1", "user", "hi")]);

        let api = FakeApi {
            fail_listing: true,
            ..FakeApi::default()
        };
        let creds = StaticToken::new("tok");
        let summary =
            block_on(SyncEngine::new(&api, &creds, opts, CancellationToken::new()).run()).unwrap();

        assert_eq!(summary.synced, 1);
    }

    #[test]
    fn test_missing_credentials_abort_before_scan() {
        let dir = TempDir::new().unwrap();
        let opts = options(&dir);

        let api = FakeApi::default();
        let result =
            block_on(SyncEngine::new(&api, &NoCredentials, opts, CancellationToken::new()).run());
        assert!(matches!(result, Err(SyncError::Credential(_))));
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let dir = TempDir::new().unwrap();
        let opts = options(&dir);

        let api = FakeApi::default();
        let creds = StaticToken::new("tok");
        let result = block_on(SyncEngine::new(&api, &creds, opts, CancellationToken::new()).run());
        assert!(matches!(result, Err(SyncError::Scan { .. })));
    }

    #[test]
    fn test_corrupt_state_is_fatal() {
        let dir = TempDir::new().unwrap();
        let opts = options(&dir);
        write_session(&opts.data_dir, "proj", "s1", &[line("m1", "user", "hi")]);
        fs::create_dir_all(opts.state_path.parent().unwrap()).unwrap();
        fs::write(&opts.state_path, "{").unwrap();

        let api = FakeApi::default();
        let creds = StaticToken::new("tok");
        let result = block_on(SyncEngine::new(&api, &creds, opts, CancellationToken::new()).run());
        assert!(matches!(result, Err(SyncError::State { .. })));
        assert!(api.uploads.lock().unwrap().is_empty());
    }

    #[test]
    fn test_dry_run_uploads_and_saves_nothing() {
        let dir = TempDir::new().unwrap();
        let mut opts = options(&dir);
        opts.dry_run = true;
        write_session(
            &opts.data_dir,
            "proj",
            "s1",
            &[line("m1", "user", "hi"), line("m2", "user", "again")],
        );

        let api = FakeApi::default();
        let creds = StaticToken::new("tok");
        let seen = Mutex::new(Vec::new());
        let engine = SyncEngine::new(&api, &creds, opts.clone(), CancellationToken::new())
            .with_progress(|event| {
                if let SyncEvent::WouldSync { session_id, messages } = event {
                    seen.lock().unwrap().push(((*session_id).to_string(), *messages));
                }
            });
        let summary = block_on(engine.run()).unwrap();

        assert!(summary.dry_run);
        assert_eq!(summary.synced, 1);
        assert_eq!(summary.messages, 2);
        assert!(api.uploads.lock().unwrap().is_empty());
        assert!(!opts.state_path.exists());
        assert_eq!(*seen.lock().unwrap(), vec![("s1".to_string(), 2)]);
    }

    #[test]
    fn test_cancelled_run_stops_and_saves() {
        let dir = TempDir::new().unwrap();
        let opts = options(&dir);
        write_session(&opts.data_dir, "proj", "s1", &[line("m1", "user", "hi")]);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let api = FakeApi::default();
        let creds = StaticToken::new("tok");
        let summary = block_on(SyncEngine::new(&api, &creds, opts.clone(), cancel).run()).unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.processed(), 0);
        assert!(api.uploads.lock().unwrap().is_empty());
        assert!(opts.state_path.exists());
    }
}
