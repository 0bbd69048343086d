//! Scenario tests for the full provisioning flow against a scripted master,
//! plus the in-memory [`ScriptedClient`] shared by the module tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::client::SaltClient;
use crate::types::{JobHandle, MinionInfo, MinionJob, Submission};
use crate::{ConvergeError, Result};

// ─── ScriptedClient ───────────────────────────────────────────────────────

/// A master that answers each call from a pre-recorded queue.
///
/// An exhausted queue panics, so a test fails loudly if the code under test
/// makes more calls than the scenario allows.
pub(crate) struct ScriptedClient {
    login: Mutex<Option<Result<()>>>,
    minions: Mutex<VecDeque<Result<Option<MinionInfo>>>>,
    submissions: Mutex<VecDeque<Result<Submission>>>,
    lookups: Mutex<VecDeque<Result<Option<Value>>>>,
    calls: Mutex<Vec<&'static str>>,
}

impl ScriptedClient {
    pub(crate) fn new() -> Self {
        Self {
            login: Mutex::new(None),
            minions: Mutex::new(VecDeque::new()),
            submissions: Mutex::new(VecDeque::new()),
            lookups: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn login_result(self, result: Result<()>) -> Self {
        *self.login.lock().unwrap() = Some(result);
        self
    }

    pub(crate) fn minions(
        self,
        script: impl IntoIterator<Item = Result<Option<MinionInfo>>>,
    ) -> Self {
        self.minions.lock().unwrap().extend(script);
        self
    }

    pub(crate) fn submissions(self, script: impl IntoIterator<Item = Result<Submission>>) -> Self {
        self.submissions.lock().unwrap().extend(script);
        self
    }

    pub(crate) fn lookups(self, script: impl IntoIterator<Item = Result<Option<Value>>>) -> Self {
        self.lookups.lock().unwrap().extend(script);
        self
    }

    pub(crate) fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, name: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == name).count()
    }

    pub(crate) fn minion_calls(&self) -> usize {
        self.count("minion")
    }

    pub(crate) fn submit_calls(&self) -> usize {
        self.count("submit_job")
    }

    pub(crate) fn lookup_calls(&self) -> usize {
        self.count("lookup_job")
    }

    fn record(&self, name: &'static str) {
        self.calls.lock().unwrap().push(name);
    }
}

fn next<T>(queue: &Mutex<VecDeque<T>>, what: &str) -> T {
    queue
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| panic!("unscripted call to {what}"))
}

#[async_trait]
impl SaltClient for ScriptedClient {
    async fn login(&self) -> Result<()> {
        self.record("login");
        self.login.lock().unwrap().take().unwrap_or(Ok(()))
    }

    async fn minion(&self, _id: &str) -> Result<Option<MinionInfo>> {
        self.record("minion");
        next(&self.minions, "minion")
    }

    async fn submit_job(&self, _job: &MinionJob) -> Result<Submission> {
        self.record("submit_job");
        next(&self.submissions, "submit_job")
    }

    async fn lookup_job(&self, _jid: &str) -> Result<Option<Value>> {
        self.record("lookup_job");
        next(&self.lookups, "lookup_job")
    }
}

// ─── Fixtures ─────────────────────────────────────────────────────────────

pub(crate) fn registered(id: &str) -> MinionInfo {
    let mut grains = Map::new();
    grains.insert("id".into(), json!(id));
    grains.insert("os".into(), json!("Ubuntu"));
    MinionInfo::with_grains(id, grains)
}

pub(crate) fn async_handle(jid: &str, minion: &str) -> JobHandle {
    JobHandle {
        jid: jid.into(),
        minions: vec![minion.into()],
    }
}

/// A highstate return with units in the given run order.
pub(crate) fn highstate(units: &[(&str, bool, &str)]) -> Value {
    let map: Map<String, Value> = units
        .iter()
        .enumerate()
        .map(|(i, (name, ok, comment))| {
            (
                name.to_string(),
                json!({"result": ok, "comment": comment, "changes": {}, "__run_num__": i}),
            )
        })
        .collect();
    Value::Object(map)
}

// ─── Scenarios ────────────────────────────────────────────────────────────

mod scenarios {
    use super::*;
    use crate::config::ProvisionConfig;
    use crate::provision::provision_with;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn config() -> ProvisionConfig {
        ProvisionConfig {
            address: "http://salt.test:8000".into(),
            username: "test_user".into(),
            password: "test_pwd".into(),
            backend: "pam".into(),
            minion_id: "minion1".into(),
            timeout_minutes: 1,
            interval_secs: 10,
            ..Default::default()
        }
    }

    struct Recorder(Mutex<Vec<String>>);

    impl Recorder {
        fn new() -> Self {
            Self(Mutex::new(Vec::new()))
        }

        fn lines(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    impl crate::OutputSink for Recorder {
        fn output(&self, line: &str) {
            self.0.lock().unwrap().push(line.to_string());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn happy_path_reports_two_status_lines() {
        let client = ScriptedClient::new()
            .minions([Ok(Some(registered("minion1")))])
            .submissions([Ok(Submission::Async(async_handle("j1", "minion1")))])
            .lookups([Ok(Some(json!({"minion1": highstate(&[("pkg", true, "ok")])})))]);
        let sink = Recorder::new();

        provision_with(&client, &config(), &sink, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            sink.lines(),
            vec![
                "Waiting for minion minion1 to register with master",
                "Executing state.highstate on minion minion1",
            ]
        );
        assert_eq!(
            client.calls(),
            vec!["login", "minion", "submit_job", "lookup_job"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn extreme_timing_values_run_without_overflow() {
        let client = ScriptedClient::new()
            .minions([Ok(Some(registered("minion1")))])
            .submissions([Ok(Submission::Async(async_handle("j1", "minion1")))])
            .lookups([Ok(Some(json!({"minion1": highstate(&[("pkg", true, "ok")])})))]);
        let cfg = ProvisionConfig {
            timeout_minutes: u64::MAX / 60,
            interval_secs: u64::MAX,
            ..config()
        };
        cfg.ensure_valid().unwrap();

        provision_with(&client, &cfg, &Recorder::new(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(client.lookup_calls(), 1);
    }

    /// The minion never registers within two polls of a timeout
    /// that fits exactly two polls.
    #[tokio::test(start_paused = true)]
    async fn never_registering_times_out() {
        let client = ScriptedClient::new().minions(
            std::iter::repeat_with(|| Err(ConvergeError::MinionNotFound("minion1".into())))
                .take(10),
        );
        let cfg = ProvisionConfig {
            timeout_minutes: 1,
            interval_secs: 30,
            ..config()
        };

        let err = provision_with(&client, &cfg, &Recorder::new(), CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ConvergeError::Timeout { .. }), "{err}");
        assert_eq!(client.minion_calls(), 2);
        assert_eq!(client.submit_calls(), 0);
    }

    /// One of two units fails.
    #[tokio::test(start_paused = true)]
    async fn failed_unit_becomes_state_failure() {
        let client = ScriptedClient::new()
            .minions([Ok(Some(registered("minion1")))])
            .submissions([Ok(Submission::Async(async_handle("j1", "minion1")))])
            .lookups([Ok(Some(json!({
                "minion1": highstate(&[("pkg", false, "package missing"), ("svc", true, "running")])
            })))]);

        let err = provision_with(&client, &config(), &Recorder::new(), CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            ConvergeError::StateFailure {
                minion,
                function,
                reasons,
            } => {
                assert_eq!(minion, "minion1");
                assert_eq!(function, "state.highstate");
                assert_eq!(reasons, vec!["pkg failed on minion1: package missing"]);
            }
            other => panic!("expected StateFailure, got {other}"),
        }
    }

    /// Missing, then offline, then registered.
    #[tokio::test(start_paused = true)]
    async fn missing_then_offline_then_registered() {
        let client = ScriptedClient::new()
            .minions([
                Err(ConvergeError::MinionNotFound("minion1".into())),
                Ok(Some(MinionInfo::offline("minion1"))),
                Ok(Some(registered("minion1"))),
            ])
            .submissions([Ok(Submission::Async(async_handle("j1", "minion1")))])
            .lookups([Ok(Some(json!({"minion1": highstate(&[("pkg", true, "")])})))]);

        provision_with(&client, &config(), &Recorder::new(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(client.minion_calls(), 3);
    }

    /// Bad credentials stop everything before any polling.
    #[tokio::test(start_paused = true)]
    async fn bad_login_returns_auth_error_immediately() {
        let client = ScriptedClient::new()
            .login_result(Err(ConvergeError::Auth("invalid credentials".into())));
        let sink = Recorder::new();

        let err = provision_with(&client, &config(), &sink, CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ConvergeError::Auth(_)));
        assert_eq!(client.calls(), vec!["login"]);
        assert!(sink.lines().is_empty());
    }

    /// The result payload is a bare string.
    #[tokio::test(start_paused = true)]
    async fn string_payload_is_shape_error() {
        let client = ScriptedClient::new()
            .minions([Ok(Some(registered("minion1")))])
            .submissions([Ok(Submission::Async(async_handle("j1", "minion1")))])
            .lookups([Ok(Some(json!("Minion did not return. [No response]")))]);

        let err = provision_with(&client, &config(), &Recorder::new(), CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ConvergeError::ResultShape { .. }), "{err}");
        assert!(!err.is_state_failure());
    }

    #[tokio::test(start_paused = true)]
    async fn sync_mode_minion_offline_then_online() {
        let client = ScriptedClient::new()
            .minions([Ok(Some(registered("minion1")))])
            .submissions([
                Ok(Submission::Sync(json!([{"minion1": false}]))),
                Ok(Submission::Sync(json!([{"minion1": highstate(&[("pkg", true, "")])}]))),
            ]);

        provision_with(&client, &config(), &Recorder::new(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(client.lookup_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_while_polling_job_aborts_without_verdict() {
        let client = ScriptedClient::new()
            .minions([Ok(Some(registered("minion1")))])
            .submissions([Ok(Submission::Async(async_handle("j1", "minion1")))])
            .lookups(std::iter::repeat_with(|| Ok(None)).take(100));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(25)).await;
            trigger.cancel();
        });

        let err = provision_with(&client, &config(), &Recorder::new(), cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, ConvergeError::Cancelled));
        assert_eq!(client.lookup_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn closure_sink_receives_progress() {
        let client = ScriptedClient::new()
            .minions([Ok(Some(registered("minion1")))])
            .submissions([Ok(Submission::Sync(json!({"minion1": highstate(&[("a", true, "")])})))]);
        let lines = Mutex::new(Vec::new());
        let sink = |line: &str| lines.lock().unwrap().push(line.to_string());

        provision_with(&client, &config(), &sink, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(lines.lock().unwrap().len(), 2);
    }
}
