//! Glue between workload code and the [`Recorder`].
//!
//! A [`SessionContext`] carries the `(simulation, scenario)` identity of a
//! virtual user. From it, workload code opens a [`UserSession`] for the user's
//! lifetime and wraps individual requests with [`SessionContext::track`],
//! [`SessionContext::track_http`] or a manual [`RequestTimer`].
//!
//! ```no_run
//! # use loadtest_metrics::{Config, MetricsSubsystem, StatusExpectation};
//! # async fn run(subsystem: &MetricsSubsystem) {
//! let ctx = subsystem.session("SmokeSimulation", "Smoke Test");
//! let _user = ctx.user_session();
//!
//! let status = ctx
//!     .track_http("Get Crocodiles", StatusExpectation::Exact(200), async { 200u16 })
//!     .await;
//! # }
//! ```

use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};

use crate::recorder::Recorder;

/// Error reason recorded when a request fails without a message.
pub const DEFAULT_FAILURE_REASON: &str = "request_failed";

/// How an HTTP status code maps to success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusExpectation {
    /// Any status in `200..=399`.
    #[default]
    Success,
    /// Exactly this status.
    Exact(u16),
}

impl StatusExpectation {
    pub fn is_success(&self, status: u16) -> bool {
        match self {
            StatusExpectation::Success => (200..400).contains(&status),
            StatusExpectation::Exact(expected) => status == *expected,
        }
    }
}

/// Error reason recorded for an unexpected HTTP status.
pub fn http_failure_reason(status: u16) -> String {
    format!("HTTP_{}", status)
}

/// Identity of one virtual user, handed around by the workload.
#[derive(Clone)]
pub struct SessionContext {
    recorder: Recorder,
    simulation: String,
    scenario: String,
}

impl SessionContext {
    pub fn new(
        recorder: Recorder,
        simulation: impl Into<String>,
        scenario: impl Into<String>,
    ) -> Self {
        Self {
            recorder,
            simulation: simulation.into(),
            scenario: scenario.into(),
        }
    }

    pub fn simulation(&self) -> &str {
        &self.simulation
    }

    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    /// Marks the user as started until the returned guard is finished or
    /// dropped.
    pub fn user_session(&self) -> UserSession {
        self.recorder.user_started(&self.simulation, &self.scenario);
        UserSession {
            ctx: self.clone(),
            finished: false,
        }
    }

    /// Starts timing `request`.
    pub fn start_timer(&self, request: impl Into<String>) -> RequestTimer {
        RequestTimer {
            ctx: self.clone(),
            request: request.into(),
            started: Instant::now(),
        }
    }

    /// Times `fut` and records its outcome. An `Err` counts as a failure with
    /// the error's display text as reason. The result is passed through.
    pub async fn track<T, E, F>(&self, request: &str, fut: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: Display,
    {
        let timer = self.start_timer(request);
        let result = fut.await;
        match &result {
            Ok(_) => timer.success(),
            Err(e) => timer.failure(Some(&e.to_string())),
        }
        result
    }

    /// Times `fut`, which yields an HTTP status code, and records success
    /// according to `expectation`. Failures are recorded as `HTTP_<status>`.
    pub async fn track_http<F>(&self, request: &str, expectation: StatusExpectation, fut: F) -> u16
    where
        F: Future<Output = u16>,
    {
        let timer = self.start_timer(request);
        let status = fut.await;
        timer.finish(
            expectation.is_success(status),
            Some(&http_failure_reason(status)),
        );
        status
    }

    fn record(&self, request: &str, success: bool, elapsed: Duration, reason: Option<&str>) {
        let latency_ms = elapsed.as_millis().min(u64::MAX as u128) as u64;
        self.recorder.record_request(
            &self.simulation,
            &self.scenario,
            request,
            success,
            latency_ms,
        );
        if !success {
            self.recorder.record_error(
                &self.simulation,
                &self.scenario,
                request,
                Some(reason.unwrap_or(DEFAULT_FAILURE_REASON)),
            );
        }
    }
}

/// Active user guard. Records `user_finished` exactly once.
pub struct UserSession {
    ctx: SessionContext,
    finished: bool,
}

impl UserSession {
    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    pub fn finish(mut self) {
        self.finish_once();
    }

    fn finish_once(&mut self) {
        if !self.finished {
            self.finished = true;
            self.ctx
                .recorder
                .user_finished(&self.ctx.simulation, &self.ctx.scenario);
        }
    }
}

impl Drop for UserSession {
    fn drop(&mut self) {
        self.finish_once();
    }
}

/// Start timestamp of one request. Dropping it without an outcome records
/// nothing.
pub struct RequestTimer {
    ctx: SessionContext,
    request: String,
    started: Instant,
}

impl RequestTimer {
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn success(self) {
        self.finish(true, None);
    }

    /// Records a failure. Without a message the reason is `request_failed`.
    pub fn failure(self, message: Option<&str>) {
        self.finish(false, message);
    }

    /// Records the outcome. `reason` is only used on failure.
    pub fn finish(self, success: bool, reason: Option<&str>) {
        let elapsed = self.started.elapsed();
        self.ctx.record(&self.request, success, elapsed, reason);
    }
}
