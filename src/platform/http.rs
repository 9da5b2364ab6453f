//! Probing the target from the runner.
//!
//! HTTP: issues a fixed number of GET requests against one endpoint with a
//! bound on how many are in flight, waits for all of them, and returns the
//! samples in attempt order. Individual request failures are recorded as
//! samples without a status; nothing here retries.
//!
//! Reach: times sequential TCP handshakes to one address, the way `ping`
//! measures round trips but without the raw sockets ICMP needs.

use crate::PreflightError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// What to probe and how hard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbePlan {
    pub endpoint: String,
    pub concurrency: usize,
    pub attempts: usize,
    /// Send one unrecorded request first so connection setup is not measured
    pub warmup: bool,
}

impl ProbePlan {
    pub fn single(endpoint: impl Into<String>) -> Self {
        ProbePlan {
            endpoint: endpoint.into(),
            concurrency: 1,
            attempts: 1,
            warmup: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeSample {
    /// None when no HTTP response arrived
    pub status: Option<u16>,
    pub latency: Duration,
    pub error: Option<String>,
}

impl ProbeSample {
    pub fn response(status: u16, latency: Duration) -> Self {
        ProbeSample {
            status: Some(status),
            latency,
            error: None,
        }
    }

    pub fn failed(latency: Duration, error: impl Into<String>) -> Self {
        ProbeSample {
            status: None,
            latency,
            error: Some(error.into()),
        }
    }

    /// Any response below 400
    pub fn is_success(&self) -> bool {
        matches!(self.status, Some(status) if status < 400)
    }
}

/// Samples of one probe plan, in attempt order
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeBatch {
    pub endpoint: String,
    pub concurrency: usize,
    pub attempts: usize,
    pub results: Vec<ProbeSample>,
}

impl ProbeBatch {
    pub fn successes(&self) -> usize {
        self.results.iter().filter(|s| s.is_success()).count()
    }

    /// successes / attempts; 0 for an empty batch
    pub fn success_ratio(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.successes() as f64 / self.attempts as f64
        }
    }

    /// Whether any request got an HTTP response at all
    pub fn any_response(&self) -> bool {
        self.results.iter().any(|s| s.status.is_some())
    }

    pub fn first_error(&self) -> Option<&str> {
        self.results.iter().find_map(|s| s.error.as_deref())
    }
}

/// Sequential TCP connects to one `host:port`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReachPlan {
    pub address: String,
    pub attempts: usize,
}

/// Handshake times of one reach plan, in attempt order
#[derive(Debug, Clone, PartialEq)]
pub struct ReachBatch {
    pub address: String,
    pub samples: Vec<Result<Duration, String>>,
}

impl ReachBatch {
    pub fn failures(&self) -> usize {
        self.samples.iter().filter(|s| s.is_err()).count()
    }

    /// Mean over the connects that succeeded
    pub fn mean(&self) -> Option<Duration> {
        let connected: Vec<Duration> = self.samples.iter().filter_map(|s| s.as_ref().ok().copied()).collect();
        if connected.is_empty() {
            return None;
        }
        Some(connected.iter().sum::<Duration>() / connected.len() as u32)
    }

    pub fn first_error(&self) -> Option<&str> {
        self.samples.iter().find_map(|s| s.as_ref().err().map(String::as_str))
    }
}

#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, plan: &ProbePlan) -> ProbeBatch;

    async fn reach(&self, plan: &ReachPlan) -> ReachBatch;
}

/// Prober backed by a shared reqwest client
#[derive(Debug, Clone)]
pub struct HttpProbeRunner {
    client: reqwest::Client,
    connect_timeout: Duration,
}

impl HttpProbeRunner {
    pub fn new(request_timeout: Duration) -> Result<Self, PreflightError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| PreflightError::Http(e.to_string()))?;
        Ok(HttpProbeRunner {
            client,
            connect_timeout: request_timeout,
        })
    }
}

async fn request_once(client: &reqwest::Client, endpoint: &str) -> ProbeSample {
    let start = Instant::now();
    match client.get(endpoint).send().await {
        Ok(response) => ProbeSample::response(response.status().as_u16(), start.elapsed()),
        Err(e) => ProbeSample::failed(start.elapsed(), e.to_string()),
    }
}

#[async_trait]
impl Prober for HttpProbeRunner {
    async fn probe(&self, plan: &ProbePlan) -> ProbeBatch {
        if plan.warmup {
            let warmup = request_once(&self.client, &plan.endpoint).await;
            debug!(endpoint = %plan.endpoint, status = ?warmup.status, "warmup request");
        }

        let permits = Arc::new(Semaphore::new(plan.concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for index in 0..plan.attempts {
            let permits = permits.clone();
            let client = self.client.clone();
            let endpoint = plan.endpoint.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                (index, request_once(&client, &endpoint).await)
            });
        }

        let mut slots: Vec<Option<ProbeSample>> = vec![None; plan.attempts];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, sample)) => {
                    debug!(index, status = ?sample.status, latency_ms = sample.latency.as_millis() as u64, "probe sample");
                    if let Some(slot) = slots.get_mut(index) {
                        *slot = Some(sample);
                    }
                }
                Err(e) => warn!(error = %e, "probe task did not finish"),
            }
        }

        ProbeBatch {
            endpoint: plan.endpoint.clone(),
            concurrency: plan.concurrency,
            attempts: plan.attempts,
            results: slots
                .into_iter()
                .map(|slot| slot.unwrap_or_else(|| ProbeSample::failed(Duration::ZERO, "probe task aborted")))
                .collect(),
        }
    }

    async fn reach(&self, plan: &ReachPlan) -> ReachBatch {
        let mut samples = Vec::with_capacity(plan.attempts);
        for attempt in 0..plan.attempts {
            let start = Instant::now();
            let sample = match tokio::time::timeout(self.connect_timeout, TcpStream::connect(plan.address.as_str())).await {
                Ok(Ok(_stream)) => Ok(start.elapsed()),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(format!("connect timed out after {}ms", self.connect_timeout.as_millis())),
            };
            debug!(address = %plan.address, attempt, sample = ?sample, "reach sample");
            samples.push(sample);
        }
        ReachBatch {
            address: plan.address.clone(),
            samples,
        }
    }
}
