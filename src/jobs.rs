//! The validation job service.
//!
//! Submitted documents are parsed eagerly (structural or local-schema
//! failure rejects the request before a job exists), then queued onto a
//! bounded pool of worker threads: at most `workers` validations execute
//! at once, the rest wait in the queue. Cancellation is cooperative and
//! only effective while a job is still queued; a running job finishes.

use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use serde::Serialize;
use serde_json::Value;
use ulid::Ulid;

use crate::error::JobError;
use crate::graph::CrateGraph;
use crate::ident::RemoteLookup;
use crate::pipeline::{FailureRecord, ValidationPipeline};
use crate::rules::RuleSet;

/// Lifecycle of one validation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Queued,
    Running,
    Complete,
    Failed,
    Canceled,
}

impl JobState {
    fn name(self) -> &'static str {
        match self {
            JobState::Queued => "QUEUED",
            JobState::Running => "RUNNING",
            JobState::Complete => "COMPLETE",
            JobState::Failed => "FAILED",
            JobState::Canceled => "CANCELED",
        }
    }
}

/// What [`ValidationService::status`] reports for a request.
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: String,
    pub state: JobState,
    /// The document as submitted.
    pub request: Value,
    /// Entity-id subset the request named, if any.
    pub targets: Option<Vec<String>>,
    /// One record per failing (entity, property, reason) triple.
    pub results: Vec<FailureRecord>,
    /// Present when the run aborted on a configuration error.
    pub detail: Option<String>,
}

struct Job {
    record: JobRecord,
    graph: CrateGraph,
}

struct ServiceInner {
    store: Mutex<HashMap<String, Job>>,
    rules: RuleSet,
    lookup: Option<Box<dyn RemoteLookup + Send + Sync>>,
}

/// A bounded-concurrency validation front end.
///
/// Owns the job store and the worker pool; dropping the service (or
/// calling [`ValidationService::shutdown`]) closes the queue and joins
/// the workers.
pub struct ValidationService {
    inner: Arc<ServiceInner>,
    sender: Option<mpsc::Sender<String>>,
    workers: Vec<JoinHandle<()>>,
}

impl ValidationService {
    /// Start a service with a fixed worker count and the given rules.
    pub fn start(workers: usize, rules: RuleSet) -> ValidationService {
        Self::start_with_lookup(workers, rules, None)
    }

    /// Start a service whose rules may consult the network.
    pub fn start_with_lookup(
        workers: usize,
        rules: RuleSet,
        lookup: Option<Box<dyn RemoteLookup + Send + Sync>>,
    ) -> ValidationService {
        let inner = Arc::new(ServiceInner {
            store: Mutex::new(HashMap::new()),
            rules,
            lookup,
        });
        let (sender, receiver) = mpsc::channel::<String>();
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..workers.max(1))
            .map(|worker| {
                let inner = Arc::clone(&inner);
                let receiver = Arc::clone(&receiver);
                std::thread::spawn(move || {
                    tracing::debug!(worker, "validation worker started");
                    worker_loop(&inner, &receiver);
                })
            })
            .collect();

        ValidationService {
            inner,
            sender: Some(sender),
            workers,
        }
    }

    /// Submit a document for validation, optionally restricting the
    /// governance phase to the named entity ids.
    ///
    /// The document is parsed and locally checked up front: a structural
    /// or local-schema failure rejects the request and never creates a
    /// job.
    pub fn submit(
        &self,
        document: Value,
        targets: Option<Vec<String>>,
    ) -> Result<String, JobError> {
        let graph = CrateGraph::from_document(&document)
            .map_err(|source| JobError::Rejected { source })?;
        graph
            .check_structure()
            .map_err(|e| JobError::Rejected { source: e.into() })?;
        graph
            .check_all_props()
            .map_err(|source| JobError::Rejected { source })?;

        let sender = self.sender.as_ref().ok_or(JobError::ShutDown)?;
        let id = Ulid::new().to_string();
        let job = Job {
            record: JobRecord {
                id: id.clone(),
                state: JobState::Queued,
                request: document,
                targets,
                results: Vec::new(),
                detail: None,
            },
            graph,
        };
        self.lock_store().insert(id.clone(), job);
        sender.send(id.clone()).map_err(|_| JobError::ShutDown)?;
        tracing::debug!(request = %id, "validation queued");
        Ok(id)
    }

    /// Current record for a request.
    pub fn status(&self, id: &str) -> Result<JobRecord, JobError> {
        self.lock_store()
            .get(id)
            .map(|job| job.record.clone())
            .ok_or_else(|| JobError::UnknownRequest { id: id.to_string() })
    }

    /// Cancel a queued request. Requests already running (or finished,
    /// or canceled) are rejected.
    pub fn cancel(&self, id: &str) -> Result<(), JobError> {
        let mut store = self.lock_store();
        let job = store
            .get_mut(id)
            .ok_or_else(|| JobError::UnknownRequest { id: id.to_string() })?;
        match job.record.state {
            JobState::Queued => {
                job.record.state = JobState::Canceled;
                tracing::debug!(request = %id, "validation canceled");
                Ok(())
            }
            state => Err(JobError::CancelRejected {
                id: id.to_string(),
                state: state.name(),
            }),
        }
    }

    /// Close the queue and wait for the workers to drain it.
    pub fn shutdown(&mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }

    fn lock_store(&self) -> std::sync::MutexGuard<'_, HashMap<String, Job>> {
        self.inner.store.lock().expect("job store poisoned")
    }
}

impl Drop for ValidationService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(inner: &ServiceInner, receiver: &Arc<Mutex<mpsc::Receiver<String>>>) {
    loop {
        let id = {
            let receiver = receiver.lock().expect("job queue poisoned");
            match receiver.recv() {
                Ok(id) => id,
                Err(_) => return, // queue closed
            }
        };

        // Re-read state under the lock: the job may have been canceled
        // while it sat in the queue.
        let claimed = {
            let mut store = inner.store.lock().expect("job store poisoned");
            match store.get_mut(&id) {
                Some(job) if job.record.state == JobState::Queued => {
                    job.record.state = JobState::Running;
                    Some((job.graph.clone(), job.record.targets.clone()))
                }
                _ => None,
            }
        };
        let Some((graph, targets)) = claimed else {
            continue;
        };

        tracing::debug!(request = %id, "validation running");
        let mut pipeline = ValidationPipeline::new(&inner.rules);
        if let Some(lookup) = &inner.lookup {
            pipeline = pipeline.with_lookup(lookup.as_ref());
        }
        if let Some(targets) = targets {
            pipeline = pipeline.with_targets(targets);
        }
        let outcome = pipeline.validate(&graph);

        let mut store = inner.store.lock().expect("job store poisoned");
        if let Some(job) = store.get_mut(&id) {
            match outcome {
                Ok(report) => {
                    job.record.results = report.records();
                    job.record.state = if report.passed() {
                        JobState::Complete
                    } else {
                        JobState::Failed
                    };
                }
                Err(config) => {
                    job.record.state = JobState::Failed;
                    job.record.detail = Some(config.to_string());
                }
            }
            tracing::debug!(request = %id, state = job.record.state.name(), "validation finished");
        }
    }
}
