//! The measuring half of the tool: a fixed pool of worker threads draining a queue of
//! attempts against a single target.
//!
//! Every queued attempt produces exactly one [`Outcome`], including attempts that fail or
//! never start because the run was cancelled. A failed request is data, not an error; the
//! only way [`dispatch`] itself fails is if a worker's client can't be built, and that
//! happens before the first request goes out.
//!
//! ```text
//!            work queue (attempts 1..=n)
//!                 |      |      |
//!             worker  worker  worker      <- pool_size() threads, one client each
//!                 |      |      |
//!            results channel ---------> caller thread: observe() + collect
//! ```

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, info};
use reqwest::blocking::Client;

use crate::config::{Config, SuccessPolicy};
use crate::error::Result;

const USER_AGENT: &str = concat!("latency-test/", env!("CARGO_PKG_VERSION"));

/// Why a single attempt didn't count as a success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    Timeout,
    Connect(String),
    Transport(String),
    /// A response arrived, but the success policy rejected its status.
    Status(u16),
    /// Headers arrived, but reading the body failed.
    Body { status: u16, reason: String },
    /// The run was interrupted before this attempt started.
    Cancelled,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Timeout => write!(f, "timed out"),
            Failure::Connect(e) => write!(f, "connect error: {}", e),
            Failure::Transport(e) => write!(f, "transport error: {}", e),
            Failure::Status(code) => write!(f, "http status {}", code),
            Failure::Body { status, reason } => write!(f, "body error after status {}: {}", status, reason),
            Failure::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// The record of one attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    /// 1-based attempt number, in queue order (not completion order).
    pub attempt: usize,
    /// Time from sending the request until the body was read or the failure observed.
    pub duration: Duration,
    /// Status code, if any response arrived.
    pub status: Option<u16>,
    pub failure: Option<Failure>,
}

impl Outcome {
    pub fn success(attempt: usize, duration: Duration, status: u16) -> Outcome {
        Outcome {
            attempt,
            duration,
            status: Some(status),
            failure: None,
        }
    }

    pub fn failure(attempt: usize, duration: Duration, failure: Failure) -> Outcome {
        let status = match failure {
            Failure::Status(code) => Some(code),
            Failure::Body { status, .. } => Some(status),
            _ => None,
        };

        Outcome {
            attempt,
            duration,
            status,
            failure: Some(failure),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }

    pub fn cancelled(&self) -> bool {
        self.failure == Some(Failure::Cancelled)
    }
}

/// Performs one GET against the target and reports the status code it got back.
///
/// Each worker owns its transport, so nothing is shared between workers.
pub trait Transport {
    fn get(&mut self, target: &str) -> std::result::Result<u16, Failure>;
}

/// `reqwest` backed transport. Reads the whole body before returning so the measured
/// time covers the full download.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &Config) -> Result<HttpTransport> {
        let mut builder = Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT);

        if !config.keep_alive {
            builder = builder.pool_max_idle_per_host(0);
        }

        Ok(HttpTransport {
            client: builder.build()?,
        })
    }
}

impl Transport for HttpTransport {
    fn get(&mut self, target: &str) -> std::result::Result<u16, Failure> {
        let mut response = self.client.get(target).send().map_err(classify)?;
        let status = response.status().as_u16();

        response.copy_to(&mut io::sink()).map_err(|e| Failure::Body {
            status,
            reason: classify(e).to_string(),
        })?;

        Ok(status)
    }
}

fn classify(e: reqwest::Error) -> Failure {
    if e.is_timeout() {
        Failure::Timeout
    } else if e.is_connect() {
        Failure::Connect(e.to_string())
    } else {
        Failure::Transport(e.to_string())
    }
}

/// Cancellation token shared between the caller and every worker. Once tripped, workers
/// stop issuing requests and record the rest of the queue as cancelled.
#[derive(Debug, Clone, Default)]
pub struct Cancel(Arc<AtomicBool>);

impl Cancel {
    pub fn new() -> Cancel {
        Cancel::default()
    }

    /// Trips the token. Returns whether it had already been tripped.
    pub fn cancel(&self) -> bool {
        self.0.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The queue of attempts, numbered from 1.
#[derive(Debug)]
pub struct Work {
    cur: usize,
    amount: usize,
}

impl Work {
    pub fn new(amount: usize) -> Self {
        Self { cur: 0, amount }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Task(pub usize);

impl Iterator for Work {
    type Item = Task;

    fn next(&mut self) -> Option<Task> {
        if self.cur >= self.amount {
            return None;
        }

        self.cur += 1;
        Some(Task(self.cur))
    }
}

/// Everything a finished run produced.
#[derive(Debug)]
pub struct Dispatch {
    /// One per attempt, in completion order.
    pub outcomes: Vec<Outcome>,
    /// Time from starting the pool until the last worker was joined.
    pub wall: Duration,
}

/// Runs `config.attempts` requests against `config.target` on `config.pool_size()` worker
/// threads, calling `observe` on the caller's thread as each outcome arrives.
///
/// `connect` is called once per worker before the clock starts; an error there aborts the
/// run before any request is made. Returns only after every worker has finished.
pub fn dispatch<T, C, O>(config: &Config, connect: C, cancel: &Cancel, mut observe: O) -> Result<Dispatch>
where
    T: Transport + Send,
    C: Fn() -> Result<T>,
    O: FnMut(&Outcome),
{
    let pool_size = config.pool_size();
    let transports = (0..pool_size).map(|_| connect()).collect::<Result<Vec<T>>>()?;

    info!(
        "starting {} attempts against {} with {} workers",
        config.attempts, config.target, pool_size
    );

    let (work_tx, work_rx) = unbounded();
    for task in Work::new(config.attempts) {
        // can't fail, `work_rx` is alive until the pool is done
        let _ = work_tx.send(task);
    }
    drop(work_tx);

    let (result_tx, result_rx) = unbounded();
    let mut outcomes = Vec::with_capacity(config.attempts);

    let start = Instant::now();
    let deadline = config.deadline.map(|d| start + d);

    thread::scope(|scope| {
        for (id, transport) in transports.into_iter().enumerate() {
            let worker = Worker {
                id,
                transport,
                target: &config.target,
                total: config.attempts,
                success: config.success,
                cancel: cancel.clone(),
                deadline,
            };
            let work = work_rx.clone();
            let results = result_tx.clone();

            scope.spawn(move || worker.run(work, results));
        }

        // the loop below ends once every worker has dropped its sender
        drop(result_tx);

        for outcome in result_rx.iter() {
            observe(&outcome);
            outcomes.push(outcome);
        }
    });

    let wall = start.elapsed();
    debug!("{} outcomes collected in {:?}", outcomes.len(), wall);

    Ok(Dispatch { outcomes, wall })
}

struct Worker<'a, T> {
    id: usize,
    transport: T,
    target: &'a str,
    total: usize,
    success: SuccessPolicy,
    cancel: Cancel,
    deadline: Option<Instant>,
}

impl<'a, T: Transport> Worker<'a, T> {
    fn run(mut self, work: Receiver<Task>, results: Sender<Outcome>) {
        debug!("worker {} started", self.id);

        for Task(attempt) in work.iter() {
            let outcome = if self.stopped() {
                Outcome::failure(attempt, Duration::default(), Failure::Cancelled)
            } else {
                self.attempt(attempt)
            };

            match &outcome.failure {
                Some(Failure::Cancelled) => debug!("test {}/{}: cancelled", attempt, self.total),
                Some(failure) => info!("test {}/{}: request failed: {}", attempt, self.total, failure),
                None => {}
            }

            if results.send(outcome).is_err() {
                break;
            }
        }

        debug!("worker {} finished", self.id);
    }

    fn stopped(&self) -> bool {
        self.cancel.is_cancelled() || self.deadline.map_or(false, |d| Instant::now() >= d)
    }

    fn attempt(&mut self, attempt: usize) -> Outcome {
        let start = Instant::now();
        let result = self.transport.get(self.target);
        let duration = start.elapsed();

        match result {
            Ok(status) if self.success.accepts(status) => Outcome::success(attempt, duration, status),
            Ok(status) => Outcome::failure(attempt, duration, Failure::Status(status)),
            Err(failure) => Outcome::failure(attempt, duration, failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;
    use crate::error::Error;
    use std::sync::atomic::AtomicUsize;

    /// Answers every request with `status` after `delay`, counting calls.
    struct Fake {
        delay: Duration,
        status: u16,
        calls: Arc<AtomicUsize>,
    }

    impl Transport for Fake {
        fn get(&mut self, _target: &str) -> std::result::Result<u16, Failure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(self.delay);
            Ok(self.status)
        }
    }

    struct Refused;

    impl Transport for Refused {
        fn get(&mut self, _target: &str) -> std::result::Result<u16, Failure> {
            Err(Failure::Connect("connection refused".into()))
        }
    }

    fn fake(delay_ms: u64, status: u16, calls: &Arc<AtomicUsize>) -> impl Fn() -> Result<Fake> {
        let calls = calls.clone();
        move || {
            Ok(Fake {
                delay: Duration::from_millis(delay_ms),
                status,
                calls: calls.clone(),
            })
        }
    }

    fn config(attempts: usize, workers: usize) -> Config {
        ConfigBuilder::new("http://test.invalid")
            .attempts(attempts)
            .workers(workers)
            .build()
    }

    #[test]
    fn work_is_numbered_from_one() {
        let tasks = Work::new(3).collect::<Vec<_>>();
        assert_eq!(tasks, vec![Task(1), Task(2), Task(3)]);
        assert_eq!(Work::new(0).count(), 0);
    }

    #[test]
    fn every_attempt_yields_one_outcome() -> Result<()> {
        for &workers in &[1, 3, 10, 25] {
            let calls = Arc::new(AtomicUsize::new(0));
            let run = dispatch(&config(10, workers), fake(0, 200, &calls), &Cancel::new(), |_| {})?;

            let mut attempts = run.outcomes.iter().map(|o| o.attempt).collect::<Vec<_>>();
            attempts.sort();

            assert_eq!(attempts, (1..=10).collect::<Vec<_>>(), "workers = {}", workers);
            assert_eq!(calls.load(Ordering::SeqCst), 10);
            assert!(run.outcomes.iter().all(Outcome::succeeded));
            assert!(run.outcomes.iter().all(|o| o.status == Some(200)));
        }

        Ok(())
    }

    #[test]
    fn observer_sees_every_outcome() -> Result<()> {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut seen = 0;

        let run = dispatch(&config(7, 2), fake(0, 200, &calls), &Cancel::new(), |_| seen += 1)?;

        assert_eq!(seen, 7);
        assert_eq!(run.outcomes.len(), 7);

        Ok(())
    }

    #[test]
    fn transport_failures_are_recorded_not_raised() -> Result<()> {
        let run = dispatch(&config(5, 2), || Ok(Refused), &Cancel::new(), |_| {})?;

        assert_eq!(run.outcomes.len(), 5);
        for outcome in &run.outcomes {
            assert!(!outcome.succeeded());
            assert_eq!(outcome.status, None);
            assert!(matches!(outcome.failure, Some(Failure::Connect(_))));
        }

        Ok(())
    }

    #[test]
    fn error_status_depends_on_policy() -> Result<()> {
        let calls = Arc::new(AtomicUsize::new(0));

        let run = dispatch(&config(3, 3), fake(0, 500, &calls), &Cancel::new(), |_| {})?;
        for outcome in &run.outcomes {
            assert_eq!(outcome.failure, Some(Failure::Status(500)));
            assert_eq!(outcome.status, Some(500));
        }

        let lenient = ConfigBuilder::new("http://test.invalid")
            .attempts(3)
            .success(SuccessPolicy::AnyResponse)
            .build();
        let run = dispatch(&lenient, fake(0, 500, &calls), &Cancel::new(), |_| {})?;
        assert!(run.outcomes.iter().all(Outcome::succeeded));

        Ok(())
    }

    #[test]
    fn cancel_reports_repeat_trips() {
        let cancel = Cancel::new();
        let shared = cancel.clone();

        assert!(!cancel.is_cancelled());
        assert!(!shared.cancel());
        assert!(cancel.is_cancelled());
        assert!(cancel.cancel());
    }

    #[test]
    fn body_failures_keep_their_status() -> Result<()> {
        struct Truncated;

        impl Transport for Truncated {
            fn get(&mut self, _target: &str) -> std::result::Result<u16, Failure> {
                Err(Failure::Body {
                    status: 200,
                    reason: "connection closed before message completed".into(),
                })
            }
        }

        let run = dispatch(&config(3, 2), || Ok(Truncated), &Cancel::new(), |_| {})?;

        for outcome in &run.outcomes {
            assert!(!outcome.succeeded());
            assert_eq!(outcome.status, Some(200));
            assert!(matches!(outcome.failure, Some(Failure::Body { status: 200, .. })));
        }

        Ok(())
    }

    #[test]
    fn cancelled_run_still_accounts_for_every_attempt() -> Result<()> {
        let calls = Arc::new(AtomicUsize::new(0));
        let cancel = Cancel::new();
        cancel.cancel();

        let run = dispatch(&config(20, 4), fake(0, 200, &calls), &cancel, |_| {})?;

        assert_eq!(run.outcomes.len(), 20);
        assert!(run.outcomes.iter().all(Outcome::cancelled));
        assert!(run.outcomes.iter().all(|o| o.duration == Duration::default()));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        Ok(())
    }

    #[test]
    fn deadline_cancels_unstarted_attempts() -> Result<()> {
        let calls = Arc::new(AtomicUsize::new(0));
        let config = ConfigBuilder::new("http://test.invalid")
            .attempts(6)
            .workers(2)
            .deadline(Some(Duration::default()))
            .build();

        let run = dispatch(&config, fake(0, 200, &calls), &Cancel::new(), |_| {})?;

        assert_eq!(run.outcomes.len(), 6);
        assert!(run.outcomes.iter().all(Outcome::cancelled));

        Ok(())
    }

    #[test]
    fn connect_errors_abort_before_any_request() {
        let result = dispatch(
            &config(5, 2),
            || -> Result<Refused> { Err(Error::invalid_value("client", "broken")) },
            &Cancel::new(),
            |_| {},
        );

        assert!(matches!(result, Err(Error::InvalidValue { .. })));
    }

    #[test]
    fn workers_run_in_parallel() -> Result<()> {
        let calls = Arc::new(AtomicUsize::new(0));

        let serial = dispatch(&config(10, 1), fake(50, 200, &calls), &Cancel::new(), |_| {})?;
        let parallel = dispatch(&config(10, 10), fake(50, 200, &calls), &Cancel::new(), |_| {})?;

        assert!(serial.wall >= Duration::from_millis(500));
        assert!(parallel.wall < Duration::from_millis(400), "{:?}", parallel.wall);
        assert!(parallel.wall <= serial.wall);

        Ok(())
    }
}
