use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Barrier, Mutex};
use std::time::Duration;

use govlink::{run_bounded, task, Outcome, Task, TaskFailure};
use tracing_subscriber::fmt::MakeWriter;

/// Counts how many instrumented tasks are running and the peak seen.
#[derive(Clone, Default)]
struct InFlight {
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    started: Arc<AtomicUsize>,
}

impl InFlight {
    fn enter(&self) {
        self.started.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

fn sleepy_jobs(n: usize, tracker: &InFlight, pause: Duration) -> Vec<Task<usize, String>> {
    (0..n)
        .map(|i| {
            let tracker = tracker.clone();
            task(move || {
                tracker.enter();
                std::thread::sleep(pause);
                tracker.leave();
                Ok(i)
            })
        })
        .collect()
}

#[test]
fn mixed_results_land_at_their_submission_index() {
    let jobs: Vec<Task<u32, &'static str>> = vec![
        task(|| Ok(1)),
        task(|| Err("e")),
        task(|| Ok(3)),
    ];

    let out = run_bounded(2, jobs).unwrap();
    assert_eq!(
        out,
        vec![
            Outcome::Fulfilled { value: 1 },
            Outcome::Rejected {
                reason: TaskFailure::Failed("e")
            },
            Outcome::Fulfilled { value: 3 },
        ]
    );
}

#[test]
fn order_follows_submission_not_completion() {
    // Earlier tasks sleep longer, so they finish last.
    let jobs: Vec<Task<usize, String>> = (0..5usize)
        .map(|i| {
            task(move || {
                std::thread::sleep(Duration::from_millis(((5 - i) * 15) as u64));
                Ok(i)
            })
        })
        .collect();

    let out = run_bounded(5, jobs).unwrap();
    let values: Vec<usize> = out.into_iter().map(|o| o.into_result().unwrap()).collect();
    assert_eq!(values, vec![0, 1, 2, 3, 4]);
}

#[test]
fn in_flight_never_exceeds_limit() {
    let tracker = InFlight::default();
    let out = run_bounded(3, sleepy_jobs(12, &tracker, Duration::from_millis(15))).unwrap();

    assert_eq!(out.len(), 12);
    assert!(tracker.peak() <= 3, "peak in flight was {}", tracker.peak());
    assert_eq!(tracker.started(), 12, "every task starts exactly once");
}

#[test]
fn zero_and_negative_limits_run_one_at_a_time() {
    for limit in [0_i64, -5] {
        let tracker = InFlight::default();
        let out = run_bounded(limit, sleepy_jobs(4, &tracker, Duration::from_millis(5))).unwrap();
        assert_eq!(out.len(), 4);
        assert_eq!(tracker.peak(), 1, "limit {limit} should behave like 1");
    }
}

#[test]
fn non_finite_limit_runs_one_at_a_time() {
    let tracker = InFlight::default();
    let out = run_bounded(f64::NAN, sleepy_jobs(3, &tracker, Duration::from_millis(5))).unwrap();
    assert_eq!(out.len(), 3);
    assert_eq!(tracker.peak(), 1);
}

#[test]
fn oversized_limit_is_clamped_to_task_count() {
    // All three tasks must be in flight together to get past the barrier.
    let barrier = Arc::new(Barrier::new(3));
    let spawned_threads = Arc::new(Mutex::new(std::collections::HashSet::new()));

    let jobs: Vec<Task<usize, String>> = (0..3usize)
        .map(|i| {
            let barrier = Arc::clone(&barrier);
            let spawned_threads = Arc::clone(&spawned_threads);
            task(move || {
                spawned_threads
                    .lock()
                    .unwrap()
                    .insert(std::thread::current().id());
                barrier.wait();
                Ok(i)
            })
        })
        .collect();

    let out = run_bounded(1000, jobs).unwrap();
    assert!(out.iter().all(|o| o.is_fulfilled()));
    assert_eq!(spawned_threads.lock().unwrap().len(), 3);
}

#[test]
fn freed_slot_starts_next_task_without_waiting_for_batch() {
    // Task 0 blocks until task 3 runs. With limit 2 that only happens if the
    // second worker keeps pulling tasks while task 0 is still running.
    let (tx, rx) = mpsc::channel::<()>();

    let jobs: Vec<Task<bool, String>> = vec![
        task(move || Ok(rx.recv_timeout(Duration::from_secs(5)).is_ok())),
        task(|| Ok(true)),
        task(|| Ok(true)),
        task(move || Ok(tx.send(()).is_ok())),
    ];

    let out = run_bounded(2, jobs).unwrap();
    assert_eq!(out[0], Outcome::Fulfilled { value: true });
    assert!(out.iter().all(|o| o.is_fulfilled()));
}

#[test]
fn panicking_task_is_isolated() {
    let tracker = InFlight::default();
    let mut jobs = sleepy_jobs(4, &tracker, Duration::from_millis(5));
    jobs.insert(1, task(|| panic!("synchronous failure")));

    let out = run_bounded(2, jobs).unwrap();
    assert_eq!(out.len(), 5);
    assert_eq!(
        out[1].reason(),
        Some(&TaskFailure::Panicked("synchronous failure".to_string()))
    );
    assert_eq!(tracker.started(), 4);
    assert_eq!(out.iter().filter(|o| o.is_fulfilled()).count(), 4);
}

#[test]
fn panic_with_formatted_message_is_preserved() {
    let jobs: Vec<Task<u8, String>> = vec![task(|| panic!("bad proposal id {}", 42))];
    let out = run_bounded(1, jobs).unwrap();
    assert_eq!(
        out[0],
        Outcome::Rejected {
            reason: TaskFailure::Panicked("bad proposal id 42".to_string())
        }
    );
}

#[test]
fn all_failures_still_return_full_outcome_list() {
    let jobs: Vec<Task<u8, String>> = (0..6)
        .map(|i| task(move || Err(format!("proposal {i} unavailable"))))
        .collect();

    let out = run_bounded(3, jobs).unwrap();
    assert_eq!(out.len(), 6);
    for (i, o) in out.iter().enumerate() {
        assert_eq!(
            o.reason().map(ToString::to_string),
            Some(format!("proposal {i} unavailable"))
        );
    }
}

#[test]
fn empty_task_list_returns_immediately() {
    let out = run_bounded(8, Vec::<Task<u8, String>>::new()).unwrap();
    assert!(out.is_empty());
}

/// In-memory log sink for asserting on emitted events.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[test]
fn run_summary_is_logged_at_info() {
    let logs = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .without_time()
        .with_writer(logs.clone())
        .finish();

    let jobs: Vec<Task<u8, String>> = vec![task(|| Ok(1)), task(|| Err("down".to_string()))];
    let out = tracing::subscriber::with_default(subscriber, || run_bounded(2, jobs)).unwrap();
    assert_eq!(out.len(), 2);

    let text = logs.contents();
    let summary = text
        .lines()
        .find(|l| l.contains("bounded run settled"))
        .unwrap_or_else(|| panic!("no run summary in logs:\n{text}"));
    assert!(summary.contains("INFO"), "{summary}");
    assert!(summary.contains("fulfilled=1"), "{summary}");
    assert!(summary.contains("rejected=1"), "{summary}");
}
