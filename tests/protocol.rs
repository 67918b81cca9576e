//! End-to-end exercises of the coordinator over real TCP connections.
//!
//! Every test starts its own coordinator on an ephemeral port and talks to
//! it through the client-side protocol helpers.

mod common;

use std::io::{Read as _, Write as _};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use common::ttt_record;
use zeroloop::evaluator::{Evaluator, LinearEvaluator};
use zeroloop::games::tictactoe::TttPosition;
use zeroloop::protocol;
use zeroloop::record::Winner;
use zeroloop::server::{Coordinator, CoordinatorConfig};
use zeroloop::{GamePosition, Reservoir};

fn start_coordinator(dir: &Path, store_only: bool, batch_size: usize) -> (String, Arc<Reservoir>) {
    let config = CoordinatorConfig {
        store_only,
        batch_size,
        weights_dir: dir.join("weights"),
        record_log: dir.join("records.jsonl"),
        connection_log: dir.join("connections.txt"),
        training_log: dir.join("training.txt"),
        ..CoordinatorConfig::default()
    };
    let evaluator = LinearEvaluator::new(TttPosition::INPUT_SIZE, TttPosition::POLICY_SIZE);
    let coordinator = Coordinator::<TttPosition, _>::new(config, evaluator).unwrap();
    let reservoir = coordinator.reservoir();

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    thread::spawn(move || coordinator.serve(listener));
    (addr, reservoir)
}

fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let start = Instant::now();
    while !condition() {
        assert!(start.elapsed() < Duration::from_secs(10), "timed out: {what}");
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn served_weights_load_into_a_fresh_evaluator() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, _reservoir) = start_coordinator(dir.path(), true, 1024);

    let blob = protocol::fetch_weights(&addr).unwrap();
    let mut evaluator = LinearEvaluator::new(TttPosition::INPUT_SIZE, TttPosition::POLICY_SIZE);
    evaluator.load_weights(&blob).unwrap();
}

#[test]
fn submitted_records_land_in_the_reservoir_intact() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, reservoir) = start_coordinator(dir.path(), true, 1024);

    let first = ttt_record(&["a1", "b1", "c1"], &[0, 2], Winner::Black);
    let second = ttt_record(&["b2", "a1"], &[1], Winner::White);
    protocol::submit_record(&addr, &first.to_bytes()).unwrap();
    protocol::submit_record(&addr, &second.to_bytes()).unwrap();

    // The ingestion ack arrives after the push, so the records are already
    // stored when submit_record returns.
    assert_eq!(reservoir.len(), 2);
    assert_eq!(reservoir.records(), vec![first, second]);
    assert_eq!(reservoir.len_learning_targets(), 3);
}

#[test]
fn a_missing_ingestion_ack_fails_the_submission() {
    // A server that swallows the record without acknowledging it: the
    // client must treat the game as lost, not report success.
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut verb = [0u8; 6];
        stream.read_exact(&mut verb).unwrap();
        stream.write_all(b"ready").unwrap();
        stream.flush().unwrap();
        let _ = protocol::read_frame(&mut stream).unwrap();
    });

    let record = ttt_record(&["a1"], &[0], Winner::Black);
    assert!(protocol::submit_record(&addr, &record.to_bytes()).is_err());
}

#[test]
fn a_bad_connection_does_not_take_the_server_down() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, reservoir) = start_coordinator(dir.path(), true, 1024);

    {
        let mut stream = TcpStream::connect(&addr).unwrap();
        stream.write_all(b"bogus!").unwrap();
    }
    // The offending connection is dropped; the next ones are served fine.
    let blob = protocol::fetch_weights(&addr).unwrap();
    assert!(!blob.is_empty());

    protocol::submit_record(&addr, &ttt_record(&["a1"], &[0], Winner::Black).to_bytes()).unwrap();
    assert_eq!(reservoir.len(), 1);
}

#[test]
fn concurrent_fetches_always_see_a_complete_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    // A real training loop: every step republishes a changed blob under the
    // trainer lock while the fetchers hammer the weight verb.
    let (addr, _reservoir) = start_coordinator(dir.path(), false, 4);

    let first = ttt_record(&["a1", "b1"], &[0, 1], Winner::Black);
    let second = ttt_record(&["c1", "a2"], &[0, 1], Winner::White);
    protocol::submit_record(&addr, &first.to_bytes()).unwrap();
    protocol::submit_record(&addr, &second.to_bytes()).unwrap();
    wait_until("training steps running", || {
        std::fs::metadata(dir.path().join("training.txt")).map_or(false, |m| m.len() > 0)
    });

    // A torn snapshot (bytes of two different publishes interleaved) would
    // not deserialize as a valid parameter blob.
    let fetchers: Vec<_> = (0..4)
        .map(|_| {
            let addr = addr.clone();
            thread::spawn(move || {
                for _ in 0..25 {
                    let blob = protocol::fetch_weights(&addr).unwrap();
                    let mut evaluator =
                        LinearEvaluator::new(TttPosition::INPUT_SIZE, TttPosition::POLICY_SIZE);
                    evaluator.load_weights(&blob).unwrap();
                }
            })
        })
        .collect();
    for fetcher in fetchers {
        fetcher.join().unwrap();
    }
}
