//! The number stream (spec.md §4.1): a buffered file line reader with an
//! in-memory push-back stack in front of it, matching
//! `utilities::number_stream_t` in `original_source/`. The push-back side is
//! LIFO (spec.md §3's data model); the file side is FIFO.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::sync::Mutex;

use utils::phone::is_plausible_phone_number;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamError {
    /// Nothing available right now; retry later (spec.md §9 ambiguity
    /// resolution (a) — an idle session re-polls rather than exiting).
    Empty,
    /// The stream has been permanently closed (task completion); the
    /// caller should terminate instead of retrying.
    Closed,
}

struct NumberStreamState {
    push_back: VecDeque<String>,
    lines: Option<Lines<BufReader<File>>>,
    closed: bool,
}

/// Resumable source of phone numbers, wrapping one input file. `next()` and
/// `push_back()` are the only ways numbers enter or leave; every number ever
/// returned by `next()` ends up either classified or pushed back (spec.md
/// §8's no-loss invariant) — callers, not this type, are responsible for
/// upholding that.
pub struct NumberStream {
    state: Mutex<NumberStreamState>,
}

impl NumberStream {
    /// Opens `path` and counts every plausible phone-number line up front
    /// (spec.md §4.5 step 1), returning the stream alongside that count.
    pub fn open(path: &str) -> std::io::Result<(Self, u64)> {
        let total = count_numbers(path)?;
        let file = File::open(path)?;
        let lines = BufReader::new(file).lines();
        Ok((
            Self {
                state: Mutex::new(NumberStreamState {
                    push_back: VecDeque::new(),
                    lines: Some(lines),
                    closed: false,
                }),
            },
            total,
        ))
    }

    /// Drains the push-back buffer first (most recently pushed back wins),
    /// then reads the next non-blank line from the file. `Empty` once both
    /// are exhausted or the stream has been closed.
    pub fn next(&self) -> Result<String, StreamError> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(StreamError::Closed);
        }
        if let Some(number) = state.push_back.pop_front() {
            return Ok(number);
        }
        loop {
            let Some(lines) = state.lines.as_mut() else {
                return Err(StreamError::Empty);
            };
            match lines.next() {
                Some(Ok(line)) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    return Ok(trimmed.to_string());
                }
                Some(Err(_)) | None => {
                    state.lines = None;
                    return Err(StreamError::Empty);
                }
            }
        }
    }

    /// Returns `n` to the front of the push-back buffer so it is retried
    /// before anything still unread in the file.
    pub fn push_back(&self, n: String) {
        self.state.lock().unwrap().push_back.push_front(n);
    }

    /// Idempotent; every subsequent `next()` fails with `Empty`.
    pub fn close(&self) {
        self.state.lock().unwrap().closed = true;
    }
}

fn count_numbers(path: &str) -> std::io::Result<u64> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut total = 0u64;
    for line in reader.lines() {
        let line = line?;
        if is_plausible_phone_number(&line) {
            total += 1;
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn temp_file(contents: &str) -> std::path::PathBuf {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let mut path = std::env::temp_dir();
        path.push(format!(
            "wudi_core_stream_test_{}_{}.txt",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        let mut file = File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn counts_only_plausible_lines() {
        let path = temp_file("13800000001\n\nnot-a-number!\n13800000002\n");
        let (_stream, total) = NumberStream::open(path.to_str().unwrap()).unwrap();
        assert_eq!(total, 2);
    }

    #[test]
    fn next_reads_file_lines_in_order() {
        let path = temp_file("13800000001\n13800000002\n");
        let (stream, _total) = NumberStream::open(path.to_str().unwrap()).unwrap();
        assert_eq!(stream.next().unwrap(), "13800000001");
        assert_eq!(stream.next().unwrap(), "13800000002");
        assert_eq!(stream.next(), Err(StreamError::Empty));
    }

    #[test]
    fn push_back_is_served_before_the_file_lifo() {
        let path = temp_file("13800000001\n13800000002\n");
        let (stream, _total) = NumberStream::open(path.to_str().unwrap()).unwrap();
        let first = stream.next().unwrap();
        stream.push_back(first.clone());
        stream.push_back("retry-me".to_string());

        // most recently pushed back comes out first
        assert_eq!(stream.next().unwrap(), "retry-me");
        assert_eq!(stream.next().unwrap(), first);
        assert_eq!(stream.next().unwrap(), "13800000002");
    }

    #[test]
    fn close_is_idempotent_and_terminal() {
        let path = temp_file("13800000001\n");
        let (stream, _total) = NumberStream::open(path.to_str().unwrap()).unwrap();
        stream.close();
        stream.close();
        assert_eq!(stream.next(), Err(StreamError::Closed));
    }

    #[test]
    fn blank_lines_are_skipped() {
        let path = temp_file("\n\n13800000001\n");
        let (stream, _total) = NumberStream::open(path.to_str().unwrap()).unwrap();
        assert_eq!(stream.next().unwrap(), "13800000001");
    }
}
