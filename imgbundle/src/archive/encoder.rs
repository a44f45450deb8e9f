//! Streaming zip encoder.
//!
//! [`ArchiveWriter::new`] returns two halves sharing one encoder:
//!
//! - [`ArchiveWriter`] declares entries (`enqueue`), ends the archive
//!   (`close`) or tears it down (`abort`).
//! - [`ArchiveStream`] is a [`Stream`] of output chunks. Bytes are produced
//!   only when the consumer polls, one chunk at a time, so a slow consumer
//!   throttles the whole archive and memory stays bounded by one in-flight
//!   chunk plus a small fixed record per entry.
//!
//! # Pull loop
//!
//! Each poll advances an explicit state machine:
//!
//! ```text
//! Idle ──► Header(i) ──► Draining(i) ──► Footer(i) ──► Idle
//!   │          └──── (directory / no source) ──┘
//!   └── (closed, nothing pending) ──► Directory ──► Done
//! ```
//!
//! The output position is advanced at exactly the points bytes are handed
//! to the consumer; local header offsets in the central directory come from
//! that counter.

use std::collections::HashSet;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use bytes::{Bytes, BytesMut};
use chrono::{Local, NaiveDateTime};
use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, trace};

use super::entry::{normalize_name, ArchiveEntry, EntryDescriptor};
use super::error::{ArchiveError, ArchiveResult};
use super::format;

/// Where the pull loop is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Waiting for the next declared entry, or for `close`.
    Idle,
    /// Entry `i` is active and its local header is next.
    Header(usize),
    /// Entry `i` is forwarding data chunks.
    Draining(usize),
    /// Entry `i` has drained; its data descriptor is next.
    Footer(usize),
    /// Every entry is finalized and the archive is closed.
    Directory,
    /// Output finished (or failed).
    Done,
}

/// Encoder state shared by the writer and the stream.
#[derive(Debug)]
struct Shared {
    entries: Vec<ArchiveEntry>,
    names: HashSet<String>,
    phase: Phase,
    /// Index of the next declared entry.
    next: usize,
    /// Bytes handed to the consumer so far.
    offset: u64,
    closed: bool,
    aborted: Option<String>,
    consumer_dropped: bool,
    created_at: NaiveDateTime,
    waker: Option<Waker>,
}

/// What one step of the pull loop produced.
struct Step {
    poll: Poll<Option<ArchiveResult<Bytes>>>,
    finalized: bool,
}

impl Step {
    fn ready(chunk: ArchiveResult<Bytes>) -> Self {
        Self {
            poll: Poll::Ready(Some(chunk)),
            finalized: false,
        }
    }
}

impl Shared {
    fn new(created_at: NaiveDateTime) -> Self {
        Self {
            entries: Vec::new(),
            names: HashSet::new(),
            phase: Phase::Idle,
            next: 0,
            offset: 0,
            closed: false,
            aborted: None,
            consumer_dropped: false,
            created_at,
            waker: None,
        }
    }

    /// Entries not yet finalized.
    fn queued(&self) -> usize {
        self.entries.len() - self.next
    }

    /// Fail the stream; nothing further is emitted.
    fn fail(&mut self, err: ArchiveError) -> Step {
        self.phase = Phase::Done;
        if self.aborted.is_none() {
            self.aborted = Some(err.to_string());
        }
        Step::ready(Err(err))
    }

    /// Park the consumer. Its waker is kept even while an entry source
    /// holds it, so `enqueue`, `close` and `abort` can always wake it.
    fn pending(&mut self, cx: &mut Context<'_>) -> Step {
        match &self.waker {
            Some(waker) if waker.will_wake(cx.waker()) => {}
            _ => self.waker = Some(cx.waker().clone()),
        }
        Step {
            poll: Poll::Pending,
            finalized: false,
        }
    }

    fn advance(&mut self, cx: &mut Context<'_>) -> Step {
        loop {
            if self.phase != Phase::Done {
                if let Some(reason) = &self.aborted {
                    let reason = reason.clone();
                    self.phase = Phase::Done;
                    return Step::ready(Err(ArchiveError::Aborted { reason }));
                }
            }

            match self.phase {
                Phase::Idle => {
                    if self.next < self.entries.len() {
                        self.entries[self.next].activate();
                        self.phase = Phase::Header(self.next);
                    } else if self.closed {
                        self.phase = Phase::Directory;
                    } else {
                        return self.pending(cx);
                    }
                }

                Phase::Header(i) => {
                    let entry = &mut self.entries[i];
                    let header = entry.write_header(self.offset);
                    trace!(name = entry.name(), offset = self.offset, "local header");
                    self.offset += header.len() as u64;
                    self.phase = if entry.drains() {
                        Phase::Draining(i)
                    } else {
                        Phase::Footer(i)
                    };
                    return Step::ready(Ok(header));
                }

                Phase::Draining(i) => {
                    let entry = &mut self.entries[i];
                    match entry.poll_chunk(cx) {
                        Poll::Pending => return self.pending(cx),
                        Poll::Ready(None) => self.phase = Phase::Footer(i),
                        Poll::Ready(Some(Err(source))) => {
                            let name = entry.name().to_string();
                            return self.fail(ArchiveError::Source { name, source });
                        }
                        Poll::Ready(Some(Ok(chunk))) => {
                            if chunk.is_empty() {
                                continue;
                            }
                            if let Err(err) = entry.absorb(&chunk) {
                                return self.fail(err);
                            }
                            self.offset += chunk.len() as u64;
                            return Step::ready(Ok(chunk));
                        }
                    }
                }

                Phase::Footer(i) => {
                    let entry = &mut self.entries[i];
                    let descriptor = entry.finalize();
                    debug!(
                        name = entry.name(),
                        bytes = entry.uncompressed_length(),
                        crc32 = entry.crc32(),
                        "entry finalized"
                    );
                    self.offset += descriptor.len() as u64;
                    self.next += 1;
                    self.phase = Phase::Idle;
                    return Step {
                        poll: Poll::Ready(Some(Ok(descriptor))),
                        finalized: true,
                    };
                }

                Phase::Directory => {
                    return match self.central_directory() {
                        Ok(directory) => {
                            self.offset += directory.len() as u64;
                            self.phase = Phase::Done;
                            debug!(
                                entries = self.entries.len(),
                                bytes = self.offset,
                                "archive complete"
                            );
                            Step::ready(Ok(directory))
                        }
                        Err(err) => self.fail(err),
                    };
                }

                Phase::Done => {
                    return Step {
                        poll: Poll::Ready(None),
                        finalized: false,
                    }
                }
            }
        }
    }

    /// Build the central directory and end record in enqueue order.
    fn central_directory(&mut self) -> ArchiveResult<Bytes> {
        let count = self.entries.len();
        let entry_count =
            u16::try_from(count).map_err(|_| ArchiveError::TooManyEntries { count })?;
        let directory_offset = u32::try_from(self.offset).map_err(|_| {
            ArchiveError::ArchiveTooLarge {
                offset: self.offset,
            }
        })?;

        let records = self
            .entries
            .iter()
            .map(|entry| entry.central_record())
            .collect::<ArchiveResult<Vec<_>>>()?;
        let directory_size: usize = records.iter().map(|r| r.encoded_len()).sum();

        let mut buf = BytesMut::with_capacity(directory_size + format::END_OF_DIRECTORY_LEN);
        for record in &records {
            record.put(&mut buf);
        }
        let directory_size = u32::try_from(directory_size).map_err(|_| {
            ArchiveError::ArchiveTooLarge {
                offset: self.offset + directory_size as u64,
            }
        })?;
        format::put_end_of_directory(&mut buf, entry_count, directory_size, directory_offset);
        drop(records);

        for entry in &mut self.entries {
            entry.close();
        }
        Ok(buf.freeze())
    }
}

/// Producer half of a streaming archive.
///
/// Entries are buffered by the encoder, so `enqueue` may be called before
/// the consumer starts pulling. Calls must be serialized by the owner; the
/// writer is not meant to be shared between concurrent producers.
#[derive(Debug)]
pub struct ArchiveWriter {
    shared: Arc<Mutex<Shared>>,
    finalized: Arc<Notify>,
}

/// Consumer half of a streaming archive: a finite, non-restartable stream
/// of output chunks.
#[derive(Debug)]
pub struct ArchiveStream {
    shared: Arc<Mutex<Shared>>,
    finalized: Arc<Notify>,
}

impl ArchiveWriter {
    /// Create an encoder. Entries without a timestamp use the current
    /// local time.
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (ArchiveWriter, ArchiveStream) {
        Self::with_timestamp(Local::now().naive_local())
    }

    /// Create an encoder whose default entry timestamp is `created_at`.
    pub fn with_timestamp(created_at: NaiveDateTime) -> (ArchiveWriter, ArchiveStream) {
        let shared = Arc::new(Mutex::new(Shared::new(created_at)));
        let finalized = Arc::new(Notify::new());
        (
            ArchiveWriter {
                shared: Arc::clone(&shared),
                finalized: Arc::clone(&finalized),
            },
            ArchiveStream { shared, finalized },
        )
    }

    /// Declare an entry.
    ///
    /// # Errors
    ///
    /// - [`ArchiveError::Closed`] after `close` was called
    /// - [`ArchiveError::DuplicateName`] if the normalized name was already declared
    /// - [`ArchiveError::InvalidEntry`] for empty or oversized names/comments
    /// - [`ArchiveError::Aborted`] if the archive was torn down
    pub fn enqueue(&self, descriptor: EntryDescriptor) -> ArchiveResult<()> {
        let waker = {
            let mut shared = self.shared.lock();
            if let Some(reason) = &shared.aborted {
                return Err(ArchiveError::Aborted {
                    reason: reason.clone(),
                });
            }
            if shared.closed {
                return Err(ArchiveError::Closed {
                    operation: "enqueue",
                });
            }

            let name = normalize_name(descriptor.name(), descriptor.is_directory());
            if shared.names.contains(&name) {
                return Err(ArchiveError::DuplicateName { name });
            }

            let entry = ArchiveEntry::declare(descriptor, shared.created_at)?;
            debug!(name = entry.name(), index = shared.entries.len(), "entry declared");
            shared.names.insert(name);
            shared.entries.push(entry);
            shared.waker.take()
        };

        if let Some(waker) = waker {
            waker.wake();
        }
        Ok(())
    }

    /// Signal that no further entries will be enqueued.
    ///
    /// The central directory is emitted once every pending entry drains.
    pub fn close(&self) -> ArchiveResult<()> {
        let waker = {
            let mut shared = self.shared.lock();
            if let Some(reason) = &shared.aborted {
                return Err(ArchiveError::Aborted {
                    reason: reason.clone(),
                });
            }
            if shared.closed {
                return Err(ArchiveError::Closed { operation: "close" });
            }
            shared.closed = true;
            debug!(entries = shared.entries.len(), "archive closed for enqueue");
            shared.waker.take()
        };

        if let Some(waker) = waker {
            waker.wake();
        }
        Ok(())
    }

    /// Tear the archive down. The stream yields [`ArchiveError::Aborted`]
    /// and then ends, so a sink never mistakes it for a complete archive.
    pub fn abort(&self, reason: impl Into<String>) {
        let waker = {
            let mut shared = self.shared.lock();
            if shared.aborted.is_none() && shared.phase != Phase::Done {
                shared.aborted = Some(reason.into());
            }
            shared.waker.take()
        };

        if let Some(waker) = waker {
            waker.wake();
        }
        self.finalized.notify_waiters();
    }

    /// Number of declared entries not yet finalized.
    pub fn queued(&self) -> usize {
        self.shared.lock().queued()
    }

    /// Number of entries declared so far.
    pub fn len(&self) -> usize {
        self.shared.lock().entries.len()
    }

    /// Whether no entries have been declared.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until fewer than `limit` entries are queued.
    ///
    /// Lets a producer stay at most `limit` entries ahead of the consumer.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Aborted`] if the archive failed or its
    /// consumer went away, since the queue would never drain.
    pub async fn wait_for_capacity(&self, limit: usize) -> ArchiveResult<()> {
        let limit = limit.max(1);
        loop {
            let notified = self.finalized.notified();
            {
                let shared = self.shared.lock();
                if let Some(reason) = &shared.aborted {
                    return Err(ArchiveError::Aborted {
                        reason: reason.clone(),
                    });
                }
                if shared.consumer_dropped {
                    return Err(ArchiveError::Aborted {
                        reason: "archive consumer dropped".to_string(),
                    });
                }
                if shared.queued() < limit {
                    return Ok(());
                }
            }
            notified.await;
        }
    }
}

impl ArchiveStream {
    /// Bytes emitted so far.
    pub fn bytes_emitted(&self) -> u64 {
        self.shared.lock().offset
    }
}

impl Stream for ArchiveStream {
    type Item = ArchiveResult<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let step = this.shared.lock().advance(cx);
        if step.finalized || matches!(step.poll, Poll::Ready(Some(Err(_))) | Poll::Ready(None)) {
            this.finalized.notify_waiters();
        }
        step.poll
    }
}

impl Drop for ArchiveStream {
    fn drop(&mut self) {
        self.shared.lock().consumer_dropped = true;
        self.finalized.notify_waiters();
    }
}
