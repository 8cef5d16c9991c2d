//! Background worker for outbound remote writes.

use crate::error::{Result, StoreError};
use crate::remote::{Document, RemoteChannel};
use crate::types::Identity;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

enum WriteJob {
    /// Overwrite the identity's document.
    Write {
        identity: Identity,
        document: Document,
    },
    /// Acknowledge once every earlier job has been attempted.
    Flush(Sender<()>),
}

/// Performs remote writes off the engine thread, in submission order.
///
/// Failures are logged and dropped. Nothing is retried: the next save
/// carries the whole snapshot again.
pub struct RemoteWriter {
    sender: Option<Sender<WriteJob>>,
    thread: Option<JoinHandle<()>>,
}

impl RemoteWriter {
    /// Start the worker thread.
    pub fn spawn(remote: Arc<dyn RemoteChannel>) -> Result<Self> {
        let (sender, receiver) = unbounded();
        let thread = thread::Builder::new()
            .name("vitalstore-remote-writer".into())
            .spawn(move || run(remote, receiver))?;

        Ok(Self {
            sender: Some(sender),
            thread: Some(thread),
        })
    }

    /// Queue a whole-document write to `identity`. The document must
    /// already be sanitized.
    pub fn enqueue(&self, identity: Identity, document: Document) -> Result<()> {
        self.sender
            .as_ref()
            .ok_or(StoreError::EngineStopped)?
            .send(WriteJob::Write { identity, document })?;
        Ok(())
    }

    /// Block until every write queued so far has been attempted.
    pub fn flush(&self) -> Result<()> {
        let (ack, done) = bounded(1);
        self.sender
            .as_ref()
            .ok_or(StoreError::EngineStopped)?
            .send(WriteJob::Flush(ack))?;
        done.recv()?;
        Ok(())
    }
}

impl Drop for RemoteWriter {
    fn drop(&mut self) {
        // Closing the queue lets the worker drain what is left and exit.
        self.sender.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn run(remote: Arc<dyn RemoteChannel>, receiver: Receiver<WriteJob>) {
    for job in receiver {
        match job {
            WriteJob::Write { identity, document } => {
                match remote.write_whole(&identity, &document) {
                    Ok(()) => tracing::debug!(uid = %identity, "remote write complete"),
                    Err(e) => tracing::warn!(uid = %identity, error = %e, "remote write failed"),
                }
            }
            WriteJob::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
}
