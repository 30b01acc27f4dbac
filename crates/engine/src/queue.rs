//! The serialized execution queue: a dedicated writer thread draining a
//! channel of commands in submission order.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use crate::command::Command;
use crate::error::EngineError;
use crate::writer::Writer;

type Job = Box<dyn FnOnce(&mut Writer) + Send>;

/// The reply to a submitted command.
pub struct Pending<T> {
    reply: Receiver<Result<T, EngineError>>,
}

impl<T> Pending<T> {
    /// Block until the command has run.
    pub fn wait(self) -> Result<T, EngineError> {
        self.reply.recv().map_err(|_| EngineError::QueueClosed)?
    }
}

pub struct WriterQueue {
    sender: Mutex<Option<Sender<Job>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl WriterQueue {
    pub fn start(writer: Writer) -> Result<Self, EngineError> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let handle = thread::Builder::new()
            .name("revdb-writer".into())
            .spawn(move || run(writer, receiver))?;
        Ok(Self {
            sender: Mutex::new(Some(sender)),
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn submit<C: Command>(&self, command: C) -> Result<Pending<C::Output>, EngineError> {
        let (reply_tx, reply) = mpsc::channel();
        let job: Job = Box::new(move |writer: &mut Writer| {
            let result = match panic::catch_unwind(AssertUnwindSafe(|| command.execute(writer))) {
                Ok(_) if writer.storage().is_in_transaction() => {
                    let depth = writer.storage().transaction_depth();
                    tracing::error!(depth, "command returned with a transaction level still open");
                    writer.abandon();
                    Err(EngineError::InvariantViolation(format!(
                        "command left {depth} transaction level(s) open"
                    )))
                }
                Ok(result) => result,
                Err(_) => {
                    tracing::error!("command panicked on the writer thread");
                    writer.abandon();
                    Err(EngineError::InvariantViolation("command panicked".into()))
                }
            };
            // The submitter may have stopped waiting.
            let _ = reply_tx.send(result);
        });

        let sender = self.sender.lock();
        let sender = sender.as_ref().ok_or(EngineError::QueueClosed)?;
        sender.send(job).map_err(|_| EngineError::QueueClosed)?;
        Ok(Pending { reply })
    }

    /// Submit and wait.
    pub fn execute<C: Command>(&self, command: C) -> Result<C::Output, EngineError> {
        self.submit(command)?.wait()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Stop accepting work, let the writer finish what is already queued,
    /// and join it. Later submissions fail with `QueueClosed`.
    pub fn shutdown(&self) {
        let Some(sender) = self.sender.lock().take() else {
            return;
        };
        drop(sender);
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                tracing::error!("writer thread panicked during shutdown");
            }
        }
        tracing::info!("writer queue shut down");
    }
}

impl Drop for WriterQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(mut writer: Writer, jobs: Receiver<Job>) {
    while let Ok(job) = jobs.recv() {
        job(&mut writer);
    }
    tracing::debug!("writer thread draining complete");
}
