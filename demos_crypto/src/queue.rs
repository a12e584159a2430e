use crate::*;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Running(Progress),
    Finished,
    Failed(String),
}

impl JobStatus {
    pub fn is_done(&self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Failed(_))
    }
}

#[derive(Default)]
struct Slot {
    status: Mutex<Option<Result<(), String>>>,
    started: Mutex<bool>,
    done: Condvar,
}

/// Observes a submitted job
#[derive(Clone)]
pub struct JobHandle {
    election: Uuid,
    slot: Arc<Slot>,
    progress: ProgressCounter,
}

impl JobHandle {
    pub fn election(&self) -> Uuid {
        self.election
    }

    pub fn status(&self) -> JobStatus {
        let status = self.slot.status.lock().unwrap_or_else(|e| e.into_inner());
        match &*status {
            Some(Ok(())) => JobStatus::Finished,
            Some(Err(e)) => JobStatus::Failed(e.clone()),
            None => {
                if *self.slot.started.lock().unwrap_or_else(|e| e.into_inner()) {
                    JobStatus::Running(self.progress.get())
                } else {
                    JobStatus::Queued
                }
            }
        }
    }

    /// Block until the job finishes or fails
    pub fn wait(&self) -> JobStatus {
        let mut status = self.slot.status.lock().unwrap_or_else(|e| e.into_inner());
        while status.is_none() {
            status = self
                .slot
                .done
                .wait(status)
                .unwrap_or_else(|e| e.into_inner());
        }
        drop(status);
        self.status()
    }
}

struct Task {
    job: Box<dyn Job>,
    slot: Arc<Slot>,
    progress: ProgressCounter,
}

/// Runs jobs on a fixed set of worker threads
pub struct WorkQueue {
    sender: Option<Sender<Task>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkQueue {
    pub fn new(workers: usize) -> Result<Self, Error> {
        let (sender, receiver) = channel::<Task>();
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..workers.max(1))
            .map(|n| {
                let receiver = receiver.clone();
                thread::Builder::new()
                    .name(format!("demos-jobs-{}", n))
                    .spawn(move || work(receiver))
                    .map_err(Error::Io)
            })
            .collect::<Result<Vec<_>, Error>>()?;

        Ok(WorkQueue {
            sender: Some(sender),
            workers,
        })
    }

    pub fn submit<J: Job + 'static>(&self, job: J) -> Result<JobHandle, Error> {
        let handle = JobHandle {
            election: job.election(),
            slot: Arc::new(Slot::default()),
            progress: ProgressCounter::default(),
        };

        let task = Task {
            job: Box::new(job),
            slot: handle.slot.clone(),
            progress: handle.progress.clone(),
        };

        match &self.sender {
            Some(sender) => sender.send(task).map_err(|_| Error::QueueClosed)?,
            None => return Err(Error::QueueClosed),
        }

        Ok(handle)
    }

    /// Stop accepting jobs and wait for queued ones to finish
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("job worker panicked");
            }
        }
    }
}

impl Drop for WorkQueue {
    fn drop(&mut self) {
        self.stop();
    }
}

fn work(receiver: Arc<Mutex<Receiver<Task>>>) {
    loop {
        let next = match receiver.lock() {
            Ok(receiver) => receiver.recv(),
            Err(_) => return,
        };
        let mut task = match next {
            Ok(task) => task,
            Err(_) => return,
        };

        *task.slot.started.lock().unwrap_or_else(|e| e.into_inner()) = true;

        let election = task.job.election();
        let result = task.job.run(&task.progress).map_err(|e| e.to_string());
        match &result {
            Ok(()) => info!(election = %election, "job finished"),
            Err(e) => warn!(election = %election, error = %e, "job failed"),
        }

        *task.slot.status.lock().unwrap_or_else(|e| e.into_inner()) = Some(result);
        task.slot.done.notify_all();
    }
}
