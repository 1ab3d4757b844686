//! Owner-thread callback queue
//!
//! Completion handlers are not run where the work finishes. They are posted
//! here and run only when the owner drains the queue, so handlers never run
//! concurrently with each other or with the owner's own work.

use tokio::sync::mpsc;

type Callback = Box<dyn FnOnce() + Send + 'static>;

pub struct MainQueue {
    sender: mpsc::UnboundedSender<Callback>,
    receiver: mpsc::UnboundedReceiver<Callback>,
}

/// Posting side of a [`MainQueue`]
#[derive(Clone)]
pub struct MainQueueHandle {
    sender: mpsc::UnboundedSender<Callback>,
}

impl MainQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self { sender, receiver }
    }

    pub fn handle(&self) -> MainQueueHandle {
        MainQueueHandle {
            sender: self.sender.clone(),
        }
    }

    /// Run every callback already queued, returning how many ran
    pub fn drain(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(callback) = self.receiver.try_recv() {
            callback();
            ran += 1;
        }
        ran
    }

    /// Wait for the next callback and run it
    pub async fn run_next(&mut self) {
        // The queue holds its own sender, so the channel never closes here
        if let Some(callback) = self.receiver.recv().await {
            callback();
        }
    }
}

impl Default for MainQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MainQueueHandle {
    /// Queue a callback; returns false if the queue is gone
    pub fn post<F>(&self, callback: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.sender.send(Box::new(callback)).is_ok()
    }
}
