//! Asynchronous queue of the software device.
//!
//! Submissions are sent over a channel to a worker thread which executes
//! them in order and signals the timeline fence after each list. A command
//! that fails validation marks the fence lost; work queued after it is
//! dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, trace, warn};

use crate::command::CommandList;
use crate::device::Queue;
use crate::error::{RhiError, RhiResult};
use crate::swapchain::SwapChainId;
use crate::sync::{CompletionCounter, FenceValue, TimelineFence};

use super::execute::execute;
use super::resources::ResourceTables;

pub(crate) enum Op {
    Execute {
        commands: CommandList,
        signal: FenceValue,
    },
    Present {
        swap_chain: SwapChainId,
        buffer_index: u32,
    },
    /// Acknowledged once every earlier op has run.
    Idle(Sender<()>),
    Shutdown,
}

#[derive(Default)]
struct Gate {
    paused: bool,
    shutting_down: bool,
}

/// State shared between the device, the queue and the worker.
pub(crate) struct Shared {
    pub tables: Mutex<ResourceTables>,
    pub fence: TimelineFence,
    gate: Mutex<Gate>,
    gate_changed: Condvar,
    pub submissions: AtomicU64,
    pub executed: AtomicU64,
    pub presents: AtomicU64,
}

impl Shared {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(ResourceTables::default()),
            fence: TimelineFence::new(),
            gate: Mutex::new(Gate::default()),
            gate_changed: Condvar::new(),
            submissions: AtomicU64::new(0),
            executed: AtomicU64::new(0),
            presents: AtomicU64::new(0),
        }
    }

    pub fn set_paused(&self, paused: bool) {
        self.gate.lock().paused = paused;
        self.gate_changed.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        self.gate.lock().paused
    }

    fn wait_while_paused(&self) {
        let mut gate = self.gate.lock();
        while gate.paused && !gate.shutting_down {
            self.gate_changed.wait(&mut gate);
        }
    }

    fn begin_shutdown(&self) {
        self.gate.lock().shutting_down = true;
        self.gate_changed.notify_all();
    }
}

/// Queue handed out by the software device.
pub struct SoftwareQueue {
    shared: Arc<Shared>,
    sender: Sender<Op>,
    last_signal: Mutex<FenceValue>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SoftwareQueue {
    pub(crate) fn new(shared: Arc<Shared>) -> RhiResult<Self> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let worker_shared = shared.clone();
        let worker = std::thread::Builder::new()
            .name("software-queue".to_string())
            .spawn(move || run(worker_shared, receiver))
            .map_err(|e| RhiError::AllocationFailed(format!("queue worker: {}", e)))?;

        debug!("Software queue worker started");

        Ok(Self {
            shared,
            sender,
            last_signal: Mutex::new(0),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Blocks until every op queued so far has run.
    pub(crate) fn wait_idle(&self) -> RhiResult<()> {
        let (ack, done) = crossbeam_channel::bounded(1);
        self.send(Op::Idle(ack))?;
        done.recv()
            .map_err(|_| RhiError::DeviceLost("queue worker stopped".to_string()))
    }

    fn send(&self, op: Op) -> RhiResult<()> {
        self.sender
            .send(op)
            .map_err(|_| RhiError::DeviceLost("queue worker stopped".to_string()))
    }
}

impl CompletionCounter for SoftwareQueue {
    fn completed_value(&self) -> RhiResult<FenceValue> {
        self.shared.fence.completed_value()
    }

    fn wait_until(&self, value: FenceValue) -> RhiResult<()> {
        self.shared.fence.wait_until(value)
    }
}

impl Queue for SoftwareQueue {
    fn submit(&self, commands: CommandList, signal_value: FenceValue) -> RhiResult<()> {
        // Fails with DeviceLost once the fence is lost
        self.shared.fence.completed_value()?;

        let mut last = self.last_signal.lock();
        if signal_value <= *last {
            return Err(RhiError::InvalidUsage(format!(
                "signal value {} must be greater than the previous {}",
                signal_value, *last
            )));
        }

        trace!(
            "Submitting '{}' ({} commands), signal {}",
            commands.label(),
            commands.len(),
            signal_value
        );
        self.send(Op::Execute {
            commands,
            signal: signal_value,
        })?;
        *last = signal_value;
        self.shared.submissions.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn present(&self, swap_chain: SwapChainId, buffer_index: u32) -> RhiResult<()> {
        self.shared.fence.completed_value()?;
        self.send(Op::Present {
            swap_chain,
            buffer_index,
        })
    }
}

impl Drop for SoftwareQueue {
    fn drop(&mut self) {
        self.shared.begin_shutdown();
        let _ = self.sender.send(Op::Shutdown);
        if let Some(worker) = self.worker.lock().take()
            && worker.join().is_err()
        {
            error!("Software queue worker panicked");
        }
        debug!("Software queue worker stopped");
    }
}

/// Marks the fence lost if the worker unwinds, so waiters wake up with
/// `DeviceLost` instead of blocking forever.
struct LoseOnPanic<'a>(&'a Shared);

impl Drop for LoseOnPanic<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.fence.mark_lost("software queue worker panicked");
        }
    }
}

fn run(shared: Arc<Shared>, receiver: Receiver<Op>) {
    let _guard = LoseOnPanic(&shared);
    while let Ok(op) = receiver.recv() {
        match op {
            Op::Shutdown => break,
            Op::Idle(ack) => {
                let _ = ack.send(());
            }
            Op::Execute { commands, signal } => {
                shared.wait_while_paused();
                if shared.fence.is_lost() {
                    warn!("Dropping '{}': device lost", commands.label());
                    continue;
                }

                let result = execute(&mut shared.tables.lock(), &commands);
                match result {
                    Ok(()) => {
                        shared.executed.fetch_add(1, Ordering::Relaxed);
                        if let Err(e) = shared.fence.signal(signal) {
                            shared.fence.mark_lost(e.to_string());
                        }
                    }
                    Err(e) => {
                        error!("Command list failed: {}", e);
                        shared.fence.mark_lost(e.to_string());
                    }
                }
            }
            Op::Present {
                swap_chain,
                buffer_index,
            } => {
                shared.wait_while_paused();
                if shared.fence.is_lost() {
                    continue;
                }
                match shared.tables.lock().present(swap_chain, buffer_index) {
                    Ok(()) => {
                        shared.presents.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        error!("Present failed: {}", e);
                        shared.fence.mark_lost(e.to_string());
                    }
                }
            }
        }
    }
}
