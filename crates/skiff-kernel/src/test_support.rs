//! Scripted kernel doubles for coordinator and pool tests.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::KernelError;
use crate::outcome::RawStatus;
use crate::process::{Kernel, KernelId, KernelLauncher};
use crate::protocol::KernelEvent;

/// Shared observation point for everything the fakes do, with an ordered
/// lifecycle log for assertions about sequencing.
#[derive(Default)]
pub(crate) struct KernelProbe {
    launches: AtomicUsize,
    executions: AtomicUsize,
    shutdowns: AtomicUsize,
    interrupts: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    log: StdMutex<Vec<String>>,
}

impl KernelProbe {
    pub fn record_launch(&self) -> usize {
        let seq = self.launches.fetch_add(1, Ordering::SeqCst) + 1;
        self.push(format!("launch:{seq}"));
        seq
    }

    pub fn record_exec(&self, seq: usize) {
        self.executions.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.push(format!("exec:{seq}"));
    }

    pub fn finish_exec(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn record_interrupt(&self) {
        self.interrupts.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_shutdown(&self, seq: usize) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        self.push(format!("shutdown:{seq}"));
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    pub fn interrupts(&self) -> usize {
        self.interrupts.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn push(&self, entry: String) {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).push(entry);
    }
}

/// Behavior of one submitted evaluation.
#[derive(Debug, Clone)]
pub(crate) enum Script {
    /// Stream the chunks, then settle ok.
    Ok { chunks: Vec<&'static str> },
    /// Stream the chunks, then settle ok after a delay.
    SlowOk {
        chunks: Vec<&'static str>,
        delay: Duration,
    },
    /// Stream the chunks, then settle with an interpreter error.
    Error {
        chunks: Vec<&'static str>,
        error: &'static str,
    },
    /// Settle ok, then the process silently exits.
    OkThenDie { chunks: Vec<&'static str> },
    /// Emit a stdin request, then settle with `EOFError`.
    StdinThenError,
    /// Never settle until interrupted.
    Hang,
    /// Stream the chunks, then close the event stream without a result.
    StreamThenDie { chunks: Vec<&'static str> },
    /// The process is already gone; submission fails.
    DeadOnSubmit,
}

pub(crate) struct FakeKernel {
    id: KernelId,
    pub probe: Arc<KernelProbe>,
    seq: usize,
    scripts: VecDeque<Script>,
    pending: VecDeque<KernelEvent>,
    current_req: u64,
    hanging: bool,
    interrupted: bool,
    result_delay: Option<Duration>,
    die_after_result: bool,
    pub alive: bool,
    pub fail_interrupt: bool,
    pub ignore_interrupt: bool,
}

impl FakeKernel {
    pub fn new(probe: Arc<KernelProbe>, seq: usize, scripts: Vec<Script>) -> Self {
        Self {
            id: KernelId::new(),
            probe,
            seq,
            scripts: scripts.into(),
            pending: VecDeque::new(),
            current_req: 0,
            hanging: false,
            interrupted: false,
            result_delay: None,
            die_after_result: false,
            alive: true,
            fail_interrupt: false,
            ignore_interrupt: false,
        }
    }

    /// Standalone kernel with its own probe, for coordinator tests.
    pub fn with_scripts(scripts: Vec<Script>) -> Self {
        Self::new(Arc::new(KernelProbe::default()), 1, scripts)
    }

    fn result_event(&self, status: RawStatus, cancelled: bool, error: Option<&str>) -> KernelEvent {
        KernelEvent::Result {
            id: self.current_req,
            status,
            cancelled,
            error: error.map(String::from),
        }
    }
}

#[async_trait]
impl Kernel for FakeKernel {
    fn id(&self) -> KernelId {
        self.id
    }

    fn is_alive(&mut self) -> bool {
        self.alive
    }

    async fn submit(
        &mut self,
        _code: &str,
        _working_dir: Option<&Path>,
    ) -> Result<u64, KernelError> {
        self.probe.record_exec(self.seq);
        self.current_req += 1;
        self.pending.clear();
        self.hanging = false;
        self.interrupted = false;
        self.result_delay = None;
        self.die_after_result = false;

        let script = self.scripts.pop_front().unwrap_or(Script::Ok { chunks: vec![] });
        match script {
            Script::DeadOnSubmit => {
                self.alive = false;
                self.probe.finish_exec();
                return Err(KernelError::DeadKernel("broken pipe".to_string()));
            }
            Script::Ok { chunks } => {
                for chunk in chunks {
                    self.pending.push_back(KernelEvent::Stream {
                        text: chunk.to_string(),
                    });
                }
                let result = self.result_event(RawStatus::Ok, false, None);
                self.pending.push_back(result);
            }
            Script::SlowOk { chunks, delay } => {
                for chunk in chunks {
                    self.pending.push_back(KernelEvent::Stream {
                        text: chunk.to_string(),
                    });
                }
                let result = self.result_event(RawStatus::Ok, false, None);
                self.pending.push_back(result);
                self.result_delay = Some(delay);
            }
            Script::Error { chunks, error } => {
                for chunk in chunks {
                    self.pending.push_back(KernelEvent::Stream {
                        text: chunk.to_string(),
                    });
                }
                let result = self.result_event(RawStatus::Error, false, Some(error));
                self.pending.push_back(result);
            }
            Script::OkThenDie { chunks } => {
                for chunk in chunks {
                    self.pending.push_back(KernelEvent::Stream {
                        text: chunk.to_string(),
                    });
                }
                let result = self.result_event(RawStatus::Ok, false, None);
                self.pending.push_back(result);
                self.die_after_result = true;
            }
            Script::StdinThenError => {
                self.pending.push_back(KernelEvent::StdinRequest);
                let result = self.result_event(RawStatus::Error, false, Some("EOFError"));
                self.pending.push_back(result);
            }
            Script::Hang => self.hanging = true,
            Script::StreamThenDie { chunks } => {
                // no result event follows; the stream just closes
                for chunk in chunks {
                    self.pending.push_back(KernelEvent::Stream {
                        text: chunk.to_string(),
                    });
                }
            }
        }
        Ok(self.current_req)
    }

    async fn next_event(&mut self) -> Result<KernelEvent, KernelError> {
        loop {
            let is_result = matches!(self.pending.front(), Some(KernelEvent::Result { .. }));
            if let Some(event) = self.pending.pop_front() {
                if is_result {
                    if let Some(delay) = self.result_delay.take() {
                        tokio::time::sleep(delay).await;
                    }
                    self.probe.finish_exec();
                    if self.die_after_result {
                        self.die_after_result = false;
                        self.alive = false;
                    }
                }
                return Ok(event);
            }
            if self.hanging {
                if self.interrupted {
                    self.hanging = false;
                    self.probe.finish_exec();
                    return Ok(self.result_event(
                        RawStatus::Error,
                        true,
                        Some("KeyboardInterrupt"),
                    ));
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
                continue;
            }
            return Err(KernelError::DeadKernel("event stream closed".to_string()));
        }
    }

    async fn interrupt(&mut self) -> Result<(), KernelError> {
        self.probe.record_interrupt();
        if self.fail_interrupt || !self.alive {
            return Err(KernelError::InterruptFailed("process gone".to_string()));
        }
        if !self.ignore_interrupt {
            self.interrupted = true;
        }
        Ok(())
    }

    async fn ping(&mut self) -> Result<(), KernelError> {
        if self.alive {
            Ok(())
        } else {
            Err(KernelError::DeadKernel("ping failed".to_string()))
        }
    }

    async fn shutdown(&mut self) {
        self.probe.record_shutdown(self.seq);
        self.alive = false;
    }
}

/// Hands out [`FakeKernel`]s in launch order, each driven by the next script
/// set in the queue.
pub(crate) struct FakeLauncher {
    probe: Arc<KernelProbe>,
    scripts: StdMutex<VecDeque<Vec<Script>>>,
}

impl FakeLauncher {
    pub fn new(probe: Arc<KernelProbe>, scripts: Vec<Vec<Script>>) -> Self {
        Self {
            probe,
            scripts: StdMutex::new(scripts.into()),
        }
    }
}

#[async_trait]
impl KernelLauncher for FakeLauncher {
    async fn launch(&self) -> Result<Box<dyn Kernel>, KernelError> {
        let seq = self.probe.record_launch();
        let scripts = self
            .scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_default();
        Ok(Box::new(FakeKernel::new(self.probe.clone(), seq, scripts)))
    }
}
