//! Background level sampling.
//!
//! The sampler task exclusively owns at most one [`CaptureProcess`]. The
//! controller redirects it through [`SamplerHandle::retarget`], which always
//! tears the old capture down before a new one is spawned, so two captures
//! never contend for a device.
//!
//! Idle (no target) -> Sampling (capture running) -> Idle, with `retarget`
//! as the only transition trigger. A capture that dies leaves the sampler
//! idle with the error recorded until the next retarget.

use super::capture::{CaptureProcess, CaptureSpawner};
use super::level;
use super::MeterHandle;
use crate::config::MeterConfig;
use crate::controller::Source;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const COMMAND_BUFFER: usize = 8;
const EOF_RETRY_PAUSE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy)]
pub struct SamplerSettings {
    pub chunk_bytes: usize,
    pub full_scale_rms: f64,
    /// Bound on the graceful shutdown of a superseded capture.
    pub stop_grace: Duration,
    /// A read that produces nothing for this long counts as a silent chunk.
    pub stall: Duration,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self::from(&MeterConfig::default())
    }
}

impl From<&MeterConfig> for SamplerSettings {
    fn from(config: &MeterConfig) -> Self {
        Self {
            chunk_bytes: config.chunk_bytes.max(2),
            full_scale_rms: config.full_scale_rms,
            stop_grace: Duration::from_millis(config.stop_grace_ms),
            stall: Duration::from_millis(config.stall_ms.max(1)),
        }
    }
}

enum SamplerCommand {
    Retarget {
        source: Source,
        device: String,
        done: oneshot::Sender<()>,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

/// Cheap, cloneable front end to the sampler task.
#[derive(Clone)]
pub struct SamplerHandle {
    tx: mpsc::Sender<SamplerCommand>,
    meter: MeterHandle,
}

impl SamplerHandle {
    /// Redirects measurement to `(source, device)`, replacing any running
    /// capture. Completes once the old capture is gone and the new one (if
    /// any) has been started. Capture problems end up in the meter, never here.
    pub async fn retarget(&self, source: Source, device: &str) {
        let (done, wait) = oneshot::channel();
        let command = SamplerCommand::Retarget {
            source,
            device: device.to_string(),
            done,
        };
        if self.tx.send(command).await.is_err() {
            warn!("Level sampler is not running, retarget to {} dropped", source);
            return;
        }
        let _ = wait.await;
    }

    /// Stops the task and terminates its capture process.
    pub async fn shutdown(&self) {
        let (done, wait) = oneshot::channel();
        if self.tx.send(SamplerCommand::Shutdown { done }).await.is_ok() {
            let _ = wait.await;
        }
    }

    pub fn meter(&self) -> &MeterHandle {
        &self.meter
    }
}

enum Event {
    Command(Option<SamplerCommand>),
    Read(Result<std::io::Result<usize>, tokio::time::error::Elapsed>),
}

pub struct LevelSampler {
    meter: MeterHandle,
    spawner: Arc<dyn CaptureSpawner>,
    settings: SamplerSettings,
    capture: Option<CaptureProcess>,
    rx: mpsc::Receiver<SamplerCommand>,
}

impl LevelSampler {
    /// Starts the sampling task. It runs until [`SamplerHandle::shutdown`]
    /// or until every handle is dropped.
    pub fn spawn(
        meter: MeterHandle,
        spawner: Arc<dyn CaptureSpawner>,
        settings: SamplerSettings,
    ) -> (SamplerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let sampler = Self {
            meter: meter.clone(),
            spawner,
            settings,
            capture: None,
            rx,
        };
        let task = tokio::spawn(sampler.run());
        (SamplerHandle { tx, meter }, task)
    }

    async fn run(mut self) {
        info!("Level sampler started");
        let mut chunk = vec![0u8; self.settings.chunk_bytes];
        let mut filled = 0usize;

        loop {
            let event = match self.capture.as_mut() {
                None => Event::Command(self.rx.recv().await),
                Some(capture) => {
                    tokio::select! {
                        command = self.rx.recv() => Event::Command(command),
                        read = tokio::time::timeout(
                            self.settings.stall,
                            capture.read(&mut chunk[filled..]),
                        ) => Event::Read(read),
                    }
                }
            };

            match event {
                Event::Command(Some(SamplerCommand::Retarget {
                    source,
                    device,
                    done,
                })) => {
                    filled = 0;
                    self.retarget(source, &device).await;
                    let _ = done.send(());
                }
                Event::Command(Some(SamplerCommand::Shutdown { done })) => {
                    self.stop_capture().await;
                    let _ = done.send(());
                    break;
                }
                Event::Command(None) => {
                    self.stop_capture().await;
                    break;
                }
                Event::Read(Ok(Ok(0))) => {
                    filled = 0;
                    self.on_output_closed().await;
                }
                Event::Read(Ok(Ok(n))) => {
                    filled += n;
                    if filled == chunk.len() {
                        self.on_chunk(&chunk).await;
                        filled = 0;
                    }
                }
                Event::Read(Ok(Err(e))) => {
                    filled = 0;
                    error!("Capture read failed: {}", e);
                    self.meter
                        .record_error(format!("capture read failed: {}", e))
                        .await;
                    self.stop_capture().await;
                }
                Event::Read(Err(_)) => self.on_stall().await,
            }
        }

        info!("Level sampler stopped");
    }

    async fn retarget(&mut self, source: Source, device: &str) {
        self.stop_capture().await;

        if source == Source::Off || device.trim().is_empty() {
            debug!("Level sampler idle (source={})", source);
            self.meter.set_idle(source).await;
            return;
        }

        match self.spawner.spawn(device) {
            Ok(capture) => {
                info!(
                    "Level sampler following {} on {} (pid {:?})",
                    source,
                    device,
                    capture.id()
                );
                self.capture = Some(capture);
                self.meter.set_sampling(source, device).await;
            }
            Err(e) => {
                warn!("Level capture for {} unavailable: {:#}", device, e);
                self.meter
                    .set_target_failed(source, device, format!("{:#}", e))
                    .await;
            }
        }
    }

    async fn stop_capture(&mut self) {
        if let Some(capture) = self.capture.take() {
            capture.terminate(self.settings.stop_grace).await;
        }
    }

    async fn on_chunk(&self, chunk: &[u8]) {
        let rms = level::rms_s16le(chunk);
        let instant = level::level_from_rms(rms, self.settings.full_scale_rms);
        self.meter.apply_instant(instant).await;
    }

    async fn on_stall(&mut self) {
        if self.capture_exited().await {
            return;
        }
        self.meter.apply_instant(0).await;
    }

    /// Output closed but the process lives on: silence until it exits.
    async fn on_output_closed(&mut self) {
        if self.capture_exited().await {
            return;
        }
        self.meter.apply_instant(0).await;
        tokio::time::sleep(EOF_RETRY_PAUSE).await;
    }

    /// Records the exit and releases the capture if the process is gone.
    async fn capture_exited(&mut self) -> bool {
        let Some(capture) = self.capture.as_mut() else {
            return false;
        };
        let Some(status) = capture.exited() else {
            return false;
        };

        let diagnostics = capture.diagnostics().await;
        let message = if diagnostics.is_empty() {
            format!("capture process exited ({})", status)
        } else {
            format!("capture process exited ({}): {}", status, diagnostics)
        };
        warn!("{}", message);
        self.meter.record_error(message).await;
        self.capture = None;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meter::capture::CommandSpawner;
    use crate::meter::MeterState;
    use anyhow::Result;
    use std::path::Path;
    use std::sync::Mutex;

    /// Runs a shell script as the capture command and remembers every pid.
    struct ScriptSpawner {
        inner: CommandSpawner,
        pids: Mutex<Vec<u32>>,
    }

    impl ScriptSpawner {
        fn new(script: &str) -> Arc<Self> {
            let config = MeterConfig {
                program: "sh".to_string(),
                args: vec!["-c".to_string(), script.to_string()],
                ..MeterConfig::default()
            };
            Arc::new(Self {
                inner: CommandSpawner::new(&config),
                pids: Mutex::new(Vec::new()),
            })
        }

        fn pids(&self) -> Vec<u32> {
            self.pids.lock().unwrap().clone()
        }
    }

    impl CaptureSpawner for ScriptSpawner {
        fn spawn(&self, device: &str) -> Result<CaptureProcess> {
            let capture = self.inner.spawn(device)?;
            if let Some(pid) = capture.id() {
                self.pids.lock().unwrap().push(pid);
            }
            Ok(capture)
        }
    }

    fn settings() -> SamplerSettings {
        SamplerSettings {
            chunk_bytes: 256,
            full_scale_rms: 1000.0,
            stop_grace: Duration::from_millis(100),
            stall: Duration::from_millis(50),
        }
    }

    fn alive(pid: u32) -> bool {
        Path::new(&format!("/proc/{}", pid)).exists()
    }

    async fn wait_for<F>(meter: &MeterHandle, predicate: F) -> MeterState
    where
        F: Fn(&MeterState) -> bool,
    {
        let deadline = std::time::Instant::now() + Duration::from_secs(3);
        loop {
            let state = meter.snapshot().await;
            if predicate(&state) || std::time::Instant::now() > deadline {
                return state;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test]
    async fn test_off_target_stays_idle() {
        let spawner = ScriptSpawner::new("exec sleep 30");
        let (handle, _task) =
            LevelSampler::spawn(MeterHandle::default(), spawner.clone(), settings());

        handle.retarget(Source::Off, "hw:1,0").await;
        handle.retarget(Source::LineIn, "").await;

        let state = handle.meter().snapshot().await;
        assert_eq!(state.level, 0);
        assert!(state.device.is_empty());
        assert!(state.last_error.is_none());
        assert!(spawner.pids().is_empty());
    }

    #[tokio::test]
    async fn test_loud_signal_raises_level() {
        // `yes` emits "y\n" forever: every sample is 0x0a79 = 2681.
        let spawner = ScriptSpawner::new("exec yes");
        let (handle, _task) =
            LevelSampler::spawn(MeterHandle::default(), spawner.clone(), settings());

        handle.retarget(Source::LineIn, "hw:1,0").await;
        let state = wait_for(handle.meter(), |s| s.level == 100).await;

        assert_eq!(state.level, 100);
        assert_eq!(state.source, Source::LineIn);
        assert_eq!(state.device, "hw:1,0");
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_retarget_off_kills_capture_and_zeroes_level() {
        let spawner = ScriptSpawner::new("exec yes");
        let (handle, _task) =
            LevelSampler::spawn(MeterHandle::default(), spawner.clone(), settings());

        handle.retarget(Source::Spotify, "hw:Loopback,1,0").await;
        wait_for(handle.meter(), |s| s.level > 0).await;
        handle.retarget(Source::Off, "").await;

        let state = handle.meter().snapshot().await;
        assert_eq!(state.level, 0);
        assert_eq!(state.source, Source::Off);
        assert!(state.device.is_empty());
        assert!(!alive(spawner.pids()[0]));
    }

    #[tokio::test]
    async fn test_repeated_retarget_never_leaves_two_captures() {
        let spawner = ScriptSpawner::new("exec sleep 30");
        let (handle, _task) =
            LevelSampler::spawn(MeterHandle::default(), spawner.clone(), settings());

        handle.retarget(Source::LineIn, "hw:1,0").await;
        handle.retarget(Source::LineIn, "hw:1,0").await;

        let pids = spawner.pids();
        assert_eq!(pids.len(), 2);
        assert!(!alive(pids[0]));
        assert!(alive(pids[1]));
        assert_eq!(handle.meter().snapshot().await.device, "hw:1,0");

        handle.shutdown().await;
        assert!(!alive(pids[1]));
    }

    #[tokio::test]
    async fn test_crashed_capture_reports_error_and_loop_survives() {
        let spawner =
            ScriptSpawner::new("echo 'audio open error: Device or resource busy' >&2; exit 1");
        let (handle, task) =
            LevelSampler::spawn(MeterHandle::default(), spawner.clone(), settings());

        handle.retarget(Source::LineIn, "hw:1,0").await;
        let state = wait_for(handle.meter(), |s| s.last_error.is_some()).await;

        assert_eq!(state.level, 0);
        let error = state.last_error.unwrap();
        assert!(error.contains("Device or resource busy"), "{}", error);
        assert!(!task.is_finished());

        // Still accepts work after the crash.
        handle.retarget(Source::Off, "").await;
        assert!(handle.meter().snapshot().await.last_error.is_none());
    }

    #[tokio::test]
    async fn test_spawn_failure_is_recorded_not_raised() {
        let config = MeterConfig {
            program: "/nonexistent/arecord".to_string(),
            ..MeterConfig::default()
        };
        let spawner = Arc::new(CommandSpawner::new(&config));
        let (handle, _task) = LevelSampler::spawn(MeterHandle::default(), spawner, settings());

        handle.retarget(Source::LineIn, "hw:1,0").await;

        let state = handle.meter().snapshot().await;
        assert_eq!(state.level, 0);
        assert_eq!(state.device, "hw:1,0");
        assert!(state.last_error.is_some());
    }

    #[tokio::test]
    async fn test_stalled_capture_decays_level() {
        // One loud chunk, then silence on an open pipe.
        let spawner = ScriptSpawner::new("yes | head -c 256; exec sleep 30");
        let (handle, _task) =
            LevelSampler::spawn(MeterHandle::default(), spawner.clone(), settings());

        handle.retarget(Source::LineIn, "hw:1,0").await;
        wait_for(handle.meter(), |s| s.level == 100).await;
        let state = wait_for(handle.meter(), |s| s.level == 0).await;

        assert_eq!(state.level, 0);
        assert!(state.last_error.is_none());
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_closed_output_on_live_capture_decays_level() {
        // One loud chunk, then stdout is closed while the process keeps running.
        let spawner = ScriptSpawner::new("yes | head -c 256; exec >&-; exec sleep 30");
        let (handle, _task) =
            LevelSampler::spawn(MeterHandle::default(), spawner.clone(), settings());

        handle.retarget(Source::LineIn, "hw:1,0").await;
        wait_for(handle.meter(), |s| s.level == 100).await;
        let state = wait_for(handle.meter(), |s| s.level == 0).await;

        assert_eq!(state.level, 0);
        assert!(state.last_error.is_none());
        assert!(alive(spawner.pids()[0]));
        handle.shutdown().await;
    }
}
