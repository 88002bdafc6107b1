use super::{ProcessEvent, ProcessHandle, ProcessSupervisor, SpawnRequest, SpawnedProcess};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use log::{debug, info, warn};
use portable_pty::{ChildKiller, CommandBuilder, MasterPty, NativePtySystem, PtySize, PtySystem};
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

const READ_BUFFER_SIZE: usize = 8192;
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Spawns agents on native pseudo-terminals via portable-pty.
#[derive(Debug, Default, Clone, Copy)]
pub struct PtySupervisor;

struct PtyHandle {
    master: Mutex<Box<dyn MasterPty + Send>>,
    writer: Mutex<Box<dyn Write + Send>>,
    killer: Mutex<Box<dyn ChildKiller + Send + Sync>>,
    pid: Option<u32>,
}

impl ProcessHandle for PtyHandle {
    fn write(&self, data: &[u8]) -> Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| anyhow!("PTY writer lock poisoned"))?;
        writer.write_all(data).context("PTY write failed")?;
        writer.flush().context("PTY flush failed")?;
        Ok(())
    }

    fn resize(&self, cols: u16, rows: u16) -> Result<()> {
        if cols == 0 || rows == 0 {
            return Err(anyhow!("invalid terminal size {cols}x{rows}"));
        }
        let master = self
            .master
            .lock()
            .map_err(|_| anyhow!("PTY master lock poisoned"))?;
        master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .context("PTY resize failed")
    }

    fn kill(&self) -> Result<()> {
        #[cfg(unix)]
        if let Some(pid) = self.pid {
            terminate_process_group(pid);
        }

        let mut killer = self
            .killer
            .lock()
            .map_err(|_| anyhow!("PTY killer lock poisoned"))?;
        match killer.kill() {
            Ok(()) => Ok(()),
            // Already reaped.
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) if err.raw_os_error() == Some(3) => Ok(()),
            Err(err) => Err(anyhow!("Failed to kill agent process: {err}")),
        }
    }

    fn pid(&self) -> Option<u32> {
        self.pid
    }
}

#[cfg(unix)]
fn terminate_process_group(pid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    match killpg(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(err) => debug!("killpg({pid}) failed: {err}"),
    }
}

#[async_trait]
impl ProcessSupervisor for PtySupervisor {
    async fn spawn(&self, request: SpawnRequest) -> Result<SpawnedProcess> {
        tokio::task::spawn_blocking(move || spawn_pty(request))
            .await
            .context("PTY spawn task panicked")?
    }
}

fn spawn_pty(request: SpawnRequest) -> Result<SpawnedProcess> {
    let pty_system = NativePtySystem::default();
    let pair = pty_system
        .openpty(PtySize {
            rows: request.rows,
            cols: request.cols,
            pixel_width: 0,
            pixel_height: 0,
        })
        .context("failed to open PTY")?;

    let mut cmd = CommandBuilder::new(&request.program);
    cmd.args(&request.args);
    cmd.cwd(&request.cwd);
    cmd.env("TERM", "xterm-256color");
    for (key, value) in &request.env {
        cmd.env(key, value);
    }

    let mut child = pair
        .slave
        .spawn_command(cmd)
        .with_context(|| format!("failed to spawn '{}'", request.program))?;
    drop(pair.slave);

    let pid = child.process_id();
    let killer = child.clone_killer();
    let mut reader = pair.master.try_clone_reader().context("PTY reader")?;
    let writer = pair.master.take_writer().context("PTY writer")?;

    info!(
        "Spawned '{}' in {} (pid={pid:?})",
        request.program,
        request.cwd.display()
    );

    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    std::thread::Builder::new()
        .name(format!("pty-reader-{}", pid.unwrap_or_default()))
        .spawn(move || {
            let mut buf = [0u8; READ_BUFFER_SIZE];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.blocking_send(ProcessEvent::Output(buf[..n].to_vec())).is_err() {
                            break;
                        }
                    }
                    Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(err) => {
                        debug!("PTY read ended: {err}");
                        break;
                    }
                }
            }

            let exit_code = match child.wait() {
                Ok(status) => Some(status.exit_code()),
                Err(err) => {
                    warn!("Failed to reap agent process {pid:?}: {err}");
                    None
                }
            };
            let _ = tx.blocking_send(ProcessEvent::Exited { exit_code });
        })
        .context("failed to start PTY reader thread")?;

    Ok(SpawnedProcess {
        handle: Arc::new(PtyHandle {
            master: Mutex::new(pair.master),
            writer: Mutex::new(writer),
            killer: Mutex::new(killer),
            pid,
        }),
        events: rx,
    })
}
