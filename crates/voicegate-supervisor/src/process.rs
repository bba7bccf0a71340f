//! OS process units.

use crate::unit::{Launch, ReadyCheck, Unit, UnitExit};
use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::{Child, Command};

/// Launch description for an external process.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub name: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub current_dir: Option<PathBuf>,
    pub ready: Option<ReadyCheck>,
}

impl ProcessSpec {
    pub fn new(name: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            current_dir: None,
            ready: None,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn ready_check(mut self, ready: ReadyCheck) -> Self {
        self.ready = Some(ready);
        self
    }
}

impl Launch for ProcessSpec {
    fn name(&self) -> &str {
        &self.name
    }

    fn launch(&self) -> io::Result<Box<dyn Unit>> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        // Own process group: a terminal Ctrl+C reaches only the supervisor,
        // which then forwards SIGTERM.
        #[cfg(unix)]
        command.process_group(0);

        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }

        let child = command.spawn()?;
        Ok(Box::new(ProcessUnit { child }))
    }

    fn ready_check(&self) -> Option<ReadyCheck> {
        self.ready.clone()
    }
}

/// A spawned child process.
#[derive(Debug)]
pub struct ProcessUnit {
    child: Child,
}

#[async_trait]
impl Unit for ProcessUnit {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    async fn wait(&mut self) -> io::Result<UnitExit> {
        self.child.wait().await.map(UnitExit::from)
    }

    #[cfg(unix)]
    fn terminate(&mut self) -> io::Result<()> {
        // `id()` is None once the child has been reaped; nothing left to signal.
        let Some(pid) = self.child.id() else {
            return Ok(());
        };
        let pid = libc::pid_t::try_from(pid)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
        // SAFETY: kill(2) has no memory-safety preconditions; the pid belongs
        // to a child we have not reaped yet.
        let result = unsafe { libc::kill(pid, libc::SIGTERM) };
        if result != 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ESRCH) {
                return Ok(());
            }
            return Err(err);
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) -> io::Result<()> {
        self.kill()
    }

    fn kill(&mut self) -> io::Result<()> {
        match self.child.start_kill() {
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
            other => other,
        }
    }
}
