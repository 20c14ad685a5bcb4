//! Keeping the display awake while the auto-advance timer runs.
//!
//! The primary lock is the platform's idle inhibitor; when it cannot be
//! started we fall back to a silent audio stream, which most desktops also
//! treat as activity.

use std::process::{Child, Command, Stdio};

use tracing::{debug, warn};

use crate::error::WakeLockError;

pub trait WakeLock: Send {
    fn name(&self) -> &'static str;
    fn acquire(&mut self) -> Result<(), WakeLockError>;
    fn release(&mut self);
    fn is_held(&self) -> bool;
}

/// Wake lock that holds a helper process alive for as long as it is acquired.
pub struct CommandWakeLock {
    name: &'static str,
    program: Option<&'static str>,
    args: Vec<&'static str>,
    child: Option<Child>,
}

impl CommandWakeLock {
    pub fn new(name: &'static str, program: &'static str, args: &[&'static str]) -> Self {
        Self {
            name,
            program: Some(program),
            args: args.to_vec(),
            child: None,
        }
    }

    pub fn unsupported(name: &'static str) -> Self {
        Self {
            name,
            program: None,
            args: Vec::new(),
            child: None,
        }
    }

    /// Idle/sleep inhibitor of the host OS.
    pub fn platform_inhibitor() -> Self {
        #[cfg(target_os = "linux")]
        {
            Self::new(
                "idle inhibitor",
                "systemd-inhibit",
                &["--what=idle:sleep", "--who=set-viewer", "--why=Slideshow running", "sleep", "infinity"],
            )
        }
        #[cfg(target_os = "macos")]
        {
            Self::new("idle inhibitor", "caffeinate", &["-d", "-i"])
        }
        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        {
            Self::unsupported("idle inhibitor")
        }
    }

    /// Endless silent audio stream.
    pub fn silent_stream() -> Self {
        #[cfg(target_os = "linux")]
        {
            Self::new("silent stream", "aplay", &["-q", "-t", "raw", "-f", "S16_LE", "-r", "8000", "/dev/zero"])
        }
        #[cfg(not(target_os = "linux"))]
        {
            Self::unsupported("silent stream")
        }
    }
}

impl WakeLock for CommandWakeLock {
    fn name(&self) -> &'static str {
        self.name
    }

    fn acquire(&mut self) -> Result<(), WakeLockError> {
        if self.is_held() {
            return Ok(());
        }
        let program = self.program.ok_or(WakeLockError::Unsupported(self.name))?;

        let child = Command::new(program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| WakeLockError::Spawn {
                program: program.to_string(),
                reason: e.to_string(),
            })?;
        debug!("Acquired {} (pid {})", self.name, child.id());
        self.child = Some(child);
        Ok(())
    }

    fn release(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
            debug!("Released {}", self.name);
        }
    }

    fn is_held(&self) -> bool {
        self.child.is_some()
    }
}

impl Drop for CommandWakeLock {
    fn drop(&mut self) {
        self.release();
    }
}

/// Does nothing. Used when wake management is disabled in the config.
#[derive(Debug, Default)]
pub struct NoopWakeLock {
    held: bool,
}

impl WakeLock for NoopWakeLock {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn acquire(&mut self) -> Result<(), WakeLockError> {
        self.held = true;
        Ok(())
    }

    fn release(&mut self) {
        self.held = false;
    }

    fn is_held(&self) -> bool {
        self.held
    }
}

/// Primary lock with an optional fallback.
pub struct WakeManager {
    primary: Box<dyn WakeLock>,
    fallback: Option<Box<dyn WakeLock>>,
}

impl WakeManager {
    pub fn new(primary: Box<dyn WakeLock>, fallback: Option<Box<dyn WakeLock>>) -> Self {
        Self { primary, fallback }
    }

    pub fn platform() -> Self {
        Self::new(
            Box::new(CommandWakeLock::platform_inhibitor()),
            Some(Box::new(CommandWakeLock::silent_stream())),
        )
    }

    pub fn disabled() -> Self {
        Self::new(Box::new(NoopWakeLock::default()), None)
    }

    /// Make sure some lock is held. Returns false when neither could be taken.
    pub fn hold(&mut self) -> bool {
        if self.is_held() {
            return true;
        }
        match self.primary.acquire() {
            Ok(()) => return true,
            Err(e) => warn!("Wake lock unavailable: {}", e),
        }
        match self.fallback.as_mut() {
            Some(fallback) => match fallback.acquire() {
                Ok(()) => {
                    debug!("Using {} as wake lock fallback", fallback.name());
                    true
                }
                Err(e) => {
                    warn!("Wake lock fallback unavailable: {}", e);
                    false
                }
            },
            None => false,
        }
    }

    pub fn release(&mut self) {
        self.primary.release();
        if let Some(fallback) = self.fallback.as_mut() {
            fallback.release();
        }
    }

    pub fn is_held(&self) -> bool {
        self.primary.is_held() || self.fallback.as_ref().is_some_and(|f| f.is_held())
    }
}

impl Drop for WakeManager {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    impl WakeLock for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }
        fn acquire(&mut self) -> Result<(), WakeLockError> {
            Err(WakeLockError::Unsupported("failing"))
        }
        fn release(&mut self) {}
        fn is_held(&self) -> bool {
            false
        }
    }

    #[test]
    fn falls_back_when_primary_fails() {
        let mut manager = WakeManager::new(Box::new(Failing), Some(Box::new(NoopWakeLock::default())));
        assert!(manager.hold());
        assert!(manager.is_held());
        manager.release();
        assert!(!manager.is_held());
    }

    #[test]
    fn reports_failure_without_fallback() {
        let mut manager = WakeManager::new(Box::new(Failing), None);
        assert!(!manager.hold());
        assert!(!manager.is_held());
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let mut lock = CommandWakeLock::new("test", "definitely-not-a-real-binary-xyz", &[]);
        assert!(matches!(lock.acquire(), Err(WakeLockError::Spawn { .. })));
        assert!(!lock.is_held());
    }
}
