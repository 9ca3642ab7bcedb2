//! Handing deep links to the outside world

use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::{HandshakeError, HandshakeResult};

/// Whether an opener can currently deliver links
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Available,
    Unavailable,
    /// Presence cannot be determined (no search path)
    Unknown,
}

impl Capability {
    /// The more capable of two results
    pub fn best(self, other: Capability) -> Capability {
        use Capability::*;
        match (self, other) {
            (Available, _) | (_, Available) => Available,
            (Unknown, _) | (_, Unknown) => Unknown,
            _ => Unavailable,
        }
    }
}

/// Navigates the user agent to a URL
pub trait LinkOpener: Send + Sync {
    fn capability(&self) -> Capability;

    /// Open `url`; control leaves the client once this returns
    fn open(&self, url: &Url) -> HandshakeResult<()>;
}

impl<T: LinkOpener + ?Sized> LinkOpener for Arc<T> {
    fn capability(&self) -> Capability {
        (**self).capability()
    }

    fn open(&self, url: &Url) -> HandshakeResult<()> {
        (**self).open(url)
    }
}

/// Look for an executable, either a path or a name on `PATH`
pub fn find_program(program: &str) -> Capability {
    if program.contains(std::path::MAIN_SEPARATOR) || program.contains('/') {
        return if Path::new(program).is_file() {
            Capability::Available
        } else {
            Capability::Unavailable
        };
    }

    let Some(search_path) = std::env::var_os("PATH") else {
        return Capability::Unknown;
    };

    let found = std::env::split_paths(&search_path).any(|dir| {
        let candidate = dir.join(program);
        candidate.is_file() || (cfg!(windows) && candidate.with_extension("exe").is_file())
    });

    if found {
        Capability::Available
    } else {
        Capability::Unavailable
    }
}

/// Spawn `program args.. url` and wait for it on a background thread
///
/// The URL is passed as a single argument, never through a shell.
fn spawn_reaped(
    program: &str,
    args: &[String],
    url: &Url,
) -> HandshakeResult<JoinHandle<Option<ExitStatus>>> {
    let mut child = Command::new(program)
        .args(args)
        .arg(url.as_str())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| HandshakeError::Open(format!("{}: {}", program, e)))?;

    let program = program.to_string();
    Ok(std::thread::spawn(move || match child.wait() {
        Ok(status) => {
            if !status.success() {
                warn!(program = %program, %status, "Link handler exited unsuccessfully");
            }
            Some(status)
        }
        Err(e) => {
            warn!(program = %program, "Failed to wait for link handler: {}", e);
            None
        }
    }))
}

/// Delegates to the embedding container's link handler
///
/// The command line is split on whitespace; the URL is appended as the last
/// argument.
#[derive(Debug, Clone)]
pub struct HostContainerOpener {
    program: String,
    args: Vec<String>,
}

impl HostContainerOpener {
    pub fn new(command_line: &str) -> HandshakeResult<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| HandshakeError::Config("host opener command is empty".into()))?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }
}

impl LinkOpener for HostContainerOpener {
    fn capability(&self) -> Capability {
        find_program(&self.program)
    }

    fn open(&self, url: &Url) -> HandshakeResult<()> {
        debug!(program = %self.program, "Opening link through host container");
        spawn_reaped(&self.program, &self.args, url).map(|_| ())
    }
}

/// Opens links with the platform's default handler
#[derive(Debug, Clone, Default)]
pub struct SystemBrowserOpener;

impl SystemBrowserOpener {
    /// Launchers the platform handler may use, in order of preference
    pub fn launchers() -> Vec<String> {
        open::commands("about:blank")
            .iter()
            .filter_map(|command| command.get_program().to_str().map(str::to_string))
            .collect()
    }
}

impl LinkOpener for SystemBrowserOpener {
    fn capability(&self) -> Capability {
        Self::launchers()
            .iter()
            .map(|program| find_program(program))
            .fold(Capability::Unavailable, Capability::best)
    }

    fn open(&self, url: &Url) -> HandshakeResult<()> {
        debug!("Opening link in system browser");
        open::that(url.as_str()).map_err(|e| HandshakeError::Open(format!("system browser: {}", e)))
    }
}

/// Host container when available, system browser otherwise
pub struct FallbackOpener {
    host: Option<Box<dyn LinkOpener>>,
    browser: Box<dyn LinkOpener>,
}

impl FallbackOpener {
    pub fn new(host: Option<Box<dyn LinkOpener>>, browser: Box<dyn LinkOpener>) -> Self {
        Self { host, browser }
    }

    /// Host command from configuration, falling back to the system browser
    pub fn from_host_command(host_command: Option<&str>) -> HandshakeResult<Self> {
        let host = match host_command {
            Some(cmd) => Some(Box::new(HostContainerOpener::new(cmd)?) as Box<dyn LinkOpener>),
            None => None,
        };
        Ok(Self::new(host, Box::new(SystemBrowserOpener)))
    }

    pub fn host_capability(&self) -> Capability {
        self.host
            .as_ref()
            .map(|host| host.capability())
            .unwrap_or(Capability::Unavailable)
    }
}

impl LinkOpener for FallbackOpener {
    fn capability(&self) -> Capability {
        self.host_capability().best(self.browser.capability())
    }

    fn open(&self, url: &Url) -> HandshakeResult<()> {
        if let Some(host) = &self.host {
            if host.capability() == Capability::Available {
                match host.open(url) {
                    Ok(()) => {
                        info!(host = %url.host_str().unwrap_or_default(), "Link handed to host container");
                        return Ok(());
                    }
                    Err(e) => warn!("Host container failed, falling back to browser: {}", e),
                }
            }
        }

        self.browser.open(url)?;
        info!(host = %url.host_str().unwrap_or_default(), "Link opened in browser");
        Ok(())
    }
}

/// Records links instead of opening them
#[derive(Debug, Default)]
pub struct RecordingOpener {
    opened: Mutex<Vec<Url>>,
}

impl RecordingOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn opened(&self) -> Vec<Url> {
        self.opened.lock().clone()
    }

    pub fn last(&self) -> Option<Url> {
        self.opened.lock().last().cloned()
    }
}

impl LinkOpener for RecordingOpener {
    fn capability(&self) -> Capability {
        Capability::Available
    }

    fn open(&self, url: &Url) -> HandshakeResult<()> {
        self.opened.lock().push(url.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedOpener {
        capability: Capability,
        fails: bool,
        log: Arc<RecordingOpener>,
    }

    impl LinkOpener for FixedOpener {
        fn capability(&self) -> Capability {
            self.capability
        }

        fn open(&self, url: &Url) -> HandshakeResult<()> {
            if self.fails {
                return Err(HandshakeError::Open("boom".into()));
            }
            self.log.open(url)
        }
    }

    fn fixed(capability: Capability, fails: bool) -> (Box<dyn LinkOpener>, Arc<RecordingOpener>) {
        let log = Arc::new(RecordingOpener::new());
        let opener = FixedOpener {
            capability,
            fails,
            log: log.clone(),
        };
        (Box::new(opener), log)
    }

    fn url() -> Url {
        Url::parse("https://phantom.app/ul/v1/connect").unwrap()
    }

    #[test]
    fn test_capability_best() {
        use Capability::*;
        assert_eq!(Unavailable.best(Available), Available);
        assert_eq!(Unknown.best(Unavailable), Unknown);
        assert_eq!(Unavailable.best(Unavailable), Unavailable);
        assert_eq!(Unknown.best(Available), Available);
    }

    #[test]
    fn test_prefers_available_host() {
        let (host, host_log) = fixed(Capability::Available, false);
        let (browser, browser_log) = fixed(Capability::Available, false);
        let opener = FallbackOpener::new(Some(host), browser);

        opener.open(&url()).unwrap();
        assert_eq!(host_log.opened().len(), 1);
        assert!(browser_log.opened().is_empty());
    }

    #[test]
    fn test_skips_unknown_or_missing_host() {
        for capability in [Capability::Unknown, Capability::Unavailable] {
            let (host, host_log) = fixed(capability, false);
            let (browser, browser_log) = fixed(Capability::Available, false);
            let opener = FallbackOpener::new(Some(host), browser);

            opener.open(&url()).unwrap();
            assert!(host_log.opened().is_empty());
            assert_eq!(browser_log.last(), Some(url()));
        }
    }

    #[test]
    fn test_falls_back_when_host_fails() {
        let (host, _) = fixed(Capability::Available, true);
        let (browser, browser_log) = fixed(Capability::Available, false);
        let opener = FallbackOpener::new(Some(host), browser);

        opener.open(&url()).unwrap();
        assert_eq!(browser_log.opened().len(), 1);
    }

    #[test]
    fn test_reports_browser_failure() {
        let (browser, _) = fixed(Capability::Unavailable, true);
        let opener = FallbackOpener::new(None, browser);

        assert_eq!(opener.host_capability(), Capability::Unavailable);
        assert!(matches!(opener.open(&url()), Err(HandshakeError::Open(_))));
    }

    #[test]
    fn test_host_command_parsing() {
        let host = HostContainerOpener::new("  tg-bridge --open-link  ").unwrap();
        assert_eq!(host.program, "tg-bridge");
        assert_eq!(host.args, vec!["--open-link".to_string()]);
        assert!(matches!(
            HostContainerOpener::new("   "),
            Err(HandshakeError::Config(_))
        ));
    }

    #[test]
    fn test_find_missing_program() {
        assert_eq!(
            find_program("/definitely/not/here/ccoin-opener"),
            Capability::Unavailable
        );
        assert_ne!(
            find_program("ccoin-opener-that-does-not-exist-3f9a"),
            Capability::Available
        );
    }

    #[test]
    fn test_missing_host_program_fails_to_open() {
        let host = HostContainerOpener::new("/definitely/not/here/ccoin-opener").unwrap();
        assert_eq!(host.capability(), Capability::Unavailable);
        assert!(matches!(host.open(&url()), Err(HandshakeError::Open(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_host_child_is_waited_for() {
        let handle = spawn_reaped("true", &[], &url()).unwrap();
        let status = handle.join().unwrap();
        assert!(status.is_some_and(|status| status.success()));
    }

    #[cfg(unix)]
    #[test]
    fn test_url_reaches_host_as_one_argument() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("args");
        let script = format!("printf '%s\\n' \"$@\" > {}", out.display());
        let args = vec!["-c".to_string(), script, "sh".to_string()];
        let url = Url::parse("https://phantom.app/ul/v1/connect?app_url=a&cluster=devnet").unwrap();

        let status = spawn_reaped("sh", &args, &url).unwrap().join().unwrap();
        assert!(status.is_some_and(|status| status.success()));
        let written = std::fs::read_to_string(&out).unwrap();
        assert_eq!(written.lines().collect::<Vec<_>>(), vec![url.as_str()]);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_browser_launchers() {
        assert!(SystemBrowserOpener::launchers().contains(&"xdg-open".to_string()));
    }
}
