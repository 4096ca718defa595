//! Lifecycle driver: turns the startup outcome into either a fatal error or
//! an armed process handed to the reactor.

use std::convert::Infallible;
use std::rc::Rc;

use tracing::info;

use crate::config::HostConfig;
use crate::engine::{self, ScriptHost, StartupOutcome};
use crate::error::{HostError, HostResult};
use crate::reactor::{self, ErrorCallback};
use crate::signals::{self, SignalDispositionTable, SignalWatch, Terminate, TokioSignalWatch};

pub struct LifecycleDriver<W> {
    watch: W,
    terminate: Terminate,
}

impl<W: SignalWatch> LifecycleDriver<W> {
    pub fn new(watch: W, terminate: Terminate) -> Self {
        Self { watch, terminate }
    }

    /// Act on the outcome of the start step.
    ///
    /// `Failed` returns the error without touching signal state. Both other
    /// outcomes arm the disposition table, then restart the collector; the
    /// caller keeps the returned table alive and enters the run loop.
    pub fn drive(
        &mut self,
        host: &ScriptHost,
        outcome: StartupOutcome,
    ) -> HostResult<SignalDispositionTable<W::Handle>> {
        match outcome {
            StartupOutcome::Failed(message) => return Err(HostError::Start(message)),
            StartupOutcome::Suspended => info!("entry script suspended, handing over to reactor"),
            StartupOutcome::CompletedSynchronously => {
                info!("entry script completed without suspending, reactor idles")
            }
        }
        let table = SignalDispositionTable::arm(&mut self.watch, Rc::clone(&self.terminate))
            .map_err(HostError::Signal)?;
        host.resume_collector();
        Ok(table)
    }

    #[cfg(test)]
    pub(crate) fn watch(&self) -> &W {
        &self.watch
    }
}

/// The whole main sequence. Returns only on a fatal startup error; must run
/// inside [`Reactor::block_on`](crate::reactor::Reactor::block_on).
pub async fn run(config: &HostConfig, on_error: ErrorCallback) -> HostResult<Infallible> {
    let mut host = engine::bootstrap(config, on_error)?;
    let outcome = host.start();

    let mut driver = LifecycleDriver::new(TokioSignalWatch, Rc::new(signals::terminate_now));
    let _table = driver.drive(&host, outcome)?;

    Ok(reactor::run_forever().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log;
    use crate::signals::testing::RecordingWatch;
    use crate::signals::{HostSignal, Policy};
    use std::cell::RefCell;

    fn host_for(script: &str) -> (tempfile::TempDir, ScriptHost) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("script")).unwrap();
        std::fs::write(dir.path().join("script/main.lua"), script).unwrap();
        let host = engine::bootstrap(&HostConfig::rooted_at(dir.path()), log::reactor_error).unwrap();
        (dir, host)
    }

    fn driver() -> (Rc<RefCell<Vec<HostSignal>>>, LifecycleDriver<RecordingWatch>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let terminate: Terminate = Rc::new(move |sig: HostSignal| sink.borrow_mut().push(sig));
        (seen, LifecycleDriver::new(RecordingWatch::default(), terminate))
    }

    #[test]
    fn failed_start_arms_nothing() {
        let (_dir, mut host) = host_for("error('broken deployment')");
        let (_, mut driver) = driver();

        let outcome = host.start();
        let err = driver.drive(&host, outcome).unwrap_err();

        let HostError::Start(message) = err else {
            panic!("expected start error, got {err}");
        };
        assert!(message.contains("broken deployment"));
        assert_eq!(driver.watch().registrations(), 0);
        assert!(!host.collector_running());
    }

    #[test]
    fn suspended_start_arms_and_restarts_collector() {
        let (_dir, mut host) = host_for("coroutine.yield()");
        let (seen, mut driver) = driver();

        let outcome = host.start();
        assert_eq!(outcome, StartupOutcome::Suspended);
        let table = driver.drive(&host, outcome).unwrap();

        assert_eq!(driver.watch().registrations(), 6);
        assert_eq!(table.policy(HostSignal::Terminate), Some(Policy::TerminateImmediately));
        assert!(host.collector_running());

        driver.watch().deliver(HostSignal::Hangup);
        assert!(seen.borrow().is_empty());
        driver.watch().deliver(HostSignal::Interrupt);
        assert_eq!(*seen.borrow(), vec![HostSignal::Interrupt]);
    }

    #[test]
    fn completed_start_still_arms() {
        let (_dir, mut host) = host_for("return");
        let (_, mut driver) = driver();

        let outcome = host.start();
        assert_eq!(outcome, StartupOutcome::CompletedSynchronously);
        let table = driver.drive(&host, outcome).unwrap();

        assert_eq!(table.bindings().len(), 6);
        assert!(host.collector_running());
    }

    #[tokio::test]
    async fn run_returns_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let config = HostConfig::rooted_at(dir.path());
        let local = tokio::task::LocalSet::new();

        let result = local.run_until(run(&config, log::reactor_error)).await;

        assert!(matches!(result, Err(HostError::Load { .. })));
    }

    #[tokio::test]
    async fn run_returns_start_errors_before_arming() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("script")).unwrap();
        std::fs::write(dir.path().join("script/main.lua"), "error('nope')").unwrap();
        let config = HostConfig::rooted_at(dir.path());
        let local = tokio::task::LocalSet::new();

        let result = local.run_until(run(&config, log::reactor_error)).await;

        let Err(HostError::Start(message)) = result else {
            panic!("expected start error");
        };
        assert!(message.contains("nope"));
    }
}
