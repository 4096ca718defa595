//! Signal dispositions for the supervised process.
//!
//! Six signals are bound once the entry script has started:
//! - SIGHUP/SIGPIPE/SIGTSTP: ignored, so a lost controlling terminal, a
//!   closed pipe peer or a Ctrl-Z keystroke never stops the worker
//! - SIGTERM/SIGINT/SIGQUIT: exit immediately with a non-zero status, no
//!   cleanup; restarts and cleanup belong to the container supervisor
//!
//! Binding goes through [`SignalWatch`], the reactor's signal-watch
//! primitive. [`TokioSignalWatch`] installs real handlers; the bindings live
//! in a [`SignalDispositionTable`] owned by whoever armed it.

use std::fmt;
use std::io;
use std::rc::Rc;

use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinHandle;
use tracing::{error, info, trace};

/// Signals with a fixed disposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostSignal {
    Hangup,
    Pipe,
    TerminalStop,
    Terminate,
    Interrupt,
    Quit,
}

impl HostSignal {
    pub const fn raw(self) -> libc::c_int {
        match self {
            HostSignal::Hangup => libc::SIGHUP,
            HostSignal::Pipe => libc::SIGPIPE,
            HostSignal::TerminalStop => libc::SIGTSTP,
            HostSignal::Terminate => libc::SIGTERM,
            HostSignal::Interrupt => libc::SIGINT,
            HostSignal::Quit => libc::SIGQUIT,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            HostSignal::Hangup => "SIGHUP",
            HostSignal::Pipe => "SIGPIPE",
            HostSignal::TerminalStop => "SIGTSTP",
            HostSignal::Terminate => "SIGTERM",
            HostSignal::Interrupt => "SIGINT",
            HostSignal::Quit => "SIGQUIT",
        }
    }

    fn kind(self) -> SignalKind {
        SignalKind::from_raw(self.raw())
    }
}

impl fmt::Display for HostSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    Ignore,
    TerminateImmediately,
}

/// Signal-to-policy assignment, in registration order.
pub const DISPOSITIONS: [(HostSignal, Policy); 6] = [
    (HostSignal::Hangup, Policy::Ignore),
    (HostSignal::Pipe, Policy::Ignore),
    (HostSignal::TerminalStop, Policy::Ignore),
    (HostSignal::Terminate, Policy::TerminateImmediately),
    (HostSignal::Interrupt, Policy::TerminateImmediately),
    (HostSignal::Quit, Policy::TerminateImmediately),
];

pub fn policy_for(signal: HostSignal) -> Policy {
    match signal {
        HostSignal::Hangup | HostSignal::Pipe | HostSignal::TerminalStop => Policy::Ignore,
        HostSignal::Terminate | HostSignal::Interrupt | HostSignal::Quit => {
            Policy::TerminateImmediately
        }
    }
}

/// Callback run on every delivery of a watched signal.
pub type SignalHandler = Box<dyn Fn(HostSignal)>;

/// Action bound to [`Policy::TerminateImmediately`].
pub type Terminate = Rc<dyn Fn(HostSignal)>;

/// Reactor primitive delivering OS signals to a handler.
pub trait SignalWatch {
    /// Registration handle kept alive by the binding.
    type Handle;

    fn watch(&mut self, signal: HostSignal, handler: SignalHandler) -> io::Result<Self::Handle>;
}

/// Watches signals with `tokio::signal::unix`, one local task per signal.
///
/// Must be used inside the reactor's `LocalSet`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSignalWatch;

impl SignalWatch for TokioSignalWatch {
    type Handle = JoinHandle<()>;

    fn watch(&mut self, sig: HostSignal, handler: SignalHandler) -> io::Result<Self::Handle> {
        // The OS handler is installed here, before the task first runs.
        let mut stream = signal(sig.kind())?;
        Ok(tokio::task::spawn_local(async move {
            while stream.recv().await.is_some() {
                handler(sig);
            }
        }))
    }
}

#[derive(Debug)]
pub struct SignalBinding<H> {
    pub signal: HostSignal,
    pub policy: Policy,
    /// Registration with the reactor; the watch stays in place while held.
    _handle: H,
}

#[cfg(test)]
impl<H> SignalBinding<H> {
    pub(crate) fn handle(&self) -> &H {
        &self._handle
    }
}

/// The armed bindings. There is no disarm: bindings last until process exit.
#[derive(Debug)]
pub struct SignalDispositionTable<H> {
    bindings: Vec<SignalBinding<H>>,
}

impl<H> SignalDispositionTable<H> {
    /// Register every entry of [`DISPOSITIONS`] with `watch`.
    pub fn arm<W>(watch: &mut W, terminate: Terminate) -> io::Result<Self>
    where
        W: SignalWatch<Handle = H>,
    {
        let mut bindings = Vec::with_capacity(DISPOSITIONS.len());
        for (signal, policy) in DISPOSITIONS {
            let handler: SignalHandler = match policy {
                Policy::Ignore => Box::new(ignore),
                Policy::TerminateImmediately => {
                    let terminate = Rc::clone(&terminate);
                    Box::new(move |sig: HostSignal| terminate(sig))
                }
            };
            let handle = watch.watch(signal, handler)?;
            bindings.push(SignalBinding {
                signal,
                policy,
                _handle: handle,
            });
        }
        info!(count = bindings.len(), "signal dispositions armed");
        Ok(Self { bindings })
    }

    pub fn bindings(&self) -> &[SignalBinding<H>] {
        &self.bindings
    }

    pub fn policy(&self, signal: HostSignal) -> Option<Policy> {
        self.bindings
            .iter()
            .find(|b| b.signal == signal)
            .map(|b| b.policy)
    }
}

fn ignore(signal: HostSignal) {
    trace!(signal = signal.name(), "signal ignored");
}

/// Production terminate action: log and exit without cleanup.
pub fn terminate_now(signal: HostSignal) {
    error!(signal = signal.name(), "terminate signal received, exiting");
    std::process::exit(i32::from(crate::EXIT_FATAL));
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingWatch;
    use super::*;
    use std::cell::RefCell;
    use std::time::Duration;

    fn recorder() -> (Rc<RefCell<Vec<HostSignal>>>, Terminate) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let terminate: Terminate = Rc::new(move |sig: HostSignal| sink.borrow_mut().push(sig));
        (seen, terminate)
    }

    #[test]
    fn fixed_assignment() {
        assert_eq!(policy_for(HostSignal::Hangup), Policy::Ignore);
        assert_eq!(policy_for(HostSignal::Pipe), Policy::Ignore);
        assert_eq!(policy_for(HostSignal::TerminalStop), Policy::Ignore);
        assert_eq!(policy_for(HostSignal::Terminate), Policy::TerminateImmediately);
        assert_eq!(policy_for(HostSignal::Interrupt), Policy::TerminateImmediately);
        assert_eq!(policy_for(HostSignal::Quit), Policy::TerminateImmediately);
        for (signal, policy) in DISPOSITIONS {
            assert_eq!(policy_for(signal), policy);
        }
    }

    #[test]
    fn raw_numbers_match_libc() {
        assert_eq!(HostSignal::Hangup.raw(), libc::SIGHUP);
        assert_eq!(HostSignal::Pipe.raw(), libc::SIGPIPE);
        assert_eq!(HostSignal::TerminalStop.raw(), libc::SIGTSTP);
        assert_eq!(HostSignal::Terminate.raw(), libc::SIGTERM);
        assert_eq!(HostSignal::Interrupt.raw(), libc::SIGINT);
        assert_eq!(HostSignal::Quit.raw(), libc::SIGQUIT);
        assert_eq!(HostSignal::Terminate.to_string(), "SIGTERM");
    }

    #[test]
    fn arm_registers_every_binding_in_order() {
        let mut watch = RecordingWatch::default();
        let (_, terminate) = recorder();

        let table = SignalDispositionTable::arm(&mut watch, terminate).unwrap();

        assert_eq!(watch.registrations(), 6);
        let order: Vec<HostSignal> = table.bindings().iter().map(|b| b.signal).collect();
        let expected: Vec<HostSignal> = DISPOSITIONS.iter().map(|(s, _)| *s).collect();
        assert_eq!(order, expected);
        assert_eq!(table.bindings().get(3).map(SignalBinding::handle), Some(&3));
        assert_eq!(table.policy(HostSignal::Quit), Some(Policy::TerminateImmediately));
    }

    #[test]
    fn each_signal_has_only_its_policy_effect() {
        for (signal, policy) in DISPOSITIONS {
            let mut watch = RecordingWatch::default();
            let (seen, terminate) = recorder();
            let _table = SignalDispositionTable::arm(&mut watch, terminate).unwrap();

            watch.deliver(signal);

            match policy {
                Policy::Ignore => assert!(seen.borrow().is_empty(), "{signal} must be ignored"),
                Policy::TerminateImmediately => assert_eq!(*seen.borrow(), vec![signal]),
            }
        }
    }

    #[test]
    fn registration_failure_is_reported() {
        struct FailingWatch(usize);

        impl SignalWatch for FailingWatch {
            type Handle = ();

            fn watch(&mut self, _: HostSignal, _: SignalHandler) -> io::Result<()> {
                if self.0 == 0 {
                    return Err(io::Error::other("no more signal slots"));
                }
                self.0 -= 1;
                Ok(())
            }
        }

        let (_, terminate) = recorder();
        let err = SignalDispositionTable::arm(&mut FailingWatch(2), terminate).unwrap_err();
        assert_eq!(err.to_string(), "no more signal slots");
    }

    #[tokio::test]
    async fn tokio_watch_delivers_real_signals() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let (seen, terminate) = recorder();
                let table = SignalDispositionTable::arm(&mut TokioSignalWatch, terminate).unwrap();
                assert_eq!(table.bindings().len(), 6);

                nix::sys::signal::raise(nix::sys::signal::Signal::SIGHUP).unwrap();
                nix::sys::signal::raise(nix::sys::signal::Signal::SIGTERM).unwrap();

                tokio::time::timeout(Duration::from_secs(5), async {
                    while seen.borrow().is_empty() {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                })
                .await
                .expect("SIGTERM was not delivered");
                // Let any late SIGHUP delivery run; it must not reach `terminate`.
                tokio::time::sleep(Duration::from_millis(50)).await;
                assert_eq!(*seen.borrow(), vec![HostSignal::Terminate]);
            })
            .await;
    }
}
