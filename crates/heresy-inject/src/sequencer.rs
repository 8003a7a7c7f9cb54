//! The injection state machine
//!
//! ```text
//! WaitingForRuntime -> HooksInstalled -> BeforeLoaded -> MainLoaded -> AfterLoaded -> Signaled
//! ```
//!
//! The sequencer polls until the runtime component resolves, then hooks
//! every known overload of the runtime's init entry point. The first init
//! call arms a single interceptor on the bundle loader. Each bundle load
//! then runs the three stages around the original call and signals the
//! controller.
//!
//! The after stage is loaded as soon as the original bundle call returns.
//! It does not wait for anything the bundle schedules asynchronously.

use crate::host::{EntryPointHook, Invocation, Overload, RuntimeHost};
use crate::params::{InjectionParams, Payloads};
use crate::paths::{write_payload, PayloadPaths};
use crate::InjectError;
use heresy_proto::HostEvent;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Parameter types of every known runtime init overload
pub const INIT_SIGNATURES: &[&[&str]] = &[
    &["android.content.Context", "int"],
    &["android.content.Context", "int", "com.facebook.soloader.SoFileLoader"],
    &[
        "android.content.Context",
        "int",
        "com.facebook.soloader.SoFileLoader",
        "[Ljava.lang.String;",
    ],
    &["android.content.Context", "boolean"],
];

/// Parameter types of the bundle loader entry point
pub const BUNDLE_SIGNATURE: &[&str] = &["android.content.res.AssetManager", "java.lang.String", "boolean"];

/// Sequencer tuning
#[derive(Debug, Clone)]
pub struct SequencerConfig {
    /// Delay between availability polls
    pub poll_interval: Duration,
    /// Runtime component to wait for
    pub runtime_class: String,
    /// Init method on the runtime component
    pub init_method: String,
    /// Class owning the bundle loader
    pub bundle_class: String,
    /// Bundle loader method
    pub bundle_method: String,
    /// Directory holding per-application private directories
    pub payload_root: PathBuf,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            runtime_class: "com.facebook.soloader.SoLoader".to_string(),
            init_method: "init".to_string(),
            bundle_class: "com.facebook.react.bridge.CatalystInstanceImpl".to_string(),
            bundle_method: "loadScriptFromAssets".to_string(),
            payload_root: PathBuf::from("/data/data"),
        }
    }
}

impl SequencerConfig {
    /// Every init overload to hook
    pub fn init_overloads(&self) -> Vec<Overload> {
        INIT_SIGNATURES
            .iter()
            .map(|sig| Overload::new(&self.runtime_class, &self.init_method, sig))
            .collect()
    }

    /// The bundle loader overload to intercept
    pub fn bundle_overload(&self) -> Overload {
        Overload::new(&self.bundle_class, &self.bundle_method, BUNDLE_SIGNATURE)
    }
}

/// Progress of the injection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    /// Polling for the runtime component
    WaitingForRuntime,
    /// Init overloads are hooked; waiting for the bundle load
    HooksInstalled,
    /// Before stage loaded
    BeforeLoaded,
    /// Original bundle load returned
    MainLoaded,
    /// After stage loaded
    AfterLoaded,
    /// Completion reported to the controller
    Signaled,
    /// A stage failed; the target keeps running without the hooks
    Degraded,
}

struct Inner {
    config: SequencerConfig,
    host: Arc<dyn RuntimeHost>,
    payloads: Payloads,
    paths: PayloadPaths,
    state: Mutex<SequencerState>,
    installed: Mutex<HashSet<Overload>>,
    armed: AtomicBool,
    polls: AtomicU32,
}

/// One-time injection sequencer
#[derive(Clone)]
pub struct Sequencer {
    inner: Arc<Inner>,
}

impl Sequencer {
    /// Create a sequencer after validating `params`
    ///
    /// Fails without touching the host when a required parameter is missing.
    pub fn new(
        config: SequencerConfig,
        params: InjectionParams,
        host: Arc<dyn RuntimeHost>,
    ) -> Result<Self, InjectError> {
        let payloads = params.validate()?;
        let paths = PayloadPaths::new(&config.payload_root, &payloads.package_name);
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                host,
                payloads,
                paths,
                state: Mutex::new(SequencerState::WaitingForRuntime),
                installed: Mutex::new(HashSet::new()),
                armed: AtomicBool::new(false),
                polls: AtomicU32::new(0),
            }),
        })
    }

    /// Current state
    pub fn state(&self) -> SequencerState {
        self.inner.state()
    }

    /// Number of availability polls made so far
    pub fn poll_attempts(&self) -> u32 {
        self.inner.polls.load(Ordering::SeqCst)
    }

    /// Where the stage payloads are written
    pub fn paths(&self) -> &PayloadPaths {
        &self.inner.paths
    }

    /// Wait for the runtime and hook it
    ///
    /// Calling this again after the hooks are in place does nothing.
    pub async fn run(&self) {
        if self.state() != SequencerState::WaitingForRuntime {
            debug!("Runtime already hooked, skipping wait");
            return;
        }
        let polls = self.wait_for_runtime().await;
        info!(polls, "{} is available", self.inner.config.runtime_class);
        self.install_hooks();
    }

    /// Poll until the runtime component resolves; returns the poll count
    pub async fn wait_for_runtime(&self) -> u32 {
        let class = &self.inner.config.runtime_class;
        let mut interval = tokio::time::interval(self.inner.config.poll_interval);
        loop {
            interval.tick().await;
            let attempt = self.inner.polls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.inner.host.is_resolvable(class) {
                return attempt;
            }
            debug!(attempt, "{} not yet available", class);
        }
    }

    /// Hook every init overload that is not hooked yet
    ///
    /// Returns how many overloads were newly hooked.
    pub fn install_hooks(&self) -> usize {
        let hook: Arc<dyn EntryPointHook> = Arc::new(InitHook {
            inner: Arc::downgrade(&self.inner),
        });
        let mut count = 0;
        for overload in self.inner.config.init_overloads() {
            if self.inner.install_once(&overload, Arc::clone(&hook)) {
                count += 1;
            }
        }
        self.inner.advance(SequencerState::WaitingForRuntime, SequencerState::HooksInstalled);
        count
    }
}

impl Inner {
    fn state(&self) -> SequencerState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: SequencerState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    fn advance(&self, from: SequencerState, to: SequencerState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state == from {
            *state = to;
        }
    }

    /// Install `hook` on `overload` unless it is already hooked
    fn install_once(&self, overload: &Overload, hook: Arc<dyn EntryPointHook>) -> bool {
        let mut installed = self.installed.lock().unwrap_or_else(|e| e.into_inner());
        if installed.contains(overload) {
            debug!("{} already hooked", overload);
            return false;
        }
        match self.host.install(overload, hook) {
            Ok(()) => {
                debug!("Hooked {}", overload);
                installed.insert(overload.clone());
                true
            }
            Err(e) => {
                error!("{}", e);
                false
            }
        }
    }

    /// Install the bundle interceptor, once per process
    fn arm(self: &Arc<Self>) {
        if self.armed.swap(true, Ordering::SeqCst) {
            return;
        }
        let hook: Arc<dyn EntryPointHook> = Arc::new(BundleHook {
            inner: Arc::downgrade(self),
        });
        if !self.install_once(&self.config.bundle_overload(), hook) {
            warn!("Bundle loader could not be intercepted; hooks will not load");
            self.set_state(SequencerState::Degraded);
        }
    }

    /// Before stage, original bundle, after stage, signal
    fn load_sequence(&self, call: &mut dyn Invocation) -> Result<(), InjectError> {
        let before = write_payload(&self.paths.before, &self.payloads.before)
            .and_then(|()| call.load_script_from_file(&self.paths.before));
        if let Err(e) = before {
            // The application still has to start even though the hooks won't.
            call.call_original()?;
            return Err(e);
        }
        self.set_state(SequencerState::BeforeLoaded);
        info!("hermes_before was loaded!");

        call.call_original()?;
        self.set_state(SequencerState::MainLoaded);

        write_payload(&self.paths.after, &self.payloads.after)?;
        call.load_script_from_file(&self.paths.after)?;
        self.set_state(SequencerState::AfterLoaded);
        info!("hermes_hook was loaded!");

        self.host.emit(HostEvent::HookLoaded);
        self.set_state(SequencerState::Signaled);
        Ok(())
    }
}

/// Replacement for every runtime init overload
struct InitHook {
    inner: Weak<Inner>,
}

impl EntryPointHook for InitHook {
    fn invoke(&self, call: &mut dyn Invocation) {
        if let Err(e) = call.call_original() {
            error!("Original {} failed: {}", call.overload(), e);
        }
        if let Some(inner) = self.inner.upgrade() {
            inner.arm();
        }
    }
}

/// Replacement for the bundle loader
struct BundleHook {
    inner: Weak<Inner>,
}

impl EntryPointHook for BundleHook {
    fn invoke(&self, call: &mut dyn Invocation) {
        let Some(inner) = self.inner.upgrade() else {
            if let Err(e) = call.call_original() {
                error!("Original {} failed: {}", call.overload(), e);
            }
            return;
        };
        if let Err(e) = inner.load_sequence(call) {
            error!("Hook load sequence failed: {}", e);
            inner.set_state(SequencerState::Degraded);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FakeHost, Step};
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn params() -> InjectionParams {
        InjectionParams {
            package_name: Some("com.example.app".into()),
            hermes_before: Some("globalThis.before = 1".into()),
            hermes_hook: Some("heresy.init()".into()),
        }
    }

    fn config(root: &TempDir) -> SequencerConfig {
        SequencerConfig {
            poll_interval: Duration::from_millis(1),
            payload_root: root.path().to_path_buf(),
            ..Default::default()
        }
    }

    fn expected_launch() -> Vec<Step> {
        vec![
            Step::Original("init".into()),
            Step::LoadFile("globalThis.before = 1".into()),
            Step::Original("loadScriptFromAssets".into()),
            Step::LoadFile("heresy.init()".into()),
        ]
    }

    #[test]
    fn test_missing_package_installs_nothing() {
        let host = Arc::new(FakeHost::available_after(1));
        let params = InjectionParams {
            package_name: None,
            ..params()
        };
        let result = Sequencer::new(SequencerConfig::default(), params, host.clone());
        assert!(matches!(result, Err(InjectError::MissingPackageName)));
        assert_eq!(host.install_calls(), 0);
    }

    #[tokio::test]
    async fn test_found_after_three_polls() {
        let root = TempDir::new().unwrap();
        let host = Arc::new(FakeHost::available_after(3));
        let sequencer = Sequencer::new(config(&root), params(), host.clone()).unwrap();
        assert_eq!(sequencer.state(), SequencerState::WaitingForRuntime);

        sequencer.run().await;
        assert_eq!(sequencer.poll_attempts(), 3);
        assert_eq!(sequencer.state(), SequencerState::HooksInstalled);
        assert_eq!(host.install_calls(), INIT_SIGNATURES.len());

        host.launch(2);
        assert_eq!(host.trace(), expected_launch());
        assert_eq!(host.events(), vec![HostEvent::HookLoaded]);
        assert_eq!(sequencer.state(), SequencerState::Signaled);
        assert_eq!(host.install_calls(), INIT_SIGNATURES.len() + 1);
    }

    #[tokio::test]
    async fn test_every_overload_triggers_sequence() {
        for index in 0..INIT_SIGNATURES.len() {
            let root = TempDir::new().unwrap();
            let host = Arc::new(FakeHost::available_after(1));
            let sequencer = Sequencer::new(config(&root), params(), host.clone()).unwrap();
            sequencer.run().await;

            host.launch(index);
            assert_eq!(host.trace(), expected_launch(), "overload {}", index);
            assert_eq!(host.events().len(), 1);
        }
    }

    #[tokio::test]
    async fn test_hooks_installed_once() {
        let root = TempDir::new().unwrap();
        let host = Arc::new(FakeHost::available_after(1));
        let sequencer = Sequencer::new(config(&root), params(), host.clone()).unwrap();

        sequencer.run().await;
        sequencer.run().await;
        assert_eq!(sequencer.install_hooks(), 0);
        assert_eq!(sequencer.poll_attempts(), 1);
        assert_eq!(host.install_calls(), INIT_SIGNATURES.len());

        // Init firing repeatedly arms the bundle interceptor only once.
        host.invoke_init(0);
        host.invoke_init(3);
        assert_eq!(host.install_calls(), INIT_SIGNATURES.len() + 1);

        host.load_bundle();
        assert_eq!(host.events(), vec![HostEvent::HookLoaded]);
    }

    #[tokio::test]
    async fn test_sequence_runs_per_bundle_load() {
        let root = TempDir::new().unwrap();
        let host = Arc::new(FakeHost::available_after(1));
        let sequencer = Sequencer::new(config(&root), params(), host.clone()).unwrap();
        sequencer.run().await;

        host.launch(0);
        host.load_bundle();
        assert_eq!(host.events(), vec![HostEvent::HookLoaded, HostEvent::HookLoaded]);
    }

    #[tokio::test]
    async fn test_payload_files_written() {
        let root = TempDir::new().unwrap();
        let host = Arc::new(FakeHost::available_after(1));
        let sequencer = Sequencer::new(config(&root), params(), host.clone()).unwrap();
        sequencer.run().await;
        host.launch(1);

        let paths = sequencer.paths();
        assert!(paths.before.starts_with(root.path().join("com.example.app").join("files")));
        assert_eq!(std::fs::read_to_string(&paths.before).unwrap(), "globalThis.before = 1");
        assert_eq!(std::fs::read_to_string(&paths.after).unwrap(), "heresy.init()");
    }

    #[tokio::test]
    async fn test_before_stage_failure_degrades() {
        let root = TempDir::new().unwrap();
        let host = Arc::new(FakeHost::available_after(1).failing_file_loads());
        let sequencer = Sequencer::new(config(&root), params(), host.clone()).unwrap();
        sequencer.run().await;

        host.launch(0);
        // The bundle still loads; nothing else does.
        assert_eq!(
            host.trace(),
            vec![
                Step::Original("init".into()),
                Step::Original("loadScriptFromAssets".into()),
            ]
        );
        assert!(host.events().is_empty());
        assert_eq!(sequencer.state(), SequencerState::Degraded);
    }

    #[tokio::test]
    async fn test_unwritable_payload_root_degrades() {
        let root = TempDir::new().unwrap();
        let blocker = root.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();

        let host = Arc::new(FakeHost::available_after(1));
        let config = SequencerConfig {
            payload_root: blocker,
            poll_interval: Duration::from_millis(1),
            ..Default::default()
        };
        let sequencer = Sequencer::new(config, params(), host.clone()).unwrap();
        sequencer.run().await;

        host.launch(0);
        assert_eq!(
            host.trace(),
            vec![
                Step::Original("init".into()),
                Step::Original("loadScriptFromAssets".into()),
            ]
        );
        assert!(host.events().is_empty());
        assert_eq!(sequencer.state(), SequencerState::Degraded);
    }

    proptest! {
        #[test]
        fn test_install_once_regardless_of_polls(polls in 1u32..6, runs in 1usize..4) {
            let root = TempDir::new().unwrap();
            let host = Arc::new(FakeHost::available_after(polls));
            let sequencer = Sequencer::new(config(&root), params(), host.clone()).unwrap();

            tokio_test::block_on(async {
                for _ in 0..runs {
                    sequencer.run().await;
                }
            });

            prop_assert_eq!(sequencer.poll_attempts(), polls);
            prop_assert_eq!(host.install_calls(), INIT_SIGNATURES.len());
            host.launch(0);
            prop_assert_eq!(host.events().len(), 1);
        }
    }
}
