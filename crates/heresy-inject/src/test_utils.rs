//! In-memory host used by the sequencer tests

use crate::host::{EntryPointHook, Invocation, Overload, RuntimeHost};
use crate::sequencer::SequencerConfig;
use crate::InjectError;
use heresy_proto::HostEvent;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Observable side effect of a call into the fake target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// An original method body ran
    Original(String),
    /// A script file was loaded; carries the file content at load time
    LoadFile(String),
}

/// Fake target with a runtime class that resolves after a number of lookups
pub struct FakeHost {
    resolvable_after: u32,
    lookups: AtomicU32,
    install_calls: AtomicUsize,
    hooks: Mutex<HashMap<Overload, Arc<dyn EntryPointHook>>>,
    trace: Arc<Mutex<Vec<Step>>>,
    events: Mutex<Vec<HostEvent>>,
    fail_file_loads: bool,
    config: SequencerConfig,
}

impl FakeHost {
    pub fn available_after(polls: u32) -> Self {
        Self {
            resolvable_after: polls,
            lookups: AtomicU32::new(0),
            install_calls: AtomicUsize::new(0),
            hooks: Mutex::new(HashMap::new()),
            trace: Arc::new(Mutex::new(Vec::new())),
            events: Mutex::new(Vec::new()),
            fail_file_loads: false,
            config: SequencerConfig::default(),
        }
    }

    pub fn failing_file_loads(mut self) -> Self {
        self.fail_file_loads = true;
        self
    }

    pub fn install_calls(&self) -> usize {
        self.install_calls.load(Ordering::SeqCst)
    }

    pub fn trace(&self) -> Vec<Step> {
        self.trace.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<HostEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Simulate an application start: runtime init, then bundle load
    pub fn launch(&self, init_overload: usize) {
        self.trace.lock().unwrap().clear();
        self.invoke_init(init_overload);
        self.load_bundle();
    }

    pub fn invoke_init(&self, index: usize) {
        let overload = self.config.init_overloads()[index].clone();
        self.invoke(overload);
    }

    pub fn load_bundle(&self) {
        self.invoke(self.config.bundle_overload());
    }

    fn invoke(&self, overload: Overload) {
        let hook = self.hooks.lock().unwrap().get(&overload).cloned();
        let mut call = FakeCall {
            overload,
            trace: Arc::clone(&self.trace),
            fail_file_loads: self.fail_file_loads,
        };
        match hook {
            Some(hook) => hook.invoke(&mut call),
            None => call.call_original().unwrap(),
        }
    }
}

impl RuntimeHost for FakeHost {
    fn is_resolvable(&self, class: &str) -> bool {
        let lookup = self.lookups.fetch_add(1, Ordering::SeqCst) + 1;
        class == self.config.runtime_class && lookup >= self.resolvable_after
    }

    fn install(&self, overload: &Overload, hook: Arc<dyn EntryPointHook>) -> Result<(), InjectError> {
        self.install_calls.fetch_add(1, Ordering::SeqCst);
        self.hooks.lock().unwrap().insert(overload.clone(), hook);
        Ok(())
    }

    fn emit(&self, event: HostEvent) {
        self.events.lock().unwrap().push(event);
    }
}

struct FakeCall {
    overload: Overload,
    trace: Arc<Mutex<Vec<Step>>>,
    fail_file_loads: bool,
}

impl Invocation for FakeCall {
    fn overload(&self) -> &Overload {
        &self.overload
    }

    fn call_original(&mut self) -> Result<(), InjectError> {
        self.trace
            .lock()
            .unwrap()
            .push(Step::Original(self.overload.method.clone()));
        Ok(())
    }

    fn load_script_from_file(&mut self, path: &Path) -> Result<(), InjectError> {
        if self.fail_file_loads {
            return Err(InjectError::Host(format!("cannot load {}", path.display())));
        }
        let content = std::fs::read_to_string(path).map_err(|e| InjectError::Host(e.to_string()))?;
        self.trace.lock().unwrap().push(Step::LoadFile(content));
        Ok(())
    }
}
