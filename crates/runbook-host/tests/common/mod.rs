//! Mock collaborators shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use runbook_config::{PackingGranularity, Profile};
use runbook_host::{
    exec_fn, Artifact, Bootloader, CompileError, CompiledScript, LoaderError, PipelineConfig,
    RawScript, ScriptCompiler, ScriptLoader, Trigger,
};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub const ROOT: &str = "/srv/scripts";

pub fn src(relative: &str) -> PathBuf {
    Path::new(ROOT).join(relative)
}

/// A structurally valid script at `<root>/<relative>`
pub fn raw(name: &str, relative: &str) -> RawScript {
    RawScript::new(name, src(relative))
        .with_trigger(Trigger::new(["afterCreate"], ["compose:record"]))
}

pub fn pipeline_config(profile: Profile, packing: PackingGranularity) -> PipelineConfig {
    PipelineConfig {
        scripts_root: PathBuf::from(ROOT),
        output_dir: PathBuf::from("/tmp/runbook-test-bundles"),
        profile,
        packing,
    }
}

/// Loader returning a fixed result, optionally after a delay
pub struct MockLoader {
    result: Mutex<Result<Vec<RawScript>, String>>,
    delay: Duration,
    calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl MockLoader {
    pub fn new(scripts: Vec<RawScript>) -> Self {
        Self {
            result: Mutex::new(Ok(scripts)),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_scripts(&self, scripts: Vec<RawScript>) {
        *self.result.lock().unwrap() = Ok(scripts);
    }

    pub fn fail(&self, message: &str) {
        *self.result.lock().unwrap() = Err(message.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScriptLoader for MockLoader {
    async fn scripts(&self) -> Result<Vec<RawScript>, LoaderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let result = self.result.lock().unwrap().clone();
        self.active.fetch_sub(1, Ordering::SeqCst);
        result.map_err(LoaderError::Unavailable)
    }

    fn base_paths(&self) -> Vec<PathBuf> {
        vec![PathBuf::from(ROOT)]
    }
}

/// Compiler whose execs echo their arguments together with the script name
#[derive(Default)]
pub struct MockCompiler {
    packed: Mutex<HashMap<PathBuf, Bootloader>>,
    pack_calls: Mutex<Vec<Vec<String>>>,
    contexts: Mutex<Vec<PathBuf>>,
    fail_pack: HashSet<String>,
    fail_load: HashSet<String>,
}

impl MockCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_pack(mut self, bundle: &str) -> Self {
        self.fail_pack.insert(bundle.to_string());
        self
    }

    pub fn failing_load(mut self, bundle: &str) -> Self {
        self.fail_load.insert(bundle.to_string());
        self
    }

    /// Bundle names passed to each pack call
    pub fn pack_calls(&self) -> Vec<Vec<String>> {
        let mut calls = self.pack_calls.lock().unwrap().clone();
        calls.sort();
        calls
    }

    pub fn contexts(&self) -> Vec<PathBuf> {
        let mut contexts = self.contexts.lock().unwrap().clone();
        contexts.sort();
        contexts
    }
}

#[async_trait]
impl ScriptCompiler for MockCompiler {
    async fn pack(
        &self,
        bootloaders: &[Bootloader],
        context: &Path,
        output_dir: &Path,
    ) -> Result<Artifact, CompileError> {
        self.pack_calls
            .lock()
            .unwrap()
            .push(bootloaders.iter().map(|b| b.bundle.clone()).collect());
        self.contexts.lock().unwrap().push(context.to_path_buf());

        let mut files = Vec::new();
        for bootloader in bootloaders {
            if self.fail_pack.contains(&bootloader.bundle) {
                return Err(CompileError::Source {
                    src: context.to_path_buf(),
                    message: format!("syntax error in {}", bootloader.bundle),
                });
            }
            let file = output_dir.join(format!("{}.json", bootloader.bundle));
            self.packed.lock().unwrap().insert(file.clone(), bootloader.clone());
            files.push(file);
        }

        Ok(Artifact {
            context: context.to_path_buf(),
            files,
        })
    }

    async fn load(
        &self,
        artifact: &Artifact,
    ) -> Result<HashMap<PathBuf, CompiledScript>, CompileError> {
        let packed = self.packed.lock().unwrap();
        let mut compiled = HashMap::new();

        for file in &artifact.files {
            let Some(bootloader) = packed.get(file) else {
                continue;
            };
            if self.fail_load.contains(&bootloader.bundle) {
                return Err(CompileError::Io {
                    path: file.clone(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "artifact vanished"),
                });
            }
            for entry in &bootloader.entries {
                let name = entry.name.clone();
                let mut script = CompiledScript::new(exec_fn(move |args, _| {
                    Ok(json!({ "script": name, "args": args }))
                }));
                script
                    .metadata
                    .insert("bundle".to_string(), json!(bootloader.bundle));
                compiled.insert(entry.src.clone(), script);
            }
        }

        Ok(compiled)
    }
}
