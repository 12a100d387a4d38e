//! Load, validate, group, pack and merge scripts, then swap the registry
//!
//! One [`BundlingPipeline::run`] is one reload. Problems with single scripts
//! or single bundles are logged and leave the affected scripts
//! non-executable; only a loader failure aborts the run.

use futures::future::join_all;
use runbook_config::{PackingGranularity, Profile, RunbookConfig};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::compiler::{Bootloader, CompileError, ScriptCompiler};
use crate::loader::{LoaderError, ScriptLoader};
use crate::registry::ScriptRegistry;
use crate::script::{CompiledScript, Script};

/// Bundle for scripts placed directly in a root directory
pub const DEFAULT_BUNDLE: &str = "default";

/// Explicit settings for a pipeline, fixed for the life of the process
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Bundle names are the first path segment below this directory
    pub scripts_root: PathBuf,
    /// Where packed bundles are written
    pub output_dir: PathBuf,
    pub profile: Profile,
    pub packing: PackingGranularity,
}

impl PipelineConfig {
    pub fn from_config(config: &RunbookConfig) -> Self {
        let profile = config.scripts.profile;
        Self {
            scripts_root: config.scripts.root(),
            output_dir: config.bundler.output_path(),
            profile,
            packing: config.bundler.packing(profile),
        }
    }
}

/// Outcome of one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReloadSummary {
    pub valid: usize,
    pub total: usize,
    pub bundles: usize,
    pub failed_bundles: Vec<String>,
}

pub struct BundlingPipeline {
    loader: Arc<dyn ScriptLoader>,
    compiler: Arc<dyn ScriptCompiler>,
    registry: Arc<ScriptRegistry>,
    config: PipelineConfig,
}

impl BundlingPipeline {
    pub fn new(
        loader: Arc<dyn ScriptLoader>,
        compiler: Arc<dyn ScriptCompiler>,
        registry: Arc<ScriptRegistry>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            loader,
            compiler,
            registry,
            config,
        }
    }

    pub fn loader(&self) -> &Arc<dyn ScriptLoader> {
        &self.loader
    }

    pub fn registry(&self) -> &Arc<ScriptRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the whole pipeline once and commit the result
    pub async fn run(&self) -> Result<ReloadSummary, LoaderError> {
        info!(
            target: "scripting",
            search_paths = ?self.loader.base_paths(),
            "Reloading scripts"
        );

        let raw = match self.loader.scripts().await {
            Ok(raw) => raw,
            Err(e) => {
                error!(target: "scripting", "Failed to load scripts, keeping current set: {}", e);
                return Err(e);
            }
        };

        let mut scripts: Vec<Script> = raw.into_iter().map(Script::from).collect();
        warn_duplicate_names(&scripts);

        let groups = self.group(&mut scripts);
        let (compiled, failed_bundles) = self.compile(&scripts, &groups).await;

        let merged: Vec<Script> = scripts
            .into_iter()
            .map(|script| match compiled.get(&script.src) {
                Some(c) if script.bundle.is_some() => script.with_compiled(c.clone()),
                _ => script,
            })
            .collect();

        let valid = merged.iter().filter(|s| self.is_valid(s)).count();
        if self.config.profile == Profile::Client {
            for s in merged.iter().filter(|s| s.bundle.is_some() && s.exec.is_none()) {
                warn!(
                    target: "scripting",
                    src = %s.src.display(),
                    script_name = %s.name,
                    "script error: not initialized after bundling"
                );
            }
        }

        let summary = ReloadSummary {
            valid,
            total: merged.len(),
            bundles: groups.len(),
            failed_bundles,
        };

        // Even an all-invalid set replaces the previous one
        self.registry.update(merged);

        info!(
            target: "scripting",
            valid = summary.valid,
            total = summary.total,
            bundles = summary.bundles,
            "processed"
        );

        Ok(summary)
    }

    /// Validity as reported in the run summary
    pub fn is_valid(&self, script: &Script) -> bool {
        match self.config.profile {
            Profile::Server => script.is_valid(),
            Profile::Client => {
                script.is_valid()
                    && !script.name.is_empty()
                    && !script.triggers.is_empty()
                    && script.exec.is_some()
            }
        }
    }

    /// Profile rules a script must pass before it is bundled
    fn bundle_errors(&self, script: &Script) -> Vec<String> {
        let mut errors = script.errors.clone();
        if self.config.profile == Profile::Client {
            if script.name.is_empty() {
                errors.push("script has no name".to_string());
            }
            if script.triggers.is_empty() {
                errors.push("script has no triggers".to_string());
            }
        }
        errors
    }

    /// Assign bundle names to bundleable scripts; returns bundle -> member indices
    fn group(&self, scripts: &mut [Script]) -> BTreeMap<String, Vec<usize>> {
        let mut roots = vec![self.config.scripts_root.clone()];
        for path in self.loader.base_paths() {
            if !roots.contains(&path) {
                roots.push(path);
            }
        }

        let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (idx, script) in scripts.iter_mut().enumerate() {
            let errors = self.bundle_errors(script);
            if !errors.is_empty() {
                for e in &errors {
                    warn!(
                        target: "scripting",
                        src = %script.src.display(),
                        script_name = %script.name,
                        "script error: {}",
                        e
                    );
                }
                continue;
            }

            let Some(bundle) = roots.iter().find_map(|root| bundle_name(root, &script.src)) else {
                warn!(
                    target: "scripting",
                    src = %script.src.display(),
                    script_name = %script.name,
                    "script is outside every scripts root, not bundling"
                );
                continue;
            };

            debug!(
                target: "scripting",
                script_name = %script.name,
                triggers = script.triggers.len(),
                bundle = %bundle,
                "script ready"
            );
            script.bundle = Some(bundle.clone());
            groups.entry(bundle).or_default().push(idx);
        }

        groups
    }

    async fn compile(
        &self,
        scripts: &[Script],
        groups: &BTreeMap<String, Vec<usize>>,
    ) -> (HashMap<PathBuf, CompiledScript>, Vec<String>) {
        let mut compiled = HashMap::new();
        let mut failed = Vec::new();

        if groups.is_empty() {
            return (compiled, failed);
        }

        let grouped: BTreeMap<String, Vec<&Script>> = groups
            .iter()
            .map(|(bundle, members)| {
                (
                    bundle.clone(),
                    members.iter().map(|&i| &scripts[i]).collect(),
                )
            })
            .collect();
        let bootloaders = self.compiler.bootloader(&self.config.output_dir, &grouped);

        match self.config.packing {
            PackingGranularity::PerBundle => {
                let jobs = bootloaders.iter().map(|bootloader| async move {
                    let context = common_path(bootloader.sources());
                    debug!(
                        target: "scripting",
                        bundle = %bootloader.bundle,
                        context = %context.display(),
                        "bundling scripts"
                    );
                    let result = self
                        .pack_and_load(std::slice::from_ref(bootloader), &context)
                        .await;
                    (bootloader.bundle.clone(), result)
                });

                for (bundle, result) in join_all(jobs).await {
                    match result {
                        Ok(map) => compiled.extend(map),
                        Err(e) => {
                            warn!(
                                target: "scripting",
                                bundle = %bundle,
                                "Failed to bundle scripts: {}",
                                e
                            );
                            failed.push(bundle);
                        }
                    }
                }
            }
            PackingGranularity::Single => {
                let context = common_path(bootloaders.iter().flat_map(|b| b.sources()));
                debug!(
                    target: "scripting",
                    bundles = bootloaders.len(),
                    context = %context.display(),
                    "bundling all scripts"
                );
                match self.pack_and_load(&bootloaders, &context).await {
                    Ok(map) => compiled.extend(map),
                    Err(e) => {
                        error!(target: "scripting", "Failed to bundle scripts: {}", e);
                        failed.extend(bootloaders.iter().map(|b| b.bundle.clone()));
                    }
                }
            }
        }

        (compiled, failed)
    }

    async fn pack_and_load(
        &self,
        bootloaders: &[Bootloader],
        context: &Path,
    ) -> Result<HashMap<PathBuf, CompiledScript>, CompileError> {
        let artifact = self
            .compiler
            .pack(bootloaders, context, &self.config.output_dir)
            .await?;
        self.compiler.load(&artifact).await
    }
}

fn warn_duplicate_names(scripts: &[Script]) {
    let mut seen = HashSet::new();
    for s in scripts.iter().filter(|s| !s.name.is_empty()) {
        if !seen.insert(s.name.as_str()) {
            warn!(
                target: "scripting",
                src = %s.src.display(),
                script_name = %s.name,
                "duplicate script name, lookups resolve to the first one"
            );
        }
    }
}

/// Bundle a source belongs to: its first path segment below `root`
///
/// Sources directly inside `root` belong to [`DEFAULT_BUNDLE`]; sources
/// outside `root` have no bundle.
pub fn bundle_name(root: &Path, src: &Path) -> Option<String> {
    let relative = src.strip_prefix(root).ok()?;
    let mut components = relative.components();

    let first = match components.next()? {
        Component::Normal(segment) => segment.to_string_lossy().into_owned(),
        _ => return None,
    };

    if components.next().is_none() {
        Some(DEFAULT_BUNDLE.to_string())
    } else {
        Some(first)
    }
}

/// Deepest directory containing every given file
pub fn common_path<'a>(sources: impl IntoIterator<Item = &'a Path>) -> PathBuf {
    let mut common: Option<Vec<Component<'a>>> = None;

    for src in sources {
        let dir: Vec<Component<'a>> = src
            .parent()
            .map(|p| p.components().collect())
            .unwrap_or_default();
        common = Some(match common {
            None => dir,
            Some(prefix) => prefix
                .into_iter()
                .zip(dir)
                .take_while(|(a, b)| a == b)
                .map(|(a, _)| a)
                .collect(),
        });
    }

    common.unwrap_or_default().into_iter().collect()
}
