use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use super::{Manifest, ProcessExec};
use crate::compiler::{Artifact, Bootloader, CompileError, ScriptCompiler};
use crate::script::CompiledScript;

/// One packed script inside a bundle file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub src: PathBuf,
    pub name: String,
    pub program: String,
    pub args: Vec<String>,
    /// Working directory, relative to the bundle context
    pub cwd: PathBuf,
}

/// Contents of `<output>/<bundle>.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFile {
    pub bundle: String,
    pub context: PathBuf,
    pub entries: Vec<ArtifactEntry>,
}

impl ArtifactFile {
    pub async fn read(path: &Path) -> Result<Self, CompileError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| CompileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| CompileError::Artifact {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Packs manifests into JSON bundle files and loads them as process execs
#[derive(Debug, Clone, Default)]
pub struct ProcessCompiler;

impl ProcessCompiler {
    pub fn new() -> Self {
        Self
    }

    async fn entry(src: &Path, name: &str, context: &Path) -> Result<ArtifactEntry, CompileError> {
        let text = tokio::fs::read_to_string(src).await.map_err(|source| CompileError::Io {
            path: src.to_path_buf(),
            source,
        })?;

        let manifest = Manifest::parse(&text).map_err(|e| CompileError::Source {
            src: src.to_path_buf(),
            message: e.message().to_string(),
        })?;

        let mut command = manifest.command.into_iter();
        let program = command.next().ok_or_else(|| CompileError::Source {
            src: src.to_path_buf(),
            message: "command is missing".to_string(),
        })?;

        let dir = src.parent().unwrap_or(Path::new(""));
        let cwd = dir.strip_prefix(context).unwrap_or(dir).to_path_buf();

        Ok(ArtifactEntry {
            src: src.to_path_buf(),
            name: name.to_string(),
            program,
            args: command.collect(),
            cwd,
        })
    }
}

#[async_trait]
impl ScriptCompiler for ProcessCompiler {
    async fn pack(
        &self,
        bootloaders: &[Bootloader],
        context: &Path,
        output_dir: &Path,
    ) -> Result<Artifact, CompileError> {
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|source| CompileError::Io {
                path: output_dir.to_path_buf(),
                source,
            })?;

        let mut files = Vec::with_capacity(bootloaders.len());
        for bootloader in bootloaders {
            let mut entries = Vec::with_capacity(bootloader.entries.len());
            for entry in &bootloader.entries {
                entries.push(Self::entry(&entry.src, &entry.name, context).await?);
            }

            let file = ArtifactFile {
                bundle: bootloader.bundle.clone(),
                context: context.to_path_buf(),
                entries,
            };

            let path = output_dir.join(format!("{}.json", bootloader.bundle));
            let json = serde_json::to_vec_pretty(&file).map_err(|source| CompileError::Artifact {
                path: path.clone(),
                source,
            })?;
            tokio::fs::write(&path, json)
                .await
                .map_err(|source| CompileError::Io {
                    path: path.clone(),
                    source,
                })?;

            debug!(
                target: "scripting",
                bundle = %bootloader.bundle,
                entries = file.entries.len(),
                "wrote {}",
                path.display()
            );
            files.push(path);
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
        let mut compiled = HashMap::new();

        for path in &artifact.files {
            let file = ArtifactFile::read(path).await?;
            for entry in file.entries {
                let exec =
                    ProcessExec::new(entry.program, entry.args, file.context.join(&entry.cwd));

                let mut script = CompiledScript::new(Arc::new(exec));
                script
                    .metadata
                    .insert("bundle".to_string(), Value::from(file.bundle.clone()));
                script.metadata.insert(
                    "artifact".to_string(),
                    Value::from(path.to_string_lossy().into_owned()),
                );
                compiled.insert(entry.src, script);
            }
        }

        Ok(compiled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::Script;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::TempDir;

    fn script(name: &str, src: PathBuf) -> Script {
        Script {
            name: name.to_string(),
            src,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_pack_writes_bundle_file_with_relative_cwd() {
        let scripts_dir = TempDir::new().unwrap();
        let output_dir = TempDir::new().unwrap();
        let crm = scripts_dir.path().join("crm");
        fs::create_dir_all(crm.join("leads")).unwrap();

        let sync = crm.join("leads/sync.toml");
        fs::write(
            &sync,
            "name = \"sync\"\ncommand = [\"sh\", \"sync.sh\", \"--fast\"]\n",
        )
        .unwrap();
        let merge = crm.join("merge.toml");
        fs::write(&merge, "name = \"merge\"\ncommand = [\"merge\"]\n").unwrap();

        let s1 = script("sync", sync.clone());
        let s2 = script("merge", merge.clone());
        let mut groups = BTreeMap::new();
        groups.insert("crm".to_string(), vec![&s1, &s2]);

        let compiler = ProcessCompiler::new();
        let bootloaders = compiler.bootloader(output_dir.path(), &groups);
        let artifact = compiler
            .pack(&bootloaders, &crm, output_dir.path())
            .await
            .unwrap();

        assert_eq!(artifact.files, vec![output_dir.path().join("crm.json")]);

        let file = ArtifactFile::read(&artifact.files[0]).await.unwrap();
        assert_eq!(file.bundle, "crm");
        assert_eq!(file.entries[0].name, "sync");
        assert_eq!(file.entries[0].program, "sh");
        assert_eq!(file.entries[0].args, vec!["sync.sh", "--fast"]);
        assert_eq!(file.entries[0].cwd, PathBuf::from("leads"));
        assert_eq!(file.entries[1].cwd, PathBuf::new());

        let compiled = compiler.load(&artifact).await.unwrap();
        assert_eq!(compiled.len(), 2);
        assert_eq!(
            compiled[&sync].metadata.get("bundle"),
            Some(&Value::from("crm"))
        );
    }

    #[tokio::test]
    async fn test_pack_fails_without_command() {
        let scripts_dir = TempDir::new().unwrap();
        let output_dir = TempDir::new().unwrap();
        let src = scripts_dir.path().join("empty.toml");
        fs::write(&src, "name = \"empty\"").unwrap();

        let bootloader = Bootloader::new("default", &[&script("empty", src)]);
        let err = ProcessCompiler::new()
            .pack(&[bootloader], scripts_dir.path(), output_dir.path())
            .await
            .unwrap_err();

        assert!(matches!(err, CompileError::Source { .. }));
    }

    #[tokio::test]
    async fn test_load_rejects_corrupt_artifact() {
        let output_dir = TempDir::new().unwrap();
        let path = output_dir.path().join("crm.json");
        fs::write(&path, "{not json").unwrap();

        let artifact = Artifact {
            context: output_dir.path().to_path_buf(),
            files: vec![path],
        };
        let err = ProcessCompiler::new().load(&artifact).await.unwrap_err();
        assert!(matches!(err, CompileError::Artifact { .. }));
    }
}
